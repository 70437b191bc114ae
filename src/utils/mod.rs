//! Utilities module for logging, error handling and small helpers

pub mod error;
pub mod logging;

use std::time::Duration;

// Re-export main types for convenience
pub use error::{IoContext, KanjiError, Result};
pub use logging::{init_logging, LogConfig, LogLevel, ProgressLogger};

/// Short human-readable duration: `12.3s`, `4m05s`, `2h03m`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0..=59 => format!("{:.1}s", duration.as_secs_f64()),
        60..=3599 => format!("{}m{:02}s", secs / 60, secs % 60),
        _ => format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60),
    }
}
