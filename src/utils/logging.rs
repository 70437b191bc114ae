//! Logging Module
//!
//! Structured logging through the `tracing` crate. Binaries call
//! [`init_logging`] once at startup; `RUST_LOG` replaces the configured filter.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use super::error::{KanjiError, Result};
use super::format_duration;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level applied to every target without its own directive
    pub level: LogLevel,
    /// Extra `EnvFilter` directives, e.g. `tower_http=debug` to see each request
    pub directives: Vec<String>,
    /// Whether to include target (module path)
    pub show_target: bool,
    /// Whether to use ANSI colors
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            directives: Vec::new(),
            show_target: false,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Debug output from this crate and per-request HTTP traces
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            directives: vec!["tower_http=debug".to_string()],
            show_target: true,
            ansi: true,
        }
    }

    /// Filter string handed to `EnvFilter` when `RUST_LOG` is unset
    pub fn filter_string(&self) -> String {
        std::iter::once(self.level.to_string())
            .chain(self.directives.iter().cloned())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// Initialize the global subscriber with the given configuration
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.filter_string())
            .map_err(|e| KanjiError::Config(format!("Invalid log directives: {e}")))?,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(config.ansi)
                .with_target(config.show_target)
                .compact(),
        )
        .with(filter)
        .try_init()
        .map_err(|e| KanjiError::Config(format!("Failed to initialize logging: {e}")))
}

/// Reports progress of a per-item loop roughly every tenth of the way
pub struct ProgressLogger {
    operation: String,
    total: usize,
    done: usize,
    step: usize,
    next_report: usize,
    started: Instant,
}

impl ProgressLogger {
    pub fn new(operation: &str, total: usize) -> Self {
        let step = (total / 10).max(1);
        Self {
            operation: operation.to_string(),
            total,
            done: 0,
            step,
            next_report: step,
            started: Instant::now(),
        }
    }

    pub fn increment(&mut self) {
        self.done += 1;
        if self.done >= self.next_report {
            self.next_report += self.step;
            tracing::debug!(
                "{}: {}/{} ({:.0}%)",
                self.operation,
                self.done,
                self.total,
                100.0 * self.done as f64 / self.total.max(1) as f64
            );
        }
    }

    pub fn done(&self) -> usize {
        self.done
    }

    /// Log completion
    pub fn finish(&self) {
        tracing::info!(
            "{}: {} items in {}",
            self.operation,
            self.done,
            format_duration(self.started.elapsed())
        );
    }
}
