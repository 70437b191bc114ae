//! API route handlers

pub mod classification;
pub mod health;
pub mod training;
