//! # Error Types
//!
//! Custom error types for the PACSAT telemetry logger using `thiserror`.

use thiserror::Error;

/// Main error type for the telemetry logger
#[derive(Debug, Error)]
pub enum TelemError {
    /// Malformed telemetry record bytes
    #[error("Telemetry record error: {0}")]
    Record(String),

    /// AGW framing errors
    #[error("AGW protocol error: {0}")]
    Agw(String),

    /// Radio link (TNC connection) errors
    #[error("Link error: {0}")]
    Link(String),

    /// Too many WOD file I/O failures; the process must stop
    #[error("Too many file I/O errors: {errors} (max {max})")]
    ErrorBudgetExhausted { errors: u32, max: u32 },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the telemetry logger
pub type Result<T> = std::result::Result<T, TelemError>;
