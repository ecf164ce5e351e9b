//! Error types for the pingback service.

/// Top-level error type for the acknowledgement tracker.
#[derive(Debug, thiserror::Error)]
pub enum PingbackError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Status record persistence error (write side; reads fall back to defaults).
    #[error("store error: {0}")]
    Store(String),

    /// Messaging gateway error.
    #[error("gateway error: {0}")]
    Gateway(#[from] crate::gateway::GatewayError),

    /// Scheduler lifecycle error.
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PingbackError>;
