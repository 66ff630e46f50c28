// Error taxonomy for the decision engine
use thiserror::Error;

/// Failures while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),

    #[error("configuration store has no backing file")]
    NoBackingFile,

    #[error("failed to watch configuration file: {0}")]
    Watch(#[from] notify::Error),

    #[error("reload task failed: {0}")]
    ReloadTask(String),

    #[error("invalid configuration for {symbol}: {reason}")]
    Invalid { symbol: String, reason: String },
}

/// Failures reported by (or while talking to) the order gateway
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    #[error("order rejected ({code}): {message}")]
    Rejected {
        code: i32,
        message: String,
        retryable: bool,
    },

    #[error("gateway did not answer within the timeout")]
    Timeout,

    #[error("gateway transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    /// Whether the request can be sent again without risking a duplicate
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Rejected { retryable, .. } => *retryable,
            GatewayError::Transport(_) => true,
            GatewayError::Timeout => false,
        }
    }
}

/// Per-symbol pipeline failures. None of these halt other symbols.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("data unavailable for {symbol}: {what}")]
    DataUnavailable { symbol: String, what: String },

    #[error("symbol {symbol} excluded from trading: {reason}")]
    ConfigInvalid { symbol: String, reason: String },

    #[error("order for {symbol} rejected: {source}")]
    OrderRejected {
        symbol: String,
        #[source]
        source: GatewayError,
    },
}
