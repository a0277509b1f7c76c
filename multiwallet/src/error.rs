//! Error types for the multiwallet core.

use std::io;
use thiserror::Error;

use crate::types::WalletId;

/// Main error type for account, balance and selection operations.
///
/// Backend engines report their own error types; the asset adapters translate
/// them into this taxonomy so nothing backend-specific escapes the adapter.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Wallet is locked")]
    WalletLocked,

    #[error("Backend failure: {0}")]
    BackendFailure(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Wallet already exists: {0}")]
    WalletExists(WalletId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WalletError {
    /// Whether this error means the looked up wallet or account does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, WalletError::NotFound(_))
    }
}

/// Logging-related errors.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log directory: {0}")]
    DirectoryCreation(#[from] io::Error),

    #[error("Subscriber initialization failed: {0}")]
    SubscriberInit(String),
}

/// Type alias for results of wallet core operations.
pub type Result<T> = std::result::Result<T, WalletError>;

/// Type alias for logging setup results.
pub type LoggingResult<T> = std::result::Result<T, LoggingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(WalletError::WalletLocked.to_string(), "Wallet is locked");
        assert_eq!(
            WalletError::NotFound("account 7".to_string()).to_string(),
            "Not found: account 7"
        );
        assert_eq!(WalletError::WalletExists(3).to_string(), "Wallet already exists: 3");
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err: WalletError = json_err.into();
        assert!(matches!(err, WalletError::Serialization(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_logging_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: LoggingError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }
}
