//! Error types for the scheduler module

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::utils::error::{FinderError, StoreError};

/// Result type for scheduler operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Scheduler-specific errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Find failed: {0}")]
    Finder(#[from] FinderError),

    #[error("Cache store failed: {0}")]
    Store(#[from] StoreError),

    /// The archive answered but listed nothing at or after the watermark
    #[error("No dumps found for {collector} since {since}")]
    NoDumps {
        collector: String,
        since: DateTime<Utc>,
    },

    /// Shutdown was requested mid-cycle
    #[error("Synchronization cancelled")]
    Cancelled,

    /// Malformed `PAIR=TIME` start argument
    #[error("Invalid start '{arg}': {reason}")]
    InvalidStart { arg: String, reason: String },
}

impl SyncError {
    pub fn invalid_start(arg: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidStart {
            arg: arg.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Finder(e) => e.is_recoverable(),
            Self::Store(_) | Self::NoDumps { .. } => true,
            Self::Cancelled | Self::InvalidStart { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_start_message() {
        let err = SyncError::invalid_start("ris/rib", "missing '='");
        assert!(err.to_string().contains("ris/rib"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_empty_result_is_recoverable() {
        let err = SyncError::NoDumps {
            collector: "rrc00".to_string(),
            since: Utc::now(),
        };
        assert!(err.is_recoverable());
        assert!(!SyncError::Cancelled.is_recoverable());
    }
}
