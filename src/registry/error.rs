use std::time::Duration;
use thiserror::Error;

use crate::stamp::StampError;
use crate::storage::StorageError;
use crate::types::ProtocolType;

/// Failures of the numbering and filing workflows.
///
/// Everything except `Validation` happens inside a database transaction
/// that is rolled back before the error reaches the caller.
#[derive(Debug, Error)]
pub enum FilingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("timed out waiting for the counter lock on {year}/{protocol_type}")]
    LockTimeout { year: i32, protocol_type: ProtocolType },

    #[error("upload to remote storage failed: {0}")]
    Upload(#[source] StorageError),

    #[error("persisting protocol failed: {0}")]
    Persistence(#[source] sqlx::Error),

    /// Reads and deletions; no number is at stake
    #[error("database operation failed: {0}")]
    Database(#[source] sqlx::Error),

    #[error("protocol counter {year}/{protocol_type} has no numbers left")]
    CounterExhausted { year: i32, protocol_type: ProtocolType },

    #[error("pdf stamping failed: {0}")]
    Stamp(#[from] StampError),

    #[error("protocol not found: {0}")]
    NotFound(String),

    #[error("operation did not complete within {0:?}")]
    Timeout(Duration),
}

impl FilingError {
    pub fn validation(message: impl Into<String>) -> Self {
        FilingError::Validation(message.into())
    }

    /// Whether re-issuing the whole operation can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FilingError::LockTimeout { .. } | FilingError::Upload(_) | FilingError::Timeout(_)
        )
    }
}

/// Postgres `lock_not_available`, raised when `lock_timeout` expires
const LOCK_NOT_AVAILABLE: &str = "55P03";

pub(crate) fn is_lock_timeout(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(LOCK_NOT_AVAILABLE),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(FilingError::LockTimeout { year: 2025, protocol_type: ProtocolType::Incoming }.is_retryable());
        assert!(FilingError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(FilingError::Upload(StorageError::Rejected("quota".into())).is_retryable());
        assert!(!FilingError::validation("missing pdf").is_retryable());
        assert!(!FilingError::NotFound("7".into()).is_retryable());
    }

    #[test]
    fn messages_name_the_failure() {
        let e = FilingError::LockTimeout { year: 2025, protocol_type: ProtocolType::Outgoing };
        assert_eq!(e.to_string(), "timed out waiting for the counter lock on 2025/U");
        let e = FilingError::Upload(StorageError::Rejected("403 forbidden".into()));
        assert!(e.to_string().starts_with("upload to remote storage failed"));
    }

    #[test]
    fn exhausted_counter_is_not_retryable() {
        let e = FilingError::CounterExhausted { year: 2025, protocol_type: ProtocolType::Internal };
        assert!(!e.is_retryable());
        assert_eq!(e.to_string(), "protocol counter 2025/I has no numbers left");
    }

    #[test]
    fn non_database_errors_are_not_lock_timeouts() {
        assert!(!is_lock_timeout(&sqlx::Error::RowNotFound));
        assert!(!is_lock_timeout(&sqlx::Error::PoolTimedOut));
    }
}
