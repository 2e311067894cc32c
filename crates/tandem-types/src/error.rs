use thiserror::Error;

use crate::transaction::TransactionId;

/// Errors surfaced by accessors and by every dispatch layer above them.
///
/// A caller observes exactly one of these per failed operation: failover
/// chains surface the last member's error, transactional traversals the
/// first blocking one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    /// A member accessor could not serve the operation.
    #[error("store unavailable: {accessor}: {reason}")]
    StoreUnavailable { accessor: String, reason: String },

    /// Nothing usable was configured (empty equalizer, no matching accessor).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The operation has no meaning on this accessor (e.g. on a composite).
    #[error("operation not supported: {operation}")]
    Unsupported { operation: String },

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// A transaction could not be enlisted, prepared, or committed.
    #[error("transaction {transaction}: {reason}")]
    Transaction {
        transaction: TransactionId,
        reason: String,
    },

    /// An update or remove referenced a record that does not exist.
    #[error("{entity_type} not found: {key}")]
    NotFound { entity_type: String, key: String },

    /// A record could not be converted to or from a typed entity.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An add collided with an existing record.
    #[error("duplicate {entity_type} key: {key}")]
    DuplicateKey { entity_type: String, key: String },

    /// A raw statement could not be executed.
    #[error("invalid statement: {0}")]
    InvalidStatement(String),
}

impl AccessError {
    /// Shorthand for [`AccessError::StoreUnavailable`].
    pub fn unavailable(accessor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            accessor: accessor.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`AccessError::Unsupported`].
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Returns `true` if this error came from a cancelled token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result alias for accessor operations.
pub type AccessResult<T> = Result<T, AccessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = AccessError::unavailable("orders-b", "connection refused");
        assert_eq!(
            err.to_string(),
            "store unavailable: orders-b: connection refused"
        );
        assert_eq!(
            AccessError::unsupported("change_connection").to_string(),
            "operation not supported: change_connection"
        );
        assert_eq!(AccessError::Cancelled.to_string(), "operation cancelled");
    }

    #[test]
    fn cancelled_predicate() {
        assert!(AccessError::Cancelled.is_cancelled());
        assert!(!AccessError::Configuration("x".into()).is_cancelled());
    }
}
