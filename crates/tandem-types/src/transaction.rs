use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Unique identifier for a transaction scope (UUID v7 for time-ordering).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(uuid::Uuid);

impl TransactionId {
    /// Generate a new time-ordered transaction ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters of UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", self.short_id())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An explicit transaction scope.
///
/// Passed by value to every member taking part in a transactional traversal
/// instead of living in ambient or thread-local state. Members key their
/// pending work by [`TransactionContext::id`].
#[derive(Clone, Debug)]
pub struct TransactionContext {
    id: TransactionId,
    started: Instant,
}

impl TransactionContext {
    /// Open a new scope.
    pub fn begin() -> Self {
        Self {
            id: TransactionId::new(),
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// When the scope was opened.
    pub fn started(&self) -> Instant {
        self.started
    }
}

impl PartialEq for TransactionContext {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TransactionContext {}
