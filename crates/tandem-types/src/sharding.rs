use std::fmt;

use serde::{Deserialize, Serialize};

/// Externally resolved physical target for an entity in a given context.
///
/// The sharding-strategy collaborator computes this; the dispatch layer only
/// carries it around as identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardingDescriptor {
    /// Name of the strategy that produced the target.
    pub strategy: String,
    /// Resolved store (database) name.
    pub store: String,
    /// Resolved table name.
    pub table: String,
}

impl ShardingDescriptor {
    pub fn new(
        strategy: impl Into<String>,
        store: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            strategy: strategy.into(),
            store: store.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for ShardingDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.strategy, self.store, self.table)
    }
}
