//! Foundation types for Tandem, the redundant-accessor dispatch engine.
//!
//! Every other Tandem crate depends on `tandem-types`. Nothing in here talks
//! to a store; these are the values that flow between accessors, equalizers
//! and redundancy policies.
//!
//! # Key Types
//!
//! - [`AccessMode`]: Read / Write / ReadWrite capability flags
//! - [`RedundancyMode`]: fan-out policy selector for an accessor group
//! - [`Record`], [`Key`], [`Statement`]: the data crossing the accessor boundary
//! - [`Specification`], [`QuerySpec`], [`Paging`], [`PagedList`]: list retrieval
//! - [`ShardingDescriptor`]: externally resolved physical target
//! - [`TransactionContext`]: explicit transaction scope threaded to members
//! - [`AccessError`]: the error taxonomy shared by every layer

pub mod error;
pub mod mode;
pub mod record;
pub mod sharding;
pub mod specification;
pub mod transaction;

pub use error::{AccessError, AccessResult};
pub use mode::{AccessMode, RedundancyMode};
pub use record::{Entity, Key, Record, Statement};
pub use sharding::ShardingDescriptor;
pub use specification::{PagedList, Paging, QuerySpec, Specification};
pub use transaction::{TransactionContext, TransactionId};
