//! From resolved registrations to the accessors application code uses.
//!
//! - [`filter_accessors`]: access-mode filtering
//! - [`Aggregator`]: one accessor per (group, partition), wrapped in the
//!   group's redundancy policy
//! - [`Slicer`]: aggregation after a caller-supplied routing predicate
//! - [`Resolver`] / [`StaticResolver`]: where registrations come from
//! - [`TopologyConfig`]: TOML description of a topology

pub mod aggregator;
pub mod config;
pub mod error;
pub mod filter;
pub mod resolver;
pub mod slicer;

pub use aggregator::{group_by_partition, Aggregate, Aggregator};
pub use config::{AccessorConfig, ShardingConfig, TopologyConfig};
pub use error::{ConfigError, ConfigResult};
pub use filter::filter_accessors;
pub use resolver::{Resolver, StaticResolver};
pub use slicer::{sharding_predicate, SliceContext, SlicePredicate, Slicer};
