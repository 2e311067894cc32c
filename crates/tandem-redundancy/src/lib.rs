//! Redundancy policies for Tandem.
//!
//! Each policy wraps a group of member accessors and is itself an
//! [`Accessor`](tandem_accessor::Accessor), so application code cannot tell a
//! composite from a single store:
//!
//! - [`CompositingAccessor`]: every read and write replayed on every member.
//! - [`MirroringAccessor`]: reads fail over, writes replicate atomically.
//! - [`StripingAccessor`]: disjoint shards; reads aggregate across shards.
//!
//! [`build_policy`] picks the policy for a [`RedundancyMode`](tandem_types::RedundancyMode)
//! and bypasses wrapping for single-member groups.
//!
//! Composites are transaction participants too. Enlisting a composite
//! enlists its members and routes its own writes through the enclosing
//! transaction, so composites can be nested.

pub mod compositing;
mod fanout;
pub mod mirroring;
pub mod policy;
pub mod striping;

#[cfg(test)]
pub(crate) mod testing;

pub use compositing::CompositingAccessor;
pub use mirroring::MirroringAccessor;
pub use policy::{build_policy, RedundantAccessor};
pub use striping::StripingAccessor;
