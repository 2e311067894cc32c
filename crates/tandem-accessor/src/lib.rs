//! The Accessor capability for Tandem.
//!
//! An [`Accessor`] is one logical connection to a backing store. Everything
//! above this crate (equalizers, dispatchers, redundancy policies) only ever
//! sees accessors through this trait, so a composite of N accessors is itself
//! an accessor and can be handed to application code unchanged.
//!
//! # Modules
//!
//! - [`traits`]: the [`Accessor`] trait (sync and async surface)
//! - [`ext`]: [`AccessorExt`] typed helpers over [`Entity`](tandem_types::Entity) types
//! - [`descriptor`]: [`AccessorDescriptor`], the registration record
//! - [`memory`]: [`InMemoryAccessor`] for tests and embedding

pub mod descriptor;
pub mod ext;
pub mod memory;
pub mod traits;

pub use descriptor::AccessorDescriptor;
pub use ext::AccessorExt;
pub use memory::InMemoryAccessor;
pub use traits::{check_cancelled, Accessor};

pub use tokio_util::sync::CancellationToken;
