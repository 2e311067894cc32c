//! Invocation strategies ("equalizers") for Tandem.
//!
//! An [`Equalizer`] is a fixed, priority-ordered, non-empty set of members.
//! The strategies wrap one and decide how a single logical operation is
//! invoked across it:
//!
//! - [`ExceptionSwitching`]: first success wins; failures advance to the
//!   next member; the last member's error surfaces if all fail.
//! - [`TransactionTraversal`]: every member inside one explicit
//!   [`TransactionContext`](tandem_types::TransactionContext); two-phase
//!   completion; any failure rolls every member back.
//! - [`PlainTraversal`]: every member, no transaction, nothing rolled back.
//!
//! Members are visited in ascending priority order, ties broken by
//! registration order, for every strategy.

pub mod equalizer;
pub mod invocation;
pub mod switching;
pub mod traversal;

pub use equalizer::{Equalizer, Participant, Ranked};
pub use invocation::Invocation;
pub use switching::ExceptionSwitching;
pub use traversal::{PlainTraversal, TransactionTraversal};

pub use futures_util::future::BoxFuture;
