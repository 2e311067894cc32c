//! Dispatcher layer for Tandem.
//!
//! A [`Dispatcher`] is a named handle (`reading` or `writing`) over one
//! invocation strategy from `tandem-equalizer`. It remembers which member
//! served the most recent call ([`Dispatcher::current_source`]) so callers
//! can tell which physical store answered.
//!
//! [`DispatchableAccessors`] bundles the reading and writing handles of one
//! accessor group, and a [`DispatcherFactory`] builds them, so redundancy
//! policies can be swapped without touching call sites:
//!
//! | constructor   | reading               | writing               |
//! |---------------|-----------------------|-----------------------|
//! | `base`        | exception switching   | transaction traversal |
//! | `transaction` | transaction traversal | transaction traversal |
//! | `compositing` | one shared transaction traversal handle       |

pub mod dispatcher;
pub mod factory;

pub use dispatcher::{DispatchKind, Dispatcher};
pub use factory::{DispatchableAccessors, DispatcherFactory, StandardDispatcherFactory};
