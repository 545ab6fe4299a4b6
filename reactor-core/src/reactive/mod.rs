//! Reactive Primitives
//!
//! This module implements the reactive core: reactors, the dependency
//! recorder, derived views, deep access and effects.
//!
//! # Concepts
//!
//! ## Reactors
//!
//! A [`Reactor`] is a container for a value. Writing it synchronously
//! notifies every subscriber with the previous and the new value. Reactors
//! come in three access flavours: writable, read-only, and one-shot
//! (writable once, read-only afterwards).
//!
//! ## Recording
//!
//! A tracked read ([`Reactor::get`]) reports the reactor to the runtime's
//! [`Recorder`]. [`Runtime::record`] wraps a closure in a recording window
//! and returns the set of reactors it read, which is how effects and
//! auto-computed values discover their dependencies.
//!
//! ## Derived views
//!
//! `compute`, `reader`, `filter` and `when` build read-only reactors that
//! follow a source; `copy` and `freeze` take independent snapshots.
//!
//! ## Deep access
//!
//! `at` and `lens` give a reactor for one part of another reactor's value.
//! Writes flow both ways between the two.
//!
//! # Implementation Notes
//!
//! Everything is synchronous. There is no scheduler and no batching in this
//! module; a write returns once every subscriber, derived view and effect
//! downstream of it has run.

mod computed;
mod deep;
mod derive;
mod effect;
mod reactor;
mod recorder;
mod runtime;
mod subscriber;

pub use deep::Traverse;
pub use derive::Truthy;
pub use effect::Effect;
pub use reactor::Reactor;
pub use recorder::{Dependencies, Recorder};
pub use runtime::{AnyReactor, Recording, Runtime};
pub use subscriber::{SubscriberId, Subscription};
