//! Reactor Core
//!
//! Fine-grained reactive state for client-side UIs. It provides:
//!
//! - Reactors: observable values that are writable, read-only or one-shot
//! - Dependency recording for effects and computed values
//! - Derived views (`copy`, `compute`, `filter`, `when`) and two-way deep
//!   property access
//! - Positional list reconciliation against a pluggable DOM host
//!
//! # Architecture
//!
//! - `reactive`: reactors, the recorder and the runtime that owns them
//! - `graph`: arena of node ids with source, derived and parent links
//! - `dom`: bindable values and the list reconciler
//! - `config`: runtime settings
//! - `error`: the crate error type
//!
//! All state hangs off an explicit [`Runtime`]; there is no global context.
//!
//! # Example
//!
//! ```rust
//! use reactor_core::Runtime;
//!
//! let rt = Runtime::new();
//! let count = rt.reactor(1);
//! let doubled = count.compute(|n| n * 2);
//!
//! let (_, deps) = rt.record(|| doubled.get());
//! assert!(deps.contains(doubled.id()));
//!
//! count.set(5).unwrap();
//! assert_eq!(doubled.get(), 10);
//! ```

pub mod config;
pub mod dom;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::{ReentrancyPolicy, RuntimeConfig};
pub use error::{ReactorError, Result};
pub use graph::{NodeId, NodeKind};
pub use reactive::{Effect, Reactor, Runtime, Subscription};
