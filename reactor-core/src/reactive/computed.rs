//! Auto-computed Reactors
//!
//! [`Runtime::computed`] derives a read-only reactor from any closure. The
//! closure's dependencies are discovered by the recorder, the same way an
//! [`Effect`] discovers them, instead of being named up front as with
//! [`Reactor::compute`].
//!
//! The value is recomputed eagerly, once per write to any dependency, and
//! every recomputation notifies the reactor's subscribers.

use std::sync::Arc;

use super::effect::Effect;
use super::reactor::{Access, Node, Reactor};
use super::runtime::Runtime;
use crate::graph::NodeKind;

impl Runtime {
    /// A read-only reactor holding the result of `compute`, recomputed
    /// whenever a reactor it read changes.
    ///
    /// ```rust
    /// use reactor_core::reactive::Runtime;
    ///
    /// let rt = Runtime::new();
    /// let (first, last) = (rt.reactor("Ada"), rt.reactor("Lovelace"));
    ///
    /// let (f, l) = (first.clone(), last.clone());
    /// let full = rt.computed(move || format!("{} {}", f.get(), l.get()));
    ///
    /// last.set("Byron").unwrap();
    /// assert_eq!(full.get(), "Ada Byron");
    /// ```
    pub fn computed<T, F>(&self, compute: F) -> Reactor<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let (initial, dependencies) = self.record(&compute);
        let reactor = Node::create(self, initial, Access::ReadOnly, NodeKind::Derived);

        let target = Arc::downgrade(&reactor.node);
        let effect = Effect::watching(self, Some(reactor.id()), dependencies, move || {
            let next = compute();
            let Some(node) = target.upgrade() else {
                return Ok(());
            };
            node.apply(next).inspect_err(|err| {
                tracing::error!(node = %node.id(), %err, "computed reactor update failed");
            })
        });

        reactor.node.own(effect);
        reactor
    }
}
