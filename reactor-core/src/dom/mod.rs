//! DOM Binding
//!
//! The glue between reactors and a document tree. The renderer treats
//! reactive and plain values differently, so values headed for the tree are
//! wrapped in [`Bindable`]: a `Reactive` value is rendered once and then
//! re-applied on every write, a `Static` one is rendered once.
//!
//! Sequences are kept in sync by the positional [`reconcile`] pass, through
//! any tree implementing [`DomHost`]. [`MemoryDom`] is an in-memory tree used
//! for headless rendering and tests.

mod memory;
mod reconcile;

pub use memory::{MemoryDom, NodeKey};
pub use reconcile::{bind_list, reconcile, ListBinding, Patch};

use std::fmt::Debug;

use smallvec::SmallVec;

use crate::reactive::{Reactor, Subscription};

/// The DOM nodes rendered for one list item.
pub type Slot<N> = SmallVec<[N; 1]>;

/// The tree operations list reconciliation needs.
pub trait DomHost {
    /// Handle to a node of the tree.
    type Node: Clone + PartialEq + Debug;

    /// Insert `node` right after `reference`, under the same parent. A node
    /// that is already attached elsewhere is moved.
    fn insert_after(&mut self, reference: &Self::Node, node: &Self::Node);

    /// Detach `node` from the tree.
    fn remove(&mut self, node: &Self::Node);
}

/// A value the renderer may receive: either fixed or reactive.
pub enum Bindable<T> {
    Static(T),
    Reactive(Reactor<T>),
}

impl<T> Bindable<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn is_reactive(&self) -> bool {
        matches!(self, Bindable::Reactive(_))
    }

    /// The current value. Reading a reactive value is tracked.
    pub fn current(&self) -> T {
        match self {
            Bindable::Static(value) => value.clone(),
            Bindable::Reactive(reactor) => reactor.get(),
        }
    }

    /// Call `apply` with the current value now and, for reactive values,
    /// after every write. Returns the subscription when there is one.
    pub fn bind<F>(&self, apply: F) -> Option<Subscription>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        match self {
            Bindable::Static(value) => {
                apply(value);
                None
            }
            Bindable::Reactive(reactor) => {
                apply(&reactor.peek());
                Some(reactor.subscribe(move |_, new| apply(new)))
            }
        }
    }
}

impl<T> From<Reactor<T>> for Bindable<T> {
    fn from(reactor: Reactor<T>) -> Self {
        Bindable::Reactive(reactor)
    }
}
