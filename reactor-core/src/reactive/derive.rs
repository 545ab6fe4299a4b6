//! Derived Views
//!
//! Operations that produce a new reactor from an existing one:
//!
//! | operation   | writable | follows the source        |
//! |-------------|----------|---------------------------|
//! | `copy`      | yes      | no                        |
//! | `freeze`    | no       | no                        |
//! | `reader`    | no       | yes, same value           |
//! | `compute`   | no       | yes, mapped               |
//! | `filter`    | no       | yes, when predicate holds |
//! | `when`      | no       | yes, branch on truthiness |
//!
//! A following view subscribes to its source. The callback runs exactly once
//! per source write, synchronously, inside the source's notification loop;
//! there is no batching at this level. Once the last handle to a view is
//! dropped the view unsubscribes and its callback never runs again.

use std::sync::Arc;

use super::reactor::{Access, Node, Reactor};
use crate::graph::NodeKind;

/// JavaScript-style truthiness, used by [`Reactor::when`].
pub trait Truthy {
    fn is_truthy(&self) -> bool;
}

impl Truthy for bool {
    fn is_truthy(&self) -> bool {
        *self
    }
}

macro_rules! impl_truthy_for_int {
    ($($ty:ty),*) => {
        $(
            impl Truthy for $ty {
                fn is_truthy(&self) -> bool {
                    *self != 0
                }
            }
        )*
    };
}

impl_truthy_for_int!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl Truthy for f32 {
    fn is_truthy(&self) -> bool {
        *self != 0.0 && !self.is_nan()
    }
}

impl Truthy for f64 {
    fn is_truthy(&self) -> bool {
        *self != 0.0 && !self.is_nan()
    }
}

impl Truthy for str {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl Truthy for String {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl<T: Truthy + ?Sized> Truthy for &T {
    fn is_truthy(&self) -> bool {
        (**self).is_truthy()
    }
}

impl<T: Truthy> Truthy for Option<T> {
    fn is_truthy(&self) -> bool {
        self.as_ref().is_some_and(Truthy::is_truthy)
    }
}

impl Truthy for serde_json::Value {
    fn is_truthy(&self) -> bool {
        use serde_json::Value;

        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f.is_truthy()),
            Value::String(s) => s.is_truthy(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }
}

impl<T> Reactor<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Independent writable reactor holding the current value. Nothing is
    /// shared with the source afterwards.
    pub fn copy(&self) -> Reactor<T> {
        Node::create(self.runtime(), self.peek(), Access::Writable, NodeKind::Snapshot)
    }

    /// Read-only snapshot of the current value. Later writes to the source
    /// are not seen.
    pub fn freeze(&self) -> Reactor<T> {
        Node::create(self.runtime(), self.peek(), Access::ReadOnly, NodeKind::Snapshot)
    }

    /// Read-only mirror that receives every write made to the source.
    pub fn reader(&self) -> Reactor<T> {
        self.derive(NodeKind::Reader, self.peek(), |new| Some(new.clone()))
    }

    /// Read-only reactor holding `f(source)`.
    ///
    /// `f` runs once now and exactly once per later write to the source.
    pub fn compute<U, F>(&self, f: F) -> Reactor<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let initial = f(&self.peek());
        self.derive(NodeKind::Derived, initial, move |new| Some(f(new)))
    }

    /// Read-only reactor that starts at the current value and then follows
    /// only the source writes accepted by `predicate`.
    pub fn filter<F>(&self, predicate: F) -> Reactor<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.derive(NodeKind::Derived, self.peek(), move |new| {
            predicate(new).then(|| new.clone())
        })
    }

    /// `truthy` while the source value is truthy, `falsy` otherwise.
    pub fn when<U>(&self, truthy: U, falsy: U) -> Reactor<U>
    where
        T: Truthy,
        U: Clone + Send + Sync + 'static,
    {
        self.when_with(|value: &T| value.is_truthy(), truthy, falsy)
    }

    /// `truthy` while `predicate(source)` holds, `falsy` otherwise.
    pub fn when_with<U, P>(&self, predicate: P, truthy: U, falsy: U) -> Reactor<U>
    where
        U: Clone + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.compute(move |value| {
            if predicate(value) {
                truthy.clone()
            } else {
                falsy.clone()
            }
        })
    }

    /// Create a read-only node that is refreshed by `on_write` after each
    /// source write. `None` leaves the derived value untouched.
    fn derive<U, F>(&self, kind: NodeKind, initial: U, on_write: F) -> Reactor<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> Option<U> + Send + Sync + 'static,
    {
        let derived = Node::create(self.runtime(), initial, Access::ReadOnly, kind);
        self.runtime().link(self.id(), derived.id());

        let target = Arc::downgrade(&derived.node);
        let feed = self.node.add_subscriber(
            None,
            Arc::new(move |_: &T, new: &T| {
                let Some(target) = target.upgrade() else {
                    return Ok(());
                };
                let Some(next) = on_write(new) else {
                    return Ok(());
                };
                target.apply(next).inspect_err(|err| {
                    tracing::error!(node = %target.id(), %err, "derived reactor update failed");
                })
            }),
        );
        derived.node.feed_from(feed);

        derived
    }
}
