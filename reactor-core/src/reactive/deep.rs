//! Deep Access
//!
//! Deep access turns a property of a reactor's value into a reactor of its
//! own. `profile.at("address")?.at("city")?` is a handle that reads, writes
//! and notifies like any other, while staying bound to `profile`.
//!
//! # Binding
//!
//! A child is linked to its parent in both directions:
//!
//! - **down**: the parent holds a subscription that re-derives the child's
//!   value after every parent write. The child is only written (and its
//!   subscribers only notified) when its slice actually changed, so writing
//!   a sibling property does not disturb it.
//! - **up**: a write to the child is turned into a write of the parent with
//!   the property replaced. The parent's permission rules apply and its
//!   subscribers are notified first; the child then receives the value through
//!   the downward binding.
//!
//! Two flavours exist. [`Reactor::at`] navigates values implementing
//! [`Traverse`] by property name and caches one child per name, for as long
//! as the parent lives. [`Reactor::lens`] projects a statically typed field
//! with a getter and a setter; it is not cached and stops following the
//! parent when its last handle is dropped.
//!
//! A child written with `set_excluding` skips its own subscribers with that
//! tag when the parent refreshes it.

use std::sync::{Arc, Weak};

use super::reactor::{Access, Node, Reactor, Routed, Upstream};
use crate::error::{ReactorError, Result};
use crate::graph::NodeKind;

/// Values whose properties can be navigated by name.
pub trait Traverse: Clone + PartialEq + Send + Sync + 'static {
    /// The value stored under `key`.
    ///
    /// Fails with [`ReactorError::NotAnObject`] when this value has no
    /// properties at all. A missing property of an object is not an error.
    fn property(&self, key: &str) -> Result<Self>;

    /// A copy of this value with `key` set to `value`.
    fn with_property(&self, key: &str, value: Self) -> Result<Self>;
}

fn not_an_object(key: &str, value: &serde_json::Value) -> ReactorError {
    ReactorError::NotAnObject {
        property: key.to_string(),
        value: value.to_string(),
    }
}

/// Objects are navigated by key and arrays by index. A missing key or index
/// reads as `null`; everything else has no properties. Writing an array index
/// replaces an element or appends right after the last one.
impl Traverse for serde_json::Value {
    fn property(&self, key: &str) -> Result<Self> {
        use serde_json::Value;

        match self {
            Value::Object(map) => Ok(map.get(key).cloned().unwrap_or(Value::Null)),
            Value::Array(items) => Ok(key
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index))
                .cloned()
                .unwrap_or(Value::Null)),
            other => Err(not_an_object(key, other)),
        }
    }

    fn with_property(&self, key: &str, value: Self) -> Result<Self> {
        use serde_json::Value;

        match self {
            Value::Object(map) => {
                let mut map = map.clone();
                map.insert(key.to_string(), value);
                Ok(Value::Object(map))
            }
            Value::Array(items) => {
                let index = key.parse::<usize>().map_err(|_| not_an_object(key, self))?;
                let mut items = items.clone();
                let len = items.len();
                match items.get_mut(index) {
                    Some(slot) => *slot = value,
                    None if index == len => items.push(value),
                    None => {
                        return Err(ReactorError::IndexOutOfRange {
                            index: key.to_string(),
                            len,
                        })
                    }
                }
                Ok(Value::Array(items))
            }
            other => Err(not_an_object(key, other)),
        }
    }
}

impl<T> Reactor<T>
where
    T: Traverse,
{
    /// The child reactor for property `key`.
    ///
    /// The child is created on first access and the same handle is returned
    /// for `key` afterwards. It is read-only when this reactor is read-only.
    pub fn at(&self, key: &str) -> Result<Reactor<T>> {
        let mut children = self.node.children.lock();
        if let Some(child) = children.get(key) {
            return Ok(child.clone());
        }

        let initial = self.node.peek().property(key)?;
        let owned_key = key.to_string();
        let upstream = upstream_into(Arc::downgrade(&self.node), move |parent: &T, child: T| {
            parent.with_property(&owned_key, child)
        });
        let child = Node::create_with(
            self.runtime(),
            initial,
            self.child_access(),
            NodeKind::Child,
            Some(upstream),
        );

        self.runtime().attach_child(self.id(), child.id(), key);
        let owned_key = key.to_string();
        self.bind_child(&child, move |parent: &T| parent.property(&owned_key));

        tracing::trace!(parent = %self.id(), child = %child.id(), key, "child reactor created");
        children.insert(key.to_string(), child.clone());
        Ok(child)
    }

    /// Follow `path` one property at a time.
    pub fn at_path(&self, path: &[&str]) -> Result<Reactor<T>> {
        path.iter()
            .try_fold(self.clone(), |reactor, key| reactor.at(key))
    }
}

impl<T> Reactor<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// A child reactor projecting part of this reactor's value.
    ///
    /// `get` extracts the part after every write to this reactor; a write to
    /// the child is stored back with `put`.
    pub fn lens<U, G, P>(&self, get: G, put: P) -> Reactor<U>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
        G: Fn(&T) -> U + Send + Sync + 'static,
        P: Fn(&mut T, U) + Send + Sync + 'static,
    {
        let upstream = upstream_into(Arc::downgrade(&self.node), move |parent: &T, child: U| {
            let mut next = parent.clone();
            put(&mut next, child);
            Ok(next)
        });
        let child = Node::create_with(
            self.runtime(),
            get(&self.peek()),
            self.child_access(),
            NodeKind::Lens,
            Some(upstream),
        );

        self.runtime().link(self.id(), child.id());
        self.bind_child(&child, move |parent: &T| Ok(get(parent)));
        child
    }

    fn child_access(&self) -> Access {
        match self.node.access() {
            Access::ReadOnly => Access::ReadOnly,
            _ => Access::Writable,
        }
    }

    /// Refresh `child` from this reactor after every write, until the child
    /// is dropped.
    fn bind_child<U, F>(&self, child: &Reactor<U>, project: F)
    where
        U: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&T) -> Result<U> + Send + Sync + 'static,
    {
        let target = Arc::downgrade(&child.node);
        let feed = self.node.add_subscriber(
            None,
            Arc::new(move |_: &T, new: &T| {
                let Some(target) = target.upgrade() else {
                    return Ok(());
                };
                match project(new) {
                    Ok(next) if next != target.peek() => target.refresh(next).inspect_err(|err| {
                        tracing::error!(node = %target.id(), %err, "child reactor update failed");
                    }),
                    Ok(_) => Ok(()),
                    Err(err) => {
                        tracing::warn!(node = %target.id(), %err, "child reactor left at its last value");
                        Ok(())
                    }
                }
            }),
        );
        child.node.feed_from(feed);
    }
}

/// Build the write path of a child: merge the child's next value into the
/// parent and write the parent.
fn upstream_into<T, U, F>(parent: Weak<Node<T>>, merge: F) -> Upstream<U>
where
    T: Clone + Send + Sync + 'static,
    U: Send + Sync + 'static,
    F: Fn(&T, U) -> Result<T> + Send + Sync + 'static,
{
    Box::new(move |next: U| match parent.upgrade() {
        Some(parent) => {
            parent.write(|current| merge(current, next), None)?;
            Ok(Routed::Delivered)
        }
        None => Ok(Routed::Detached(next)),
    })
}
