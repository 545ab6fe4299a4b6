//! Subscriber types for the reactive system.
//!
//! A subscriber is a callback attached to one reactor. It is invoked with the
//! previous and the new value on every write, in registration order.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::graph::NodeId;

/// Unique identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Internal handlers report failures back to the write that triggered them.
pub(crate) type Handler<T> = Arc<dyn Fn(&T, &T) -> Result<()> + Send + Sync>;

/// A registered callback on a node.
pub(crate) struct Subscriber<T> {
    pub(crate) id: SubscriberId,

    /// Identity tag used by `set_excluding` to skip this subscriber.
    pub(crate) tag: Option<Arc<str>>,

    pub(crate) handler: Handler<T>,
}

impl<T> Subscriber<T> {
    pub(crate) fn new(tag: Option<Arc<str>>, handler: Handler<T>) -> Self {
        Self {
            id: SubscriberId::new(),
            tag,
            handler,
        }
    }

    /// Whether a write excluding `skip` should reach this subscriber.
    pub(crate) fn accepts(&self, skip: Option<&str>) -> bool {
        match (skip, self.tag.as_deref()) {
            (Some(skip), Some(tag)) => skip != tag,
            _ => true,
        }
    }
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            tag: self.tag.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

type Cancel = Box<dyn FnOnce() + Send + Sync>;

/// Handle returned by `subscribe`.
///
/// Dropping it does not cancel anything; call [`unsubscribe`](Self::unsubscribe).
/// Unsubscribing removes exactly the handler this subscription was created
/// for, and doing it more than once is harmless.
pub struct Subscription {
    id: SubscriberId,
    node: NodeId,
    cancel: Mutex<Option<Cancel>>,
}

impl Subscription {
    pub(crate) fn new<F>(id: SubscriberId, node: NodeId, cancel: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            id,
            node,
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// The reactor this subscription is attached to.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Detach the handler.
    pub fn unsubscribe(&self) {
        // Take first so the lock is released before the node's list is touched.
        let cancel = self.cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// False once `unsubscribe` has been called.
    pub fn is_active(&self) -> bool {
        self.cancel.lock().is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn tagged_subscribers_can_be_skipped() {
        let handler: Handler<i32> = Arc::new(|_, _| Ok(()));
        let tagged = Subscriber::new(Some(Arc::from("dom")), handler.clone());
        let plain = Subscriber::new(None, handler);

        assert!(!tagged.accepts(Some("dom")));
        assert!(tagged.accepts(Some("other")));
        assert!(tagged.accepts(None));
        assert!(plain.accepts(Some("dom")));
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let subscription = Subscription::new(SubscriberId::new(), NodeId::new(), move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(subscription.is_active());
        subscription.unsubscribe();
        subscription.unsubscribe();

        assert!(!subscription.is_active());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
