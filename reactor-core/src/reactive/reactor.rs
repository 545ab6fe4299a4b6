//! Reactor Implementation
//!
//! A reactor is the fundamental reactive cell. It holds a value, a list of
//! subscribers, and (for deep access) a cache of child reactors.
//!
//! # How Reactors Work
//!
//! 1. A tracked read ([`Reactor::get`]) returns a clone of the value and
//!    registers the reactor with the runtime's current recording session.
//!
//! 2. A write ([`Reactor::set`], [`Reactor::update`]) stores the new value
//!    and then calls every subscriber with `(old, new)`, in registration
//!    order, before returning. Subscribers run untracked: their reads never
//!    land in the writer's recording session.
//!
//! 3. A rejected write (read-only, spent one-shot) changes nothing and
//!    notifies nobody.
//!
//! # Reentrancy
//!
//! A subscriber may write to any reactor, including the one notifying it.
//! Writes to a reactor whose notification loop is still running are handled
//! by the runtime's [`ReentrancyPolicy`]. With the default `Queue` policy
//! they are applied, in order, once the current loop is done, so every
//! subscriber always observes consecutive `(old, new)` pairs. A loop that
//! keeps feeding itself stops after `max_propagation_depth` queued writes.
//!
//! A failure further down (a rejected reentrant write, a loop that did not
//! settle) is returned from the write that started the propagation, after
//! every subscriber of each node has run.
//!
//! # Memory Layout
//!
//! A derived node is owned by its handles. The node it follows only keeps a
//! weak reference in its subscriber list, and the derived node cancels that
//! subscription when it is dropped. Deep-access children are the exception:
//! they are cached, and owned, by their parent.

use std::collections::{HashMap, VecDeque};
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use super::effect::Effect;
use super::runtime::{AnyReactor, Runtime};
use super::subscriber::{Handler, Subscriber, Subscription};
use crate::config::ReentrancyPolicy;
use crate::error::{ReactorError, Result};
use crate::graph::{NodeId, NodeKind};

/// Write permission of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Writable,
    ReadOnly,
    OneShot { written: bool },
}

/// Outcome of routing a child's write into its parent.
pub(crate) enum Routed<T> {
    /// The parent accepted the write and re-derived the child.
    Delivered,

    /// The parent is gone; the child keeps the value on its own.
    Detached(T),
}

/// Routes a write on a child node into the node it was derived from.
pub(crate) type Upstream<T> = Box<dyn Fn(T) -> Result<Routed<T>> + Send + Sync>;

type SubscriberList<T> = Arc<Mutex<SmallVec<[Subscriber<T>; 4]>>>;

/// The cell behind a [`Reactor`].
pub(crate) struct Node<T> {
    id: NodeId,
    kind: NodeKind,
    runtime: Runtime,

    value: RwLock<T>,
    access: Mutex<Access>,
    subscribers: SubscriberList<T>,

    /// Deep-access children by property name.
    pub(crate) children: Mutex<HashMap<String, Reactor<T>>>,

    /// Set for children and lenses: writes go to the parent instead.
    upstream: Option<Upstream<T>>,

    /// True while the subscriber loop runs.
    notifying: AtomicBool,

    /// Reentrant writes waiting for the current loop to finish.
    pending: Mutex<VecDeque<T>>,

    /// Tag excluded by a routed `set_excluding`, applied when the parent
    /// refreshes this node.
    routed_skip: Mutex<Option<String>>,

    /// Subscriptions on the nodes this one is derived from.
    feeds: Mutex<Vec<Subscription>>,

    /// Effects that live exactly as long as this node.
    owned: Mutex<Vec<Effect>>,
}

impl<T> Node<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn create(runtime: &Runtime, value: T, access: Access, kind: NodeKind) -> Reactor<T> {
        Self::create_with(runtime, value, access, kind, None)
    }

    pub(crate) fn create_with(
        runtime: &Runtime,
        value: T,
        access: Access,
        kind: NodeKind,
        upstream: Option<Upstream<T>>,
    ) -> Reactor<T> {
        let node = Arc::new(Node {
            id: NodeId::new(),
            kind,
            runtime: runtime.clone(),
            value: RwLock::new(value),
            access: Mutex::new(access),
            subscribers: Arc::new(Mutex::new(SmallVec::new())),
            children: Mutex::new(HashMap::new()),
            upstream,
            notifying: AtomicBool::new(false),
            pending: Mutex::new(VecDeque::new()),
            routed_skip: Mutex::new(None),
            feeds: Mutex::new(Vec::new()),
            owned: Mutex::new(Vec::new()),
        });

        let weak: Weak<dyn AnyReactor> = Arc::downgrade(&node) as Weak<dyn AnyReactor>;
        runtime.register(node.id, kind, weak);

        Reactor { node }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub(crate) fn access(&self) -> Access {
        *self.access.lock()
    }

    pub(crate) fn peek(&self) -> T {
        self.value.read().clone()
    }

    /// Keep `effect` alive for as long as this node exists.
    pub(crate) fn own(&self, effect: Effect) {
        self.owned.lock().push(effect);
    }

    /// Cancel `subscription` when this node is dropped.
    pub(crate) fn feed_from(&self, subscription: Subscription) {
        self.feeds.lock().push(subscription);
    }

    /// Check write permission. With `consume`, a one-shot's single write is
    /// used up.
    fn claim_write(&self, consume: bool) -> Result<()> {
        let mut access = self.access.lock();
        match *access {
            Access::Writable => Ok(()),
            Access::ReadOnly => Err(ReactorError::ReadOnly { node: self.id }),
            Access::OneShot { written: true } => Err(ReactorError::AlreadyWritten { node: self.id }),
            Access::OneShot { written: false } => {
                if consume {
                    *access = Access::OneShot { written: true };
                }
                Ok(())
            }
        }
    }

    /// Public write path: permission check, then commit or route upstream.
    ///
    /// A failing `next` leaves the value untouched and notifies nobody.
    pub(crate) fn write(&self, next: impl FnOnce(&T) -> Result<T>, skip: Option<&str>) -> Result<()> {
        self.claim_write(false)?;

        let current = self.peek();
        let next = next(&current)?;
        self.claim_write(true)?;

        let Some(upstream) = &self.upstream else {
            return self.commit(next, skip);
        };

        *self.routed_skip.lock() = skip.map(str::to_string);
        let routed = upstream(next);
        *self.routed_skip.lock() = None;

        match routed? {
            Routed::Delivered => Ok(()),
            Routed::Detached(next) => self.commit(next, skip),
        }
    }

    /// Internal write path used by derivations; ignores write permission.
    pub(crate) fn apply(&self, next: T) -> Result<()> {
        self.commit(next, None)
    }

    /// Like [`apply`](Self::apply), for a parent refreshing its child. A tag
    /// excluded by the child's own routed write is honoured here.
    pub(crate) fn refresh(&self, next: T) -> Result<()> {
        let skip = self.routed_skip.lock().take();
        self.commit(next, skip.as_deref())
    }

    fn commit(&self, next: T, skip: Option<&str>) -> Result<()> {
        if self.notifying.load(Ordering::SeqCst) {
            return match self.runtime.config().reentrancy {
                ReentrancyPolicy::Queue => {
                    self.pending.lock().push_back(next);
                    tracing::debug!(node = %self.id, "reentrant write queued");
                    Ok(())
                }
                ReentrancyPolicy::Ignore => {
                    tracing::warn!(node = %self.id, "reentrant write ignored");
                    Ok(())
                }
                ReentrancyPolicy::Error => Err(ReactorError::ReentrantWrite { node: self.id }),
            };
        }

        let old = std::mem::replace(&mut *self.value.write(), next.clone());
        tracing::debug!(node = %self.id, kind = ?self.kind, "reactor written");
        self.notify(old, next, skip)
    }

    fn notify(&self, old: T, new: T, skip: Option<&str>) -> Result<()> {
        self.notifying.store(true, Ordering::SeqCst);
        let _reset = ResetOnDrop(&self.notifying);

        self.runtime.untrack(|| self.drain(old, new, skip))
    }

    fn drain(&self, mut old: T, mut new: T, mut skip: Option<&str>) -> Result<()> {
        let limit = self.runtime.config().max_propagation_depth;
        let mut drained = 0;
        let mut failure = None;

        loop {
            // Copy first: handlers may subscribe or unsubscribe.
            let subscribers = self.subscribers.lock().clone();
            for subscriber in subscribers.iter().filter(|s| s.accepts(skip)) {
                if let Err(err) = (subscriber.handler)(&old, &new) {
                    failure.get_or_insert(err);
                }
            }

            let Some(next) = self.pending.lock().pop_front() else {
                return failure.map_or(Ok(()), Err);
            };

            drained += 1;
            if drained > limit {
                self.pending.lock().clear();
                tracing::warn!(node = %self.id, drained, "queued writes did not settle");
                return Err(ReactorError::PropagationLimit {
                    node: self.id,
                    depth: drained,
                });
            }

            old = std::mem::replace(&mut *self.value.write(), next.clone());
            new = next;
            skip = None;
        }
    }

    pub(crate) fn add_subscriber(&self, tag: Option<Arc<str>>, handler: Handler<T>) -> Subscription {
        let subscriber = Subscriber::new(tag, handler);
        let id = subscriber.id;
        self.subscribers.lock().push(subscriber);

        let list = Arc::downgrade(&self.subscribers);
        Subscription::new(id, self.id, move || {
            if let Some(list) = list.upgrade() {
                list.lock().retain(|s| s.id != id);
            }
        })
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<T> AnyReactor for Node<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn watch(&self, on_change: Arc<dyn Fn() -> Result<()> + Send + Sync>) -> Subscription {
        self.add_subscriber(None, Arc::new(move |_: &T, _: &T| on_change()))
    }
}

impl<T> Drop for Node<T> {
    fn drop(&mut self) {
        for subscription in self.feeds.get_mut().drain(..) {
            subscription.unsubscribe();
        }
        for effect in self.owned.get_mut().drain(..) {
            effect.dispose();
        }
        self.runtime.unregister(self.id);
    }
}

struct ResetOnDrop<'a>(&'a AtomicBool);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to a reactive cell holding a value of type `T`.
///
/// Cloning a handle yields another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use reactor_core::reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.reactor(0);
///
/// let doubled = count.compute(|n| n * 2);
/// count.set(5).unwrap();
///
/// assert_eq!(doubled.get(), 10);
/// assert!(doubled.set(1).is_err());
/// ```
pub struct Reactor<T> {
    pub(crate) node: Arc<Node<T>>,
}

impl<T> Reactor<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Identity of the underlying cell.
    pub fn id(&self) -> NodeId {
        self.node.id
    }

    pub fn kind(&self) -> NodeKind {
        self.node.kind
    }

    /// The runtime this reactor belongs to.
    pub fn runtime(&self) -> &Runtime {
        self.node.runtime()
    }

    /// Read the value and record this reactor in the current recording
    /// session, if any.
    pub fn get(&self) -> T {
        self.node.runtime.track(self.node.id);
        self.node.peek()
    }

    /// Read the value without recording the read.
    pub fn peek(&self) -> T {
        self.node.peek()
    }

    /// Borrow the value for the duration of `f`. The read is recorded.
    ///
    /// `f` must not write to this reactor.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.node.runtime.track(self.node.id);
        f(&self.node.value.read())
    }

    /// Replace the value and notify subscribers.
    pub fn set(&self, value: T) -> Result<()> {
        self.node.write(move |_| Ok(value), None)
    }

    /// Compute the next value from the previous one and notify subscribers.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        self.node.write(move |current| Ok(f(current)), None)
    }

    /// Like [`set`](Self::set), but subscribers registered with `tag` are not
    /// called for this write.
    pub fn set_excluding(&self, value: T, tag: &str) -> Result<()> {
        self.node.write(move |_| Ok(value), Some(tag))
    }

    /// Call `handler(old, new)` after every write.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.node.add_subscriber(None, infallible(handler))
    }

    /// Like [`subscribe`](Self::subscribe), with an identity tag that
    /// [`set_excluding`](Self::set_excluding) can filter on.
    pub fn subscribe_tagged<F>(&self, tag: impl Into<Arc<str>>, handler: F) -> Subscription
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.node.add_subscriber(Some(tag.into()), infallible(handler))
    }

    /// Number of registered subscribers, including internal bindings of
    /// live derived values and children.
    pub fn subscriber_count(&self) -> usize {
        self.node.subscriber_count()
    }

    /// Whether a write through this handle would currently be accepted.
    pub fn is_writable(&self) -> bool {
        matches!(
            self.node.access(),
            Access::Writable | Access::OneShot { written: false }
        )
    }
}

fn infallible<T, F>(handler: F) -> Handler<T>
where
    F: Fn(&T, &T) + Send + Sync + 'static,
{
    Arc::new(move |old: &T, new: &T| {
        handler(old, new);
        Ok(())
    })
}

impl<T> Clone for Reactor<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<T> Debug for Reactor<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("value", &self.peek())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use std::sync::atomic::AtomicI32;

    fn observe<T: Clone + Send + 'static>(reactor: &Reactor<T>) -> Arc<Mutex<Vec<(T, T)>>>
    where
        T: Sync,
    {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        reactor.subscribe(move |old: &T, new: &T| sink.lock().push((old.clone(), new.clone())));
        seen
    }

    #[test]
    fn reactor_get_and_set() {
        let rt = Runtime::new();
        let reactor = rt.reactor(0);
        assert_eq!(reactor.get(), 0);

        reactor.set(42).unwrap();
        assert_eq!(reactor.get(), 42);
    }

    #[test]
    fn reactor_update() {
        let rt = Runtime::new();
        let reactor = rt.reactor(10);
        reactor.update(|v| v + 5).unwrap();
        assert_eq!(reactor.peek(), 15);
    }

    #[test]
    fn subscribers_see_consecutive_pairs() {
        let rt = Runtime::new();
        let reactor = rt.reactor(0);
        let seen = observe(&reactor);

        for v in [3, 1, 4, 1, 5] {
            reactor.set(v).unwrap();
        }

        assert_eq!(*seen.lock(), vec![(0, 3), (3, 1), (1, 4), (4, 1), (1, 5)]);
    }

    #[test]
    fn subscribers_run_in_registration_order() {
        let rt = Runtime::new();
        let reactor = rt.reactor(0);
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = order.clone();
            reactor.subscribe(move |_, _| order.lock().push(n));
        }
        reactor.set(1).unwrap();

        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let rt = Runtime::new();
        let reactor = rt.reactor(0);
        let first = Arc::new(AtomicI32::new(0));
        let second = Arc::new(AtomicI32::new(0));

        let first_clone = first.clone();
        let subscription = reactor.subscribe(move |_, _| {
            first_clone.fetch_add(1, Ordering::SeqCst);
        });
        let second_clone = second.clone();
        reactor.subscribe(move |_, _| {
            second_clone.fetch_add(1, Ordering::SeqCst);
        });

        reactor.set(1).unwrap();
        subscription.unsubscribe();
        subscription.unsubscribe();
        reactor.set(2).unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);
        assert_eq!(reactor.subscriber_count(), 1);
    }

    #[test]
    fn handler_may_unsubscribe_itself_during_notification() {
        let rt = Runtime::new();
        let reactor = rt.reactor(0);
        let calls = Arc::new(AtomicI32::new(0));

        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let (slot_clone, calls_clone) = (slot.clone(), calls.clone());
        let subscription = reactor.subscribe(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            if let Some(subscription) = slot_clone.lock().as_ref() {
                subscription.unsubscribe();
            }
        });
        *slot.lock() = Some(subscription);

        reactor.set(1).unwrap();
        reactor.set(2).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn read_only_rejects_writes_atomically() {
        let rt = Runtime::new();
        let reactor = rt.read_only(7);
        let seen = observe(&reactor);

        let err = reactor.set(8).unwrap_err();
        assert!(matches!(err, ReactorError::ReadOnly { node } if node == reactor.id()));
        assert!(reactor.update(|v| v + 1).is_err());

        assert_eq!(reactor.peek(), 7);
        assert!(seen.lock().is_empty());
        assert!(!reactor.is_writable());
    }

    #[test]
    fn one_shot_accepts_a_single_write() {
        let rt = Runtime::new();
        let reactor = rt.one_shot(0);
        assert!(reactor.is_writable());

        reactor.set(1).unwrap();
        let err = reactor.set(2).unwrap_err();

        assert!(matches!(err, ReactorError::AlreadyWritten { .. }));
        assert_eq!(reactor.peek(), 1);
        assert!(!reactor.is_writable());
    }

    #[test]
    fn set_excluding_skips_tagged_subscribers() {
        let rt = Runtime::new();
        let reactor = rt.reactor(0);
        let dom = Arc::new(AtomicI32::new(0));
        let other = Arc::new(AtomicI32::new(0));

        let dom_clone = dom.clone();
        reactor.subscribe_tagged("dom", move |_, _| {
            dom_clone.fetch_add(1, Ordering::SeqCst);
        });
        let other_clone = other.clone();
        reactor.subscribe(move |_, _| {
            other_clone.fetch_add(1, Ordering::SeqCst);
        });

        reactor.set_excluding(1, "dom").unwrap();
        reactor.set(2).unwrap();

        assert_eq!(dom.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reentrant_writes_are_queued_by_default() {
        let rt = Runtime::new();
        let reactor = rt.reactor(0);
        let seen = observe(&reactor);

        let handle = reactor.clone();
        reactor.subscribe(move |_, new: &i32| {
            if *new < 3 {
                handle.set(new + 1).unwrap();
            }
        });

        reactor.set(1).unwrap();

        assert_eq!(reactor.peek(), 3);
        assert_eq!(*seen.lock(), vec![(0, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn reentrant_writes_can_be_ignored() {
        let rt = Runtime::with_config(RuntimeConfig::default().with_reentrancy(ReentrancyPolicy::Ignore));
        let reactor = rt.reactor(0);

        let handle = reactor.clone();
        reactor.subscribe(move |_, new: &i32| {
            handle.set(new + 100).unwrap();
        });

        reactor.set(1).unwrap();
        assert_eq!(reactor.peek(), 1);
    }

    #[test]
    fn reentrant_writes_can_be_rejected() {
        let rt = Runtime::with_config(RuntimeConfig::default().with_reentrancy(ReentrancyPolicy::Error));
        let reactor = rt.reactor(0);
        let rejected = Arc::new(AtomicBool::new(false));

        let (handle, rejected_clone) = (reactor.clone(), rejected.clone());
        reactor.subscribe(move |_, new: &i32| {
            let result = handle.set(new + 1);
            rejected_clone.store(
                matches!(result, Err(ReactorError::ReentrantWrite { .. })),
                Ordering::SeqCst,
            );
        });

        reactor.set(1).unwrap();
        assert!(rejected.load(Ordering::SeqCst));
        assert_eq!(reactor.peek(), 1);
    }

    #[test]
    fn self_feeding_writes_hit_the_propagation_limit() {
        let rt = Runtime::with_config(RuntimeConfig::default().with_max_propagation_depth(5));
        let reactor = rt.reactor(0);

        let handle = reactor.clone();
        reactor.subscribe(move |_, new: &i32| {
            let _ = handle.set(new + 1);
        });

        let err = reactor.set(1).unwrap_err();
        assert!(matches!(err, ReactorError::PropagationLimit { .. }));

        // The reactor is usable again afterwards.
        assert!(reactor.is_writable());
    }

    #[test]
    fn reactor_clone_shares_state() {
        let rt = Runtime::new();
        let reactor1 = rt.reactor(0);
        let reactor2 = reactor1.clone();

        reactor1.set(42).unwrap();
        assert_eq!(reactor2.get(), 42);
        assert_eq!(reactor1.id(), reactor2.id());
    }

    #[test]
    fn debug_shows_value() {
        let rt = Runtime::new();
        let reactor = rt.reactor(5);
        let debug = format!("{:?}", reactor);
        assert!(debug.contains("value: 5"));
        assert!(debug.contains("Source"));
    }
}
