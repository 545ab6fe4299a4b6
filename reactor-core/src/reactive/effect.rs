//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever one of
//! the reactors it read changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function inside a recording window
//!    to discover its dependencies.
//!
//! 2. It subscribes to every recorded reactor through the runtime registry.
//!
//! 3. When any dependency is written, the effect drops its old subscriptions,
//!    runs again under a fresh recording window, and subscribes to whatever
//!    this run read. Dependencies can therefore change from run to run.
//!
//! # Lifetime
//!
//! An effect stays subscribed until [`Effect::dispose`] is called, even if
//! every handle to it is dropped; the subscriptions keep it alive. Effects
//! backing an auto-computed reactor are disposed with that reactor.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::recorder::Dependencies;
use super::runtime::Runtime;
use super::subscriber::Subscription;
use crate::error::Result;
use crate::graph::NodeId;

/// Counter for generating unique effect IDs.
static EFFECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_effect_id() -> u64 {
    EFFECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

struct EffectInner {
    id: u64,
    runtime: Runtime,
    run: Box<dyn Fn() -> Result<()> + Send + Sync>,

    /// Reactor this effect writes, linked in the graph to every dependency.
    target: Option<NodeId>,

    watching: Mutex<Vec<Subscription>>,
    dependencies: Mutex<Dependencies>,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

impl EffectInner {
    /// Run once and re-subscribe. A failure of the run is returned after
    /// the new subscriptions are in place.
    fn execute(self: &Arc<Self>) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Ok(());
        }

        let (result, dependencies) = self.runtime.record(|| (self.run)());
        self.run_count.fetch_add(1, Ordering::SeqCst);
        self.watch(dependencies);
        result
    }

    /// Replace the current subscriptions with one per dependency.
    fn watch(self: &Arc<Self>, dependencies: Dependencies) {
        self.release();

        let mut watching = Vec::with_capacity(dependencies.len());
        for id in dependencies.iter() {
            let Some(node) = self.runtime.lookup(id) else {
                continue;
            };
            let inner = Arc::clone(self);
            watching.push(node.watch(Arc::new(move || inner.execute())));
            if let Some(target) = self.target {
                self.runtime.link(id, target);
            }
        }

        tracing::trace!(effect = self.id, dependencies = dependencies.len(), "effect subscribed");
        *self.watching.lock() = watching;
        *self.dependencies.lock() = dependencies;
    }

    /// Drop every subscription and graph link.
    fn release(&self) {
        let old = std::mem::take(&mut *self.watching.lock());
        for subscription in old {
            subscription.unsubscribe();
        }
        if let Some(target) = self.target {
            for id in self.dependencies.lock().iter() {
                self.runtime.unlink(id, target);
            }
        }
    }
}

/// A side-effecting computation that runs when its dependencies change.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use reactor_core::reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.reactor(0);
/// let seen = Arc::new(AtomicI32::new(-1));
///
/// let (count_clone, seen_clone) = (count.clone(), seen.clone());
/// let _effect = rt.effect(move || seen_clone.store(count_clone.get(), Ordering::SeqCst));
///
/// count.set(5).unwrap();
/// assert_eq!(seen.load(Ordering::SeqCst), 5);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    fn build<F>(runtime: &Runtime, target: Option<NodeId>, run: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(EffectInner {
                id: next_effect_id(),
                runtime: runtime.clone(),
                run: Box::new(run),
                target,
                watching: Mutex::new(Vec::new()),
                dependencies: Mutex::new(Dependencies::default()),
                disposed: AtomicBool::new(false),
                run_count: AtomicUsize::new(0),
            }),
        }
    }

    /// An effect that has already run once, outside of this constructor,
    /// and read `dependencies`.
    pub(crate) fn watching<F>(
        runtime: &Runtime,
        target: Option<NodeId>,
        dependencies: Dependencies,
        run: F,
    ) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        let effect = Self::build(runtime, target, run);
        effect.inner.run_count.store(1, Ordering::SeqCst);
        effect.inner.watch(dependencies);
        effect
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Run the effect now and re-subscribe to what it reads.
    pub fn execute(&self) {
        if let Err(err) = self.inner.execute() {
            tracing::error!(effect = self.inner.id, %err, "effect run failed");
        }
    }

    /// Stop the effect. It will not run again.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.release();
        tracing::trace!(effect = self.inner.id, "effect disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Reactors read by the latest run.
    pub fn dependencies(&self) -> Dependencies {
        self.inner.dependencies.lock().clone()
    }

    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Runtime {
    /// Create an effect and run it once immediately.
    pub fn effect<F>(&self, run: F) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Effect::build(self, None, move || {
            run();
            Ok(())
        });
        effect.execute();
        effect
    }

    /// Create an effect without running it. It has no dependencies until
    /// [`Effect::execute`] is called.
    pub fn effect_lazy<F>(&self, run: F) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        Effect::build(self, None, move || {
            run();
            Ok(())
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
