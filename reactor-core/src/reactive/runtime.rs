//! Reactive Runtime
//!
//! The runtime is the context object every reactor belongs to. It owns:
//!
//! 1. one dependency [`Recorder`] per thread, used by tracked reads,
//! 2. the [`ReactorGraph`] with the topology of every live node,
//! 3. a registry of type-erased nodes so effects can subscribe to a
//!    dependency knowing only its id,
//! 4. the [`RuntimeConfig`] policies.
//!
//! # Why an explicit context
//!
//! Nothing here is global. A runtime is created by the application and
//! cloned into every handle it produces, so two runtimes never see each
//! other's recording sessions, and tests never share state. Within one
//! runtime each thread records into its own session stack, so a read on one
//! thread never lands in a window opened on another.
//!
//! # Locking
//!
//! All locks are short critical sections around bookkeeping. No lock is held
//! while user code (an updater, a subscriber, a recorded closure) runs, so
//! callbacks may freely read, write and subscribe.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};

use super::reactor::{Access, Node, Reactor};
use super::recorder::{Dependencies, Recorder};
use super::subscriber::Subscription;
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::graph::{NodeId, NodeKind, ReactorGraph};

/// A reactor seen through its type-erased capabilities.
///
/// This is what the registry stores and what effects use to subscribe to
/// dependencies discovered by the recorder.
pub trait AnyReactor: Send + Sync {
    /// Identity of the node.
    fn id(&self) -> NodeId;

    /// How the node was created.
    fn kind(&self) -> NodeKind;

    /// Call `on_change` after every write to the node. An error is returned
    /// from the write that triggered it.
    fn watch(&self, on_change: Arc<dyn Fn() -> Result<()> + Send + Sync>) -> Subscription;
}

struct RuntimeInner {
    config: RuntimeConfig,
    /// Session stacks of the threads currently recording.
    recorders: Mutex<HashMap<ThreadId, Recorder>>,
    graph: Mutex<ReactorGraph>,
    registry: RwLock<HashMap<NodeId, Weak<dyn AnyReactor>>>,
}

/// Shared handle to a reactive runtime. Cloning is cheap.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                recorders: Mutex::new(HashMap::new()),
                graph: Mutex::new(ReactorGraph::new()),
                registry: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Create a writable reactor.
    pub fn reactor<T>(&self, value: T) -> Reactor<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        Node::create(self, value, Access::Writable, NodeKind::Source)
    }

    /// Create a reactor that can never be written.
    pub fn read_only<T>(&self, value: T) -> Reactor<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        Node::create(self, value, Access::ReadOnly, NodeKind::Source)
    }

    /// Create a reactor that accepts exactly one write.
    pub fn one_shot<T>(&self, value: T) -> Reactor<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        Node::create(self, value, Access::OneShot { written: false }, NodeKind::Source)
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Open a recording window. Tracked reads made until the returned guard
    /// is stopped (or dropped) are collected into one session.
    pub fn start_recording(&self) -> Recording {
        let thread = thread::current().id();
        self.inner.recorders.lock().entry(thread).or_default().start();
        Recording {
            runtime: self.clone(),
            thread,
            open: true,
        }
    }

    /// Run `f` inside a recording window and return what it read.
    pub fn record<R>(&self, f: impl FnOnce() -> R) -> (R, Dependencies) {
        let recording = self.start_recording();
        let result = f();
        (result, recording.stop())
    }

    /// Run `f` without recording any of its reads.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let was_recording = self
            .with_recorder(thread::current().id(), |recorder| {
                let was_recording = recorder.is_recording();
                recorder.pause();
                was_recording
            })
            .unwrap_or(false);
        let _restore = ResumeOnDrop {
            runtime: self,
            resume: was_recording,
        };
        f()
    }

    /// Run `f` tracked, then drop `excluded` from the current session even
    /// if `f` read them.
    pub fn untrack_only<R>(&self, f: impl FnOnce() -> R, excluded: impl IntoIterator<Item = NodeId>) -> R {
        let result = f();
        self.with_recorder(thread::current().id(), |recorder| recorder.pop(excluded));
        result
    }

    /// Whether a tracked read on this thread would currently be recorded.
    pub fn is_recording(&self) -> bool {
        self.with_recorder(thread::current().id(), |recorder| recorder.is_recording())
            .unwrap_or(false)
    }

    pub(crate) fn track(&self, id: NodeId) {
        self.with_recorder(thread::current().id(), |recorder| recorder.push([id]));
    }

    /// Run `f` on the session stack of `thread`, if it has one. A stack left
    /// empty is discarded.
    fn with_recorder<R>(&self, thread: ThreadId, f: impl FnOnce(&mut Recorder) -> R) -> Option<R> {
        let mut recorders = self.inner.recorders.lock();
        let recorder = recorders.get_mut(&thread)?;
        let result = f(recorder);
        if recorder.depth() == 0 {
            recorders.remove(&thread);
        }
        Some(result)
    }

    // ------------------------------------------------------------------
    // Registry and graph
    // ------------------------------------------------------------------

    /// Find a live node by id.
    pub fn lookup(&self, id: NodeId) -> Option<Arc<dyn AnyReactor>> {
        self.inner.registry.read().get(&id).and_then(Weak::upgrade)
    }

    /// Nodes refreshed by a write to `id`, sources before dependents.
    pub fn downstream(&self, id: NodeId) -> Vec<NodeId> {
        self.inner.graph.lock().downstream(id)
    }

    /// Deep-access parent of `id` and the key it mirrors.
    pub fn parent_of(&self, id: NodeId) -> Option<(NodeId, String)> {
        let graph = self.inner.graph.lock();
        graph
            .get(id)
            .and_then(|node| node.parent())
            .map(|(parent, key)| (parent, key.to_string()))
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.inner.graph.lock().node_count()
    }

    pub(crate) fn register(&self, id: NodeId, kind: NodeKind, node: Weak<dyn AnyReactor>) {
        self.inner.graph.lock().insert(id, kind);
        self.inner.registry.write().insert(id, node);
        tracing::trace!(node = %id, ?kind, "reactor created");
    }

    pub(crate) fn unregister(&self, id: NodeId) {
        self.inner.graph.lock().remove(id);
        self.inner.registry.write().remove(&id);
        tracing::trace!(node = %id, "reactor dropped");
    }

    pub(crate) fn link(&self, source: NodeId, derived: NodeId) {
        self.inner.graph.lock().add_edge(source, derived);
    }

    pub(crate) fn unlink(&self, source: NodeId, derived: NodeId) {
        self.inner.graph.lock().remove_edge(source, derived);
    }

    pub(crate) fn attach_child(&self, parent: NodeId, child: NodeId, key: &str) {
        self.inner.graph.lock().attach_child(parent, child, key);
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("node_count", &self.node_count())
            .field("recording", &self.is_recording())
            .finish()
    }
}

/// Guard for an open recording window.
///
/// Stopping consumes the guard and returns the session. Dropping an unstopped
/// guard closes the session and discards it, keeping the stack balanced when
/// a recorded closure panics.
pub struct Recording {
    runtime: Runtime,
    thread: ThreadId,
    open: bool,
}

impl Recording {
    /// Close the window and return the reactors read inside it.
    pub fn stop(mut self) -> Dependencies {
        self.open = false;
        self.runtime
            .with_recorder(self.thread, Recorder::stop)
            .flatten()
            .unwrap_or_default()
    }
}

impl Drop for Recording {
    fn drop(&mut self) {
        if self.open {
            self.runtime.with_recorder(self.thread, Recorder::stop);
        }
    }
}

struct ResumeOnDrop<'a> {
    runtime: &'a Runtime,
    resume: bool,
}

impl Drop for ResumeOnDrop<'_> {
    fn drop(&mut self) {
        if self.resume {
            self.runtime
                .with_recorder(thread::current().id(), Recorder::resume);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_collects_each_reactor_once() {
        let rt = Runtime::new();
        let a = rt.reactor(1);
        let b = rt.reactor(2);

        let (sum, deps) = rt.record(|| a.get() + b.get() + a.get());

        assert_eq!(sum, 4);
        assert_eq!(deps.len(), 2);
        assert!(deps.contains(a.id()));
        assert!(deps.contains(b.id()));
    }

    #[test]
    fn untrack_hides_reads_from_the_enclosing_window() {
        let rt = Runtime::new();
        let (a, b, c) = (rt.reactor(1), rt.reactor(2), rt.reactor(3));

        let (_, deps) = rt.record(|| {
            a.get();
            rt.untrack(|| b.get());
            c.get();
        });

        assert_eq!(deps.iter().collect::<Vec<_>>(), vec![a.id(), c.id()]);
        assert!(!rt.is_recording());
    }

    #[test]
    fn untrack_only_excludes_named_reactors() {
        let rt = Runtime::new();
        let (a, b) = (rt.reactor(1), rt.reactor(2));

        let (_, deps) = rt.record(|| rt.untrack_only(|| a.get() + b.get(), [b.id()]));

        assert!(deps.contains(a.id()));
        assert!(!deps.contains(b.id()));
    }

    #[test]
    fn reads_outside_a_window_are_not_recorded() {
        let rt = Runtime::new();
        let a = rt.reactor(1);
        a.get();

        let recording = rt.start_recording();
        assert!(recording.stop().is_empty());
    }

    #[test]
    fn dropped_recording_rebalances_the_stack() {
        let rt = Runtime::new();
        {
            let _recording = rt.start_recording();
            assert!(rt.is_recording());
        }
        assert!(!rt.is_recording());
    }

    #[test]
    fn lookup_finds_live_nodes_only() {
        let rt = Runtime::new();
        let a = rt.reactor(0);
        let id = a.id();

        assert_eq!(rt.lookup(id).map(|n| n.id()), Some(id));
        assert_eq!(rt.node_count(), 1);

        drop(a);
        assert!(rt.lookup(id).is_none());
        assert_eq!(rt.node_count(), 0);
    }

    #[test]
    fn reads_on_other_threads_stay_out_of_the_window() {
        let rt = Runtime::new();
        let (a, b) = (rt.reactor(1), rt.reactor(2));

        let (_, deps) = rt.record(|| {
            a.get();
            let b = b.clone();
            std::thread::spawn(move || b.get()).join().unwrap();
        });

        assert!(deps.contains(a.id()));
        assert!(!deps.contains(b.id()));
    }

    #[test]
    fn threads_record_independently() {
        let rt = Runtime::new();
        let (a, b) = (rt.reactor(1), rt.reactor(2));

        let outer = rt.start_recording();
        let worker = {
            let (rt, b) = (rt.clone(), b.clone());
            std::thread::spawn(move || rt.record(|| b.get()).1)
        };
        let inner = worker.join().unwrap();
        a.get();
        let outer = outer.stop();

        assert_eq!(inner.iter().collect::<Vec<_>>(), vec![b.id()]);
        assert_eq!(outer.iter().collect::<Vec<_>>(), vec![a.id()]);
    }

    #[test]
    fn runtimes_do_not_share_sessions() {
        let rt1 = Runtime::new();
        let rt2 = Runtime::new();
        let a = rt2.reactor(1);

        let (_, deps) = rt1.record(|| a.get());
        assert!(deps.is_empty());
    }
}
