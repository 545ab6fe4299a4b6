//! Dependency Recorder
//!
//! The recorder answers one question: which reactors did this computation
//! read? It keeps a stack of recording sessions. Every tracked read pushes
//! the reactor's id into the innermost session, and the session is handed
//! back when the recording window closes.
//!
//! # Implementation
//!
//! The stack is a plain `Vec` owned by a [`Runtime`](super::Runtime), not a
//! thread-local: whoever holds the runtime holds the recorder. Nested
//! windows push a new session on top; the enclosing session is untouched
//! until the inner one stops. Sessions are insertion-ordered sets, so a
//! reactor read many times is recorded once, at the position of its first
//! read.
//!
//! Each session remembers whether recording was active when it started, and
//! `stop` restores that state. A window opened inside an untracked region
//! therefore does not switch tracking back on for the rest of that region.

use indexmap::IndexSet;

use crate::graph::NodeId;

/// The set of reactors read during one recording window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    ids: IndexSet<NodeId>,
}

impl Dependencies {
    /// Number of distinct reactors recorded.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether the reactor with `id` was read.
    pub fn contains(&self, id: NodeId) -> bool {
        self.ids.contains(&id)
    }

    /// Recorded ids in first-read order.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ids.iter().copied()
    }
}

impl FromIterator<NodeId> for Dependencies {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Dependencies {
    type Item = NodeId;
    type IntoIter = indexmap::set::IntoIter<NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.into_iter()
    }
}

/// One entry of the recording stack.
#[derive(Debug, Default)]
struct RecordSession {
    items: IndexSet<NodeId>,
    /// Recording state of the enclosing session when this one started.
    resume_active: bool,
}

/// A stack of recording sessions.
///
/// # Example
///
/// ```rust
/// use reactor_core::graph::NodeId;
/// use reactor_core::reactive::Recorder;
///
/// let (a, b) = (NodeId::new(), NodeId::new());
/// let mut recorder = Recorder::new();
///
/// recorder.start();
/// recorder.push([a, b, a]);
/// let deps = recorder.stop().unwrap();
///
/// assert_eq!(deps.len(), 2);
/// assert!(recorder.stop().is_none());
/// ```
#[derive(Debug, Default)]
pub struct Recorder {
    stack: Vec<RecordSession>,
    active: bool,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new, empty session on top of the stack and start recording.
    pub fn start(&mut self) {
        self.stack.push(RecordSession {
            items: IndexSet::new(),
            resume_active: self.active,
        });
        self.active = true;
    }

    /// Record `items` into the current session.
    ///
    /// Ignored while paused or when no session exists.
    pub fn push(&mut self, items: impl IntoIterator<Item = NodeId>) {
        if !self.active {
            return;
        }
        if let Some(session) = self.stack.last_mut() {
            session.items.extend(items);
        }
    }

    /// Remove `items` from the current session, paused or not.
    pub fn pop(&mut self, items: impl IntoIterator<Item = NodeId>) {
        if let Some(session) = self.stack.last_mut() {
            for item in items {
                session.items.shift_remove(&item);
            }
        }
    }

    /// Suspend recording without closing the session.
    pub fn pause(&mut self) {
        self.active = false;
    }

    /// Resume recording. Stays paused when there is no session to record into.
    pub fn resume(&mut self) {
        self.active = !self.stack.is_empty();
    }

    /// Close the current session and return what it recorded.
    ///
    /// Returns `None` when there is no session. The enclosing session becomes
    /// current again, with the recording state it had when this one started.
    pub fn stop(&mut self) -> Option<Dependencies> {
        let session = self.stack.pop()?;
        self.active = session.resume_active && !self.stack.is_empty();
        Some(Dependencies {
            ids: session.items,
        })
    }

    /// Whether reads are currently being recorded.
    pub fn is_recording(&self) -> bool {
        self.active
    }

    /// Number of open sessions.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}
