//! Positional list reconciliation.
//!
//! Old and new values are compared index by index. Equal values keep their
//! rendered nodes, anything else is rendered again. There is no move
//! detection: a reordered list costs one replacement per changed position.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{DomHost, Slot};
use crate::reactive::{Reactor, Subscription};

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Patch {
    pub kept: usize,
    pub replaced: usize,
    pub inserted: usize,
    pub removed: usize,
}

impl Patch {
    /// True when no node was created or removed.
    pub fn is_noop(&self) -> bool {
        self.replaced == 0 && self.inserted == 0 && self.removed == 0
    }
}

/// Bring the region after `anchor` from `previous` to `next`.
///
/// `slots` holds the nodes rendered for `previous`, one slot per item. The
/// returned slots line up with `next`. If `slots` is shorter than `previous`
/// the missing positions are rendered as inserts; extra slots are removed.
pub fn reconcile<H, T, R>(
    host: &mut H,
    anchor: &H::Node,
    slots: Vec<Slot<H::Node>>,
    previous: &[T],
    next: &[T],
    mut render: R,
) -> (Vec<Slot<H::Node>>, Patch)
where
    H: DomHost,
    T: PartialEq,
    R: FnMut(&mut H, &T) -> Slot<H::Node>,
{
    let mut patch = Patch::default();
    let mut rendered = Vec::with_capacity(next.len());
    let mut last = anchor.clone();
    let mut slots = slots.into_iter();

    for index in 0..previous.len().max(next.len()) {
        let slot = slots.next();
        match (previous.get(index), next.get(index), slot) {
            (Some(old), Some(new), Some(slot)) if old == new => {
                if let Some(node) = slot.last() {
                    last = node.clone();
                }
                rendered.push(slot);
                patch.kept += 1;
            }
            (_, Some(new), slot) => {
                let fresh = render(host, new);
                for node in &fresh {
                    host.insert_after(&last, node);
                    last = node.clone();
                }
                match slot {
                    Some(stale) => {
                        for node in &stale {
                            host.remove(node);
                        }
                        patch.replaced += 1;
                    }
                    None => patch.inserted += 1,
                }
                rendered.push(fresh);
            }
            (_, None, Some(stale)) => {
                for node in &stale {
                    host.remove(node);
                }
                patch.removed += 1;
            }
            (_, None, None) => {}
        }
    }

    for stale in slots {
        for node in &stale {
            host.remove(node);
        }
        patch.removed += 1;
    }

    tracing::debug!(
        kept = patch.kept,
        replaced = patch.replaced,
        inserted = patch.inserted,
        removed = patch.removed,
        "reconciled list"
    );
    (rendered, patch)
}

struct ListState<N, T> {
    slots: Vec<Slot<N>>,
    values: Vec<T>,
    last_patch: Patch,
}

/// A list region kept in sync with a `Reactor<Vec<T>>`.
pub struct ListBinding<N, T> {
    state: Arc<Mutex<ListState<N, T>>>,
    subscription: Subscription,
}

impl<N: Clone, T> ListBinding<N, T> {
    /// The rendered nodes, one slot per item.
    pub fn slots(&self) -> Vec<Slot<N>> {
        self.state.lock().slots.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summary of the most recent pass, including the initial render.
    pub fn last_patch(&self) -> Patch {
        self.state.lock().last_patch
    }

    /// Stop following the source. Rendered nodes stay where they are.
    pub fn unbind(&self) {
        self.subscription.unsubscribe();
    }

    pub fn is_bound(&self) -> bool {
        self.subscription.is_active()
    }
}

impl<N, T> fmt::Debug for ListBinding<N, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListBinding")
            .field("node", &self.subscription.node())
            .field("bound", &self.subscription.is_active())
            .finish()
    }
}

/// Render `source` after `anchor` and reconcile on every write.
///
/// The host is locked for the duration of each pass. `render` must not write
/// to `source` synchronously; such writes are handled by the runtime's
/// reentrancy policy.
pub fn bind_list<H, T, R>(
    source: &Reactor<Vec<T>>,
    host: Arc<Mutex<H>>,
    anchor: H::Node,
    render: R,
) -> ListBinding<H::Node, T>
where
    H: DomHost + Send + 'static,
    H::Node: Send + Sync + 'static,
    T: Clone + PartialEq + Send + Sync + 'static,
    R: FnMut(&mut H, &T) -> Slot<H::Node> + Send + 'static,
{
    let render = Arc::new(Mutex::new(render));
    let initial = source.peek();

    let (slots, last_patch) = {
        let mut host = host.lock();
        let mut render = render.lock();
        reconcile(&mut *host, &anchor, Vec::new(), &[], &initial, &mut *render)
    };
    let state = Arc::new(Mutex::new(ListState {
        slots,
        values: initial,
        last_patch,
    }));

    let shared = state.clone();
    let subscription = source.subscribe(move |_, next: &Vec<T>| {
        let mut state = shared.lock();
        let mut host = host.lock();
        let mut render = render.lock();

        let slots = std::mem::take(&mut state.slots);
        let (slots, patch) =
            reconcile(&mut *host, &anchor, slots, &state.values, next, &mut *render);
        state.slots = slots;
        state.values = next.clone();
        state.last_patch = patch;
    });

    tracing::debug!(node = %source.id(), "list bound");
    ListBinding {
        state,
        subscription,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDom, NodeKey};
    use crate::reactive::Runtime;
    use smallvec::smallvec;

    fn fixture() -> (MemoryDom, NodeKey, NodeKey) {
        let mut dom = MemoryDom::new();
        let list = dom.create_element("ul");
        let anchor = dom.create_comment("");
        dom.append_child(list, anchor);
        (dom, list, anchor)
    }

    fn item(dom: &mut MemoryDom, value: &i32) -> Slot<NodeKey> {
        let li = dom.create_element("li");
        let text = dom.create_text(&value.to_string());
        dom.append_child(li, text);
        smallvec![li]
    }

    fn render_all(dom: &mut MemoryDom, anchor: NodeKey, values: &[i32]) -> Vec<Slot<NodeKey>> {
        reconcile(dom, &anchor, Vec::new(), &[], values, item).0
    }

    #[test]
    fn changed_item_is_replaced_in_place() {
        let (mut dom, list, anchor) = fixture();
        let slots = render_all(&mut dom, anchor, &[1, 2, 3]);
        let before = slots.clone();

        let (slots, patch) = reconcile(&mut dom, &anchor, slots, &[1, 2, 3], &[1, 9, 3], item);

        assert_eq!(
            patch,
            Patch {
                kept: 2,
                replaced: 1,
                inserted: 0,
                removed: 0
            }
        );
        assert_eq!(slots[0], before[0]);
        assert_ne!(slots[1], before[1]);
        assert_eq!(slots[2], before[2]);
        assert_eq!(dom.text_content(list), "193");
    }

    #[test]
    fn appended_item_is_inserted_after_last() {
        let (mut dom, list, anchor) = fixture();
        let slots = render_all(&mut dom, anchor, &[1, 2]);

        let (slots, patch) = reconcile(&mut dom, &anchor, slots, &[1, 2], &[1, 2, 3], item);

        assert_eq!(patch.kept, 2);
        assert_eq!(patch.inserted, 1);
        assert_eq!(slots.len(), 3);
        assert_eq!(
            dom.to_html(list),
            "<ul><!----><li>1</li><li>2</li><li>3</li></ul>"
        );
    }

    #[test]
    fn trailing_items_are_removed() {
        let (mut dom, list, anchor) = fixture();
        let slots = render_all(&mut dom, anchor, &[1, 2, 3]);
        let dropped = slots[1][0];

        let (slots, patch) = reconcile(&mut dom, &anchor, slots, &[1, 2, 3], &[1], item);

        assert_eq!(patch.kept, 1);
        assert_eq!(patch.removed, 2);
        assert_eq!(slots.len(), 1);
        assert_eq!(dom.parent(dropped), None);
        assert_eq!(dom.text_content(list), "1");
    }

    #[test]
    fn reorder_is_seen_as_replacements() {
        let (mut dom, list, anchor) = fixture();
        let slots = render_all(&mut dom, anchor, &[1, 2, 3]);
        let middle = slots[1].clone();

        let (slots, patch) = reconcile(&mut dom, &anchor, slots, &[1, 2, 3], &[3, 2, 1], item);

        // No move detection: the ends are rebuilt, only the unchanged middle survives.
        assert_eq!(patch.replaced, 2);
        assert_eq!(patch.kept, 1);
        assert_eq!(slots[1], middle);
        assert_eq!(dom.text_content(list), "321");
    }

    #[test]
    fn multi_node_and_empty_slots() {
        let (mut dom, list, anchor) = fixture();
        let render = |dom: &mut MemoryDom, value: &i32| -> Slot<NodeKey> {
            (0..*value)
                .map(|_| dom.create_text(&value.to_string()))
                .collect()
        };

        let (slots, _) = reconcile(&mut dom, &anchor, Vec::new(), &[], &[2, 0, 1], render);
        assert_eq!(dom.text_content(list), "221");

        let (slots, patch) = reconcile(&mut dom, &anchor, slots, &[2, 0, 1], &[2, 3, 1], render);
        assert_eq!(patch.replaced, 1);
        assert_eq!(dom.text_content(list), "223331");
        assert_eq!(slots[1].len(), 3);
    }

    #[test]
    fn identical_lists_are_a_noop() {
        let (mut dom, _, anchor) = fixture();
        let slots = render_all(&mut dom, anchor, &[4, 5]);

        let (_, patch) = reconcile(&mut dom, &anchor, slots, &[4, 5], &[4, 5], item);
        assert!(patch.is_noop());
        assert_eq!(patch.kept, 2);
    }

    #[test]
    fn surplus_slots_are_removed() {
        let (mut dom, list, anchor) = fixture();
        let slots = render_all(&mut dom, anchor, &[1, 2, 3]);

        // Slots for three items but only two previous values.
        let (slots, patch) = reconcile(&mut dom, &anchor, slots, &[1, 2], &[1, 2], item);
        assert_eq!(patch.kept, 2);
        assert_eq!(patch.removed, 1);
        assert_eq!(slots.len(), 2);
        assert_eq!(dom.text_content(list), "12");
    }

    #[test]
    fn bound_list_follows_its_source() {
        let rt = Runtime::new();
        let items = rt.reactor(vec![1, 2]);
        let (dom, list, anchor) = fixture();
        let dom = Arc::new(Mutex::new(dom));

        let binding = bind_list(&items, dom.clone(), anchor, item);
        assert_eq!(binding.len(), 2);
        assert_eq!(binding.last_patch().inserted, 2);
        assert_eq!(dom.lock().text_content(list), "12");

        items
            .update(|v| v.iter().copied().chain([3]).collect())
            .unwrap();
        assert_eq!(binding.last_patch().inserted, 1);
        assert_eq!(dom.lock().text_content(list), "123");

        items.set(vec![7]).unwrap();
        assert_eq!(
            binding.last_patch(),
            Patch {
                kept: 0,
                replaced: 1,
                inserted: 0,
                removed: 2
            }
        );
        assert_eq!(dom.lock().text_content(list), "7");

        binding.unbind();
        assert!(!binding.is_bound());
        items.set(vec![]).unwrap();
        assert_eq!(dom.lock().text_content(list), "7");
    }
}
