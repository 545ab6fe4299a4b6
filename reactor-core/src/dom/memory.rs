//! In-memory document tree.
//!
//! [`MemoryDom`] is an arena of nodes linked by index. Removing a node only
//! detaches it, like a DOM node that is no longer in the document; its key
//! stays valid and it can be inserted again.

use std::fmt::Write as _;

use super::DomHost;

/// Index of a node in a [`MemoryDom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(usize);

#[derive(Debug, Clone)]
enum Content {
    Element(String),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct MemoryNode {
    content: Content,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
}

#[derive(Debug, Default)]
pub struct MemoryDom {
    nodes: Vec<MemoryNode>,
}

impl MemoryDom {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, content: Content) -> NodeKey {
        self.nodes.push(MemoryNode {
            content,
            parent: None,
            children: Vec::new(),
        });
        NodeKey(self.nodes.len() - 1)
    }

    pub fn create_element(&mut self, tag: &str) -> NodeKey {
        self.push(Content::Element(tag.to_string()))
    }

    pub fn create_text(&mut self, text: &str) -> NodeKey {
        self.push(Content::Text(text.to_string()))
    }

    /// Comments are used as list anchors: they render nothing visible.
    pub fn create_comment(&mut self, text: &str) -> NodeKey {
        self.push(Content::Comment(text.to_string()))
    }

    /// Append `child` as the last child of `parent`, detaching it first.
    pub fn append_child(&mut self, parent: NodeKey, child: NodeKey) {
        self.detach(child);
        if let Some(node) = self.nodes.get_mut(parent.0) {
            node.children.push(child);
        }
        if let Some(node) = self.nodes.get_mut(child.0) {
            node.parent = Some(parent);
        }
    }

    /// Replace the text of a text or comment node. Elements are left alone.
    pub fn set_text(&mut self, node: NodeKey, text: &str) {
        if let Some(node) = self.nodes.get_mut(node.0) {
            match &mut node.content {
                Content::Text(current) | Content::Comment(current) => {
                    current.clear();
                    current.push_str(text);
                }
                Content::Element(_) => {}
            }
        }
    }

    pub fn parent(&self, node: NodeKey) -> Option<NodeKey> {
        self.nodes.get(node.0).and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeKey) -> &[NodeKey] {
        self.nodes
            .get(node.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Concatenated text of `node` and its descendants. Comments are skipped.
    pub fn text_content(&self, node: NodeKey) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, key: NodeKey, out: &mut String) {
        let Some(node) = self.nodes.get(key.0) else {
            return;
        };
        match &node.content {
            Content::Text(text) => out.push_str(text),
            Content::Comment(_) => {}
            Content::Element(_) => {
                for child in &node.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Serialize `node` and its descendants.
    pub fn to_html(&self, node: NodeKey) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    fn write_html(&self, key: NodeKey, out: &mut String) {
        let Some(node) = self.nodes.get(key.0) else {
            return;
        };
        match &node.content {
            Content::Text(text) => out.push_str(text),
            Content::Comment(text) => {
                let _ = write!(out, "<!--{text}-->");
            }
            Content::Element(tag) => {
                let _ = write!(out, "<{tag}>");
                for child in &node.children {
                    self.write_html(*child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    fn detach(&mut self, child: NodeKey) {
        let Some(parent) = self.parent(child) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(parent.0) {
            node.children.retain(|c| *c != child);
        }
        if let Some(node) = self.nodes.get_mut(child.0) {
            node.parent = None;
        }
    }
}

impl DomHost for MemoryDom {
    type Node = NodeKey;

    fn insert_after(&mut self, reference: &NodeKey, node: &NodeKey) {
        self.detach(*node);

        let Some(parent) = self.parent(*reference) else {
            tracing::warn!(?reference, "insert_after on a detached reference node");
            return;
        };
        if let Some(parent_node) = self.nodes.get_mut(parent.0) {
            let position = parent_node
                .children
                .iter()
                .position(|c| c == reference)
                .map_or(parent_node.children.len(), |p| p + 1);
            parent_node.children.insert(position, *node);
        }
        if let Some(child) = self.nodes.get_mut(node.0) {
            child.parent = Some(parent);
        }
    }

    fn remove(&mut self, node: &NodeKey) {
        self.detach(*node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_serializes_a_tree() {
        let mut dom = MemoryDom::new();
        let list = dom.create_element("ul");
        let anchor = dom.create_comment("list");
        let item = dom.create_element("li");
        let text = dom.create_text("one");

        dom.append_child(list, anchor);
        dom.append_child(item, text);
        dom.append_child(list, item);

        assert_eq!(dom.to_html(list), "<ul><!--list--><li>one</li></ul>");
        assert_eq!(dom.text_content(list), "one");
        assert_eq!(dom.parent(item), Some(list));
    }

    #[test]
    fn insert_after_places_and_moves_nodes() {
        let mut dom = MemoryDom::new();
        let root = dom.create_element("div");
        let a = dom.create_text("a");
        let b = dom.create_text("b");
        let c = dom.create_text("c");
        dom.append_child(root, a);
        dom.append_child(root, b);

        dom.insert_after(&a, &c);
        assert_eq!(dom.text_content(root), "acb");

        dom.insert_after(&b, &c);
        assert_eq!(dom.text_content(root), "abc");
    }

    #[test]
    fn removed_nodes_can_come_back() {
        let mut dom = MemoryDom::new();
        let root = dom.create_element("p");
        let a = dom.create_text("a");
        let b = dom.create_text("b");
        dom.append_child(root, a);
        dom.append_child(root, b);

        dom.remove(&b);
        assert_eq!(dom.children(root), &[a]);
        assert_eq!(dom.parent(b), None);

        dom.insert_after(&a, &b);
        assert_eq!(dom.text_content(root), "ab");
    }

    #[test]
    fn insert_after_detached_reference_is_ignored() {
        let mut dom = MemoryDom::new();
        let a = dom.create_text("a");
        let b = dom.create_text("b");

        dom.insert_after(&a, &b);
        assert_eq!(dom.parent(b), None);
    }
}
