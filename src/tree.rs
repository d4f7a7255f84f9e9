//! Arena representation of a single parsed `alpino_ds` subtree
//!
//! Nodes are stored in document order. Node 0 is a synthetic document node
//! whose only child is the tree's root element, so absolute paths inside a
//! query stay within the tree. Each node records the id of its last
//! descendant, which turns subtree walks into index ranges.

use crate::names::{Name, NamePool};
use std::ops::RangeInclusive;

/// Unique identifier for a node (its position in document order)
pub type NodeId = usize;

/// Id of the synthetic document node
pub const DOCUMENT: NodeId = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: Name,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Document,
    Element {
        name: Name,
        attributes: Vec<Attribute>,
    },
    /// Adjacent character data and CDATA sections, merged
    Text(String),
    Comment(String),
    /// Processing instruction: target and content as written
    Instruction(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub last_descendant: NodeId,
}

impl Node {
    fn new(id: NodeId, kind: NodeKind, parent: Option<NodeId>) -> Self {
        Self {
            id,
            kind,
            parent,
            children: Vec::new(),
            last_descendant: id,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element { .. })
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, NodeKind::Text(_))
    }

    pub fn attributes(&self) -> &[Attribute] {
        match &self.kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }
}

/// One parsed tree
#[derive(Debug, Clone)]
pub struct Tree {
    pub nodes: Vec<Node>,
    names: NamePool,
}

impl Tree {
    /// Create a tree holding only the document node
    pub fn new(names: NamePool) -> Self {
        Self {
            nodes: vec![Node::new(DOCUMENT, NodeKind::Document, None)],
            names,
        }
    }

    pub fn names(&self) -> &NamePool {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root().is_none()
    }

    /// Append an element as the last child of `parent`
    pub fn add_element(&mut self, parent: NodeId, name: &str, attributes: Vec<Attribute>) -> NodeId {
        let name = self.names.intern(name);
        self.push(parent, NodeKind::Element { name, attributes })
    }

    /// Append character data to `parent`, merging with a preceding text child
    pub fn add_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let last = self.nodes.len() - 1;
        if self.nodes[parent].children.last() == Some(&last) {
            if let NodeKind::Text(existing) = &mut self.nodes[last].kind {
                existing.push_str(text);
                return last;
            }
        }
        self.push(parent, NodeKind::Text(text.to_string()))
    }

    /// Append a comment; text on either side of it stays in separate nodes
    pub fn add_comment(&mut self, parent: NodeId, comment: &str) -> NodeId {
        self.push(parent, NodeKind::Comment(comment.to_string()))
    }

    pub fn add_instruction(&mut self, parent: NodeId, instruction: &str) -> NodeId {
        self.push(parent, NodeKind::Instruction(instruction.to_string()))
    }

    /// Mark an element as complete; everything added since it opened is its subtree
    pub fn close(&mut self, id: NodeId) {
        self.nodes[id].last_descendant = self.nodes.len() - 1;
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node::new(id, kind, Some(parent)));
        self.nodes[parent].children.push(id);
        id
    }

    /// Get a node by ID
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// The tree's root element (the `alpino_ds` node)
    pub fn root(&self) -> Option<NodeId> {
        self.nodes[DOCUMENT]
            .children
            .iter()
            .copied()
            .find(|&id| self.nodes[id].is_element())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// Ids of all descendants of `id`, in document order
    pub fn descendants(&self, id: NodeId) -> RangeInclusive<NodeId> {
        id + 1..=self.nodes[id].last_descendant
    }

    /// Element name, `None` for text and document nodes
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element { name, .. } => Some(self.names.resolve(*name)),
            _ => None,
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        let name = self.names.lookup(name)?;
        self.nodes[id]
            .attributes()
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// First child element of `id` with the given name
    pub fn child_element(&self, id: NodeId, name: &str) -> Option<NodeId> {
        let name = self.names.lookup(name)?;
        self.nodes[id].children.iter().copied().find(|&child| {
            matches!(&self.nodes[child].kind, NodeKind::Element { name: n, .. } if *n == name)
        })
    }

    /// Character data directly inside `id`, before its first child element
    pub fn text(&self, id: NodeId) -> Option<&str> {
        let first = *self.nodes[id].children.first()?;
        match &self.nodes[first].kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// XPath string-value: the concatenated text of all descendants
    pub fn string_value(&self, id: NodeId) -> String {
        match &self.nodes[id].kind {
            NodeKind::Text(text) | NodeKind::Comment(text) | NodeKind::Instruction(text) => {
                text.clone()
            }
            _ => self
                .descendants(id)
                .filter_map(|d| match &self.nodes[d].kind {
                    NodeKind::Text(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// <alpino_ds><node rel="top"><node rel="su" word="Hij"/>x</node><sentence>Hij loopt.</sentence></alpino_ds>
    fn create_test_tree() -> Tree {
        let mut tree = Tree::new(NamePool::new());
        let rel = tree.names().intern("rel");
        let word = tree.names().intern("word");

        let root = tree.add_element(DOCUMENT, "alpino_ds", Vec::new());
        let top = tree.add_element(
            root,
            "node",
            vec![Attribute {
                name: rel,
                value: "top".to_string(),
            }],
        );
        let su = tree.add_element(
            top,
            "node",
            vec![
                Attribute {
                    name: rel,
                    value: "su".to_string(),
                },
                Attribute {
                    name: word,
                    value: "Hij".to_string(),
                },
            ],
        );
        tree.close(su);
        tree.add_text(top, "x");
        tree.close(top);
        let sentence = tree.add_element(root, "sentence", Vec::new());
        tree.add_text(sentence, "Hij ");
        tree.add_text(sentence, "loopt.");
        tree.close(sentence);
        tree.close(root);
        tree.close(DOCUMENT);
        tree
    }

    #[test]
    fn test_tree_creation() {
        let tree = create_test_tree();

        assert_eq!(tree.len(), 7);
        assert_eq!(tree.root(), Some(1));
        assert_eq!(tree.name(1), Some("alpino_ds"));
        assert_eq!(tree.parent(3), Some(2));
        assert_eq!(tree.children(1), &[2, 5]);
    }

    #[test]
    fn test_adjacent_text_is_merged() {
        let tree = create_test_tree();
        let sentence = tree.child_element(1, "sentence").unwrap();

        assert_eq!(tree.children(sentence).len(), 1);
        assert_eq!(tree.text(sentence), Some("Hij loopt."));
    }

    #[test]
    fn test_descendant_ranges() {
        let tree = create_test_tree();

        assert_eq!(tree.descendants(DOCUMENT), 1..=6);
        assert_eq!(tree.descendants(2), 3..=4);
        assert!(tree.descendants(3).is_empty());
    }

    #[test]
    fn test_attributes() {
        let tree = create_test_tree();

        assert_eq!(tree.attribute(3, "rel"), Some("su"));
        assert_eq!(tree.attribute(3, "word"), Some("Hij"));
        assert_eq!(tree.attribute(3, "cat"), None);
        assert_eq!(tree.attribute(1, "rel"), None);
    }

    #[test]
    fn test_string_value() {
        let tree = create_test_tree();

        assert_eq!(tree.string_value(1), "xHij loopt.");
        assert_eq!(tree.string_value(3), "");
    }

    #[test]
    fn test_text_only_before_first_element() {
        let tree = create_test_tree();
        // `top` starts with an element child, so it has no leading text
        assert_eq!(tree.text(2), None);
        assert_eq!(tree.child_element(1, "missing"), None);
    }

    #[test]
    fn test_comment_splits_text() {
        let mut tree = Tree::new(NamePool::new());
        let sentence = tree.add_element(DOCUMENT, "sentence", Vec::new());
        tree.add_text(sentence, "Hij");
        let comment = tree.add_comment(sentence, " c ");
        tree.add_text(sentence, " loopt.");
        tree.close(sentence);

        assert_eq!(tree.children(sentence).len(), 3);
        assert_eq!(tree.text(sentence), Some("Hij"));
        assert_eq!(tree.string_value(sentence), "Hij loopt.");
        assert_eq!(tree.string_value(comment), " c ");
        assert!(!tree.get_node(comment).unwrap().is_text());
    }
}
