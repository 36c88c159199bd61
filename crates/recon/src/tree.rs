//! In-memory tag/attribute tree that path expressions are evaluated against.
//!
//! Nodes keep their qualified tag name as written in the document. Every
//! comparison against a path segment goes through [`local_name`], so
//! namespace prefixes are stripped in exactly one place.

use std::collections::HashMap;

/// A single element of a parsed document.
///
/// `Drop`, `Clone` and `PartialEq` are implemented without recursion, so a
/// document of any nesting depth is safe to own, copy and compare.
#[derive(Debug, Default)]
pub struct TreeNode {
    /// Qualified tag name (`ns:Tag` or `Tag`).
    pub name: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    /// Direct text content (all text pieces that are immediate children of
    /// this element, concatenated). `None` when the element has none.
    pub text: Option<String>,
    pub children: Vec<TreeNode>,
}

/// Strip a namespace prefix (`ns:Tag`) or Clark-notation URI (`{uri}Tag`).
pub fn local_name(name: &str) -> &str {
    let name = match name.rfind('}') {
        Some(i) => &name[i + 1..],
        None => name,
    };
    match name.rfind(':') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

impl TreeNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: TreeNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    /// Attribute value by local name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| local_name(k) == name)
            .map(|(_, v)| v.as_str())
    }

    /// Direct children whose local name equals `name`, in document order.
    pub fn children_named(&self, name: &str) -> Vec<&TreeNode> {
        self.children.iter().filter(|c| c.local_name() == name).collect()
    }

    /// The `index`-th (1-based) direct child named `name`.
    pub fn nth_child_named(&self, name: &str, index: usize) -> Option<&TreeNode> {
        if index == 0 {
            return None;
        }
        self.children.iter().filter(|c| c.local_name() == name).nth(index - 1)
    }

    /// Pre-order walk of this node and all of its descendants.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![Visit {
                node: self,
                depth: 0,
                ordinal: 1,
            }],
        }
    }

    /// Pre-order walk of the descendants only (this node excluded).
    pub fn descendants(&self) -> impl Iterator<Item = Visit<'_>> {
        self.walk().skip(1)
    }

    /// Extracted text value of this node.
    ///
    /// Direct text wins when it is non-blank. Otherwise the non-blank text of
    /// all descendants is joined with single spaces in document order.
    /// Whitespace-only content yields `None`.
    pub fn text_value(&self) -> Option<String> {
        if let Some(text) = self.text.as_deref() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if self.children.is_empty() {
            return None;
        }

        let pieces: Vec<&str> = self
            .descendants()
            .filter_map(|v| v.node.text.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();

        if pieces.is_empty() {
            None
        } else {
            Some(pieces.join(" "))
        }
    }

    /// Total number of nodes in this subtree.
    pub fn node_count(&self) -> usize {
        self.walk().count()
    }

    /// Copy of this node without its children.
    fn shallow_copy(&self) -> Self {
        Self {
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            text: self.text.clone(),
            children: Vec::with_capacity(self.children.len()),
        }
    }
}

impl Drop for TreeNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

impl Clone for TreeNode {
    fn clone(&self) -> Self {
        // (source, copy under construction, next child to copy)
        let mut stack: Vec<(&TreeNode, TreeNode, usize)> = vec![(self, self.shallow_copy(), 0)];
        let mut finished = None;

        while let Some((source, copy, next)) = stack.pop() {
            if let Some(child) = source.children.get(next) {
                stack.push((source, copy, next + 1));
                stack.push((child, child.shallow_copy(), 0));
                continue;
            }
            match stack.last_mut() {
                Some((_, parent, _)) => parent.children.push(copy),
                None => finished = Some(copy),
            }
        }
        finished.unwrap_or_default()
    }
}

impl PartialEq for TreeNode {
    /// Two pre-order walks agree node by node, including child counts.
    fn eq(&self, other: &Self) -> bool {
        let mut left = self.walk();
        let mut right = other.walk();
        loop {
            match (left.next(), right.next()) {
                (None, None) => return true,
                (Some(a), Some(b)) => {
                    let (a, b) = (a.node, b.node);
                    if a.name != b.name
                        || a.attributes != b.attributes
                        || a.text != b.text
                        || a.children.len() != b.children.len()
                    {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }
}

impl Eq for TreeNode {}

/// One step of a [`Walk`].
#[derive(Debug, Clone, Copy)]
pub struct Visit<'a> {
    pub node: &'a TreeNode,
    /// Distance from the node the walk started at.
    pub depth: usize,
    /// 1-based position among same-named siblings. The start node is 1.
    pub ordinal: usize,
}

/// Explicit-stack pre-order traversal in document order.
pub struct Walk<'a> {
    stack: Vec<Visit<'a>>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = Visit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let visit = self.stack.pop()?;

        if !visit.node.children.is_empty() {
            let mut seen: HashMap<&str, usize> = HashMap::new();
            let children: Vec<Visit<'a>> = visit
                .node
                .children
                .iter()
                .map(|child| {
                    let n = seen.entry(child.local_name()).or_insert(0);
                    *n += 1;
                    Visit {
                        node: child,
                        depth: visit.depth + 1,
                        ordinal: *n,
                    }
                })
                .collect();
            self.stack.extend(children.into_iter().rev());
        }

        Some(visit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TreeNode {
        TreeNode::new("inv:Invoice")
            .with_child(TreeNode::new("inv:Header").with_child(TreeNode::new("Number").with_text("F-17")))
            .with_child(TreeNode::new("ROW").with_text("a"))
            .with_child(TreeNode::new("ROW").with_text("b"))
            .with_child(TreeNode::new("Note").with_text("   "))
    }

    #[test]
    fn local_name_strips_prefix_and_uri() {
        assert_eq!(local_name("ns:Total"), "Total");
        assert_eq!(local_name("{urn:x}Total"), "Total");
        assert_eq!(local_name("Total"), "Total");
    }

    #[test]
    fn walk_is_document_order() {
        let root = sample();
        let names: Vec<&str> = root.walk().map(|v| v.node.local_name()).collect();
        assert_eq!(names, vec!["Invoice", "Header", "Number", "ROW", "ROW", "Note"]);
    }

    #[test]
    fn walk_tracks_sibling_ordinals() {
        let root = sample();
        let rows: Vec<(String, usize)> = root
            .descendants()
            .filter(|v| v.node.local_name() == "ROW")
            .map(|v| (v.node.text.clone().unwrap_or_default(), v.ordinal))
            .collect();
        assert_eq!(rows, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
    }

    #[test]
    fn text_value_falls_back_to_descendants() {
        let root = sample();
        assert_eq!(root.children[0].text_value().as_deref(), Some("F-17"));
        assert_eq!(root.text_value().as_deref(), Some("F-17 a b"));
    }

    #[test]
    fn whitespace_only_text_is_none() {
        let root = sample();
        assert_eq!(root.children[3].text_value(), None);
    }

    #[test]
    fn nth_child_is_one_based() {
        let root = sample();
        assert_eq!(root.nth_child_named("ROW", 2).and_then(|n| n.text.as_deref()), Some("b"));
        assert!(root.nth_child_named("ROW", 0).is_none());
        assert!(root.nth_child_named("ROW", 3).is_none());
    }

    fn chain(depth: usize) -> TreeNode {
        let mut node = TreeNode::new("leaf").with_text("x");
        for _ in 0..depth {
            node = TreeNode::new("n").with_child(node);
        }
        node
    }

    #[test]
    fn deep_tree_walks_and_drops() {
        let node = chain(100_000);
        assert_eq!(node.walk().count(), 100_001);
        assert_eq!(node.text_value().as_deref(), Some("x"));
        drop(node);
    }

    #[test]
    fn deep_tree_clones_and_compares() {
        let node = chain(100_000);
        let copy = node.clone();
        assert_eq!(copy.node_count(), 100_001);
        assert_eq!(node, copy);
        assert_ne!(node, chain(99_999));
    }

    #[test]
    fn equality_sees_shape_and_content() {
        let root = sample();
        assert_eq!(root, root.clone());

        let mut moved = sample();
        let row = moved.children.remove(1);
        moved.children[0].children.push(row);
        assert_ne!(root, moved);

        let mut retexted = sample();
        retexted.children[2].text = Some("c".into());
        assert_ne!(root, retexted);
    }
}
