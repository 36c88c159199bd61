//! Tree value resolution.
//!
//! A [`Resolver`] evaluates a [`PathExpression`] against a [`TreeNode`].
//! Simple paths go through an ordered list of [`ResolveStrategy`]
//! implementations; the first one that yields non-blank text wins and is
//! recorded on the [`ResolvedValue`].

use serde::Serialize;

use crate::path::{PathExpression, SimplePath};
use crate::tree::TreeNode;

/// Default separator between the values of concatenated path parts.
pub const DEFAULT_SEPARATOR: &str = " - ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    DirectDescendant,
    FullPath,
    ManualWalk,
    TagOnly,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DirectDescendant => write!(f, "direct_descendant"),
            Self::FullPath => write!(f, "full_path"),
            Self::ManualWalk => write!(f, "manual_walk"),
            Self::TagOnly => write!(f, "tag_only"),
        }
    }
}

/// Result of resolving one expression against one document.
///
/// `raw_text == None` means not found, which is distinct from `Some("")`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedValue {
    pub raw_text: Option<String>,
    pub strategy_used: Option<StrategyKind>,
    /// Tag name of the node the text was taken from.
    pub origin_segment: Option<String>,
}

impl ResolvedValue {
    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn is_found(&self) -> bool {
        self.raw_text.is_some()
    }

    fn has_text(&self) -> bool {
        self.raw_text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

/// A node text hit produced by a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    pub text: String,
    pub origin_segment: String,
}

impl Found {
    fn from_node(node: &TreeNode) -> Option<Self> {
        node.text_value().map(|text| Self {
            text,
            origin_segment: node.name.clone(),
        })
    }
}

/// One way of locating a simple path inside a tree.
pub trait ResolveStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// First node (document order) matching `path` with non-blank text.
    fn find(&self, path: &SimplePath, root: &TreeNode) -> Option<Found>;
}

/// One strategy attempt, recorded by [`Resolver::resolve_traced`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub path: String,
    pub strategy: StrategyKind,
    pub hit: bool,
}

pub struct Resolver {
    strategies: Vec<Box<dyn ResolveStrategy>>,
    separator: String,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(DEFAULT_SEPARATOR)
    }
}

impl Resolver {
    /// Resolver with the standard strategy chain: direct descendant, full
    /// path, manual walk, tag only.
    pub fn new(separator: impl Into<String>) -> Self {
        Self::with_strategies(
            vec![
                Box::new(DirectDescendant),
                Box::new(FullPath),
                Box::new(ManualWalk),
                Box::new(TagOnly),
            ],
            separator,
        )
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ResolveStrategy>>, separator: impl Into<String>) -> Self {
        Self {
            strategies,
            separator: separator.into(),
        }
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn strategy_kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    pub fn resolve(&self, expr: &PathExpression, root: &TreeNode) -> ResolvedValue {
        let mut trace = Vec::new();
        self.resolve_inner(expr, root, &mut trace)
    }

    /// Like [`resolve`](Self::resolve), also returning every strategy attempt
    /// in the order it was made.
    pub fn resolve_traced(&self, expr: &PathExpression, root: &TreeNode) -> (ResolvedValue, Vec<Attempt>) {
        let mut trace = Vec::new();
        let value = self.resolve_inner(expr, root, &mut trace);
        (value, trace)
    }

    fn resolve_inner(&self, expr: &PathExpression, root: &TreeNode, trace: &mut Vec<Attempt>) -> ResolvedValue {
        match expr {
            PathExpression::Simple(path) => self.resolve_simple(path, root, trace),
            PathExpression::Concatenation(parts) => {
                let resolved: Vec<ResolvedValue> = parts
                    .iter()
                    .map(|p| self.resolve_inner(p, root, trace))
                    .filter(ResolvedValue::has_text)
                    .collect();
                let Some(first) = resolved.first() else {
                    return ResolvedValue::not_found();
                };

                let texts: Vec<&str> = resolved
                    .iter()
                    .filter_map(|r| r.raw_text.as_deref())
                    .map(str::trim)
                    .collect();
                let origins: Vec<&str> = resolved
                    .iter()
                    .filter_map(|r| r.origin_segment.as_deref())
                    .collect();

                ResolvedValue {
                    raw_text: Some(texts.join(&self.separator)),
                    strategy_used: first.strategy_used,
                    origin_segment: Some(origins.join("+")),
                }
            }
            PathExpression::Alternation(candidates) => candidates
                .iter()
                .map(|c| self.resolve_inner(c, root, trace))
                .find(ResolvedValue::has_text)
                .unwrap_or_default(),
        }
    }

    fn resolve_simple(&self, path: &SimplePath, root: &TreeNode, trace: &mut Vec<Attempt>) -> ResolvedValue {
        for strategy in &self.strategies {
            let found = strategy.find(path, root);
            trace.push(Attempt {
                path: path.to_string(),
                strategy: strategy.kind(),
                hit: found.is_some(),
            });
            if let Some(found) = found {
                return ResolvedValue {
                    raw_text: Some(found.text),
                    strategy_used: Some(strategy.kind()),
                    origin_segment: Some(found.origin_segment),
                };
            }
        }
        ResolvedValue::not_found()
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Descendants of the root named like the last segment. A predicate selects
/// the k-th same-named child of each parent.
pub struct DirectDescendant;

impl ResolveStrategy for DirectDescendant {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DirectDescendant
    }

    fn find(&self, path: &SimplePath, root: &TreeNode) -> Option<Found> {
        let last = path.last();
        root.descendants()
            .filter(|v| v.node.local_name() == last)
            .filter(|v| path.index().map_or(true, |k| v.ordinal == k))
            .find_map(|v| Found::from_node(v.node))
    }
}

/// The whole segment chain as a relative path anchored at any descendant
/// (`.//A/B/C`).
pub struct FullPath;

impl ResolveStrategy for FullPath {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FullPath
    }

    fn find(&self, path: &SimplePath, root: &TreeNode) -> Option<Found> {
        let segments = path.local_segments();
        let (first, rest) = segments.split_first()?;

        for start in root.descendants().filter(|v| v.node.local_name() == *first) {
            if rest.is_empty() && path.index().is_some_and(|k| start.ordinal != k) {
                continue;
            }
            let reached = step_children(vec![start.node], rest, path.index());
            if let Some(found) = reached.into_iter().find_map(Found::from_node) {
                return Some(found);
            }
        }
        None
    }
}

/// Explicit child-by-child walk anchored at the root. The first segment may
/// name the root element itself.
pub struct ManualWalk;

impl ResolveStrategy for ManualWalk {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ManualWalk
    }

    fn find(&self, path: &SimplePath, root: &TreeNode) -> Option<Found> {
        let segments = path.local_segments();
        let first = *segments.first()?;

        let reached = if first == root.local_name() {
            if segments.len() == 1 && path.index().is_some_and(|k| k != 1) {
                return None;
            }
            step_children(vec![root], &segments[1..], path.index())
        } else {
            step_children(vec![root], &segments, path.index())
        };

        reached.into_iter().find_map(Found::from_node)
    }
}

/// Any node in the tree, root included, whose tag equals the last segment.
/// Predicates are ignored.
pub struct TagOnly;

impl ResolveStrategy for TagOnly {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TagOnly
    }

    fn find(&self, path: &SimplePath, root: &TreeNode) -> Option<Found> {
        let last = path.last();
        root.walk()
            .filter(|v| v.node.local_name() == last)
            .find_map(|v| Found::from_node(v.node))
    }
}

/// Descend one segment at a time from `current`, fanning out over duplicate
/// children. `index` applies to the final segment only.
fn step_children<'a>(mut current: Vec<&'a TreeNode>, segments: &[&str], index: Option<usize>) -> Vec<&'a TreeNode> {
    for (i, segment) in segments.iter().enumerate() {
        let is_last = i + 1 == segments.len();
        let mut next = Vec::new();
        for node in current {
            match index.filter(|_| is_last) {
                Some(k) => next.extend(node.nth_child_named(segment, k)),
                None => next.extend(node.children_named(segment)),
            }
        }
        if next.is_empty() {
            return next;
        }
        current = next;
    }
    current
}
