use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::node::{Forest, NodeId, TreeNode};

/// Which containers are currently open.
///
/// `open_all` is only the starting point: folders collapsed afterwards stay
/// closed until they are expanded again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expansion {
    #[serde(default)]
    expanded: HashSet<NodeId>,
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    collapsed: HashSet<NodeId>,
    /// When set, every container not explicitly collapsed is expanded.
    #[serde(default)]
    pub open_all: bool,
}

impl Expansion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_all() -> Self {
        Self {
            open_all: true,
            ..Self::default()
        }
    }

    pub fn with_expanded<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        Self {
            expanded: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        !self.collapsed.contains(id) && (self.open_all || self.expanded.contains(id))
    }

    /// Returns whether `id` was closed before.
    pub fn expand(&mut self, id: impl Into<NodeId>) -> bool {
        let id = id.into();
        let was_expanded = self.is_expanded(&id);
        self.collapsed.remove(&id);
        self.expanded.insert(id);
        !was_expanded
    }

    /// Returns whether `id` was open before.
    pub fn collapse(&mut self, id: &str) -> bool {
        let was_expanded = self.is_expanded(id);
        self.expanded.remove(id);
        if self.open_all {
            self.collapsed.insert(id.to_string());
        }
        was_expanded
    }

    /// Flip the state of `id`. Returns the new state.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.is_expanded(id) {
            self.collapse(id);
            false
        } else {
            self.expand(id);
            true
        }
    }

    /// Explicitly expanded ids. Folders open only through `open_all` are not listed.
    pub fn expanded_ids(&self) -> impl Iterator<Item = &str> {
        self.expanded.iter().map(String::as_str)
    }
}

/// A visible node and its depth, borrowed from the forest.
#[derive(Debug)]
pub struct FlatItem<'a, T> {
    pub node: &'a TreeNode<T>,
    pub depth: usize,
}

impl<T> Clone for FlatItem<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FlatItem<'_, T> {}

/// Lazy pre-order walk over the visible nodes of a forest.
///
/// Cheap to create, so callers regenerate it whenever the tree or the
/// expansion changes instead of patching a previous result.
pub struct Flatten<'a, T> {
    stack: Vec<(std::slice::Iter<'a, TreeNode<T>>, usize)>,
    expansion: &'a Expansion,
}

impl<'a, T> Iterator for Flatten<'a, T> {
    type Item = FlatItem<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (iter, depth) = self.stack.last_mut()?;
            let depth = *depth;
            let Some(node) = iter.next() else {
                self.stack.pop();
                continue;
            };

            if node.is_folder() && self.expansion.is_expanded(&node.id) {
                self.stack.push((node.children.iter(), depth + 1));
            }
            return Some(FlatItem { node, depth });
        }
    }
}

pub fn flatten<'a, T>(roots: &'a [TreeNode<T>], expansion: &'a Expansion) -> Flatten<'a, T> {
    Flatten {
        stack: vec![(roots.iter(), 0)],
        expansion,
    }
}

/// An owned row of the linearized tree, detached from the forest's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearItem {
    pub id: NodeId,
    pub depth: usize,
    pub parent_id: Option<NodeId>,
    pub is_folder: bool,
    pub is_expanded: bool,
}

pub fn linearize<T>(forest: &Forest<T>, expansion: &Expansion) -> Vec<LinearItem> {
    flatten(forest.roots(), expansion)
        .map(|item| LinearItem {
            id: item.node.id.clone(),
            depth: item.depth,
            parent_id: item.node.parent.clone(),
            is_folder: item.node.is_folder(),
            is_expanded: item.node.is_folder() && expansion.is_expanded(&item.node.id),
        })
        .collect()
}

pub fn index_of(items: &[LinearItem], id: &str) -> Option<usize> {
    items.iter().position(|item| item.id == id)
}

/// One past the last row belonging to the subtree that starts at `start_ix`.
pub fn subtree_end(items: &[LinearItem], start_ix: usize) -> usize {
    let Some(start) = items.get(start_ix) else {
        return items.len();
    };
    let mut ix = start_ix + 1;
    while ix < items.len() && items[ix].depth > start.depth {
        ix += 1;
    }
    ix
}

/// Rows a windowed renderer should mount for `start..start + count`.
pub fn visible_slice<I>(items: &[I], start: usize, count: usize) -> &[I] {
    let start = start.min(items.len());
    let end = start.saturating_add(count).min(items.len());
    &items[start..end]
}
