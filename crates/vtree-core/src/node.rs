use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TreeError;

pub type NodeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Folder,
    File,
}

/// One node of a dataset.
///
/// `children` is the owning edge. `parent` is a lookup field kept in sync by
/// [`Forest::new`] and the move engine. Once a node is inside a [`Forest`] only
/// its payload can be reached mutably, through [`Forest::data_mut`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct TreeNode<T> {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub parent: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_parent: Option<NodeId>,
    #[serde(default)]
    pub children: Vec<TreeNode<T>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> TreeNode<T> {
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            parent: None,
            prev_parent: None,
            children: Vec::new(),
            data: None,
        }
    }

    pub fn folder(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeKind::Folder)
    }

    pub fn file(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeKind::File)
    }

    pub fn child(mut self, child: TreeNode<T>) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = TreeNode<T>>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn with_data(mut self, data: T) -> Self {
        self.data = Some(data);
        self
    }

    #[inline]
    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(TreeNode::subtree_len)
            .sum::<usize>()
    }

    pub fn subtree_contains(&self, id: &str) -> bool {
        if self.id == id {
            return true;
        }
        self.children.iter().any(|child| child.subtree_contains(id))
    }

    fn collect_ids(&self, out: &mut Vec<NodeId>) {
        out.push(self.id.clone());
        for child in &self.children {
            child.collect_ids(out);
        }
    }
}

/// The top-level nodes of one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Forest<T> {
    roots: Vec<TreeNode<T>>,
}

impl<T> Default for Forest<T> {
    fn default() -> Self {
        Self { roots: Vec::new() }
    }
}

impl<T> Forest<T> {
    /// Build a forest, rewriting every `parent` field from the owning edges.
    pub fn new(roots: impl Into<Vec<TreeNode<T>>>) -> Self {
        let mut roots = roots.into();
        for root in roots.iter_mut() {
            link_parents(root, None);
        }
        Self { roots }
    }

    pub fn roots(&self) -> &[TreeNode<T>] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.roots.iter().map(TreeNode::subtree_len).sum()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    pub fn find(&self, id: &str) -> Option<&TreeNode<T>> {
        find_in(&self.roots, id)
    }

    pub(crate) fn find_mut(&mut self, id: &str) -> Option<&mut TreeNode<T>> {
        find_in_mut(&mut self.roots, id)
    }

    /// Mutable payload of node `id`. `None` for unknown ids and nodes without data.
    pub fn data_mut(&mut self, id: &str) -> Option<&mut T> {
        self.find_mut(id)?.data.as_mut()
    }

    /// Replace the payload of node `id`, returning the old one.
    /// Hands `data` back as the error when `id` is unknown.
    pub fn set_data(&mut self, id: &str, data: Option<T>) -> Result<Option<T>, Option<T>> {
        match self.find_mut(id) {
            Some(node) => Ok(std::mem::replace(&mut node.data, data)),
            None => Err(data),
        }
    }

    /// Every node in pre-order.
    pub fn iter(&self) -> impl Iterator<Item = &TreeNode<T>> + '_ {
        let mut stack: Vec<&TreeNode<T>> = self.roots.iter().rev().collect();
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.find(id).and_then(|node| node.parent.as_deref())
    }

    /// Ancestor ids of `id`, nearest first. Empty for top-level or unknown nodes.
    pub fn ancestors(&self, id: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            // A corrupted parent chain must not spin forever.
            if out.iter().any(|seen: &NodeId| seen == parent) {
                break;
            }
            out.push(parent.to_string());
            current = self.parent_of(parent);
        }
        out
    }

    /// Whether `id` sits strictly below `ancestor_id`.
    pub fn is_descendant_of(&self, id: &str, ancestor_id: &str) -> bool {
        self.ancestors(id).iter().any(|a| a == ancestor_id)
    }

    /// Parent id and child index of `id`.
    pub fn position_of(&self, id: &str) -> Option<(Option<NodeId>, usize)> {
        position_in(&self.roots, id, None)
    }

    /// Pre-order ids of the subtree rooted at `id` (including `id`).
    pub fn subtree_ids(&self, id: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(node) = self.find(id) {
            node.collect_ids(&mut out);
        }
        out
    }

    /// Pre-order ids of every node.
    pub fn all_ids(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for root in &self.roots {
            root.collect_ids(&mut out);
        }
        out
    }

    /// Apply `name` to node `id`. Returns the previous name when something changed.
    pub fn rename(&mut self, id: &str, name: impl Into<String>) -> Option<String> {
        let name = name.into();
        let node = self.find_mut(id)?;
        if node.name == name {
            return None;
        }
        Some(std::mem::replace(&mut node.name, name))
    }

    /// Check id uniqueness and that every `parent` field matches its owning edge.
    pub fn validate(&self) -> Result<(), TreeError> {
        let mut seen = HashSet::new();
        for root in &self.roots {
            validate_node(root, None, &mut seen)?;
        }
        Ok(())
    }

    /// Indented outline of ids, one node per line.
    pub fn dump(&self) -> String {
        fn walk<T>(nodes: &[TreeNode<T>], depth: usize, out: &mut String) {
            for node in nodes {
                out.push_str(&"  ".repeat(depth));
                out.push_str(&node.id);
                out.push('\n');
                walk(&node.children, depth + 1, out);
            }
        }

        let mut out = String::new();
        walk(&self.roots, 0, &mut out);
        out
    }

    /// Children of `parent_id`, or the top-level nodes for `None`.
    pub fn children_of(&self, parent_id: Option<&str>) -> Option<&[TreeNode<T>]> {
        match parent_id {
            None => Some(&self.roots),
            Some(id) => self.find(id).map(|node| node.children.as_slice()),
        }
    }

    pub(crate) fn siblings_mut(&mut self, parent_id: Option<&str>) -> Option<&mut Vec<TreeNode<T>>> {
        match parent_id {
            None => Some(&mut self.roots),
            Some(id) => self.find_mut(id).map(|node| &mut node.children),
        }
    }

    pub(crate) fn detach(&mut self, id: &str) -> Option<Detached<T>> {
        detach_in(&mut self.roots, id, None)
    }

    /// Insert `node` under `parent_id` (or at top level) at `index`, clamped.
    /// Hands the node back when the parent does not exist.
    pub(crate) fn insert(
        &mut self,
        parent_id: Option<&str>,
        index: usize,
        node: TreeNode<T>,
    ) -> Result<(), TreeNode<T>> {
        let Some(siblings) = self.siblings_mut(parent_id) else {
            return Err(node);
        };
        let ix = index.min(siblings.len());
        siblings.insert(ix, node);
        Ok(())
    }

    /// Put detached nodes back where they came from. Expects them in detach order.
    pub(crate) fn restore(&mut self, detached: Vec<Detached<T>>) {
        for Detached {
            node,
            parent_id,
            index,
        } in detached.into_iter().rev()
        {
            if let Err(node) = self.insert(parent_id.as_deref(), index, node) {
                tracing::error!(
                    target: "vtree::node",
                    id = %node.id,
                    parent = ?parent_id,
                    "lost a node while restoring a failed move"
                );
            }
        }
    }
}

impl<T: Serialize> Serialize for Forest<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.roots.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Forest<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<TreeNode<T>>::deserialize(deserializer).map(Forest::new)
    }
}

/// A node spliced out of its parent, with enough context to put it back.
#[derive(Debug, Clone)]
pub struct Detached<T> {
    pub node: TreeNode<T>,
    pub parent_id: Option<NodeId>,
    pub index: usize,
}

fn link_parents<T>(node: &mut TreeNode<T>, parent: Option<&str>) {
    node.parent = parent.map(str::to_string);
    let id = node.id.clone();
    for child in node.children.iter_mut() {
        link_parents(child, Some(&id));
    }
}

fn validate_node<T>(
    node: &TreeNode<T>,
    parent: Option<&str>,
    seen: &mut HashSet<NodeId>,
) -> Result<(), TreeError> {
    if !seen.insert(node.id.clone()) {
        return Err(TreeError::DuplicateId(node.id.clone()));
    }
    if node.parent.as_deref() != parent {
        return Err(TreeError::ParentMismatch {
            id: node.id.clone(),
            expected: parent.map(str::to_string),
            found: node.parent.clone(),
        });
    }
    for child in &node.children {
        validate_node(child, Some(&node.id), seen)?;
    }
    Ok(())
}

fn find_in<'a, T>(nodes: &'a [TreeNode<T>], id: &str) -> Option<&'a TreeNode<T>> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_in(&node.children, id) {
            return Some(found);
        }
    }
    None
}

fn find_in_mut<'a, T>(nodes: &'a mut [TreeNode<T>], id: &str) -> Option<&'a mut TreeNode<T>> {
    for node in nodes.iter_mut() {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_in_mut(&mut node.children, id) {
            return Some(found);
        }
    }
    None
}

fn position_in<T>(
    nodes: &[TreeNode<T>],
    id: &str,
    parent_id: Option<&str>,
) -> Option<(Option<NodeId>, usize)> {
    for (index, node) in nodes.iter().enumerate() {
        if node.id == id {
            return Some((parent_id.map(str::to_string), index));
        }
        if let Some(found) = position_in(&node.children, id, Some(&node.id)) {
            return Some(found);
        }
    }
    None
}

fn detach_in<T>(
    nodes: &mut Vec<TreeNode<T>>,
    id: &str,
    parent_id: Option<&str>,
) -> Option<Detached<T>> {
    if let Some(index) = nodes.iter().position(|node| node.id == id) {
        let node = nodes.remove(index);
        return Some(Detached {
            node,
            parent_id: parent_id.map(str::to_string),
            index,
        });
    }

    for node in nodes.iter_mut() {
        let parent_id = node.id.clone();
        if let Some(detached) = detach_in(&mut node.children, id, Some(&parent_id)) {
            return Some(detached);
        }
    }

    None
}
