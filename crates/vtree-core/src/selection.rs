use std::collections::{HashMap, HashSet};

use crate::flatten::LinearItem;
use crate::node::{Forest, NodeId};

/// Parent lookup used to reason about ancestor chains.
pub trait ParentLookup {
    fn parent_of(&self, id: &str) -> Option<&str>;

    /// Whether `id` sits strictly below any member of `set`.
    ///
    /// Walks the full chain. A chain that loops back on itself ends the walk.
    fn has_ancestor_in(&self, id: &str, set: &HashSet<&str>) -> bool {
        let mut visited = HashSet::new();
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            if set.contains(parent) {
                return true;
            }
            if !visited.insert(parent) {
                tracing::warn!(target: "vtree::selection", id, parent, "parent chain loops");
                return false;
            }
            current = self.parent_of(parent);
        }
        false
    }
}

impl<T> ParentLookup for Forest<T> {
    fn parent_of(&self, id: &str) -> Option<&str> {
        Forest::parent_of(self, id)
    }
}

impl ParentLookup for [LinearItem] {
    fn parent_of(&self, id: &str) -> Option<&str> {
        self.iter()
            .find(|item| item.id == id)
            .and_then(|item| item.parent_id.as_deref())
    }
}

/// Parent of every known node, hashed once.
///
/// Ancestor walks over an index cost their depth, not a scan per step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentIndex {
    parents: HashMap<NodeId, Option<NodeId>>,
}

impl ParentIndex {
    pub fn from_forest<T>(forest: &Forest<T>) -> Self {
        Self {
            parents: forest
                .iter()
                .map(|node| (node.id.clone(), node.parent.clone()))
                .collect(),
        }
    }

    pub fn from_items(items: &[LinearItem]) -> Self {
        Self {
            parents: items
                .iter()
                .map(|item| (item.id.clone(), item.parent_id.clone()))
                .collect(),
        }
    }

    pub fn insert(&mut self, id: impl Into<NodeId>, parent: Option<NodeId>) {
        self.parents.insert(id.into(), parent);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.parents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

impl ParentLookup for ParentIndex {
    fn parent_of(&self, id: &str) -> Option<&str> {
        self.parents.get(id)?.as_deref()
    }
}

/// Index over the visible rows, falling back to a slower lookup for hidden ones.
struct IndexedLookup<'a, L: ?Sized> {
    index: ParentIndex,
    fallback: &'a L,
}

impl<L: ParentLookup + ?Sized> ParentLookup for IndexedLookup<'_, L> {
    fn parent_of(&self, id: &str) -> Option<&str> {
        match self.index.parents.get(id) {
            Some(parent) => parent.as_deref(),
            None => self.fallback.parent_of(id),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClickModifiers {
    pub shift: bool,
    /// Ctrl, or Cmd on macOS.
    pub toggle: bool,
}

impl ClickModifiers {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn toggle() -> Self {
        Self {
            shift: false,
            toggle: true,
        }
    }

    pub fn shift() -> Self {
        Self {
            shift: true,
            toggle: false,
        }
    }
}

/// Selected node ids plus the anchor used for shift-ranges.
///
/// Membership order is kept for stable iteration, but equality ignores it.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    ids: Vec<NodeId>,
    members: HashSet<NodeId>,
    anchor: Option<NodeId>,
}

impl PartialEq for Selection {
    fn eq(&self, other: &Self) -> bool {
        self.anchor == other.anchor && self.members == other.members
    }
}

impl Eq for Selection {}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(id: impl Into<NodeId>) -> Self {
        let mut selection = Self::new();
        let id = id.into();
        selection.anchor = Some(id.clone());
        selection.insert(id);
        selection
    }

    pub fn from_ids<I, S>(ids: I, anchor: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        let mut selection = Self {
            anchor: anchor.map(str::to_string),
            ..Self::default()
        };
        for id in ids {
            selection.insert(id.into());
        }
        selection
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }

    pub fn anchor(&self) -> Option<&str> {
        self.anchor.as_deref()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.members.clear();
        self.anchor = None;
    }

    /// Drop ids that no longer resolve, e.g. after a provider refresh.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        let members = &mut self.members;
        self.ids.retain(|id| {
            let kept = keep(id);
            if !kept {
                members.remove(id);
            }
            kept
        });
        if self.anchor.as_deref().is_some_and(|anchor| !keep(anchor)) {
            self.anchor = None;
        }
    }

    fn insert(&mut self, id: NodeId) {
        if self.members.insert(id.clone()) {
            self.ids.push(id);
        }
    }

    fn remove(&mut self, id: &str) {
        if self.members.remove(id) {
            self.ids.retain(|selected| selected != id);
        }
    }

    fn strip_nested(&mut self, lookup: &(impl ParentLookup + ?Sized)) {
        let nested: Vec<NodeId> = {
            let set: HashSet<&str> = self.ids.iter().map(String::as_str).collect();
            self.ids
                .iter()
                .filter(|id| lookup.has_ancestor_in(id, &set))
                .cloned()
                .collect()
        };
        if nested.is_empty() {
            return;
        }
        for id in &nested {
            self.members.remove(id);
        }
        let members = &self.members;
        self.ids.retain(|id| members.contains(id));
    }
}

/// Next selection after clicking `clicked` with `modifiers`.
///
/// `order` is the current linearized tree; it fixes the extent of shift-ranges.
/// Parents of rows in `order` are read from it directly, `lookup` only
/// answers for selected nodes that are currently hidden.
pub fn compute_selection(
    current: &Selection,
    clicked: &str,
    modifiers: ClickModifiers,
    order: &[LinearItem],
    lookup: &(impl ParentLookup + ?Sized),
) -> Selection {
    if !modifiers.toggle && !modifiers.shift {
        return Selection::single(clicked);
    }

    let lookup = IndexedLookup {
        index: ParentIndex::from_items(order),
        fallback: lookup,
    };

    if modifiers.toggle {
        let mut next = current.clone();
        if next.contains(clicked) {
            next.remove(clicked);
        } else {
            next.insert(clicked.to_string());
            next.strip_nested(&lookup);
        }
        return next;
    }

    let Some(anchor) = current.anchor() else {
        return current.clone();
    };
    if lookup.parent_of(anchor) != lookup.parent_of(clicked) {
        return current.clone();
    }
    let (Some(anchor_ix), Some(clicked_ix)) = (
        order.iter().position(|item| item.id == anchor),
        order.iter().position(|item| item.id == clicked),
    ) else {
        return current.clone();
    };

    let (start, end) = if anchor_ix <= clicked_ix {
        (anchor_ix, clicked_ix)
    } else {
        (clicked_ix, anchor_ix)
    };

    let mut next = current.clone();
    for item in &order[start..=end] {
        next.insert(item.id.clone());
    }
    next.strip_nested(&lookup);
    next
}

/// Whether any two ids of `selection` stand in an ancestor/descendant relation.
///
/// Pass a [`ParentIndex`] for large selections over a [`Forest`].
pub fn has_nested_members(selection: &Selection, lookup: &(impl ParentLookup + ?Sized)) -> bool {
    let set: HashSet<&str> = selection.ids.iter().map(String::as_str).collect();
    selection
        .ids
        .iter()
        .any(|id| lookup.has_ancestor_in(id, &set))
}
