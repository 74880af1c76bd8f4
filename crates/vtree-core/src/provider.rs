use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::classify::{DropPosition, HoverTarget};
use crate::config::TreeCapabilities;
use crate::error::{MoveRejection, TreeError};
use crate::flatten::{Expansion, LinearItem};
use crate::selection::{ParentLookup, Selection};

pub type ItemId = String;

/// Flat item records keyed by id. Structure lives in each item's `children` list.
pub type Items<T> = HashMap<ItemId, TreeItem<T>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeItem<T> {
    pub index: ItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ItemId>>,
    #[serde(default)]
    pub has_children: bool,
    #[serde(default = "can_move_default")]
    pub can_move: bool,
    pub data: T,
}

fn can_move_default() -> bool {
    true
}

impl<T> TreeItem<T> {
    pub fn new(index: impl Into<ItemId>, data: T) -> Self {
        Self {
            index: index.into(),
            children: None,
            has_children: false,
            can_move: true,
            data,
        }
    }

    /// Make this a container holding `children`.
    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ItemId>,
    {
        self.children = Some(children.into_iter().map(Into::into).collect());
        self.has_children = true;
        self
    }

    pub fn immovable(mut self) -> Self {
        self.can_move = false;
        self
    }
}

impl<T> ParentLookup for Items<T> {
    fn parent_of(&self, id: &str) -> Option<&str> {
        self.values()
            .find(|item| {
                item.children
                    .as_ref()
                    .is_some_and(|children| children.iter().any(|child| child == id))
            })
            .map(|item| item.index.as_str())
    }
}

type Listener = Rc<dyn Fn(&[ItemId])>;

#[derive(Default)]
struct Listeners {
    next_id: usize,
    entries: Vec<(usize, Listener)>,
}

/// Change listeners of a provider.
#[derive(Clone, Default)]
pub struct ChangeEmitter {
    listeners: Rc<RefCell<Listeners>>,
}

impl ChangeEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn(&[ItemId]) + 'static) -> Subscription {
        let mut listeners = self.listeners.borrow_mut();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Rc::new(listener)));
        Subscription {
            listeners: Rc::downgrade(&self.listeners),
            id,
        }
    }

    pub fn emit(&self, changed: &[ItemId]) {
        // Listeners may subscribe or unsubscribe while being called.
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(changed);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().entries.len()
    }
}

/// Keeps a change listener registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    listeners: Weak<RefCell<Listeners>>,
    id: usize,
}

impl Subscription {
    /// A handle for providers that never report changes.
    pub fn detached() -> Self {
        Self {
            listeners: Weak::new(),
            id: 0,
        }
    }

    pub fn dispose(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .borrow_mut()
                .entries
                .retain(|(id, _)| *id != self.id);
        }
    }
}

/// Index-based data source.
///
/// Only `all_data` is required. A provider that cannot change children keeps
/// the default no-op, and one without notifications hands out detached
/// subscriptions.
#[allow(async_fn_in_trait)]
pub trait TreeDataProvider<T> {
    fn all_data(&self) -> &Items<T>;

    async fn change_item_children(&mut self, _item: &str, _children: Vec<ItemId>) {}

    fn on_did_change_tree_data(&self, _listener: impl Fn(&[ItemId]) + 'static) -> Subscription {
        Subscription::detached()
    }
}

/// In-memory provider. Every children change is reported to listeners.
pub struct StaticTreeDataProvider<T> {
    items: Items<T>,
    emitter: ChangeEmitter,
}

impl<T> StaticTreeDataProvider<T> {
    pub fn new(items: impl IntoIterator<Item = TreeItem<T>>) -> Self {
        Self {
            items: items
                .into_iter()
                .map(|item| (item.index.clone(), item))
                .collect(),
            emitter: ChangeEmitter::new(),
        }
    }

    pub fn item(&self, id: &str) -> Option<&TreeItem<T>> {
        self.items.get(id)
    }

    pub fn insert(&mut self, item: TreeItem<T>) {
        let id = item.index.clone();
        self.items.insert(id.clone(), item);
        self.emitter.emit(&[id]);
    }
}

impl<T> TreeDataProvider<T> for StaticTreeDataProvider<T> {
    fn all_data(&self) -> &Items<T> {
        &self.items
    }

    async fn change_item_children(&mut self, item: &str, children: Vec<ItemId>) {
        let Some(entry) = self.items.get_mut(item) else {
            tracing::trace!(target: "vtree::provider", item, "children change for unknown item ignored");
            return;
        };
        entry.children = Some(children);
        self.emitter.emit(&[item.to_string()]);
    }

    fn on_did_change_tree_data(&self, listener: impl Fn(&[ItemId]) + 'static) -> Subscription {
        self.emitter.subscribe(listener)
    }
}

/// Result of linearizing a provider-backed tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Linearized {
    pub items: Vec<LinearItem>,
    /// Child ids referenced by some item but absent from the data.
    pub missing: Vec<ItemId>,
}

/// Pre-order walk of the visible items under `root`.
///
/// The root itself is not part of the output. A root without a children list
/// cannot be rendered and is reported as an error.
pub fn linearize_items<T>(
    root: &str,
    items: &Items<T>,
    expansion: &Expansion,
) -> Result<Linearized, TreeError> {
    let Some(root_item) = items.get(root) else {
        tracing::error!(target: "vtree::provider", root, "root item missing from data source");
        return Err(TreeError::MissingRoot(root.to_string()));
    };
    let Some(children) = root_item.children.as_ref() else {
        tracing::error!(target: "vtree::provider", root, "root item has no children list");
        return Err(TreeError::RootWithoutChildren(root.to_string()));
    };

    let mut out = Linearized::default();
    let mut visited = HashSet::from([root.to_string()]);
    walk_items(items, root, children, 0, expansion, &mut visited, &mut out);
    Ok(out)
}

fn walk_items<T>(
    items: &Items<T>,
    parent: &str,
    children: &[ItemId],
    depth: usize,
    expansion: &Expansion,
    visited: &mut HashSet<ItemId>,
    out: &mut Linearized,
) {
    for child_id in children {
        let Some(child) = items.get(child_id) else {
            if !out.missing.contains(child_id) {
                out.missing.push(child_id.clone());
            }
            continue;
        };
        if !visited.insert(child_id.clone()) {
            tracing::warn!(target: "vtree::provider", id = %child_id, "item reachable twice, skipping");
            continue;
        }

        let is_expanded = child.has_children && expansion.is_expanded(child_id);
        out.items.push(LinearItem {
            id: child_id.clone(),
            depth,
            parent_id: Some(parent.to_string()),
            is_folder: child.has_children,
            is_expanded,
        });
        if let (true, Some(grandchildren)) = (is_expanded, child.children.as_ref()) {
            walk_items(items, child_id, grandchildren, depth + 1, expansion, visited, out);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinePosition {
    Top,
    Bottom,
}

/// A drop location in a provider-backed tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraggingPosition {
    /// Onto an item, making the dragged items its children.
    Item {
        tree_id: String,
        parent_item: ItemId,
        target_item: ItemId,
        depth: usize,
        linear_index: usize,
    },
    /// Between two rows, inserting under `parent_item` at `child_index`.
    BetweenItems {
        tree_id: String,
        parent_item: ItemId,
        depth: usize,
        linear_index: usize,
        child_index: usize,
        line: LinePosition,
    },
}

impl DraggingPosition {
    pub fn tree_id(&self) -> &str {
        match self {
            DraggingPosition::Item { tree_id, .. } | DraggingPosition::BetweenItems { tree_id, .. } => {
                tree_id
            }
        }
    }

    pub fn parent_item(&self) -> &str {
        match self {
            DraggingPosition::Item { parent_item, .. }
            | DraggingPosition::BetweenItems { parent_item, .. } => parent_item,
        }
    }
}

/// Inputs for turning a classified hover into a [`DraggingPosition`].
pub struct DragContext<'a, T> {
    pub tree_id: &'a str,
    pub root_item: &'a str,
    pub items: &'a Items<T>,
    pub linear: &'a [LinearItem],
    pub capabilities: &'a TreeCapabilities,
    pub selection: &'a Selection,
    pub dragged: &'a [ItemId],
}

/// Apply the container-level drop rules to a classified hover.
pub fn dragging_position<T>(cx: &DragContext<'_, T>, hover: HoverTarget) -> Option<DraggingPosition> {
    let caps = cx.capabilities;
    if !caps.can_drag_and_drop {
        return None;
    }

    let index = hover.index;
    let target = cx.linear.get(index)?;
    let target_data = cx.items.get(&target.id)?;

    if hover.position == DropPosition::Child && !caps.accepts_child_drop(target_data.has_children) {
        return None;
    }
    if hover.position.is_reorder() && !caps.can_reorder_items {
        return None;
    }

    let parent = cx.linear[..index]
        .iter()
        .rev()
        .find(|item| item.depth < target.depth)
        .map(|item| item.id.as_str())
        .unwrap_or(cx.root_item);
    if parent == cx.root_item && !caps.can_drag_on_root {
        return None;
    }
    if cx.selection.contains(&target.id) {
        return None;
    }

    let dragged: HashSet<&str> = cx.dragged.iter().map(String::as_str).collect();
    if dragged.contains(parent)
        || dragged.contains(target.id.as_str())
        || cx.linear.has_ancestor_in(&target.id, &dragged)
    {
        return None;
    }

    let position = match hover.position {
        DropPosition::Child => DraggingPosition::Item {
            tree_id: cx.tree_id.to_string(),
            parent_item: parent.to_string(),
            target_item: target.id.clone(),
            depth: target.depth,
            linear_index: index,
        },
        DropPosition::Above | DropPosition::Below => {
            let siblings = cx.items.get(parent)?.children.as_ref()?;
            let offset = usize::from(hover.position == DropPosition::Below);
            let child_index = siblings.iter().position(|id| *id == target.id)? + offset;

            // A top line directly under a sibling row is drawn as that row's bottom line.
            let line = match hover.position {
                DropPosition::Above
                    if index > 0 && cx.linear[index - 1].depth == target.depth =>
                {
                    LinePosition::Bottom
                }
                DropPosition::Above => LinePosition::Top,
                _ => LinePosition::Bottom,
            };

            DraggingPosition::BetweenItems {
                tree_id: cx.tree_id.to_string(),
                parent_item: parent.to_string(),
                depth: target.depth,
                linear_index: index + offset,
                child_index,
                line,
            }
        }
    };
    Some(position)
}

/// A between-items drop, as reported to the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reorder {
    pub source_id: ItemId,
    pub target_id: ItemId,
    pub item_id: ItemId,
    pub new_index: usize,
}

/// Perform a drop through the provider's `change_item_children`.
///
/// Every item is checked before the first call. Each structural change is
/// awaited before the next one is issued: removal from the old parent
/// completes before the insertion into the new one.
pub async fn apply_provider_drop<T, P>(
    provider: &mut P,
    dragged: &[ItemId],
    position: &DraggingPosition,
) -> Result<Vec<Reorder>, MoveRejection>
where
    P: TreeDataProvider<T>,
{
    validate_provider_drop(provider.all_data(), dragged, position)?;

    let mut reorders = Vec::new();
    let mut cursor = match position {
        DraggingPosition::BetweenItems { child_index, .. } => *child_index,
        DraggingPosition::Item { .. } => 0,
    };

    for item_id in dragged {
        let items = provider.all_data();
        let Some(old_parent) = items.parent_of(item_id).map(str::to_string) else {
            return Err(MoveRejection::MissingNodes(vec![item_id.clone()]));
        };
        let old_siblings = children_of(items, &old_parent);

        match position {
            DraggingPosition::Item { target_item, .. } => {
                if *target_item == old_parent {
                    continue;
                }
                let mut new_children = children_of(items, target_item);
                new_children.push(item_id.clone());
                let without = without(&old_siblings, item_id);

                provider.change_item_children(&old_parent, without).await;
                provider.change_item_children(target_item, new_children).await;
            }
            DraggingPosition::BetweenItems { parent_item, .. } => {
                let target_siblings = children_of(items, parent_item);
                let mut new_children = without(&target_siblings, item_id);

                let new_index = if *parent_item == old_parent {
                    let old_index = target_siblings.iter().position(|id| id == item_id);
                    let prior = old_index.is_some_and(|ix| ix < cursor);
                    let ix = (cursor - usize::from(prior)).min(new_children.len());
                    new_children.insert(ix, item_id.clone());
                    provider.change_item_children(parent_item, new_children).await;
                    ix
                } else {
                    let ix = cursor.min(new_children.len());
                    new_children.insert(ix, item_id.clone());
                    provider
                        .change_item_children(&old_parent, without(&old_siblings, item_id))
                        .await;
                    provider.change_item_children(parent_item, new_children).await;
                    ix
                };
                cursor = new_index + 1;

                reorders.push(Reorder {
                    source_id: old_parent,
                    target_id: parent_item.clone(),
                    item_id: item_id.clone(),
                    new_index,
                });
            }
        }
    }

    Ok(reorders)
}

fn validate_provider_drop<T>(
    items: &Items<T>,
    dragged: &[ItemId],
    position: &DraggingPosition,
) -> Result<(), MoveRejection> {
    if dragged.is_empty() {
        return Err(MoveRejection::NothingToMove);
    }

    let missing: Vec<ItemId> = dragged
        .iter()
        .filter(|id| !items.contains_key(id.as_str()) || items.parent_of(id).is_none())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(MoveRejection::MissingNodes(missing));
    }
    if dragged.iter().any(|id| items.get(id).is_some_and(|item| !item.can_move)) {
        return Err(MoveRejection::Vetoed);
    }

    let destination = match position {
        DraggingPosition::Item { target_item, .. } => target_item.as_str(),
        DraggingPosition::BetweenItems { parent_item, .. } => parent_item.as_str(),
    };
    let Some(destination_item) = items.get(destination) else {
        return Err(MoveRejection::MissingNodes(vec![destination.to_string()]));
    };
    let set: HashSet<&str> = dragged.iter().map(String::as_str).collect();
    if set.contains(destination) {
        return Err(MoveRejection::DropOnSelf);
    }
    if items.has_ancestor_in(destination, &set) {
        return Err(MoveRejection::WouldCreateCycle {
            target: destination.to_string(),
        });
    }
    if matches!(position, DraggingPosition::BetweenItems { .. })
        && destination_item.children.is_none()
    {
        return Err(MoveRejection::TargetNotContainer {
            target: destination.to_string(),
        });
    }
    Ok(())
}

fn children_of<T>(items: &Items<T>, id: &str) -> Vec<ItemId> {
    items
        .get(id)
        .and_then(|item| item.children.clone())
        .unwrap_or_default()
}

fn without(children: &[ItemId], id: &str) -> Vec<ItemId> {
    children.iter().filter(|child| *child != id).cloned().collect()
}

/// Coalesces missing-item reports until the host flushes them.
#[derive(Debug, Default)]
pub struct MissingItems {
    pending: Vec<ItemId>,
}

impl MissingItems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `ids`. Returns `true` when this is the first report since the
    /// last flush, meaning the caller should schedule one refresh.
    pub fn report<I, S>(&mut self, ids: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<ItemId>,
    {
        let was_idle = self.pending.is_empty();
        for id in ids {
            let id = id.into();
            if !self.pending.contains(&id) {
                self.pending.push(id);
            }
        }
        let schedule = was_idle && !self.pending.is_empty();
        tracing::trace!(target: "vtree::provider", pending = self.pending.len(), schedule, "missing items reported");
        schedule
    }

    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn take(&mut self) -> Vec<ItemId> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn provider() -> StaticTreeDataProvider<&'static str> {
        StaticTreeDataProvider::new([
            TreeItem::new("root", "Root").with_children(["a", "b"]),
            TreeItem::new("a", "A").with_children(["a1"]),
            TreeItem::new("a1", "A1"),
            TreeItem::new("b", "B"),
        ])
    }

    #[test]
    fn subscription_drop_unsubscribes() {
        let mut provider = provider();
        let hits = Rc::new(Cell::new(0));
        let sub = {
            let hits = hits.clone();
            provider.on_did_change_tree_data(move |ids| {
                assert_eq!(ids, ["root"]);
                hits.set(hits.get() + 1);
            })
        };

        pollster::block_on(provider.change_item_children("root", vec!["b".into(), "a".into()]));
        assert_eq!(hits.get(), 1);

        drop(sub);
        pollster::block_on(provider.change_item_children("root", vec!["a".into(), "b".into()]));
        assert_eq!(hits.get(), 1);
        assert_eq!(provider.emitter.listener_count(), 0);
    }

    #[test]
    fn linearize_honours_expansion_and_reports_missing() {
        let mut items = provider().all_data().clone();
        items.get_mut("a").unwrap().children = Some(vec!["a1".into(), "ghost".into()]);

        let flat = linearize_items("root", &items, &Expansion::new()).unwrap();
        let ids: Vec<_> = flat.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert!(flat.missing.is_empty());

        let flat = linearize_items("root", &items, &Expansion::with_expanded(["a"])).unwrap();
        let ids: Vec<_> = flat.items.iter().map(|i| (i.id.as_str(), i.depth)).collect();
        assert_eq!(ids, [("a", 0), ("a1", 1), ("b", 0)]);
        assert_eq!(flat.missing, ["ghost"]);
    }

    #[test]
    fn root_without_children_is_fatal() {
        let items: Items<()> = [("root".to_string(), TreeItem::new("root", ()))].into();
        assert_eq!(
            linearize_items("root", &items, &Expansion::new()),
            Err(TreeError::RootWithoutChildren("root".into()))
        );
        assert_eq!(
            linearize_items("nope", &items, &Expansion::new()),
            Err(TreeError::MissingRoot("nope".into()))
        );
    }

    #[test]
    fn missing_items_are_batched() {
        let mut missing = MissingItems::new();
        assert!(missing.report(["x"]));
        assert!(!missing.report(["y", "x"]));
        assert_eq!(missing.take(), ["x", "y"]);
        assert!(!missing.report(Vec::<ItemId>::new()));
        assert!(missing.report(["z"]));
    }
}
