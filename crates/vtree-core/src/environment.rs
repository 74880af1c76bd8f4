use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::classify::HoverTarget;
use crate::config::TreeCapabilities;
use crate::error::{MoveRejection, TreeError};
use crate::flatten::{Expansion, LinearItem};
use crate::provider::{
    DragContext, DraggingPosition, ItemId, MissingItems, Reorder, Subscription, TreeDataProvider,
    apply_provider_drop, dragging_position, linearize_items,
};
use crate::selection::{ClickModifiers, Selection, compute_selection};

/// Per-tree view state: what is open, selected and focused.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub expansion: Expansion,
    pub selection: Selection,
    pub focused: Option<ItemId>,
}

struct TreeEntry {
    root_item: ItemId,
    view: ViewState,
    linear: Option<Vec<LinearItem>>,
}

/// Several trees rendered over one shared item pool.
///
/// Structural changes go through the provider; the environment listens for
/// its change notifications and re-linearizes on the next read.
pub struct TreeEnvironment<T, P> {
    provider: P,
    capabilities: TreeCapabilities,
    trees: HashMap<String, TreeEntry>,
    changed: Rc<RefCell<Vec<ItemId>>>,
    missing: MissingItems,
    _subscription: Subscription,
    _data: PhantomData<T>,
}

impl<T, P: TreeDataProvider<T>> TreeEnvironment<T, P> {
    pub fn new(provider: P, capabilities: TreeCapabilities) -> Self {
        let changed = Rc::new(RefCell::new(Vec::new()));
        let subscription = {
            let changed = changed.clone();
            provider.on_did_change_tree_data(move |ids| {
                changed.borrow_mut().extend(ids.iter().cloned());
            })
        };
        Self {
            provider,
            capabilities,
            trees: HashMap::new(),
            changed,
            missing: MissingItems::new(),
            _subscription: subscription,
            _data: PhantomData,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn capabilities(&self) -> &TreeCapabilities {
        &self.capabilities
    }

    pub fn register_tree(&mut self, tree_id: impl Into<String>, root_item: impl Into<ItemId>) {
        let view = ViewState {
            expansion: if self.capabilities.open_all {
                Expansion::open_all()
            } else {
                Expansion::new()
            },
            ..ViewState::default()
        };
        self.trees.insert(
            tree_id.into(),
            TreeEntry {
                root_item: root_item.into(),
                view,
                linear: None,
            },
        );
    }

    pub fn view_state(&self, tree_id: &str) -> Option<&ViewState> {
        self.trees.get(tree_id).map(|entry| &entry.view)
    }

    pub fn expand(&mut self, tree_id: &str, item: &str) -> Result<bool, TreeError> {
        let entry = self.entry_mut(tree_id)?;
        let changed = entry.view.expansion.expand(item);
        if changed {
            entry.linear = None;
        }
        Ok(changed)
    }

    /// Ignored while `allow_collapse` is off.
    pub fn collapse(&mut self, tree_id: &str, item: &str) -> Result<bool, TreeError> {
        if !self.capabilities.allow_collapse {
            return Ok(false);
        }
        let entry = self.entry_mut(tree_id)?;
        let changed = entry.view.expansion.collapse(item);
        if changed {
            entry.linear = None;
        }
        Ok(changed)
    }

    /// Returns whether `item` is expanded afterwards.
    pub fn toggle(&mut self, tree_id: &str, item: &str) -> Result<bool, TreeError> {
        let expanded = self
            .trees
            .get(tree_id)
            .ok_or_else(|| TreeError::UnknownTree(tree_id.to_string()))?
            .view
            .expansion
            .is_expanded(item);
        if expanded {
            let collapsed = self.collapse(tree_id, item)?;
            Ok(!collapsed)
        } else {
            self.expand(tree_id, item)?;
            Ok(true)
        }
    }

    pub fn select_items(&mut self, tree_id: &str, ids: Vec<ItemId>) -> Result<(), TreeError> {
        let entry = self.entry_mut(tree_id)?;
        let anchor = ids.last().cloned();
        entry.view.selection = Selection::from_ids(ids, anchor.as_deref());
        Ok(())
    }

    pub fn focus_item(&mut self, tree_id: &str, item: &str) -> Result<(), TreeError> {
        self.entry_mut(tree_id)?.view.focused = Some(item.to_string());
        Ok(())
    }

    /// Visible items of `tree_id`, re-linearized if anything changed since the last read.
    pub fn linear_items(&mut self, tree_id: &str) -> Result<&[LinearItem], TreeError> {
        self.apply_changes();
        let provider = &self.provider;
        let missing = &mut self.missing;
        let entry = self
            .trees
            .get_mut(tree_id)
            .ok_or_else(|| TreeError::UnknownTree(tree_id.to_string()))?;

        if entry.linear.is_none() {
            let flat = linearize_items(&entry.root_item, provider.all_data(), &entry.view.expansion)?;
            if !flat.missing.is_empty() && missing.report(flat.missing) {
                tracing::debug!(target: "vtree::environment", tree_id, "scheduling refresh for missing items");
            }
            entry.linear = Some(flat.items);
        }
        Ok(entry.linear.as_deref().unwrap_or_default())
    }

    /// Apply a click to `tree_id`'s selection.
    pub fn click(
        &mut self,
        tree_id: &str,
        item: &str,
        modifiers: ClickModifiers,
    ) -> Result<&Selection, TreeError> {
        let order = self.linear_items(tree_id)?.to_vec();
        let entry = self.entry_mut(tree_id)?;
        entry.view.selection = compute_selection(&entry.view.selection, item, modifiers, &order, &order[..]);
        entry.view.focused = Some(item.to_string());
        Ok(&entry.view.selection)
    }

    /// Turn a classified hover over `tree_id` into a provider drop position.
    pub fn drag_position(
        &mut self,
        tree_id: &str,
        hover: HoverTarget,
        dragged: &[ItemId],
    ) -> Result<Option<DraggingPosition>, TreeError> {
        let linear = self.linear_items(tree_id)?.to_vec();
        let entry = self
            .trees
            .get(tree_id)
            .ok_or_else(|| TreeError::UnknownTree(tree_id.to_string()))?;
        let cx = DragContext {
            tree_id,
            root_item: &entry.root_item,
            items: self.provider.all_data(),
            linear: &linear,
            capabilities: &self.capabilities,
            selection: &entry.view.selection,
            dragged,
        };
        Ok(dragging_position(&cx, hover))
    }

    /// Drop `dragged` at `position` through the provider.
    ///
    /// On success every tree forgets the dropped items from its selection.
    pub async fn drop_items(
        &mut self,
        dragged: &[ItemId],
        position: &DraggingPosition,
    ) -> Result<Vec<Reorder>, MoveRejection> {
        if !self.capabilities.can_drag_and_drop {
            return Err(MoveRejection::Disabled);
        }
        let reorders = apply_provider_drop(&mut self.provider, dragged, position).await?;

        for entry in self.trees.values_mut() {
            entry.view.selection.retain(|id| !dragged.iter().any(|d| d == id));
            entry.linear = None;
        }
        Ok(reorders)
    }

    /// Whether a refresh for missing items is pending.
    pub fn has_missing_items(&self) -> bool {
        self.missing.is_pending()
    }

    /// Flush the batched missing-item report. Caches are rebuilt on the next read.
    pub fn take_missing_items(&mut self) -> Vec<ItemId> {
        for entry in self.trees.values_mut() {
            entry.linear = None;
        }
        self.missing.take()
    }

    fn apply_changes(&mut self) {
        let changed = std::mem::take(&mut *self.changed.borrow_mut());
        if changed.is_empty() {
            return;
        }
        tracing::trace!(target: "vtree::environment", count = changed.len(), "provider reported changes");
        let items = self.provider.all_data();
        for entry in self.trees.values_mut() {
            entry.linear = None;
            entry.view.selection.retain(|id| items.contains_key(id));
        }
    }

    fn entry_mut(&mut self, tree_id: &str) -> Result<&mut TreeEntry, TreeError> {
        self.trees
            .get_mut(tree_id)
            .ok_or_else(|| TreeError::UnknownTree(tree_id.to_string()))
    }
}
