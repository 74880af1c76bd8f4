use std::collections::HashSet;

use crate::classify::{DropPosition, DropTarget, HoverKey, HoverTracker, resolve_hover};
use crate::config::TreeCapabilities;
use crate::error::MoveRejection;
use crate::flatten::LinearItem;
use crate::layout::RowLayout;
use crate::moves::{CrossMove, DropPolicy, MoveOutcome, move_nodes, move_to_root};
use crate::node::{Forest, NodeId, TreeNode};
use crate::selection::{ParentLookup, Selection};

/// What is being dragged and where it came from. Captured once at drag start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragPayload {
    pub node_ids: Vec<NodeId>,
    pub source_dataset: String,
}

/// Datasets a tree accepts drags from: its own id plus an explicit allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptList {
    dataset: String,
    allow: Vec<String>,
}

impl AcceptList {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            allow: Vec::new(),
        }
    }

    pub fn allow(mut self, dataset: impl Into<String>) -> Self {
        self.allow.push(dataset.into());
        self
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn accepts(&self, source_dataset: &str) -> bool {
        self.dataset == source_dataset || self.allow.iter().any(|d| d == source_dataset)
    }
}

/// Reported to the embedding application after a successful drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropEvent {
    pub dragged: Vec<NodeId>,
    pub target: Option<NodeId>,
    pub position: Option<DropPosition>,
    pub source_dataset: String,
    pub destination_dataset: String,
    pub dropped_on_root: bool,
}

/// State of one drag gesture, from drag start to drop or cancel.
///
/// Owned by whoever handles the gesture and dropped with it; nothing about an
/// active drag lives anywhere else.
#[derive(Debug)]
pub struct DragSession {
    payload: DragPayload,
    tracker: HoverTracker,
}

impl DragSession {
    /// Start dragging `dragged_id`.
    ///
    /// A selected node drags the whole selection, in tree order; an unselected
    /// node drags alone. Returns `None` if any dragged node refuses `can_drag`.
    pub fn start<T>(
        forest: &Forest<T>,
        source_dataset: impl Into<String>,
        selection: &Selection,
        dragged_id: &str,
        policy: &impl DropPolicy<T>,
    ) -> Option<Self> {
        let nodes: Vec<&TreeNode<T>> = if selection.contains(dragged_id) {
            forest.iter().filter(|node| selection.contains(&node.id)).collect()
        } else {
            vec![forest.find(dragged_id)?]
        };
        if nodes.iter().any(|node| !policy.can_drag(node)) {
            return None;
        }
        let node_ids: Vec<NodeId> = nodes.iter().map(|node| node.id.clone()).collect();

        Some(Self {
            payload: DragPayload {
                node_ids,
                source_dataset: source_dataset.into(),
            },
            tracker: HoverTracker::new(),
        })
    }

    pub fn payload(&self) -> &DragPayload {
        &self.payload
    }

    pub fn is_dragging(&self, id: &str) -> bool {
        self.payload.node_ids.iter().any(|dragged| dragged == id)
    }

    /// Current drop zone, if the pointer is over one.
    pub fn target(&self) -> Option<&HoverKey> {
        self.tracker.current()
    }

    /// Feed a pointer position over a tree. Returns `true` when the drop zone changed.
    ///
    /// The accept-list runs first, then the classifier, then the structural
    /// filters that hide zones a drop could never use.
    pub fn hover(
        &mut self,
        accept: &AcceptList,
        capabilities: &TreeCapabilities,
        layout: &RowLayout,
        items: &[LinearItem],
        y_in_content: f32,
    ) -> bool {
        match self.zone_at(accept, capabilities, layout, items, y_in_content) {
            Some(target) => self.tracker.update(HoverKey {
                dataset: accept.dataset().to_string(),
                target,
            }),
            None => self.tracker.leave(),
        }
    }

    /// The pointer left every tree.
    pub fn leave(&mut self) -> bool {
        self.tracker.leave()
    }

    fn zone_at(
        &self,
        accept: &AcceptList,
        capabilities: &TreeCapabilities,
        layout: &RowLayout,
        items: &[LinearItem],
        y_in_content: f32,
    ) -> Option<DropTarget> {
        if !capabilities.can_drag_and_drop || !accept.accepts(&self.payload.source_dataset) {
            return None;
        }

        let Some(hover) = resolve_hover(layout, items, y_in_content, |item| {
            capabilities.accepts_child_drop(item.is_folder)
        }) else {
            return capabilities.can_drag_on_root.then_some(DropTarget::Root);
        };

        let item = items.get(hover.index)?;
        if hover.position.is_reorder() && !capabilities.can_reorder_items {
            return None;
        }
        if self.is_dragging(&item.id) {
            return None;
        }
        let dragged: HashSet<&str> = self.payload.node_ids.iter().map(String::as_str).collect();
        if items.has_ancestor_in(&item.id, &dragged) {
            return None;
        }

        Some(DropTarget::Row {
            id: item.id.clone(),
            position: hover.position,
        })
    }

    /// Drop into the dataset the drag started in.
    pub fn drop_on<T>(
        self,
        forest: &mut Forest<T>,
        accept: &AcceptList,
        policy: &impl DropPolicy<T>,
    ) -> Result<DropEvent, MoveRejection> {
        let target = self.accepted_target(accept)?;
        let outcome = match &target {
            DropTarget::Row { id, position } => {
                move_nodes(forest, &self.payload.node_ids, id, *position, policy)
            }
            DropTarget::Root => move_to_root(forest, &self.payload.node_ids, policy),
        }
        .inspect_err(|err| {
            tracing::debug!(target: "vtree::session", %err, "drop rejected");
        })?;
        Ok(self.into_event(accept, target, outcome))
    }

    /// Drop into another dataset using the two-phase cross move.
    pub fn drop_across<T>(
        self,
        source: &mut Forest<T>,
        destination: &mut Forest<T>,
        accept: &AcceptList,
        policy: &impl DropPolicy<T>,
    ) -> Result<DropEvent, MoveRejection> {
        let target = self.accepted_target(accept)?;
        let prepared = CrossMove::prepare(
            source,
            destination,
            &self.payload.node_ids,
            target.row_id(),
            target.position().unwrap_or(DropPosition::Below),
            policy,
        )?;
        let outcome = prepared
            .commit(source, destination, policy)
            .inspect_err(|err| {
                tracing::debug!(target: "vtree::session", %err, "cross drop rejected");
            })?;
        Ok(self.into_event(accept, target, outcome))
    }

    fn accepted_target(&self, accept: &AcceptList) -> Result<DropTarget, MoveRejection> {
        if !accept.accepts(&self.payload.source_dataset) {
            return Err(MoveRejection::NotAccepted {
                origin: self.payload.source_dataset.clone(),
                destination: accept.dataset().to_string(),
            });
        }
        match self.tracker.current() {
            Some(key) if key.dataset == accept.dataset() => Ok(key.target.clone()),
            _ => Err(MoveRejection::NothingToMove),
        }
    }

    fn into_event(self, accept: &AcceptList, target: DropTarget, outcome: MoveOutcome) -> DropEvent {
        DropEvent {
            dropped_on_root: target == DropTarget::Root,
            target: target.row_id().map(str::to_string),
            position: target.position(),
            dragged: outcome.moved,
            source_dataset: self.payload.source_dataset,
            destination_dataset: accept.dataset().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::{Expansion, linearize};
    use crate::moves::{DropRules, Permissive};

    fn forest() -> Forest<()> {
        Forest::new(vec![
            TreeNode::folder("docs", "docs").children([
                TreeNode::file("a", "a"),
                TreeNode::file("b", "b"),
            ]),
            TreeNode::file("c", "c"),
        ])
    }

    #[test]
    fn selected_node_drags_whole_selection_in_tree_order() {
        let forest = forest();
        let selection = Selection::from_ids(["c", "a"], None);
        let session = DragSession::start(&forest, "left", &selection, "c", &Permissive).unwrap();
        assert_eq!(session.payload().node_ids, vec!["a", "c"]);

        let session = DragSession::start(&forest, "left", &selection, "b", &Permissive).unwrap();
        assert_eq!(session.payload().node_ids, vec!["b"]);
    }

    #[test]
    fn accept_list_gates_hover() {
        let forest = forest();
        let items = linearize(&forest, &Expansion::open_all());
        let layout = RowLayout::uniform(items.len(), 20.0);
        let caps = TreeCapabilities::default();
        let mut session =
            DragSession::start(&forest, "left", &Selection::new(), "c", &Permissive).unwrap();

        assert!(!session.hover(&AcceptList::new("right"), &caps, &layout, &items, 10.0));
        assert!(session.target().is_none());

        let accept = AcceptList::new("right").allow("left");
        assert!(session.hover(&accept, &caps, &layout, &items, 10.0));
        assert!(!session.hover(&accept, &caps, &layout, &items, 11.0));
        assert_eq!(
            session.target().map(|k| &k.target),
            Some(&DropTarget::Row {
                id: "docs".into(),
                position: DropPosition::Child
            })
        );
    }

    #[test]
    fn hovering_own_subtree_shows_no_zone() {
        let forest = forest();
        let items = linearize(&forest, &Expansion::open_all());
        let layout = RowLayout::uniform(items.len(), 20.0);
        let caps = TreeCapabilities::default();
        let accept = AcceptList::new("left");
        let mut session =
            DragSession::start(&forest, "left", &Selection::new(), "docs", &Permissive).unwrap();

        session.hover(&accept, &caps, &layout, &items, 10.0);
        assert!(session.target().is_none());
        session.hover(&accept, &caps, &layout, &items, 30.0);
        assert!(session.target().is_none());
    }

    #[test]
    fn drop_below_last_row_lands_on_root() {
        let mut forest = forest();
        let items = linearize(&forest, &Expansion::open_all());
        let layout = RowLayout::uniform(items.len(), 20.0);
        let caps = TreeCapabilities::default();
        let accept = AcceptList::new("left");
        let mut session =
            DragSession::start(&forest, "left", &Selection::new(), "a", &Permissive).unwrap();

        session.hover(&accept, &caps, &layout, &items, 500.0);
        let event = session.drop_on(&mut forest, &accept, &Permissive).unwrap();
        assert!(event.dropped_on_root);
        assert_eq!(event.target, None);
        assert_eq!(forest.all_ids(), vec!["docs", "b", "c", "a"]);
    }

    #[test]
    fn root_veto_rejects_drop_below_last_row() {
        let mut forest = forest();
        let before = forest.clone();
        let items = linearize(&forest, &Expansion::open_all());
        let layout = RowLayout::uniform(items.len(), 20.0);
        let accept = AcceptList::new("left");
        let rules = DropRules::<()>::new().can_drop_on_root(|_| false);
        let mut session =
            DragSession::start(&forest, "left", &Selection::new(), "a", &rules).unwrap();

        session.hover(&accept, &TreeCapabilities::default(), &layout, &items, 500.0);
        assert_eq!(
            session.drop_on(&mut forest, &accept, &rules).unwrap_err(),
            MoveRejection::Vetoed
        );
        assert_eq!(forest, before);
    }

    #[test]
    fn drop_across_moves_between_forests() {
        let mut left = forest();
        let mut right = Forest::<()>::new(vec![TreeNode::file("z", "z")]);
        let right_items = linearize(&right, &Expansion::new());
        let layout = RowLayout::uniform(right_items.len(), 20.0);
        let caps = TreeCapabilities::default();
        let accept = AcceptList::new("right").allow("left");
        let mut session =
            DragSession::start(&left, "left", &Selection::new(), "docs", &Permissive).unwrap();

        session.hover(&accept, &caps, &layout, &right_items, 2.0);
        let event = session
            .drop_across(&mut left, &mut right, &accept, &Permissive)
            .unwrap();
        assert_eq!(event.position, Some(DropPosition::Above));
        assert_eq!(event.destination_dataset, "right");
        assert_eq!(right.all_ids(), vec!["docs", "a", "b", "z"]);
        assert_eq!(left.all_ids(), vec!["c"]);
    }
}
