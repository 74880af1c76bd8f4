use std::collections::HashSet;
use std::rc::Rc;

use crate::classify::DropPosition;
use crate::error::MoveRejection;
use crate::node::{Detached, Forest, NodeId, TreeNode};
use crate::selection::{ParentIndex, ParentLookup};

/// Capability predicates supplied by the embedding application.
///
/// All default to permissive.
pub trait DropPolicy<T> {
    fn can_drag(&self, _node: &TreeNode<T>) -> bool {
        true
    }

    fn can_drop(
        &self,
        _dragged: &[&TreeNode<T>],
        _target: &TreeNode<T>,
        _position: DropPosition,
    ) -> bool {
        true
    }

    /// Drops on the empty area below the rows, which append to the top level.
    fn can_drop_on_root(&self, _dragged: &[&TreeNode<T>]) -> bool {
        true
    }
}

/// Allows every drag and every drop.
#[derive(Debug, Clone, Copy, Default)]
pub struct Permissive;

impl<T> DropPolicy<T> for Permissive {}

type CanDragFn<T> = Rc<dyn Fn(&TreeNode<T>) -> bool>;
type CanDropFn<T> = Rc<dyn Fn(&[&TreeNode<T>], &TreeNode<T>, DropPosition) -> bool>;
type CanDropOnRootFn<T> = Rc<dyn Fn(&[&TreeNode<T>]) -> bool>;

/// Closure-backed [`DropPolicy`]. Missing closures fall back to `true`.
pub struct DropRules<T> {
    can_drag: Option<CanDragFn<T>>,
    can_drop: Option<CanDropFn<T>>,
    can_drop_on_root: Option<CanDropOnRootFn<T>>,
}

impl<T> Default for DropRules<T> {
    fn default() -> Self {
        Self {
            can_drag: None,
            can_drop: None,
            can_drop_on_root: None,
        }
    }
}

impl<T> Clone for DropRules<T> {
    fn clone(&self) -> Self {
        Self {
            can_drag: self.can_drag.clone(),
            can_drop: self.can_drop.clone(),
            can_drop_on_root: self.can_drop_on_root.clone(),
        }
    }
}

impl<T> DropRules<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_drag(mut self, f: impl Fn(&TreeNode<T>) -> bool + 'static) -> Self {
        self.can_drag = Some(Rc::new(f));
        self
    }

    pub fn can_drop(
        mut self,
        f: impl Fn(&[&TreeNode<T>], &TreeNode<T>, DropPosition) -> bool + 'static,
    ) -> Self {
        self.can_drop = Some(Rc::new(f));
        self
    }

    pub fn can_drop_on_root(mut self, f: impl Fn(&[&TreeNode<T>]) -> bool + 'static) -> Self {
        self.can_drop_on_root = Some(Rc::new(f));
        self
    }
}

impl<T> DropPolicy<T> for DropRules<T> {
    fn can_drag(&self, node: &TreeNode<T>) -> bool {
        self.can_drag.as_ref().is_none_or(|f| f(node))
    }

    fn can_drop(
        &self,
        dragged: &[&TreeNode<T>],
        target: &TreeNode<T>,
        position: DropPosition,
    ) -> bool {
        self.can_drop
            .as_ref()
            .is_none_or(|f| f(dragged, target, position))
    }

    fn can_drop_on_root(&self, dragged: &[&TreeNode<T>]) -> bool {
        self.can_drop_on_root.as_ref().is_none_or(|f| f(dragged))
    }
}

/// Where the moved nodes ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Top level of the dataset, outside any explicit container.
    Root,
    Folder(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Moved ids in insertion order. Nested members of the drag are folded into their ancestor.
    pub moved: Vec<NodeId>,
    pub destination: Destination,
    /// Index of the first moved node among its new siblings.
    pub index: usize,
}

impl MoveOutcome {
    pub fn dropped_on_root(&self) -> bool {
        self.destination == Destination::Root
    }

    pub fn parent_id(&self) -> Option<&str> {
        match &self.destination {
            Destination::Root => None,
            Destination::Folder(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Placement {
    /// Append under a folder, or at the end of the top level.
    Append(Option<NodeId>),
    Above(NodeId),
    Below(NodeId),
}

impl Placement {
    fn new(target: &str, position: DropPosition) -> Self {
        match position {
            DropPosition::Child => Placement::Append(Some(target.to_string())),
            DropPosition::Above => Placement::Above(target.to_string()),
            DropPosition::Below => Placement::Below(target.to_string()),
        }
    }
}

/// Move `dragged` relative to `target` within one dataset.
///
/// Everything is validated before the first mutation, so a rejection leaves
/// `forest` untouched.
pub fn move_nodes<T>(
    forest: &mut Forest<T>,
    dragged: &[NodeId],
    target: &str,
    position: DropPosition,
    policy: &impl DropPolicy<T>,
) -> Result<MoveOutcome, MoveRejection> {
    let ids = resolve_dragged(forest, dragged, policy)?;
    check_target(forest, forest, &ids, target, position, policy)?;

    let detached = detach_all(forest, &ids)?;
    let outcome = place_or_restore(forest, Placement::new(target, position), detached)?;
    tracing::debug!(
        target: "vtree::moves",
        moved = ?outcome.moved,
        destination = ?outcome.destination,
        "move applied"
    );
    Ok(outcome)
}

/// Append `dragged` at the end of the top level.
pub fn move_to_root<T>(
    forest: &mut Forest<T>,
    dragged: &[NodeId],
    policy: &impl DropPolicy<T>,
) -> Result<MoveOutcome, MoveRejection> {
    let ids = resolve_dragged(forest, dragged, policy)?;
    check_root_drop(forest, &ids, policy)?;
    let detached = detach_all(forest, &ids)?;
    place_or_restore(forest, Placement::Append(None), detached)
}

/// A validated move of nodes from one dataset into another.
///
/// Preparing checks both forests without touching them. [`CrossMove::commit`]
/// checks again, then detaches from the source (phase one) and attaches to the
/// destination (phase two). If the attach cannot happen the nodes go back to
/// the source, so a stale preparation never loses data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossMove {
    ids: Vec<NodeId>,
    target: Option<NodeId>,
    position: DropPosition,
}

impl CrossMove {
    /// `target: None` appends at the top level of `destination`.
    pub fn prepare<T>(
        source: &Forest<T>,
        destination: &Forest<T>,
        dragged: &[NodeId],
        target: Option<&str>,
        position: DropPosition,
        policy: &impl DropPolicy<T>,
    ) -> Result<Self, MoveRejection> {
        let ids = resolve_dragged(source, dragged, policy)?;
        check_collisions(source, destination, &ids)?;
        match target {
            Some(target) => check_target(source, destination, &ids, target, position, policy)?,
            None => check_root_drop(source, &ids, policy)?,
        }
        Ok(Self {
            ids,
            target: target.map(str::to_string),
            position,
        })
    }

    /// Ids that will move, with nested members already folded away.
    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }

    pub fn commit<T>(
        &self,
        source: &mut Forest<T>,
        destination: &mut Forest<T>,
        policy: &impl DropPolicy<T>,
    ) -> Result<MoveOutcome, MoveRejection> {
        let ids = resolve_dragged(source, &self.ids, policy)?;
        check_collisions(source, destination, &ids)?;
        let placement = match self.target.as_deref() {
            Some(target) => {
                check_target(source, destination, &ids, target, self.position, policy)?;
                Placement::new(target, self.position)
            }
            None => {
                check_root_drop(source, &ids, policy)?;
                Placement::Append(None)
            }
        };

        let detached = detach_all(source, &ids)?;
        match place(destination, placement, detached) {
            Ok(outcome) => {
                tracing::debug!(target: "vtree::moves", moved = ?outcome.moved, "cross-dataset move applied");
                Ok(outcome)
            }
            Err(Unplaced(detached)) => {
                let missing = self.target.iter().cloned().collect();
                source.restore(detached);
                Err(MoveRejection::MissingNodes(missing))
            }
        }
    }
}

/// Dedupe, resolve, fold nested members into their dragged ancestor and ask `can_drag`.
fn resolve_dragged<T>(
    forest: &Forest<T>,
    dragged: &[NodeId],
    policy: &impl DropPolicy<T>,
) -> Result<Vec<NodeId>, MoveRejection> {
    let mut seen = HashSet::new();
    let mut unique: Vec<&NodeId> = Vec::with_capacity(dragged.len());
    for id in dragged {
        if seen.insert(id.as_str()) {
            unique.push(id);
        }
    }
    if unique.is_empty() {
        return Err(MoveRejection::NothingToMove);
    }

    let index = ParentIndex::from_forest(forest);
    let missing: Vec<NodeId> = unique
        .iter()
        .filter(|id| !index.contains(id))
        .map(|id| id.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(MoveRejection::MissingNodes(missing));
    }

    let ids: Vec<NodeId> = unique
        .iter()
        .filter(|id| !index.has_ancestor_in(id, &seen))
        .map(|id| id.to_string())
        .collect();

    let kept: HashSet<&str> = ids.iter().map(String::as_str).collect();
    if forest
        .iter()
        .filter(|node| kept.contains(node.id.as_str()))
        .any(|node| !policy.can_drag(node))
    {
        return Err(MoveRejection::Vetoed);
    }
    Ok(ids)
}

/// Validate `target` in `destination` for nodes that currently live in `source`.
///
/// Across datasets the self and cycle checks cannot fire, since colliding ids
/// are rejected first.
fn check_target<T>(
    source: &Forest<T>,
    destination: &Forest<T>,
    ids: &[NodeId],
    target: &str,
    position: DropPosition,
    policy: &impl DropPolicy<T>,
) -> Result<(), MoveRejection> {
    let Some(target_node) = destination.find(target) else {
        return Err(MoveRejection::MissingNodes(vec![target.to_string()]));
    };
    if ids.iter().any(|id| id == target) {
        return Err(MoveRejection::DropOnSelf);
    }
    let ancestors = destination.ancestors(target);
    if ids.iter().any(|id| ancestors.contains(id)) {
        return Err(MoveRejection::WouldCreateCycle {
            target: target.to_string(),
        });
    }
    if position == DropPosition::Child && !target_node.is_folder() {
        return Err(MoveRejection::TargetNotContainer {
            target: target.to_string(),
        });
    }

    let nodes: Vec<&TreeNode<T>> = ids.iter().filter_map(|id| source.find(id)).collect();
    if !policy.can_drop(&nodes, target_node, position) {
        return Err(MoveRejection::Vetoed);
    }
    Ok(())
}

fn check_root_drop<T>(
    source: &Forest<T>,
    ids: &[NodeId],
    policy: &impl DropPolicy<T>,
) -> Result<(), MoveRejection> {
    let nodes: Vec<&TreeNode<T>> = ids.iter().filter_map(|id| source.find(id)).collect();
    if !policy.can_drop_on_root(&nodes) {
        return Err(MoveRejection::Vetoed);
    }
    Ok(())
}

fn check_collisions<T>(
    source: &Forest<T>,
    destination: &Forest<T>,
    ids: &[NodeId],
) -> Result<(), MoveRejection> {
    for id in ids {
        if let Some(collision) = source
            .subtree_ids(id)
            .into_iter()
            .find(|id| destination.contains(id))
        {
            return Err(MoveRejection::DuplicateIdInDestination { id: collision });
        }
    }
    Ok(())
}

fn place_or_restore<T>(
    forest: &mut Forest<T>,
    placement: Placement,
    detached: Vec<Detached<T>>,
) -> Result<MoveOutcome, MoveRejection> {
    match place(forest, placement, detached) {
        Ok(outcome) => Ok(outcome),
        Err(Unplaced(detached)) => {
            tracing::error!(target: "vtree::moves", "validated move lost its insertion point");
            let ids = detached.iter().map(|d| d.node.id.clone()).collect();
            forest.restore(detached);
            Err(MoveRejection::MissingNodes(ids))
        }
    }
}

fn detach_all<T>(forest: &mut Forest<T>, ids: &[NodeId]) -> Result<Vec<Detached<T>>, MoveRejection> {
    let mut detached = Vec::with_capacity(ids.len());
    for id in ids {
        match forest.detach(id) {
            Some(d) => detached.push(d),
            None => {
                forest.restore(detached);
                return Err(MoveRejection::MissingNodes(vec![id.clone()]));
            }
        }
    }
    Ok(detached)
}

struct Unplaced<T>(Vec<Detached<T>>);

/// Attach detached nodes according to `placement`, doing the parent bookkeeping.
///
/// `prev_parent` is only rewritten when the parent really changes.
fn place<T>(
    forest: &mut Forest<T>,
    placement: Placement,
    detached: Vec<Detached<T>>,
) -> Result<MoveOutcome, Unplaced<T>> {
    let slot = match &placement {
        Placement::Append(parent) => forest
            .children_of(parent.as_deref())
            .map(|children| (parent.clone(), children.len())),
        Placement::Above(target) => forest.position_of(target),
        Placement::Below(target) => forest.position_of(target).map(|(parent, ix)| (parent, ix + 1)),
    };
    let Some((parent_id, index)) = slot else {
        return Err(Unplaced(detached));
    };
    let Some(siblings) = forest.siblings_mut(parent_id.as_deref()) else {
        return Err(Unplaced(detached));
    };

    let index = index.min(siblings.len());
    let mut moved = Vec::with_capacity(detached.len());
    for (offset, Detached { mut node, .. }) in detached.into_iter().enumerate() {
        if node.parent != parent_id {
            node.prev_parent = node.parent.take();
            node.parent = parent_id.clone();
        }
        moved.push(node.id.clone());
        siblings.insert(index + offset, node);
    }

    let destination = match parent_id {
        Some(id) => Destination::Folder(id),
        None => Destination::Root,
    };
    Ok(MoveOutcome {
        moved,
        destination,
        index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Forest<()> {
        Forest::new(vec![TreeNode::folder("root", "root").children([
            TreeNode::folder("folder1", "folder1").children([
                TreeNode::file("fileA", "a.txt"),
                TreeNode::file("fileB", "b.txt"),
            ]),
            TreeNode::file("file2", "file2.txt"),
        ])])
    }

    fn ids(list: &[&str]) -> Vec<NodeId> {
        list.iter().map(|id| id.to_string()).collect()
    }

    fn child_ids<T>(forest: &Forest<T>, parent: &str) -> Vec<String> {
        forest
            .find(parent)
            .map(|node| node.children.iter().map(|c| c.id.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn below_makes_sibling_of_target() {
        let mut forest = sample();
        let outcome =
            move_nodes(&mut forest, &ids(&["fileA"]), "file2", DropPosition::Below, &Permissive)
                .unwrap();

        assert_eq!(child_ids(&forest, "root"), vec!["folder1", "file2", "fileA"]);
        assert_eq!(child_ids(&forest, "folder1"), vec!["fileB"]);
        let node = forest.find("fileA").unwrap();
        assert_eq!(node.parent.as_deref(), Some("root"));
        assert_eq!(node.prev_parent.as_deref(), Some("folder1"));
        assert_eq!(outcome.destination, Destination::Folder("root".into()));
        assert_eq!(outcome.index, 2);
        assert!(forest.validate().is_ok());
    }

    #[test]
    fn drop_into_own_descendant_is_rejected() {
        let mut forest = sample();
        let before = forest.clone();
        let err = move_nodes(&mut forest, &ids(&["folder1"]), "fileA", DropPosition::Child, &Permissive)
            .unwrap_err();
        assert_eq!(err, MoveRejection::WouldCreateCycle { target: "fileA".into() });
        assert_eq!(forest, before);
    }

    #[test]
    fn drop_on_self_is_rejected() {
        let mut forest = sample();
        let err = move_nodes(&mut forest, &ids(&["file2"]), "file2", DropPosition::Above, &Permissive)
            .unwrap_err();
        assert_eq!(err, MoveRejection::DropOnSelf);
    }

    #[test]
    fn child_drop_on_file_is_rejected() {
        let mut forest = sample();
        let err = move_nodes(&mut forest, &ids(&["fileA"]), "file2", DropPosition::Child, &Permissive)
            .unwrap_err();
        assert_eq!(err, MoveRejection::TargetNotContainer { target: "file2".into() });
    }

    #[test]
    fn child_drop_appends_and_keeps_same_parent_prev_parent() {
        let mut forest = sample();
        move_nodes(&mut forest, &ids(&["fileA"]), "folder1", DropPosition::Child, &Permissive).unwrap();
        assert_eq!(child_ids(&forest, "folder1"), vec!["fileB", "fileA"]);
        assert_eq!(forest.find("fileA").unwrap().prev_parent, None);
    }

    #[test]
    fn veto_leaves_tree_untouched() {
        let mut forest = sample();
        let before = forest.clone();
        let rules = DropRules::new().can_drop(|_, target: &TreeNode<()>, _| target.id != "folder1");
        let err = move_nodes(&mut forest, &ids(&["file2"]), "folder1", DropPosition::Child, &rules)
            .unwrap_err();
        assert_eq!(err, MoveRejection::Vetoed);
        assert_eq!(forest, before);

        let rules = DropRules::new().can_drag(|node: &TreeNode<()>| node.id != "file2");
        let err = move_nodes(&mut forest, &ids(&["file2"]), "fileA", DropPosition::Above, &rules)
            .unwrap_err();
        assert_eq!(err, MoveRejection::Vetoed);
        assert_eq!(forest, before);
    }

    #[test]
    fn nested_members_travel_with_their_ancestor() {
        let mut forest = sample();
        let outcome = move_nodes(
            &mut forest,
            &ids(&["fileA", "folder1"]),
            "file2",
            DropPosition::Below,
            &Permissive,
        )
        .unwrap();
        assert_eq!(outcome.moved, vec!["folder1"]);
        assert_eq!(child_ids(&forest, "root"), vec!["file2", "folder1"]);
        assert_eq!(child_ids(&forest, "folder1"), vec!["fileA", "fileB"]);
    }

    #[test]
    fn above_a_top_level_node_reports_root() {
        let mut forest = Forest::<()>::new(vec![
            TreeNode::file("a", "a"),
            TreeNode::folder("f", "f").child(TreeNode::file("b", "b")),
        ]);
        let outcome =
            move_nodes(&mut forest, &ids(&["b"]), "a", DropPosition::Above, &Permissive).unwrap();
        assert!(outcome.dropped_on_root());
        assert_eq!(forest.all_ids(), vec!["b", "a", "f"]);
        assert_eq!(forest.find("b").unwrap().parent, None);
        assert_eq!(forest.find("b").unwrap().prev_parent.as_deref(), Some("f"));
    }

    #[test]
    fn move_to_root_appends_at_end() {
        let mut forest = sample();
        let outcome = move_to_root(&mut forest, &ids(&["fileB"]), &Permissive).unwrap();
        assert!(outcome.dropped_on_root());
        let top: Vec<_> = forest.roots().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(top, vec!["root", "fileB"]);
    }

    #[test]
    fn unknown_ids_are_reported() {
        let mut forest = sample();
        let err = move_nodes(&mut forest, &ids(&["ghost"]), "file2", DropPosition::Above, &Permissive)
            .unwrap_err();
        assert_eq!(err.missing_ids(), ["ghost"]);
        let err = move_nodes(&mut forest, &ids(&["fileA"]), "ghost", DropPosition::Above, &Permissive)
            .unwrap_err();
        assert_eq!(err.missing_ids(), ["ghost"]);
        assert_eq!(
            move_nodes(&mut forest, &[], "file2", DropPosition::Above, &Permissive),
            Err(MoveRejection::NothingToMove)
        );
    }

    #[test]
    fn cross_move_is_two_phase() {
        let mut left = sample();
        let mut right = Forest::<()>::new(vec![TreeNode::folder("inbox", "inbox")]);

        let prepared = CrossMove::prepare(
            &left,
            &right,
            &ids(&["folder1"]),
            Some("inbox"),
            DropPosition::Child,
            &Permissive,
        )
        .unwrap();
        assert_eq!(left, sample());

        let outcome = prepared.commit(&mut left, &mut right, &Permissive).unwrap();
        assert_eq!(outcome.destination, Destination::Folder("inbox".into()));
        assert_eq!(right.all_ids(), vec!["inbox", "folder1", "fileA", "fileB"]);
        assert_eq!(left.all_ids(), vec!["root", "file2"]);
        assert!(left.validate().is_ok());
        assert!(right.validate().is_ok());
    }

    #[test]
    fn cross_move_rejects_id_collisions() {
        let left = sample();
        let right = Forest::<()>::new(vec![TreeNode::file("fileB", "other b")]);
        let err = CrossMove::prepare(&left, &right, &ids(&["folder1"]), None, DropPosition::Below, &Permissive)
            .unwrap_err();
        assert_eq!(err, MoveRejection::DuplicateIdInDestination { id: "fileB".into() });
    }

    #[test]
    fn stale_cross_move_is_rejected_on_commit() {
        let mut left = sample();
        let mut right = Forest::<()>::new(vec![TreeNode::folder("inbox", "inbox")]);
        let prepared = CrossMove::prepare(
            &left,
            &right,
            &ids(&["fileA"]),
            Some("inbox"),
            DropPosition::Child,
            &Permissive,
        )
        .unwrap();

        right = Forest::new(vec![TreeNode::file("other", "other")]);
        let before = left.clone();
        let err = prepared.commit(&mut left, &mut right, &Permissive).unwrap_err();
        assert_eq!(err.missing_ids(), ["inbox"]);
        assert_eq!(left, before);
    }

    #[test]
    fn root_drop_honours_its_veto() {
        let mut forest = sample();
        let before = forest.clone();
        let rules = DropRules::<()>::new()
            .can_drop_on_root(|dragged| dragged.iter().all(|node| node.is_folder()));

        let err = move_to_root(&mut forest, &ids(&["fileB"]), &rules).unwrap_err();
        assert_eq!(err, MoveRejection::Vetoed);
        assert_eq!(forest, before);

        let outcome = move_to_root(&mut forest, &ids(&["folder1"]), &rules).unwrap();
        assert!(outcome.dropped_on_root());
    }

    #[test]
    fn cross_root_drop_honours_its_veto() {
        let mut left = sample();
        let mut right = Forest::<()>::new(vec![TreeNode::folder("inbox", "inbox")]);
        let refuse_root = DropRules::<()>::new().can_drop_on_root(|_| false);

        let err = CrossMove::prepare(&left, &right, &ids(&["fileA"]), None, DropPosition::Below, &refuse_root)
            .unwrap_err();
        assert_eq!(err, MoveRejection::Vetoed);

        let prepared =
            CrossMove::prepare(&left, &right, &ids(&["fileA"]), None, DropPosition::Below, &Permissive)
                .unwrap();
        let (left_before, right_before) = (left.clone(), right.clone());
        let err = prepared.commit(&mut left, &mut right, &refuse_root).unwrap_err();
        assert_eq!(err, MoveRejection::Vetoed);
        assert_eq!(left, left_before);
        assert_eq!(right, right_before);
    }
}
