use thiserror::Error;

use crate::node::NodeId;
use crate::provider::ItemId;

/// Structural errors. These point at a broken data source, not at a user gesture.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("root `{0}` does not contain any children")]
    RootWithoutChildren(ItemId),
    #[error("root `{0}` is not present in the data source")]
    MissingRoot(ItemId),
    #[error("node id `{0}` appears more than once")]
    DuplicateId(NodeId),
    #[error("node `{id}` records parent {found:?} but is owned by {expected:?}")]
    ParentMismatch {
        id: NodeId,
        expected: Option<NodeId>,
        found: Option<NodeId>,
    },
    #[error("no tree registered with id `{0}`")]
    UnknownTree(String),
}

/// Why a drop did not happen. A rejected move never mutates anything.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveRejection {
    #[error("the drop target is one of the dragged nodes")]
    DropOnSelf,
    #[error("`{target}` is a descendant of a dragged node")]
    WouldCreateCycle { target: NodeId },
    #[error("`{target}` cannot hold children")]
    TargetNotContainer { target: NodeId },
    #[error("the drop was vetoed by the embedding application")]
    Vetoed,
    #[error("dataset `{destination}` does not accept drags from `{origin}`")]
    NotAccepted { origin: String, destination: String },
    #[error("`{id}` already exists in the destination dataset")]
    DuplicateIdInDestination { id: NodeId },
    #[error("unknown node ids: {0:?}")]
    MissingNodes(Vec<NodeId>),
    #[error("nothing to move")]
    NothingToMove,
    #[error("drag and drop is disabled for this tree")]
    Disabled,
}

impl MoveRejection {
    /// Ids that could not be resolved, for forwarding to a missing-items report.
    pub fn missing_ids(&self) -> &[NodeId] {
        match self {
            MoveRejection::MissingNodes(ids) => ids,
            _ => &[],
        }
    }
}
