use crate::node::{Forest, NodeId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RenameState {
    #[default]
    Idle,
    Editing { node_id: NodeId, draft: String },
}

/// A rename that changed a node's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameCommit {
    pub node_id: NodeId,
    pub old_name: String,
    pub new_name: String,
}

/// Inline rename for one tree instance. At most one node is edited at a time.
#[derive(Debug, Clone, Default)]
pub struct Renamer {
    state: RenameState,
}

impl Renamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &RenameState {
        &self.state
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.state, RenameState::Editing { .. })
    }

    pub fn editing_id(&self) -> Option<&str> {
        match &self.state {
            RenameState::Editing { node_id, .. } => Some(node_id),
            RenameState::Idle => None,
        }
    }

    pub fn draft(&self) -> Option<&str> {
        match &self.state {
            RenameState::Editing { draft, .. } => Some(draft),
            RenameState::Idle => None,
        }
    }

    /// Start editing `node_id` with its current name as the draft.
    ///
    /// A rename already in progress is committed first, the same way losing
    /// focus would. Returns that commit, if it changed anything.
    pub fn begin<T>(&mut self, forest: &mut Forest<T>, node_id: &str) -> Option<RenameCommit> {
        let previous = self.commit(forest);
        if let Some(node) = forest.find(node_id) {
            self.state = RenameState::Editing {
                node_id: node.id.clone(),
                draft: node.name.clone(),
            };
        }
        previous
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        if let RenameState::Editing { draft, .. } = &mut self.state {
            *draft = text.into();
        }
    }

    pub fn push_str(&mut self, text: &str) {
        if let RenameState::Editing { draft, .. } = &mut self.state {
            draft.push_str(text);
        }
    }

    pub fn backspace(&mut self) {
        if let RenameState::Editing { draft, .. } = &mut self.state {
            draft.pop();
        }
    }

    /// Enter or blur. Applies the trimmed draft if it is non-empty and differs
    /// from the current name, and returns to idle either way.
    pub fn commit<T>(&mut self, forest: &mut Forest<T>) -> Option<RenameCommit> {
        let RenameState::Editing { node_id, draft } = std::mem::take(&mut self.state) else {
            return None;
        };

        let new_name = draft.trim();
        if new_name.is_empty() {
            return None;
        }
        let old_name = forest.rename(&node_id, new_name)?;
        tracing::debug!(target: "vtree::rename", id = %node_id, %old_name, new_name, "renamed");
        Some(RenameCommit {
            node_id,
            old_name,
            new_name: new_name.to_string(),
        })
    }

    /// Escape. Discards the draft.
    pub fn cancel(&mut self) {
        self.state = RenameState::Idle;
    }
}
