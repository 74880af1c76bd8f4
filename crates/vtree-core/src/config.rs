use serde::{Deserialize, Serialize};

use crate::layout::DEFAULT_ROW_HEIGHT;

/// Per-tree switches for interaction features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeCapabilities {
    pub can_drag_and_drop: bool,
    /// Rows that are folders offer the middle "drop as child" band.
    pub can_drop_on_folder: bool,
    /// Files offer it too. Only useful with a data source that turns files into folders.
    pub can_drop_on_file: bool,
    pub can_reorder_items: bool,
    /// Dropping below the last row appends to the top level.
    pub can_drag_on_root: bool,
    pub allow_collapse: bool,
    pub open_all: bool,
    pub row_height: f32,
}

impl Default for TreeCapabilities {
    fn default() -> Self {
        Self {
            can_drag_and_drop: true,
            can_drop_on_folder: true,
            can_drop_on_file: false,
            can_reorder_items: true,
            can_drag_on_root: true,
            allow_collapse: true,
            open_all: false,
            row_height: DEFAULT_ROW_HEIGHT,
        }
    }
}

impl TreeCapabilities {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(json).map(Self::with_defaults)
    }

    /// Whether a row of this kind gets a child band in the classifier.
    pub fn accepts_child_drop(&self, node_is_folder: bool) -> bool {
        if node_is_folder {
            self.can_drop_on_folder
        } else {
            self.can_drop_on_file
        }
    }

    fn with_defaults(mut self) -> Self {
        if !self.row_height.is_finite() || self.row_height <= 0.0 {
            self.row_height = DEFAULT_ROW_HEIGHT;
        }
        self
    }
}
