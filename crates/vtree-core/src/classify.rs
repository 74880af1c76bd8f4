use serde::{Deserialize, Serialize};

use crate::flatten::LinearItem;
use crate::layout::RowLayout;
use crate::node::NodeId;

/// Share of the row height used for the above/below bands when the row
/// also offers a child zone.
pub const LINE_BAND_WITH_CHILD_ZONE: f32 = 0.2;
/// Without a child zone the row splits in two halves.
pub const LINE_BAND_WITHOUT_CHILD_ZONE: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPosition {
    Above,
    Below,
    Child,
}

impl DropPosition {
    pub fn is_reorder(self) -> bool {
        !matches!(self, DropPosition::Child)
    }
}

/// Classify a pointer hovering a row.
///
/// `accepts_child` decides whether the middle band exists at all; without it every
/// hover resolves to a reorder.
pub fn classify(pointer_y: f32, row_top: f32, row_height: f32, accepts_child: bool) -> DropPosition {
    let height = if row_height.is_finite() && row_height > 0.0 {
        row_height
    } else {
        1.0
    };
    let r = (pointer_y - row_top) / height;
    let r = if r.is_finite() { r.clamp(0.0, 1.0) } else { 0.0 };

    if !accepts_child {
        return if r < LINE_BAND_WITHOUT_CHILD_ZONE {
            DropPosition::Above
        } else {
            DropPosition::Below
        };
    }

    if r < LINE_BAND_WITH_CHILD_ZONE {
        DropPosition::Above
    } else if r > 1.0 - LINE_BAND_WITH_CHILD_ZONE {
        DropPosition::Below
    } else {
        DropPosition::Child
    }
}

/// A classified hover over one row of a linearized tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HoverTarget {
    pub index: usize,
    pub position: DropPosition,
}

/// Resolve a content-space `y` over a whole tree container.
///
/// `accepts_child` is asked per hovered row. Returns `None` past the last row.
pub fn resolve_hover(
    layout: &RowLayout,
    items: &[LinearItem],
    y_in_content: f32,
    accepts_child: impl Fn(&LinearItem) -> bool,
) -> Option<HoverTarget> {
    let index = layout.index_at_y(y_in_content);
    let item = items.get(index)?;
    let position = classify(
        y_in_content,
        layout.row_top(index),
        layout.row_height(index),
        accepts_child(item),
    );
    Some(HoverTarget { index, position })
}

/// What a drop would land on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropTarget {
    Row { id: NodeId, position: DropPosition },
    /// Empty space below the last row: append at the top level.
    Root,
}

impl DropTarget {
    pub fn row_id(&self) -> Option<&str> {
        match self {
            DropTarget::Row { id, .. } => Some(id),
            DropTarget::Root => None,
        }
    }

    pub fn position(&self) -> Option<DropPosition> {
        match self {
            DropTarget::Row { position, .. } => Some(*position),
            DropTarget::Root => None,
        }
    }
}

/// Identity of the zone last reported during a drag gesture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HoverKey {
    pub dataset: String,
    pub target: DropTarget,
}

/// Suppresses repeated reports while the pointer stays inside one zone.
#[derive(Debug, Default)]
pub struct HoverTracker {
    last: Option<HoverKey>,
}

impl HoverTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key`. Returns `true` when it differs from the previous zone.
    pub fn update(&mut self, key: HoverKey) -> bool {
        if self.last.as_ref() == Some(&key) {
            return false;
        }
        self.last = Some(key);
        true
    }

    /// The pointer left every drop zone. Returns `true` if that is a change.
    pub fn leave(&mut self) -> bool {
        self.last.take().is_some()
    }

    pub fn current(&self) -> Option<&HoverKey> {
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::{Expansion, linearize};
    use crate::node::{Forest, TreeNode};

    #[test]
    fn bands_with_child_zone() {
        assert_eq!(classify(100.0, 100.0, 20.0, true), DropPosition::Above);
        assert_eq!(classify(103.9, 100.0, 20.0, true), DropPosition::Above);
        assert_eq!(classify(110.0, 100.0, 20.0, true), DropPosition::Child);
        assert_eq!(classify(116.1, 100.0, 20.0, true), DropPosition::Below);
        assert_eq!(classify(120.0, 100.0, 20.0, true), DropPosition::Below);
    }

    #[test]
    fn halves_without_child_zone() {
        assert_eq!(classify(109.9, 100.0, 20.0, false), DropPosition::Above);
        assert_eq!(classify(110.0, 100.0, 20.0, false), DropPosition::Below);
    }

    #[test]
    fn out_of_row_pointer_is_clamped() {
        assert_eq!(classify(50.0, 100.0, 20.0, true), DropPosition::Above);
        assert_eq!(classify(500.0, 100.0, 20.0, true), DropPosition::Below);
        assert_eq!(classify(100.0, 100.0, 0.0, true), DropPosition::Above);
    }

    #[test]
    fn resolve_hover_over_variable_rows() {
        let forest = Forest::<()>::new(vec![
            TreeNode::folder("a", "a").child(TreeNode::file("b", "b")),
            TreeNode::file("c", "c"),
        ]);
        let items = linearize(&forest, &Expansion::open_all());
        let layout = RowLayout::new([10.0, 40.0, 10.0]);

        let hover = resolve_hover(&layout, &items, 15.0, |item| item.is_folder);
        assert_eq!(
            hover,
            Some(HoverTarget {
                index: 1,
                position: DropPosition::Above
            })
        );

        let hover = resolve_hover(&layout, &items, 5.0, |item| item.is_folder);
        assert_eq!(hover.map(|h| h.position), Some(DropPosition::Child));

        assert_eq!(resolve_hover(&layout, &items, 80.0, |_| true), None);
    }

    #[test]
    fn tracker_reports_zone_changes_only() {
        let mut tracker = HoverTracker::new();
        let key = |position| HoverKey {
            dataset: "tree".into(),
            target: DropTarget::Row {
                id: "a".into(),
                position,
            },
        };

        assert!(tracker.update(key(DropPosition::Above)));
        assert!(!tracker.update(key(DropPosition::Above)));
        assert!(tracker.update(key(DropPosition::Child)));
        assert!(tracker.leave());
        assert!(!tracker.leave());
        assert!(tracker.update(key(DropPosition::Child)));
        assert!(tracker.update(HoverKey {
            dataset: "tree".into(),
            target: DropTarget::Root,
        }));
        assert_eq!(tracker.current().and_then(|k| k.target.row_id()), None);
    }
}
