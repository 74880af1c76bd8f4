use std::cell::RefCell;
use std::rc::Rc;

use gpui_dnd_vtree_core::{
    DragContext, DraggingPosition, DropPosition, Expansion, HoverTarget, ItemId, LinePosition,
    MoveRejection, Reorder, Selection, StaticTreeDataProvider, TreeCapabilities, TreeDataProvider,
    TreeItem, apply_provider_drop, dragging_position, linearize_items,
};

fn provider() -> StaticTreeDataProvider<String> {
    StaticTreeDataProvider::new([
        TreeItem::new("root", "Root".to_string()).with_children(["fruit", "veg", "misc"]),
        TreeItem::new("fruit", "Fruit".to_string()).with_children(["apple", "pear", "plum"]),
        TreeItem::new("apple", "Apple".to_string()),
        TreeItem::new("pear", "Pear".to_string()),
        TreeItem::new("plum", "Plum".to_string()),
        TreeItem::new("veg", "Veg".to_string()).with_children(["leek"]),
        TreeItem::new("leek", "Leek".to_string()),
        TreeItem::new("misc", "Misc".to_string()),
    ])
}

fn children(provider: &StaticTreeDataProvider<String>, id: &str) -> Vec<ItemId> {
    provider.item(id).and_then(|item| item.children.clone()).unwrap_or_default()
}

fn between(parent: &str, child_index: usize) -> DraggingPosition {
    DraggingPosition::BetweenItems {
        tree_id: "tree".into(),
        parent_item: parent.into(),
        depth: 1,
        linear_index: 0,
        child_index,
        line: LinePosition::Top,
    }
}

fn ids(list: &[&str]) -> Vec<ItemId> {
    list.iter().map(|id| id.to_string()).collect()
}

#[test]
fn same_parent_reorder_adjusts_for_removed_slot() {
    let mut provider = provider();
    let reorders =
        pollster::block_on(apply_provider_drop(&mut provider, &ids(&["apple"]), &between("fruit", 2)))
            .unwrap();

    assert_eq!(children(&provider, "fruit"), ["pear", "apple", "plum"]);
    assert_eq!(
        reorders,
        [Reorder {
            source_id: "fruit".into(),
            target_id: "fruit".into(),
            item_id: "apple".into(),
            new_index: 1,
        }]
    );
}

#[test]
fn cross_parent_drop_removes_before_inserting() {
    let mut provider = provider();
    let log = Rc::new(RefCell::new(Vec::new()));
    let _sub = {
        let log = log.clone();
        provider.on_did_change_tree_data(move |changed| log.borrow_mut().extend_from_slice(changed))
    };

    pollster::block_on(apply_provider_drop(
        &mut provider,
        &ids(&["pear", "plum"]),
        &between("veg", 0),
    ))
    .unwrap();

    assert_eq!(children(&provider, "veg"), ["pear", "plum", "leek"]);
    assert_eq!(children(&provider, "fruit"), ["apple"]);
    assert_eq!(*log.borrow(), ["fruit", "veg", "fruit", "veg"]);
}

#[test]
fn item_drop_appends_and_skips_current_parent() {
    let mut provider = provider();
    let position = DraggingPosition::Item {
        tree_id: "tree".into(),
        parent_item: "root".into(),
        target_item: "fruit".into(),
        depth: 0,
        linear_index: 0,
    };

    let reorders = pollster::block_on(apply_provider_drop(
        &mut provider,
        &ids(&["misc", "apple"]),
        &position,
    ))
    .unwrap();
    assert!(reorders.is_empty());
    assert_eq!(children(&provider, "fruit"), ["apple", "pear", "plum", "misc"]);
    assert_eq!(children(&provider, "root"), ["fruit", "veg"]);
}

#[test]
fn drop_into_own_subtree_is_rejected_before_any_change() {
    let mut provider = provider();
    let position = DraggingPosition::Item {
        tree_id: "tree".into(),
        parent_item: "fruit".into(),
        target_item: "apple".into(),
        depth: 1,
        linear_index: 1,
    };
    let result = pollster::block_on(apply_provider_drop(&mut provider, &ids(&["fruit"]), &position));
    assert_eq!(
        result,
        Err(MoveRejection::WouldCreateCycle {
            target: "apple".into()
        })
    );
    assert_eq!(children(&provider, "root"), ["fruit", "veg", "misc"]);
}

#[test]
fn hover_rules_produce_dragging_positions() {
    let provider = provider();
    let expansion = Expansion::with_expanded(["fruit"]);
    let flat = linearize_items("root", provider.all_data(), &expansion).unwrap();
    // fruit, apple, pear, plum, veg, misc
    let caps = TreeCapabilities::default();
    let selection = Selection::single("misc");
    let dragged = ids(&["leek"]);
    let cx = DragContext {
        tree_id: "tree",
        root_item: "root",
        items: provider.all_data(),
        linear: &flat.items,
        capabilities: &caps,
        selection: &selection,
        dragged: &dragged,
    };

    let hover = |index, position| HoverTarget { index, position };

    assert_eq!(
        dragging_position(&cx, hover(2, DropPosition::Above)),
        Some(DraggingPosition::BetweenItems {
            tree_id: "tree".into(),
            parent_item: "fruit".into(),
            depth: 1,
            linear_index: 2,
            child_index: 1,
            line: LinePosition::Bottom,
        })
    );
    assert_eq!(
        dragging_position(&cx, hover(1, DropPosition::Above)),
        Some(DraggingPosition::BetweenItems {
            tree_id: "tree".into(),
            parent_item: "fruit".into(),
            depth: 1,
            linear_index: 1,
            child_index: 0,
            line: LinePosition::Top,
        })
    );
    assert_eq!(
        dragging_position(&cx, hover(4, DropPosition::Child)),
        Some(DraggingPosition::Item {
            tree_id: "tree".into(),
            parent_item: "root".into(),
            target_item: "veg".into(),
            depth: 0,
            linear_index: 4,
        })
    );
    // Files have no child band by default, and selected rows are never targets.
    assert_eq!(dragging_position(&cx, hover(1, DropPosition::Child)), None);
    assert_eq!(dragging_position(&cx, hover(5, DropPosition::Below)), None);
}

#[test]
fn root_drops_follow_capability() {
    let provider = provider();
    let flat = linearize_items("root", provider.all_data(), &Expansion::new()).unwrap();
    let caps = TreeCapabilities {
        can_drag_on_root: false,
        ..TreeCapabilities::default()
    };
    let selection = Selection::new();
    let dragged = ids(&["apple"]);
    let cx = DragContext {
        tree_id: "tree",
        root_item: "root",
        items: provider.all_data(),
        linear: &flat.items,
        capabilities: &caps,
        selection: &selection,
        dragged: &dragged,
    };
    let hover = HoverTarget {
        index: 0,
        position: DropPosition::Below,
    };
    assert_eq!(dragging_position(&cx, hover), None);
}
