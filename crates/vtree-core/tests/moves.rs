use gpui_dnd_vtree_core::{
    DropPosition, Expansion, Forest, MoveRejection, Permissive, TreeNode, linearize, move_nodes,
};

fn scenario() -> Forest<()> {
    Forest::new(vec![TreeNode::folder("root", "root").children([
        TreeNode::folder("folder1", "folder1").children([
            TreeNode::file("fileA", "fileA"),
            TreeNode::file("fileB", "fileB"),
        ]),
        TreeNode::file("file2", "file2"),
    ])])
}

fn siblings() -> Forest<()> {
    Forest::new(vec![
        TreeNode::folder("src", "src").children([
            TreeNode::file("A", "A"),
            TreeNode::file("B", "B"),
        ]),
        TreeNode::folder("dst", "dst").children([
            TreeNode::file("X", "X"),
            TreeNode::file("T", "T"),
            TreeNode::file("Y", "Y"),
        ]),
    ])
}

fn child_ids(forest: &Forest<()>, parent: &str) -> Vec<String> {
    forest
        .find(parent)
        .unwrap()
        .children
        .iter()
        .map(|node| node.id.clone())
        .collect()
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|id| id.to_string()).collect()
}

#[test]
fn file_dropped_below_sibling_of_its_parent() {
    let mut forest = scenario();
    move_nodes(
        &mut forest,
        &ids(&["fileA"]),
        "file2",
        DropPosition::Below,
        &Permissive,
    )
    .unwrap();

    assert_eq!(
        forest.dump(),
        "root\n  folder1\n    fileB\n  file2\n  fileA\n"
    );
    assert_eq!(forest.find("fileA").unwrap().parent.as_deref(), Some("root"));
}

#[test]
fn folder_onto_own_descendant_is_rejected_for_every_position() {
    for position in [DropPosition::Above, DropPosition::Below, DropPosition::Child] {
        let mut forest = scenario();
        let result = move_nodes(&mut forest, &ids(&["folder1"]), "fileA", position, &Permissive);
        assert_eq!(
            result,
            Err(MoveRejection::WouldCreateCycle {
                target: "fileA".into()
            })
        );
        assert_eq!(forest, scenario());
    }
}

#[test]
fn descendant_targets_are_always_rejected() {
    let forest = scenario();
    for dragged in forest.all_ids() {
        for target in forest.subtree_ids(&dragged).into_iter().skip(1) {
            let mut copy = forest.clone();
            let result = move_nodes(
                &mut copy,
                std::slice::from_ref(&dragged),
                &target,
                DropPosition::Above,
                &Permissive,
            );
            assert!(result.is_err(), "{dragged} -> {target}");
            assert_eq!(copy, forest);
        }
    }
}

#[test]
fn successful_moves_conserve_nodes() {
    let forest = scenario();
    let all = forest.all_ids();
    for dragged in &all {
        for target in &all {
            for position in [DropPosition::Above, DropPosition::Below, DropPosition::Child] {
                let mut copy = forest.clone();
                let subtree = forest.subtree_ids(dragged);
                if move_nodes(
                    &mut copy,
                    std::slice::from_ref(dragged),
                    target,
                    position,
                    &Permissive,
                )
                .is_ok()
                {
                    assert_eq!(copy.node_count(), forest.node_count());
                    assert_eq!(copy.subtree_ids(dragged), subtree);
                    assert!(copy.validate().is_ok());
                }
            }
        }
    }
}

#[test]
fn reorder_above_keeps_dragged_order() {
    let mut forest = siblings();
    move_nodes(&mut forest, &ids(&["A", "B"]), "T", DropPosition::Above, &Permissive).unwrap();
    assert_eq!(child_ids(&forest, "dst"), ["X", "A", "B", "T", "Y"]);
    assert!(child_ids(&forest, "src").is_empty());
}

#[test]
fn reorder_below_keeps_dragged_order() {
    let mut forest = siblings();
    move_nodes(&mut forest, &ids(&["A", "B"]), "T", DropPosition::Below, &Permissive).unwrap();
    assert_eq!(child_ids(&forest, "dst"), ["X", "T", "A", "B", "Y"]);
}

#[test]
fn same_parent_reorder_leaves_prev_parent_alone() {
    let mut forest = siblings();
    move_nodes(&mut forest, &ids(&["Y"]), "X", DropPosition::Above, &Permissive).unwrap();
    assert_eq!(child_ids(&forest, "dst"), ["Y", "X", "T"]);
    assert_eq!(forest.find("Y").unwrap().prev_parent, None);
}

#[test]
fn collapsing_removes_exactly_the_descendants() {
    let forest = scenario();
    let open = linearize(&forest, &Expansion::open_all());
    assert_eq!(open.len(), forest.node_count());

    let mut expansion = Expansion::with_expanded(forest.all_ids());
    expansion.collapse("folder1");
    let partial = linearize(&forest, &expansion);
    assert_eq!(
        open.len() - partial.len(),
        forest.subtree_ids("folder1").len() - 1
    );
}
