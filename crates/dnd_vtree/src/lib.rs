mod tree;

pub use tree::{
    DndVTree, DndVTreeEntry, DndVTreeIndicatorCap, DndVTreeIndicatorStyle, DndVTreeRowState,
    DndVTreeState, dnd_vtree,
};
