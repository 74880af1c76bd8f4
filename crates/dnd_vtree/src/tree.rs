use std::{cell::RefCell, collections::HashMap, ops::Range, rc::Rc};

use gpui::{
    App, AppContext as _, Context, CursorStyle, ElementId, Entity, EntityId, FocusHandle, Hsla,
    InteractiveElement as _, IntoElement, ListSizingBehavior, Modifiers, ParentElement as _,
    Pixels, Point, Render, RenderOnce, ScrollStrategy, SharedString, Size, StatefulInteractiveElement as _,
    StyleRefinement, Styled, WeakEntity, Window, div, prelude::FluentBuilder as _, px, size,
};
use gpui_component::list::ListItem;
use gpui_component::scroll::{Scrollbar, ScrollbarState};
use gpui_component::{ActiveTheme as _, StyledExt as _, VirtualListScrollHandle, v_virtual_list};
use gpui_dnd_vtree_core::{
    AcceptList, ClickModifiers, DragSession, DropEvent, DropPolicy, DropPosition, DropRules,
    DropTarget, Expansion, Forest, LinearItem, NodeId, RenameCommit, Renamer, RowLayout,
    Selection, TreeCapabilities, TreeNode, compute_selection, index_of, linearize, subtree_end,
};

const CONTEXT: &str = "DndVTree";
const DEFAULT_DATASET: &str = "default";

type RenderItemFn<T> =
    Rc<dyn Fn(usize, &DndVTreeEntry<'_, T>, DndVTreeRowState, &mut Window, &mut App) -> ListItem>;

/// Create a [`DndVTree`].
pub fn dnd_vtree<T, R>(state: &Entity<DndVTreeState<T>>, render_item: R) -> DndVTree<T>
where
    T: 'static,
    R: Fn(usize, &DndVTreeEntry<'_, T>, DndVTreeRowState, &mut Window, &mut App) -> ListItem
        + 'static,
{
    DndVTree::new(state, render_item)
}

/// Drag value shared by every tree with the same item type.
///
/// The session is filled in when the drag starts and taken by whichever tree
/// receives the drop.
struct DndVTreeDrag<T> {
    tree_id: EntityId,
    source: WeakEntity<DndVTreeState<T>>,
    label: SharedString,
    session: Rc<RefCell<Option<DragSession>>>,
}

struct DragGhost {
    label: SharedString,
}

impl DragGhost {
    fn new(label: SharedString) -> Self {
        Self { label }
    }
}

impl Render for DragGhost {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();
        div()
            .px(px(10.))
            .py(px(6.))
            .rounded(px(8.))
            .bg(theme.popover)
            .border_1()
            .border_color(theme.border)
            .shadow_md()
            .text_color(theme.popover_foreground)
            .text_sm()
            .child(self.label.clone())
    }
}

/// One visible row, as handed to the row renderer.
pub struct DndVTreeEntry<'a, T> {
    node: &'a TreeNode<T>,
    item: &'a LinearItem,
}

impl<'a, T> DndVTreeEntry<'a, T> {
    #[inline]
    pub fn node(&self) -> &'a TreeNode<T> {
        self.node
    }

    #[inline]
    pub fn id(&self) -> &'a str {
        &self.item.id
    }

    #[inline]
    pub fn name(&self) -> &'a str {
        &self.node.name
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.item.depth
    }

    #[inline]
    pub fn parent_id(&self) -> Option<&'a str> {
        self.item.parent_id.as_deref()
    }

    #[inline]
    pub fn is_folder(&self) -> bool {
        self.item.is_folder
    }

    #[inline]
    pub fn is_expanded(&self) -> bool {
        self.item.is_expanded
    }
}

#[derive(Clone, Copy, Debug)]
pub enum DndVTreeIndicatorCap {
    None,
    StartBar { width: Pixels, height: Pixels },
    StartAndEndBars { width: Pixels, height: Pixels },
}

#[derive(Clone, Copy, Debug)]
pub struct DndVTreeIndicatorStyle {
    pub color: Option<Hsla>,
    pub thickness: Pixels,
    pub cap: DndVTreeIndicatorCap,
}

impl Default for DndVTreeIndicatorStyle {
    fn default() -> Self {
        Self {
            color: None,
            thickness: px(2.),
            cap: DndVTreeIndicatorCap::StartBar {
                width: px(2.),
                height: px(10.),
            },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DndVTreeRowState {
    pub selected: bool,
    pub dragging: bool,
    /// Set on the row a drop would currently land on.
    pub drop_position: Option<DropPosition>,
    /// Draft text while this row is being renamed.
    pub editing: Option<SharedString>,
}

struct DndVTreeStateCallbacks<T> {
    on_drop: Option<Rc<dyn Fn(&DropEvent, &Forest<T>)>>,
    on_rename: Option<Rc<dyn Fn(&RenameCommit)>>,
    on_selection_change: Option<Rc<dyn Fn(&Selection)>>,
    on_click: Option<Rc<dyn Fn(&TreeNode<T>, ClickModifiers)>>,
}

impl<T> Default for DndVTreeStateCallbacks<T> {
    fn default() -> Self {
        Self {
            on_drop: None,
            on_rename: None,
            on_selection_change: None,
            on_click: None,
        }
    }
}

/// State for a virtualized tree with multi-selection, inline rename and
/// drag-and-drop within and across trees.
pub struct DndVTreeState<T> {
    focus_handle: FocusHandle,
    forest: Forest<T>,
    expansion: Expansion,
    selection: Selection,
    cursor: Option<NodeId>,
    renamer: Renamer,
    accept: AcceptList,
    accepted_datasets: Vec<String>,
    capabilities: TreeCapabilities,
    rules: DropRules<T>,
    entries: Vec<LinearItem>,
    row_heights: HashMap<NodeId, Pixels>,
    entry_sizes: Rc<Vec<Size<Pixels>>>,
    layout: RowLayout,
    indent_width: Pixels,
    indent_offset: Pixels,
    indicator_style: DndVTreeIndicatorStyle,
    scrollbar_state: ScrollbarState,
    scroll_handle: VirtualListScrollHandle,
    drag_handle_width: Option<Pixels>,
    dragged_ids: Vec<NodeId>,
    drop_target: Option<DropTarget>,
    callbacks: DndVTreeStateCallbacks<T>,
    render_item: RenderItemFn<T>,
}

impl<T: 'static> DndVTreeState<T> {
    pub fn new(cx: &mut App) -> Self {
        Self {
            focus_handle: cx.focus_handle(),
            forest: Forest::default(),
            expansion: Expansion::new(),
            selection: Selection::new(),
            cursor: None,
            renamer: Renamer::new(),
            accept: AcceptList::new(DEFAULT_DATASET),
            accepted_datasets: Vec::new(),
            capabilities: TreeCapabilities::default(),
            rules: DropRules::new(),
            entries: Vec::new(),
            row_heights: HashMap::new(),
            entry_sizes: Rc::new(Vec::new()),
            layout: RowLayout::default(),
            indent_width: px(16.),
            indent_offset: px(12.),
            indicator_style: DndVTreeIndicatorStyle::default(),
            scrollbar_state: ScrollbarState::default(),
            scroll_handle: VirtualListScrollHandle::new(),
            drag_handle_width: None,
            dragged_ids: Vec::new(),
            drop_target: None,
            callbacks: DndVTreeStateCallbacks::default(),
            render_item: Rc::new(|_, _, _, _, _| ListItem::new("dnd-vtree-empty")),
        }
    }

    pub fn items(mut self, items: impl Into<Vec<TreeNode<T>>>) -> Self {
        self.forest = Forest::new(items);
        self.rebuild_entries();
        self
    }

    /// Name of the dataset this tree shows. Drags carry it so other trees can
    /// decide whether to accept them.
    pub fn dataset(mut self, dataset: impl Into<String>) -> Self {
        self.accept = self
            .accepted_datasets
            .iter()
            .fold(AcceptList::new(dataset), |accept, d| accept.allow(d.clone()));
        self
    }

    /// Also accept drags that start in `dataset`.
    pub fn accept_from(mut self, dataset: impl Into<String>) -> Self {
        let dataset = dataset.into();
        self.accept = self.accept.allow(dataset.clone());
        self.accepted_datasets.push(dataset);
        self
    }

    pub fn capabilities(mut self, capabilities: TreeCapabilities) -> Self {
        if capabilities.open_all && !self.capabilities.open_all {
            self.expansion = Expansion::open_all();
        }
        self.capabilities = capabilities;
        self.rebuild_entries();
        self
    }

    /// Start with these folders expanded.
    pub fn expanded<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        for id in ids {
            self.expansion.expand(id);
        }
        self.rebuild_entries();
        self
    }

    /// Horizontal step per depth level, used to place the drop indicator.
    ///
    /// This should match the indentation used by your row renderer.
    pub fn indent_width(mut self, indent_width: Pixels) -> Self {
        self.indent_width = indent_width;
        self
    }

    /// Set the left offset for the drop indicator line.
    pub fn indent_offset(mut self, indent_offset: Pixels) -> Self {
        self.indent_offset = indent_offset;
        self
    }

    /// Restrict drag start to a left-side handle area with the given width.
    pub fn drag_handle_width(mut self, width: Pixels) -> Self {
        self.drag_handle_width = Some(width);
        self
    }

    /// Allow dragging from anywhere on the row.
    pub fn drag_on_row(mut self) -> Self {
        self.drag_handle_width = None;
        self
    }

    pub fn indicator_style(mut self, style: DndVTreeIndicatorStyle) -> Self {
        self.indicator_style = style;
        self
    }

    pub fn indicator_color(mut self, color: Hsla) -> Self {
        self.indicator_style.color = Some(color);
        self
    }

    pub fn indicator_thickness(mut self, thickness: Pixels) -> Self {
        self.indicator_style.thickness = thickness;
        self
    }

    pub fn indicator_cap(mut self, cap: DndVTreeIndicatorCap) -> Self {
        self.indicator_style.cap = cap;
        self
    }

    /// Decide per node whether it may be dragged.
    pub fn can_drag(mut self, can_drag: impl Fn(&TreeNode<T>) -> bool + 'static) -> Self {
        self.rules = self.rules.can_drag(can_drag);
        self
    }

    /// Decide whether the dragged nodes may land on `target` at `position`.
    pub fn can_drop(
        mut self,
        can_drop: impl Fn(&[&TreeNode<T>], &TreeNode<T>, DropPosition) -> bool + 'static,
    ) -> Self {
        self.rules = self.rules.can_drop(can_drop);
        self
    }

    /// Decide whether the dragged nodes may be appended to the top level.
    pub fn can_drop_on_root(
        mut self,
        can_drop_on_root: impl Fn(&[&TreeNode<T>]) -> bool + 'static,
    ) -> Self {
        self.rules = self.rules.can_drop_on_root(can_drop_on_root);
        self
    }

    /// Called after a successful drop, with the forest as it is afterwards.
    ///
    /// For drops between two trees both trees call their own callback.
    pub fn on_drop(mut self, on_drop: impl Fn(&DropEvent, &Forest<T>) + 'static) -> Self {
        self.callbacks.on_drop = Some(Rc::new(on_drop));
        self
    }

    /// Called when a rename changed a node's name.
    pub fn on_rename(mut self, on_rename: impl Fn(&RenameCommit) + 'static) -> Self {
        self.callbacks.on_rename = Some(Rc::new(on_rename));
        self
    }

    pub fn on_selection_change(mut self, f: impl Fn(&Selection) + 'static) -> Self {
        self.callbacks.on_selection_change = Some(Rc::new(f));
        self
    }

    pub fn on_click(mut self, f: impl Fn(&TreeNode<T>, ClickModifiers) + 'static) -> Self {
        self.callbacks.on_click = Some(Rc::new(f));
        self
    }

    pub fn set_items(&mut self, items: impl Into<Vec<TreeNode<T>>>, cx: &mut Context<Self>) {
        self.forest = Forest::new(items);
        self.selection.clear();
        self.cursor = None;
        self.renamer.cancel();
        self.dragged_ids.clear();
        self.drop_target = None;
        self.rebuild_entries();
        cx.notify();
    }

    pub fn forest(&self) -> &Forest<T> {
        &self.forest
    }

    pub fn dataset_id(&self) -> &str {
        self.accept.dataset()
    }

    pub fn visible_items(&self) -> &[LinearItem] {
        &self.entries
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn set_selection(&mut self, selection: Selection, cx: &mut Context<Self>) {
        self.selection = selection;
        self.notify_selection();
        cx.notify();
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expansion.is_expanded(id)
    }

    pub fn expand(&mut self, id: &str, cx: &mut Context<Self>) {
        if self.expansion.expand(id) {
            self.rebuild_entries();
            cx.notify();
        }
    }

    /// Ignored while `allow_collapse` is off.
    pub fn collapse(&mut self, id: &str, cx: &mut Context<Self>) {
        if self.capabilities.allow_collapse && self.expansion.collapse(id) {
            self.rebuild_entries();
            cx.notify();
        }
    }

    pub fn toggle_expand(&mut self, id: &str, cx: &mut Context<Self>) {
        if self.expansion.is_expanded(id) {
            self.collapse(id, cx);
        } else {
            self.expand(id, cx);
        }
    }

    /// Override the height of one node's row.
    pub fn set_row_height(&mut self, id: impl Into<NodeId>, height: Pixels, cx: &mut Context<Self>) {
        self.row_heights.insert(id.into(), height);
        self.rebuild_entries();
        self.drop_target = None;
        cx.notify();
    }

    pub fn editing_id(&self) -> Option<&str> {
        self.renamer.editing_id()
    }

    /// Start renaming `id`. A rename already in progress is committed first.
    pub fn begin_rename(&mut self, id: &str, cx: &mut Context<Self>) {
        if let Some(commit) = self.renamer.begin(&mut self.forest, id) {
            self.notify_rename(&commit);
        }
        cx.notify();
    }

    pub fn commit_rename(&mut self, cx: &mut Context<Self>) {
        if let Some(commit) = self.renamer.commit(&mut self.forest) {
            self.notify_rename(&commit);
        }
        cx.notify();
    }

    pub fn cancel_rename(&mut self, cx: &mut Context<Self>) {
        self.renamer.cancel();
        cx.notify();
    }

    fn rebuild_entries(&mut self) {
        self.entries = linearize(&self.forest, &self.expansion);
        let default_height = px(self.capabilities.row_height);
        let heights: Vec<Pixels> = self
            .entries
            .iter()
            .map(|item| {
                sanitize_row_height(
                    self.row_heights
                        .get(&item.id)
                        .copied()
                        .unwrap_or(default_height),
                )
            })
            .collect();

        self.layout = RowLayout::new(heights.iter().map(|h| f32::from(*h)));
        self.entry_sizes = Rc::new(heights.into_iter().map(|h| size(px(0.), h)).collect());
    }

    fn notify_selection(&self) {
        if let Some(f) = self.callbacks.on_selection_change.as_ref() {
            f(&self.selection);
        }
    }

    fn notify_rename(&self, commit: &RenameCommit) {
        if let Some(f) = self.callbacks.on_rename.as_ref() {
            f(commit);
        }
    }

    fn notify_drop(&self, event: &DropEvent) {
        if let Some(f) = self.callbacks.on_drop.as_ref() {
            f(event, &self.forest);
        }
    }

    fn select(&mut self, id: &str, modifiers: ClickModifiers) {
        let next = compute_selection(&self.selection, id, modifiers, &self.entries, &self.forest);
        if next != self.selection {
            self.selection = next;
            self.notify_selection();
        }
        self.cursor = Some(id.to_string());
    }

    fn move_cursor_to(&mut self, ix: usize, cx: &mut Context<Self>) {
        let ix = ix.min(self.entries.len().saturating_sub(1));
        let Some(id) = self.entries.get(ix).map(|item| item.id.clone()) else {
            return;
        };
        self.select(&id, ClickModifiers::plain());
        self.scroll_handle.scroll_to_item(ix, ScrollStrategy::Center);
        cx.notify();
    }

    fn on_key_down(&mut self, event: &gpui::KeyDownEvent, cx: &mut Context<Self>) -> bool {
        if cx.has_active_drag() {
            return false;
        }

        if self.renamer.is_editing() {
            return self.on_rename_key(event, cx);
        }

        if self.entries.is_empty() {
            return false;
        }

        let cursor_ix = self
            .cursor
            .as_deref()
            .and_then(|id| index_of(&self.entries, id))
            .unwrap_or(0)
            .min(self.entries.len() - 1);

        match event.keystroke.key.as_str() {
            "up" => {
                self.move_cursor_to(cursor_ix.saturating_sub(1), cx);
                true
            }
            "down" => {
                self.move_cursor_to(cursor_ix + 1, cx);
                true
            }
            "home" => {
                self.move_cursor_to(0, cx);
                true
            }
            "end" => {
                self.move_cursor_to(self.entries.len() - 1, cx);
                true
            }
            "right" => {
                let item = self.entries[cursor_ix].clone();
                if !item.is_folder {
                    return false;
                }
                if !item.is_expanded {
                    self.expand(&item.id, cx);
                } else if self
                    .entries
                    .get(cursor_ix + 1)
                    .is_some_and(|child| child.depth == item.depth + 1)
                {
                    self.move_cursor_to(cursor_ix + 1, cx);
                }
                true
            }
            "left" => {
                let item = self.entries[cursor_ix].clone();
                if item.is_folder && item.is_expanded && self.capabilities.allow_collapse {
                    self.collapse(&item.id, cx);
                    return true;
                }
                let Some(parent_ix) = item
                    .parent_id
                    .as_deref()
                    .and_then(|parent| index_of(&self.entries, parent))
                else {
                    return false;
                };
                self.move_cursor_to(parent_ix, cx);
                true
            }
            "enter" | "space" => {
                let item = &self.entries[cursor_ix];
                if !item.is_folder {
                    return false;
                }
                let id = item.id.clone();
                self.toggle_expand(&id, cx);
                if let Some(ix) = index_of(&self.entries, &id) {
                    self.scroll_handle.scroll_to_item(ix, ScrollStrategy::Center);
                }
                true
            }
            "f2" => {
                let id = self.entries[cursor_ix].id.clone();
                self.begin_rename(&id, cx);
                true
            }
            _ => false,
        }
    }

    fn on_rename_key(&mut self, event: &gpui::KeyDownEvent, cx: &mut Context<Self>) -> bool {
        let keystroke = &event.keystroke;
        match rename_key(
            &keystroke.key,
            keystroke.key_char.as_deref(),
            keystroke.modifiers,
        ) {
            RenameKey::Commit => self.commit_rename(cx),
            RenameKey::Cancel => self.cancel_rename(cx),
            RenameKey::Backspace => {
                self.renamer.backspace();
                cx.notify();
            }
            RenameKey::Insert(text) => {
                self.renamer.push_str(text);
                cx.notify();
            }
            RenameKey::Ignore => return false,
        }
        true
    }

    fn on_entry_click(
        &mut self,
        ix: usize,
        event: &gpui::ClickEvent,
        window: &mut Window,
        cx: &mut Context<Self>,
    ) {
        let Some(item) = self.entries.get(ix).cloned() else {
            return;
        };
        window.focus(&self.focus_handle);

        if self.renamer.is_editing() && self.renamer.editing_id() != Some(item.id.as_str()) {
            self.commit_rename(cx);
        }

        if event.click_count() >= 2 {
            self.begin_rename(&item.id, cx);
            return;
        }

        let modifiers = click_modifiers(window.modifiers());
        self.select(&item.id, modifiers);
        if modifiers == ClickModifiers::plain() && item.is_folder {
            self.toggle_expand(&item.id, cx);
        }

        if let Some(on_click) = self.callbacks.on_click.as_ref()
            && let Some(node) = self.forest.find(&item.id)
        {
            on_click(node, modifiers);
        }
        cx.notify();
    }

    fn on_drag_start(&mut self, drag: &DndVTreeDrag<T>, item_id: &str, cx: &mut Context<Self>) {
        self.renamer.cancel();
        let session = DragSession::start(
            &self.forest,
            self.accept.dataset(),
            &self.selection,
            item_id,
            &self.rules,
        );
        match session.as_ref() {
            Some(session) => {
                self.dragged_ids = session.payload().node_ids.clone();
                tracing::debug!(
                    target: "vtree::adapter",
                    dataset = self.accept.dataset(),
                    count = self.dragged_ids.len(),
                    "drag started"
                );
            }
            None => {
                self.dragged_ids.clear();
                tracing::debug!(target: "vtree::adapter", id = item_id, "drag refused");
            }
        }
        *drag.session.borrow_mut() = session;
        self.drop_target = None;
        cx.notify();
    }

    fn on_drag_move(
        &mut self,
        event: &gpui::DragMoveEvent<DndVTreeDrag<T>>,
        _window: &mut Window,
        cx: &mut Context<Self>,
    ) {
        if !cx.has_active_drag() {
            return;
        }

        let mouse_position = event.event.position;
        let list_bounds = event.bounds;
        let cell = event.drag(cx).session.clone();
        let mut session = cell.borrow_mut();
        let Some(session) = session.as_mut() else {
            return;
        };

        if !list_bounds.contains(&mouse_position) {
            let ours = session
                .target()
                .is_some_and(|key| key.dataset == self.accept.dataset());
            if ours {
                session.leave();
            }
            if self.drop_target.take().is_some() {
                cx.notify();
            }
            return;
        }

        let scroll_y = self.scroll_handle.offset().y;
        let y_in_content = mouse_position.y - list_bounds.origin.y - scroll_y;
        session.hover(
            &self.accept,
            &self.capabilities,
            &self.layout,
            &self.entries,
            y_in_content.into(),
        );

        let new_target = session
            .target()
            .filter(|key| key.dataset == self.accept.dataset())
            .map(|key| key.target.clone());
        if self.drop_target != new_target {
            self.drop_target = new_target;
            cx.notify();
        }
    }

    fn on_drop_dragged(
        &mut self,
        drag: &DndVTreeDrag<T>,
        _window: &mut Window,
        cx: &mut Context<Self>,
    ) {
        self.drop_target = None;
        let Some(session) = drag.session.borrow_mut().take() else {
            return;
        };

        let result = if drag.tree_id == cx.entity_id() {
            session.drop_on(&mut self.forest, &self.accept, &self.rules)
        } else {
            let Some(source) = drag.source.upgrade() else {
                tracing::warn!(target: "vtree::adapter", "drag source tree is gone");
                return;
            };
            source.update(cx, |source, cx| {
                let result = session.drop_across(
                    &mut source.forest,
                    &mut self.forest,
                    &self.accept,
                    &self.rules,
                );
                if let Ok(event) = &result {
                    source.after_move_out(event);
                    cx.notify();
                }
                result
            })
        };

        match result {
            Ok(event) => {
                tracing::debug!(
                    target: "vtree::adapter",
                    from = %event.source_dataset,
                    to = %event.destination_dataset,
                    count = event.dragged.len(),
                    "dropped"
                );
                self.selection.clear();
                self.notify_selection();
                self.dragged_ids.clear();
                self.rebuild_entries();
                self.notify_drop(&event);
            }
            Err(err) => {
                tracing::debug!(target: "vtree::adapter", %err, "drop rejected");
            }
        }
        cx.notify();
    }

    /// Source side of a drop into another tree.
    fn after_move_out(&mut self, event: &DropEvent) {
        let forest = &self.forest;
        self.selection.retain(|id| forest.contains(id));
        if self.cursor.as_deref().is_some_and(|id| !forest.contains(id)) {
            self.cursor = None;
        }
        self.notify_selection();
        self.dragged_ids.clear();
        self.rebuild_entries();
        self.notify_drop(event);
    }

    fn indicator_line(&self) -> Option<(Pixels, Pixels)> {
        let target = self.drop_target.as_ref()?;
        let (y, depth) = indicator_geometry(&self.layout, &self.entries, target)?;
        let scroll_y = self.scroll_handle.offset().y;
        Some((px(y) + scroll_y, self.indent_offset + self.indent_width * depth as f32))
    }
}

impl<T: 'static> Render for DndVTreeState<T> {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        if !cx.has_active_drag() {
            self.drop_target = None;
            self.dragged_ids.clear();
        }

        let render_item = Rc::clone(&self.render_item);
        let state_entity = cx.entity();
        let indicator_style = self.indicator_style;
        let drag_handle_width = self.drag_handle_width;
        let entry_sizes = self.entry_sizes.clone();
        let scroll_handle = self.scroll_handle.clone();
        let drag_enabled = self.capabilities.can_drag_and_drop;

        let line = self.indicator_line().map(|(y, x)| {
            let theme = cx.theme();
            let color = indicator_style.color.unwrap_or(theme.foreground);
            let thickness = indicator_style.thickness.max(px(1.));

            let line = div()
                .absolute()
                .left(x)
                .right_0()
                .top(y)
                .h(thickness)
                .bg(color);

            let cap = |width: Pixels, height: Pixels| {
                let cap_width = width.max(px(1.));
                let cap_height = height.max(px(1.));
                div()
                    .absolute()
                    .top((thickness - cap_height) / 2.0)
                    .w(cap_width)
                    .h(cap_height)
                    .bg(color)
            };

            match indicator_style.cap {
                DndVTreeIndicatorCap::None => line,
                DndVTreeIndicatorCap::StartBar { width, height } => {
                    line.child(cap(width, height).left(px(0.) - width.max(px(1.)) / 2.0))
                }
                DndVTreeIndicatorCap::StartAndEndBars { width, height } => line
                    .child(cap(width, height).left(px(0.) - width.max(px(1.)) / 2.0))
                    .child(cap(width, height).right_0()),
            }
        });

        div()
            .id("dnd-vtree-state")
            .size_full()
            .relative()
            .child(
                div()
                    .id("dnd-vtree-list")
                    .size_full()
                    .on_drag_move::<DndVTreeDrag<T>>(cx.listener(Self::on_drag_move))
                    .on_drop::<DndVTreeDrag<T>>(cx.listener(Self::on_drop_dragged))
                    .child(
                        v_virtual_list(cx.entity(), "entries", entry_sizes, move |state, visible_range: Range<usize>, window, cx| {
                            let drop_target_bg = cx.theme().drop_target;
                            let active_drag = cx.has_active_drag();
                            let mut rows = Vec::with_capacity(visible_range.len());
                            for ix in visible_range {
                                let Some(item) = state.entries.get(ix) else {
                                    continue;
                                };
                                let Some(node) = state.forest.find(&item.id) else {
                                    continue;
                                };

                                let drop_position = state
                                    .drop_target
                                    .as_ref()
                                    .filter(|target| target.row_id() == Some(item.id.as_str()))
                                    .and_then(DropTarget::position);
                                let editing = (state.renamer.editing_id() == Some(item.id.as_str()))
                                    .then(|| SharedString::from(state.renamer.draft().unwrap_or_default().to_string()));
                                let row_state = DndVTreeRowState {
                                    selected: state.selection.contains(&item.id),
                                    dragging: active_drag && state.dragged_ids.contains(&item.id),
                                    drop_position,
                                    editing,
                                };
                                let highlight = drop_position == Some(DropPosition::Child);
                                let selected = row_state.selected;

                                let entry = DndVTreeEntry { node, item };
                                let list_item = (render_item)(ix, &entry, row_state, window, cx);
                                let draggable = drag_enabled && DropPolicy::can_drag(&state.rules, node);
                                let item_id = item.id.clone();
                                let drag_value = DndVTreeDrag {
                                    tree_id: cx.entity_id(),
                                    source: cx.entity().downgrade(),
                                    label: node.name.clone().into(),
                                    session: Rc::new(RefCell::new(None)),
                                };

                                let start_drag = {
                                    let state_entity = state_entity.clone();
                                    move |drag: &DndVTreeDrag<T>, _cursor_offset: Point<Pixels>, _window: &mut Window, cx: &mut App| {
                                        state_entity.update(cx, |state, cx| {
                                            state.on_drag_start(drag, &item_id, cx);
                                        });
                                        let label = drag.label.clone();
                                        cx.new(|_| DragGhost::new(label))
                                    }
                                };

                                let row = div()
                                    .id(ix)
                                    .relative()
                                    .size_full()
                                    .flex()
                                    .flex_row()
                                    .when(highlight, |this| this.bg(drop_target_bg))
                                    .child(list_item.selected(selected).h_full().flex_1())
                                    .on_click(cx.listener(move |this, click_event, window, cx| {
                                        this.on_entry_click(ix, click_event, window, cx);
                                    }))
                                    .when(draggable, |this| match drag_handle_width {
                                        Some(handle_width) => this.child(
                                            div()
                                                .id(("dnd-vtree-handle", ix))
                                                .absolute()
                                                .top_0()
                                                .left_0()
                                                .bottom_0()
                                                .w(handle_width)
                                                .cursor(CursorStyle::OpenHand)
                                                .on_drag(drag_value, start_drag),
                                        ),
                                        None => this.on_drag(drag_value, start_drag),
                                    });

                                rows.push(row);
                            }
                            rows
                        })
                        .track_scroll(&scroll_handle)
                        .flex_grow()
                        .size_full()
                        .with_sizing_behavior(ListSizingBehavior::Auto)
                        .into_any_element(),
                    ),
            )
            .child(
                div()
                    .absolute()
                    .top_0()
                    .right_0()
                    .bottom_0()
                    .w(px(12.))
                    .child(Scrollbar::uniform_scroll(&self.scrollbar_state, &self.scroll_handle)),
            )
            .when_some(line, |this, line| this.child(line))
    }
}

/// A virtualized tree element with selection, rename and drag-and-drop.
#[derive(IntoElement)]
pub struct DndVTree<T: 'static> {
    id: ElementId,
    state: Entity<DndVTreeState<T>>,
    style: StyleRefinement,
    render_item: RenderItemFn<T>,
}

impl<T: 'static> DndVTree<T> {
    pub fn new<R>(state: &Entity<DndVTreeState<T>>, render_item: R) -> Self
    where
        R: Fn(usize, &DndVTreeEntry<'_, T>, DndVTreeRowState, &mut Window, &mut App) -> ListItem
            + 'static,
    {
        Self {
            id: ElementId::Name(format!("dnd-vtree-{}", state.entity_id()).into()),
            state: state.clone(),
            style: StyleRefinement::default(),
            render_item: Rc::new(move |ix, entry, row_state, window, cx| {
                render_item(ix, entry, row_state, window, cx)
            }),
        }
    }
}

impl<T: 'static> Styled for DndVTree<T> {
    fn style(&mut self) -> &mut StyleRefinement {
        &mut self.style
    }
}

impl<T: 'static> RenderOnce for DndVTree<T> {
    fn render(self, _window: &mut Window, cx: &mut App) -> impl IntoElement {
        let focus_handle = self.state.read(cx).focus_handle.clone();
        let state_entity = self.state.clone();
        self.state
            .update(cx, |state, _| state.render_item = self.render_item);

        div()
            .id(self.id)
            .key_context(CONTEXT)
            .track_focus(&focus_handle)
            .on_key_down(move |event, window, cx| {
                let handled = state_entity.update(cx, |state, cx| state.on_key_down(event, cx));
                if handled {
                    window.prevent_default();
                    cx.stop_propagation();
                }
            })
            .size_full()
            .child(self.state)
            .refine_style(&self.style)
    }
}

fn click_modifiers(modifiers: Modifiers) -> ClickModifiers {
    ClickModifiers {
        shift: modifiers.shift,
        toggle: modifiers.secondary(),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum RenameKey<'a> {
    Commit,
    Cancel,
    Backspace,
    Insert(&'a str),
    Ignore,
}

fn rename_key<'a>(key: &str, key_char: Option<&'a str>, modifiers: Modifiers) -> RenameKey<'a> {
    match key {
        "enter" => RenameKey::Commit,
        "escape" => RenameKey::Cancel,
        "backspace" => RenameKey::Backspace,
        _ if modifiers.control || modifiers.platform => RenameKey::Ignore,
        _ => match key_char {
            Some(text) if !text.chars().any(char::is_control) => RenameKey::Insert(text),
            _ => RenameKey::Ignore,
        },
    }
}

/// Content-space `y` and depth of the insertion line for `target`.
///
/// Child drops highlight the row instead and have no line.
fn indicator_geometry(
    layout: &RowLayout,
    entries: &[LinearItem],
    target: &DropTarget,
) -> Option<(f32, usize)> {
    match target {
        DropTarget::Root => Some((layout.content_height(), 0)),
        DropTarget::Row { id, position } => {
            let ix = index_of(entries, id)?;
            let depth = entries[ix].depth;
            match position {
                DropPosition::Above => Some((layout.row_top(ix), depth)),
                DropPosition::Below => Some((layout.row_top(subtree_end(entries, ix)), depth)),
                DropPosition::Child => None,
            }
        }
    }
}

fn sanitize_row_height(height: Pixels) -> Pixels {
    let h: f32 = height.into();
    if !h.is_finite() || h <= 0.0 {
        return px(1.);
    }
    height
}
