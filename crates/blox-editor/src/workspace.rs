//! The workspace: one block graph plus everything that coordinates edits to
//! it.
//!
//! Every user-level operation opens a [`MutationContext`], applies its graph
//! mutations, and hands the context back to [`Workspace::commit`], which
//! records undo history and dispatches the fired events to listeners.
//! Re-layout is deferred: mutations only mark trees dirty, and
//! [`Workspace::tick`] (or [`Workspace::flush_render`]) lays them out.

use crate::history::UndoStack;
use crate::metrics::MetricsManager;
use crate::replay::Replay;
use crate::warnings::WarningScheduler;
use blox_core::block::BlockRegistry;
use blox_core::comment::WorkspaceComments;
use blox_core::config::{DragConfig, GridOptions};
use blox_core::context::MutationContext;
use blox_core::error::{EventError, GraphError, VariableError};
use blox_core::events::{
    self, Click, ClickTarget, Event, EventKind, Selected, ViewportChange,
};
use blox_core::geometry::{Coordinate, Rect, Size};
use blox_core::graph::BlockGraph;
use blox_core::id::{BlockId, CommentId, ConnectionId, Uid, VariableId};
use blox_core::serialization::{self, BlockState, SaveOptions, WorkspaceState};
use blox_core::variables::VariableMap;
use blox_render::{RenderQueue, RenderTicket};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

/// Host-supplied workspace configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkspaceOptions {
    /// Blocks cannot be created, deleted, connected or moved.
    pub read_only: bool,
    /// Maximum number of recorded undo events.
    pub max_undo: usize,
    pub grid: GridOptions,
    pub drag: DragConfig,
}

impl Default for WorkspaceOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            max_undo: 1024,
            grid: GridOptions::default(),
            drag: DragConfig::default(),
        }
    }
}

/// Handle returned by [`Workspace::add_change_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type ChangeListener = Box<dyn FnMut(&mut Workspace, &Event)>;

pub struct Workspace {
    pub(crate) id: Uid,
    pub(crate) graph: BlockGraph,
    pub(crate) comments: WorkspaceComments,
    pub(crate) variables: VariableMap,
    pub(crate) options: WorkspaceOptions,
    pub(crate) render: RenderQueue,
    pub(crate) metrics: MetricsManager,
    pub(crate) history: UndoStack,
    listeners: Vec<(ListenerId, ChangeListener)>,
    next_listener: u64,
    /// Listeners removed while dispatch had them checked out.
    removed_listeners: Vec<ListenerId>,
    dispatch_queue: VecDeque<Event>,
    dispatching: bool,
    resize_suspended: u32,
    resize_pending: bool,
    pub(crate) dragging: bool,
    selected: Option<Uid>,
    warnings: WarningScheduler,
    clock_ms: u64,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("id", &self.id)
            .field("blocks", &self.graph.len())
            .field("comments", &self.comments.len())
            .field("listeners", &self.listeners.len())
            .field("dragging", &self.dragging)
            .finish_non_exhaustive()
    }
}

impl Workspace {
    pub fn new(registry: BlockRegistry, options: WorkspaceOptions) -> Self {
        let mut graph = BlockGraph::new(registry);
        graph.config = options.drag;
        Self {
            id: Uid::generate(),
            graph,
            comments: WorkspaceComments::default(),
            variables: VariableMap::default(),
            options,
            render: RenderQueue::new(),
            metrics: MetricsManager::default(),
            history: UndoStack::new(options.max_undo),
            listeners: Vec::new(),
            next_listener: 0,
            removed_listeners: Vec::new(),
            dispatch_queue: VecDeque::new(),
            dispatching: false,
            resize_suspended: 0,
            resize_pending: false,
            dragging: false,
            selected: None,
            warnings: WarningScheduler::default(),
            clock_ms: 0,
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    pub fn id(&self) -> Uid {
        self.id
    }

    pub fn graph(&self) -> &BlockGraph {
        &self.graph
    }

    pub fn comments(&self) -> &WorkspaceComments {
        &self.comments
    }

    pub fn variables(&self) -> &VariableMap {
        &self.variables
    }

    pub fn options(&self) -> &WorkspaceOptions {
        &self.options
    }

    pub fn history(&self) -> &UndoStack {
        &self.history
    }

    pub fn metrics(&self) -> &MetricsManager {
        &self.metrics
    }

    pub fn is_read_only(&self) -> bool {
        self.options.read_only
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn selected(&self) -> Option<Uid> {
        self.selected
    }

    // ─── Contexts & dispatch ─────────────────────────────────────────────

    /// A context for one user operation, in a fresh event group.
    pub fn begin(&self) -> MutationContext {
        self.begin_in_group(Some(MutationContext::new_group()))
    }

    /// A context continuing `group` (or ungrouped, for `None`).
    pub fn begin_in_group(&self, group: Option<String>) -> MutationContext {
        MutationContext::new(Some(self.id)).with_group(group)
    }

    /// Record and dispatch everything `ctx` fired.
    ///
    /// Listeners may edit the workspace and commit again; those events are
    /// queued behind the ones being dispatched, so every listener sees
    /// events in firing order.
    pub fn commit(&mut self, ctx: MutationContext) {
        let fired = ctx.into_events();
        for event in &fired {
            if event.record_undo && !event.is_null() {
                self.history.record(event.clone());
            }
        }
        self.dispatch_queue.extend(fired);
        if self.dispatching {
            return;
        }

        self.dispatching = true;
        let mut listeners = std::mem::take(&mut self.listeners);
        while let Some(event) = self.dispatch_queue.pop_front() {
            for (id, listener) in listeners.iter_mut() {
                if !self.removed_listeners.contains(id) {
                    listener(self, &event);
                }
            }
        }
        // Listeners added during dispatch went into the emptied list.
        listeners.append(&mut self.listeners);
        let removed = std::mem::take(&mut self.removed_listeners);
        listeners.retain(|(id, _)| !removed.contains(id));
        self.listeners = listeners;
        self.dispatching = false;
    }

    pub fn add_change_listener(
        &mut self,
        listener: impl FnMut(&mut Workspace, &Event) + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_change_listener(&mut self, id: ListenerId) {
        if self.dispatching {
            self.removed_listeners.push(id);
        }
        self.listeners.retain(|(l, _)| *l != id);
    }

    /// Run `f` in a fresh context and commit whatever it fired, even when
    /// it fails part-way.
    fn apply<R, E>(
        &mut self,
        f: impl FnOnce(&mut Self, &mut MutationContext) -> Result<R, E>,
    ) -> Result<R, E> {
        let mut ctx = self.begin();
        let result = f(self, &mut ctx);
        self.commit(ctx);
        result
    }

    // ─── Undo / redo ─────────────────────────────────────────────────────

    /// Undo (or redo) the newest group. Groups whose events all cancel out
    /// are skipped.
    pub fn undo(&mut self, redo: bool) -> Result<(), EventError> {
        loop {
            let group = self.history.pop_group(redo);
            if group.is_empty() {
                return Ok(());
            }
            let events = events::filter(&group, redo);
            if events.is_empty() {
                continue;
            }
            log::debug!(
                "{} {} event(s) of group {:?}",
                if redo { "redo" } else { "undo" },
                events.len(),
                events[0].group
            );
            for event in &events {
                event.run(self, redo)?;
            }
            return Ok(());
        }
    }

    pub fn discard_undo_group(&mut self, group: &str) {
        self.history.discard_group(group);
    }

    pub fn clear_undo(&mut self) {
        self.history.clear();
    }

    // ─── Blocks ──────────────────────────────────────────────────────────

    pub fn new_block(&mut self, block_type: &str, id: Option<&str>) -> Result<BlockId, GraphError> {
        let id = id.map(BlockId::intern);
        self.apply(|ws, ctx| ws.graph.new_block(ctx, block_type, id))
    }

    /// Build a block tree from saved state as a new top block.
    pub fn append_block(&mut self, state: &BlockState) -> Result<BlockId, GraphError> {
        self.apply(|ws, ctx| serialization::append(&mut ws.graph, ctx, state))
    }

    pub fn dispose_block(&mut self, id: BlockId, heal: bool) -> Result<(), GraphError> {
        if self.is_read_only() {
            return Ok(());
        }
        self.apply(|ws, ctx| ws.dispose_in(ctx, id, heal))
    }

    /// Dispose as part of an existing group (a drag that ended on the
    /// delete area).
    pub fn dispose_block_in_group(
        &mut self,
        id: BlockId,
        heal: bool,
        group: Option<String>,
    ) -> Result<(), GraphError> {
        if self.is_read_only() {
            return Ok(());
        }
        let mut ctx = self.begin_in_group(group);
        let result = self.dispose_in(&mut ctx, id, heal);
        self.commit(ctx);
        result
    }

    fn dispose_in(
        &mut self,
        ctx: &mut MutationContext,
        id: BlockId,
        heal: bool,
    ) -> Result<(), GraphError> {
        if self.selected == Some(id) {
            self.selected = None;
        }
        self.graph.dispose(ctx, id, heal)
    }

    pub fn connect(&mut self, a: ConnectionId, b: ConnectionId) -> Result<(), GraphError> {
        if self.is_read_only() {
            return Ok(());
        }
        self.apply(|ws, ctx| ws.graph.connect(ctx, a, b))
    }

    pub fn disconnect(&mut self, conn: ConnectionId) -> Result<(), GraphError> {
        if self.is_read_only() {
            return Ok(());
        }
        self.apply(|ws, ctx| ws.graph.disconnect(ctx, conn))
    }

    pub fn move_block_by(&mut self, id: BlockId, dx: f64, dy: f64) -> Result<(), GraphError> {
        if self.is_read_only() {
            return Ok(());
        }
        self.apply(|ws, ctx| ws.graph.move_by(ctx, id, dx, dy, &[]))
    }

    pub fn move_block_to(&mut self, id: BlockId, xy: Coordinate) -> Result<(), GraphError> {
        if self.is_read_only() {
            return Ok(());
        }
        self.apply(|ws, ctx| ws.graph.move_to(ctx, id, xy, &[]))
    }

    pub fn set_field_value(
        &mut self,
        id: BlockId,
        name: &str,
        value: Value,
    ) -> Result<(), GraphError> {
        self.apply(|ws, ctx| ws.graph.set_field_value(ctx, id, name, value))
    }

    pub fn set_collapsed(&mut self, id: BlockId, collapsed: bool) -> Result<(), GraphError> {
        self.apply(|ws, ctx| ws.graph.set_collapsed(ctx, id, collapsed))
    }

    pub fn set_enabled(&mut self, id: BlockId, enabled: bool) -> Result<(), GraphError> {
        self.apply(|ws, ctx| ws.graph.set_enabled(ctx, id, enabled))
    }

    pub fn set_inputs_inline(&mut self, id: BlockId, inline: bool) -> Result<(), GraphError> {
        self.apply(|ws, ctx| ws.graph.set_inputs_inline(ctx, id, inline))
    }

    pub fn set_block_comment(&mut self, id: BlockId, text: Option<String>) -> Result<(), GraphError> {
        self.apply(|ws, ctx| ws.graph.set_comment_text(ctx, id, text))
    }

    /// Set a block's warning. While a drag is active the update waits
    /// until the drag has ended.
    pub fn set_warning_text(&mut self, id: BlockId, text: Option<String>) -> Result<(), GraphError> {
        if !self.graph.contains(id) {
            return Err(GraphError::UnknownBlock(id));
        }
        if self.dragging {
            self.warnings.schedule(id, text, self.clock_ms);
            return Ok(());
        }
        self.graph.set_warning_text(id, text)
    }

    // ─── Comments ────────────────────────────────────────────────────────

    pub fn create_comment(&mut self, text: &str, xy: Coordinate) -> CommentId {
        let mut ctx = self.begin();
        let id = self.comments.create(&mut ctx, text, xy, None);
        self.commit(ctx);
        id
    }

    pub fn dispose_comment(&mut self, id: CommentId) -> bool {
        if self.is_read_only() {
            return false;
        }
        if self.selected == Some(id) {
            self.selected = None;
        }
        let mut ctx = self.begin();
        let removed = self.comments.dispose(&mut ctx, id);
        self.commit(ctx);
        removed
    }

    pub fn set_comment_text(&mut self, id: CommentId, text: &str) -> Result<(), GraphError> {
        self.apply(|ws, ctx| ws.comments.set_text(ctx, id, text))
    }

    pub fn move_comment_to(&mut self, id: CommentId, xy: Coordinate) -> Result<(), GraphError> {
        if self.is_read_only() {
            return Ok(());
        }
        self.apply(|ws, ctx| ws.comments.move_to(ctx, id, xy, &[]))
    }

    pub fn resize_comment(&mut self, id: CommentId, size: Size) -> Result<(), GraphError> {
        self.apply(|ws, ctx| ws.comments.resize(ctx, id, size))
    }

    pub fn set_comment_collapsed(&mut self, id: CommentId, collapsed: bool) -> Result<(), GraphError> {
        self.apply(|ws, ctx| ws.comments.set_collapsed(ctx, id, collapsed))
    }

    // ─── Variables ───────────────────────────────────────────────────────

    pub fn create_variable(
        &mut self,
        name: &str,
        var_type: &str,
        id: Option<&str>,
    ) -> Result<VariableId, VariableError> {
        let id = id.map(VariableId::intern);
        self.apply(|ws, ctx| ws.variables.create_variable(ctx, name, var_type, id))
    }

    pub fn rename_variable(&mut self, id: VariableId, new_name: &str) -> Result<(), VariableError> {
        self.apply(|ws, ctx| ws.variables.rename_variable(ctx, id, new_name))
    }

    pub fn delete_variable(&mut self, id: VariableId) -> Result<(), VariableError> {
        self.apply(|ws, ctx| ws.variables.delete_variable(ctx, id))
    }

    // ─── UI state ────────────────────────────────────────────────────────

    /// Select a block or comment (`None` clears the selection).
    pub fn select(&mut self, id: Option<Uid>) {
        if self.selected == id {
            return;
        }
        let old = std::mem::replace(&mut self.selected, id);
        let mut ctx = self.begin_in_group(None);
        ctx.fire(EventKind::Selected(Selected {
            old_element_id: old,
            new_element_id: id,
        }));
        self.commit(ctx);
    }

    /// Report a click on a block, or on the empty workspace for `None`.
    pub fn click(&mut self, block: Option<BlockId>) {
        let mut ctx = self.begin_in_group(None);
        ctx.fire(EventKind::Click(Click {
            block_id: block,
            target_type: if block.is_some() {
                ClickTarget::Block
            } else {
                ClickTarget::Workspace
            },
        }));
        self.commit(ctx);
    }

    /// Scroll and zoom. `scroll` is the workspace point at the viewport's
    /// top-left corner.
    pub fn set_viewport(&mut self, scroll: Coordinate, scale: f64) {
        let old_scale = self.metrics.scale;
        if self.metrics.scroll == scroll && old_scale == scale {
            return;
        }
        self.metrics.scroll = scroll;
        self.metrics.scale = scale;
        let mut ctx = self.begin_in_group(None);
        ctx.fire(EventKind::ViewportChange(ViewportChange {
            viewport_top: scroll.y,
            viewport_left: scroll.x,
            scale,
            old_scale,
        }));
        self.commit(ctx);
    }

    pub fn set_viewport_size(&mut self, size: Size) {
        self.metrics.viewport = size;
    }

    // ─── Persistence ─────────────────────────────────────────────────────

    pub fn save(&self) -> WorkspaceState {
        let options = SaveOptions {
            add_coordinates: true,
            ..SaveOptions::default()
        };
        WorkspaceState {
            blocks: self
                .graph
                .top_blocks()
                .iter()
                .filter_map(|root| serialization::save(&self.graph, *root, options))
                .collect(),
            comments: self.comments.iter().map(|c| c.save()).collect(),
            variables: self.variables.save(),
        }
    }

    /// Replace the workspace contents with `state`. Loading is not
    /// undoable; a `FinishedLoading` event follows the creates.
    pub fn load(&mut self, state: &WorkspaceState) -> Result<(), GraphError> {
        let mut ctx = self.begin().with_record_undo(false);
        let result = self.load_in(&mut ctx, state);
        ctx.fire(EventKind::FinishedLoading);
        self.commit(ctx);
        self.flush_render();
        log::debug!(
            "loaded {} top block(s), {} comment(s)",
            self.graph.top_blocks().len(),
            self.comments.len()
        );
        result
    }

    fn load_in(&mut self, ctx: &mut MutationContext, state: &WorkspaceState) -> Result<(), GraphError> {
        self.clear_in(ctx)?;
        for variable in &state.variables {
            self.variables
                .create_variable(ctx, &variable.name, &variable.var_type, Some(variable.id))?;
        }
        for block in &state.blocks {
            serialization::append(&mut self.graph, ctx, block)?;
        }
        for comment in &state.comments {
            self.comments.load(ctx, comment);
        }
        Ok(())
    }

    /// Delete every block, comment and variable as one undoable group.
    pub fn clear(&mut self) -> Result<(), GraphError> {
        self.apply(|ws, ctx| ws.clear_in(ctx))
    }

    fn clear_in(&mut self, ctx: &mut MutationContext) -> Result<(), GraphError> {
        for root in self.graph.top_blocks().to_vec() {
            self.graph.dispose(ctx, root, false)?;
        }
        let comments: Vec<CommentId> = self.comments.iter().map(|c| c.id).collect();
        for id in comments {
            self.comments.dispose(ctx, id);
        }
        let variables: Vec<VariableId> = self.variables.all().iter().map(|v| v.id).collect();
        for id in variables {
            self.variables.delete_variable(ctx, id)?;
        }
        self.selected = None;
        Ok(())
    }

    // ─── Rendering & metrics ─────────────────────────────────────────────

    /// Queue the tree containing `id` for the next layout pass.
    pub fn queue_render(&mut self, id: BlockId) -> RenderTicket {
        self.render.queue(id)
    }

    pub fn is_render_complete(&self, ticket: RenderTicket) -> bool {
        self.render.is_complete(ticket)
    }

    /// Lay out every dirty tree now.
    pub fn flush_render(&mut self) {
        if self.render.is_pending(&self.graph) {
            self.render.flush(&mut self.graph);
        }
        self.resize_contents();
    }

    /// Hold off content-bounds recomputation (nests).
    pub fn suspend_resizes(&mut self) {
        self.resize_suspended += 1;
    }

    pub fn resume_resizes(&mut self) {
        self.resize_suspended = self.resize_suspended.saturating_sub(1);
        if self.resize_suspended == 0 && self.resize_pending {
            self.resize_contents();
        }
    }

    pub fn resize_contents(&mut self) {
        if self.resize_suspended > 0 {
            self.resize_pending = true;
            return;
        }
        self.resize_pending = false;
        self.metrics.update_content(&self.graph);
    }

    /// The scrollable area, once content bounds are known.
    pub fn content_bounds(&self) -> Option<Rect> {
        self.metrics.content.map(|_| self.metrics.scroll_metrics())
    }

    /// Advance the workspace clock: apply due warning updates (held back
    /// again while a drag is still active) and flush pending layout.
    pub fn tick(&mut self, now_ms: u64) {
        self.clock_ms = now_ms;
        for (id, text) in self.warnings.take_due(now_ms) {
            if self.dragging {
                self.warnings.schedule(id, text, now_ms);
            } else if let Err(err) = self.graph.set_warning_text(id, text) {
                log::warn!("dropping warning update: {err}");
            }
        }
        self.flush_render();
    }
}
