//! Dragging blocks.
//!
//! Picking a block up detaches it (and, when healing, closes the gap it
//! leaves). While it moves, the strategy keeps one connection candidate:
//! the closest compatible pairing between the dragged stack and the rest of
//! the workspace. Dropping commits that candidate with a regular `connect`.
//!
//! Shadow blocks are never dragged on their own; the nearest real ancestor
//! is dragged instead, keeping the pointer's grip offset.

use crate::drag::{ConnectionCandidate, DragError, DragState, DragStrategy, Preview};
use crate::input::Modifiers;
use crate::metrics::bump_into_bounds;
use crate::workspace::Workspace;
use blox_core::connection::ConnectionType;
use blox_core::context::MutationContext;
use blox_core::events::{BlockDrag, EventKind, PendingMove};
use blox_core::geometry::Coordinate;
use blox_core::graph::BlockGraph;
use blox_core::id::{BlockId, ConnectionId};
use smallvec::SmallVec;

#[derive(Debug)]
pub struct BlockDragStrategy {
    /// The block that was picked up.
    block: BlockId,
    /// The block actually moved: `block`, or its nearest real ancestor.
    dragged: BlockId,
    /// `dragged` position minus `block` position.
    drag_offset: Coordinate,
    state: DragState,
    group: Option<String>,
    start_loc: Coordinate,
    start_parent_conn: Option<ConnectionId>,
    start_child_conn: Option<ConnectionId>,
    candidate: Option<ConnectionCandidate>,
    preview: Preview,
}

impl BlockDragStrategy {
    pub fn new(block: BlockId) -> Self {
        Self {
            block,
            dragged: block,
            drag_offset: Coordinate::ZERO,
            state: DragState::Idle,
            group: None,
            start_loc: Coordinate::ZERO,
            start_parent_conn: None,
            start_child_conn: None,
            candidate: None,
            preview: Preview::None,
        }
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    /// The block that moves with the pointer.
    pub fn dragged(&self) -> BlockId {
        self.dragged
    }

    pub fn candidate(&self) -> Option<ConnectionCandidate> {
        self.candidate
    }

    pub fn preview(&self) -> Preview {
        self.preview
    }

    /// Nearest non-shadow block at or above `id`.
    fn delegate(graph: &BlockGraph, id: BlockId) -> Option<BlockId> {
        let mut current = id;
        loop {
            let block = graph.block(current)?;
            if !block.shadow {
                return Some(current);
            }
            current = graph.parent(current)?;
        }
    }

    fn begin(&self, ws: &Workspace) -> MutationContext {
        ws.begin_in_group(self.group.clone())
    }

    fn fire_drag(&self, ws: &Workspace, ctx: &mut MutationContext, is_start: bool) {
        ctx.fire(EventKind::BlockDrag(BlockDrag {
            block_id: self.dragged,
            is_start,
            blocks: ws.graph.descendants(self.dragged),
        }));
    }

    // ─── Start ───────────────────────────────────────────────────────────

    fn should_heal(graph: &BlockGraph, id: BlockId, modifiers: Modifiers) -> bool {
        modifiers.heal_stack()
            && graph
                .next_block(id)
                .and_then(|next| graph.block(next))
                .is_some_and(|next| !next.shadow)
    }

    /// Detach from the parent, remembering where the block came from.
    fn disconnect(
        &mut self,
        ws: &mut Workspace,
        ctx: &mut MutationContext,
        heal: bool,
    ) -> Result<(), DragError> {
        let graph = &ws.graph;
        if graph.parent(self.dragged).is_none() && !heal {
            return Ok(());
        }
        let Some(block) = graph.block(self.dragged) else {
            return Ok(());
        };
        let target = |conn: Option<ConnectionId>| {
            conn.and_then(|c| graph.connection(c)).and_then(|c| c.target)
        };
        self.start_parent_conn = target(block.output).or_else(|| target(block.previous));
        if heal {
            self.start_child_conn = target(block.next);
        }
        ws.graph.unplug(ctx, self.dragged, heal)?;
        Ok(())
    }

    // ─── Candidate search ────────────────────────────────────────────────

    /// Connections of the dragged stack that may form a candidate: the
    /// block's own, plus the free next connection at the bottom of its
    /// stack.
    fn local_connections(graph: &BlockGraph, id: BlockId) -> SmallVec<[ConnectionId; 8]> {
        let Some(block) = graph.block(id) else {
            return SmallVec::new();
        };
        let mut local = block.connections(false);
        if let Some(last) = graph.last_connection_in_stack(id, true)
            && Some(last) != block.next
        {
            local.push(last);
        }
        local
    }

    fn search_candidate(&self, graph: &mut BlockGraph, delta: Coordinate) -> Option<ConnectionCandidate> {
        let mut radius = if self.candidate.is_some() {
            graph.config.connecting_snap_radius
        } else {
            graph.config.snap_radius
        };
        let mut found = None;
        for local in Self::local_connections(graph, self.dragged) {
            let closest = graph.closest(local, radius, delta);
            if let Some(neighbour) = closest.connection {
                found = Some(ConnectionCandidate {
                    local,
                    neighbour,
                    distance: closest.radius,
                });
                radius = closest.radius;
            }
        }
        found
    }

    /// The held candidate wins unless the new one is closer by more than
    /// the preference margin.
    fn current_is_better(
        graph: &BlockGraph,
        current: &ConnectionCandidate,
        delta: Coordinate,
        new: &ConnectionCandidate,
    ) -> bool {
        let (Some(local), Some(neighbour)) = (
            graph.connection(current.local),
            graph.connection(current.neighbour),
        ) else {
            return false;
        };
        let current_distance = Coordinate::distance(local.position() + delta, neighbour.position());
        new.distance > current_distance - graph.config.current_connection_preference
    }

    fn update_candidate(&mut self, graph: &mut BlockGraph, delta: Coordinate) {
        let Some(new) = self.search_candidate(graph, delta) else {
            self.candidate = None;
            self.preview = Preview::None;
            return;
        };
        let chosen = match self.candidate {
            Some(current) if Self::current_is_better(graph, &current, delta, &new) => current,
            _ => new,
        };
        if self.candidate != Some(chosen) {
            log::trace!(
                "drag candidate {:?} -> {:?} ({:.1})",
                chosen.local,
                chosen.neighbour,
                chosen.distance
            );
        }
        self.candidate = Some(chosen);
        self.preview = Self::preview_for(graph, self.dragged, chosen);
    }

    /// `Replace` when dropping would oust a real block from the neighbour
    /// and that block cannot rejoin at the end of the dragged stack.
    fn preview_for(graph: &BlockGraph, dragged: BlockId, candidate: ConnectionCandidate) -> Preview {
        let local_kind = graph.connection(candidate.local).map(|c| c.kind);
        let plugs_in = matches!(
            local_kind,
            Some(ConnectionType::OutputValue | ConnectionType::PreviousStatement)
        );
        let occupant = graph
            .target_block(candidate.neighbour)
            .filter(|b| !b.shadow && !b.insertion_marker);
        if plugs_in && let Some(orphan) = occupant {
            let orphan_conn = if local_kind == Some(ConnectionType::OutputValue) {
                orphan.output
            } else {
                orphan.previous
            };
            let fits_at_end = orphan_conn
                .and_then(|c| graph.connection_for_orphaned_connection(dragged, c))
                .is_some();
            if !fits_at_end {
                return Preview::Replace {
                    candidate,
                    orphan: orphan.id,
                };
            }
        }
        Preview::Connect(candidate)
    }

    // ─── Finish ──────────────────────────────────────────────────────────

    fn release(&mut self, ws: &mut Workspace) {
        ws.graph.set_dragging(self.dragged, false);
        ws.dragging = false;
    }

    fn settle(&self, ws: &mut Workspace, ctx: &mut MutationContext) -> Result<(), DragError> {
        if let Some(spacing) = ws.options.grid.snap_spacing() {
            ws.graph.snap_to_grid(ctx, self.dragged, spacing)?;
        }
        ws.graph.bump_neighbours(ctx, self.dragged)?;
        Ok(())
    }

    fn restore(&self, ws: &mut Workspace, ctx: &mut MutationContext) -> Result<(), DragError> {
        let Some(block) = ws.graph.block(self.dragged) else {
            return Ok(());
        };
        let (output, previous, next) = (block.output, block.previous, block.next);

        if let (Some(child), Some(next)) = (self.start_child_conn, next) {
            ws.graph.connect(ctx, next, child)?;
        }
        let Some(parent) = self.start_parent_conn else {
            ws.graph
                .move_to(ctx, self.dragged, self.start_loc, &["drag"])?;
            if let Some(bounds) = ws.content_bounds() {
                bump_into_bounds(&mut ws.graph, ctx, &bounds, self.dragged)?;
            }
            return Ok(());
        };
        let local = match ws.graph.connection(parent).map(|c| c.kind) {
            Some(ConnectionType::InputValue) => output,
            Some(ConnectionType::NextStatement) => previous,
            _ => None,
        };
        if let Some(local) = local {
            ws.graph.connect(ctx, parent, local)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.state = DragState::Idle;
        self.start_parent_conn = None;
        self.start_child_conn = None;
        self.candidate = None;
        self.preview = Preview::None;
    }
}

impl DragStrategy for BlockDragStrategy {
    fn is_movable(&self, ws: &Workspace) -> bool {
        !ws.is_read_only()
            && Self::delegate(&ws.graph, self.block)
                .and_then(|id| ws.graph.block(id))
                .is_some_and(|b| b.is_movable())
    }

    fn start_drag(&mut self, ws: &mut Workspace, modifiers: Modifiers) -> Result<bool, DragError> {
        if self.state == DragState::Dragging {
            return Err(DragError::AlreadyDragging);
        }
        if !self.is_movable(ws) {
            return Ok(false);
        }
        let Some(dragged) = Self::delegate(&ws.graph, self.block) else {
            return Ok(false);
        };
        self.dragged = dragged;
        self.drag_offset =
            ws.graph.relative_to_surface(dragged) - ws.graph.relative_to_surface(self.block);
        self.group = Some(MutationContext::new_group());

        let mut ctx = self.begin(ws);
        self.fire_drag(ws, &mut ctx, true);
        self.start_loc = ws.graph.relative_to_surface(dragged);
        ws.suspend_resizes();

        let heal = Self::should_heal(&ws.graph, dragged, modifiers);
        let detached = self.disconnect(ws, &mut ctx, heal);
        ws.graph.set_dragging(dragged, true);
        ws.dragging = true;
        ws.commit(ctx);
        if let Err(err) = detached {
            self.release(ws);
            ws.resume_resizes();
            self.reset();
            return Err(err);
        }

        self.state = DragState::Dragging;
        log::debug!("block drag start: {dragged} (heal: {heal})");
        Ok(true)
    }

    fn drag(&mut self, ws: &mut Workspace, new_location: Coordinate) -> Result<(), DragError> {
        if self.state != DragState::Dragging {
            return Err(DragError::NotDragging);
        }
        let target = new_location + self.drag_offset;
        ws.graph.move_during_drag(self.dragged, target);
        let delta = target - self.start_loc;
        self.update_candidate(&mut ws.graph, delta);
        Ok(())
    }

    fn end_drag(&mut self, ws: &mut Workspace) -> Result<(), DragError> {
        if self.state != DragState::Dragging {
            return Err(DragError::NotDragging);
        }
        let mut ctx = self.begin(ws);
        self.fire_drag(ws, &mut ctx, false);
        let pending = PendingMove::capture(&ws.graph, self.dragged)
            .with_old_coordinate(self.start_loc)
            .with_reason(&["drag"]);
        self.release(ws);
        ctx.fire_event(pending.record_new(&ws.graph));

        let connected = match self.candidate {
            Some(candidate) => ws
                .graph
                .connect(&mut ctx, candidate.local, candidate.neighbour)
                .map_err(DragError::from),
            None => Ok(()),
        };
        let result = connected.and_then(|()| self.settle(ws, &mut ctx));

        ws.resume_resizes();
        ws.commit(ctx);
        log::debug!(
            "block drag end: {} (connected: {})",
            self.dragged,
            self.candidate.is_some()
        );
        self.reset();
        result
    }

    fn revert_drag(&mut self, ws: &mut Workspace) -> Result<(), DragError> {
        if self.state != DragState::Dragging {
            return Err(DragError::NotDragging);
        }
        let mut ctx = self.begin(ws);
        self.release(ws);
        self.fire_drag(ws, &mut ctx, false);
        let result = self.restore(ws, &mut ctx);

        ws.resume_resizes();
        ws.commit(ctx);
        if let Some(group) = &self.group {
            ws.discard_undo_group(group);
        }
        log::debug!("block drag reverted: {}", self.dragged);
        self.reset();
        result
    }

    fn state(&self) -> DragState {
        self.state
    }

    fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceOptions;
    use blox_core::block::{BlockDefinition, BlockRegistry};
    use blox_core::serialization::{BlockState, ConnectionState};
    use pretty_assertions::assert_eq;

    fn workspace() -> Workspace {
        let mut registry = BlockRegistry::new();
        registry.define(BlockDefinition::new("stmt").previous(None).next(None));
        registry.define(BlockDefinition::new("num").output(Some(&["Number"])));
        registry.define(
            BlockDefinition::new("holder")
                .previous(None)
                .next(None)
                .value_input("VALUE", Some(&["Number"])),
        );
        Workspace::new(registry, WorkspaceOptions::default())
    }

    fn at(ws: &mut Workspace, ty: &str, x: f64, y: f64) -> BlockId {
        let id = ws.new_block(ty, None).unwrap();
        ws.move_block_to(id, Coordinate::new(x, y)).unwrap();
        id
    }

    #[test]
    fn shadow_drags_its_parent() {
        let mut ws = workspace();
        let state = BlockState::new("holder").at(100.0, 100.0).with_input(
            "VALUE",
            ConnectionState::with_shadow(BlockState::new("num").with_id("shadow_num")),
        );
        let holder = ws.append_block(&state).unwrap();
        let shadow = BlockId::intern("shadow_num");
        let grip = ws.graph().relative_to_surface(shadow);

        let mut strategy = BlockDragStrategy::new(shadow);
        assert!(strategy.start_drag(&mut ws, Modifiers::NONE).unwrap());
        assert_eq!(strategy.dragged(), holder);

        strategy
            .drag(&mut ws, grip.translate(10.0, 0.0))
            .unwrap();
        assert_eq!(
            ws.graph().block(holder).unwrap().xy,
            Coordinate::new(110.0, 100.0)
        );
        strategy.end_drag(&mut ws).unwrap();
        assert_eq!(ws.graph().parent(shadow), Some(holder));
    }

    #[test]
    fn candidate_requires_snap_radius() {
        let mut ws = workspace();
        let target = at(&mut ws, "stmt", 0.0, 0.0);
        let dragged = at(&mut ws, "stmt", 300.0, 300.0);
        let target_next = ws.graph().block(target).unwrap().next.unwrap();
        let below = ws.graph().connection(target_next).unwrap().position();

        let mut strategy = BlockDragStrategy::new(dragged);
        strategy.start_drag(&mut ws, Modifiers::NONE).unwrap();
        strategy
            .drag(&mut ws, below.translate(100.0, 0.0))
            .unwrap();
        assert_eq!(strategy.candidate(), None);

        strategy.drag(&mut ws, below.translate(3.0, 4.0)).unwrap();
        let candidate = strategy.candidate().unwrap();
        assert_eq!(candidate.neighbour, target_next);
        assert_eq!(candidate.distance, 5.0);
        assert!(matches!(strategy.preview(), Preview::Connect(_)));
    }

    #[test]
    fn ending_without_candidate_leaves_a_top_block() {
        let mut ws = workspace();
        let id = at(&mut ws, "stmt", 0.0, 0.0);
        let mut strategy = BlockDragStrategy::new(id);
        strategy.start_drag(&mut ws, Modifiers::NONE).unwrap();
        strategy.drag(&mut ws, Coordinate::new(50.0, 60.0)).unwrap();
        strategy.end_drag(&mut ws).unwrap();

        assert_eq!(strategy.state(), DragState::Idle);
        assert_eq!(ws.graph().block(id).unwrap().xy, Coordinate::new(50.0, 60.0));
        assert!(!ws.is_dragging());
        assert!(ws.graph().block(id).unwrap().previous.is_some_and(|p| ws
            .graph()
            .db(ConnectionType::PreviousStatement)
            .contains(p)));
    }

    #[test]
    fn drag_calls_outside_a_drag_are_errors() {
        let mut ws = workspace();
        let id = at(&mut ws, "stmt", 0.0, 0.0);
        let mut strategy = BlockDragStrategy::new(id);
        assert!(matches!(
            strategy.drag(&mut ws, Coordinate::ZERO),
            Err(DragError::NotDragging)
        ));
        strategy.start_drag(&mut ws, Modifiers::NONE).unwrap();
        assert!(matches!(
            strategy.start_drag(&mut ws, Modifiers::NONE),
            Err(DragError::AlreadyDragging)
        ));
    }

    #[test]
    fn immovable_block_is_not_picked_up() {
        let mut ws = workspace();
        let id = at(&mut ws, "stmt", 0.0, 0.0);
        ws.graph.block_mut(id).unwrap().movable = false;
        let mut strategy = BlockDragStrategy::new(id);
        assert!(!strategy.start_drag(&mut ws, Modifiers::NONE).unwrap());
        assert_eq!(strategy.state(), DragState::Idle);
    }
}
