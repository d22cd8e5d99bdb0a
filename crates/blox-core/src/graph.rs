//! The block graph: every block of a workspace, the connections that join
//! them, and the spatial index used to find connection candidates.
//!
//! Blocks live in a `StableDiGraph` with edges from parent to child. Each
//! edge carries the parent-side connection the child is plugged into, so
//! `parent_connection` is a single edge lookup. The connections themselves
//! (with their reciprocal `target` links) are the source of truth; the edge
//! set mirrors them.

use crate::block::{Block, BlockRegistry, Input, InputKind};
use crate::config::DragConfig;
use crate::connection::{
    Check, Closest, Connectability, Connection, ConnectionArena, ConnectionChecker,
    ConnectionType, DefaultConnectionChecker,
};
use crate::connection_db::ConnectionDb;
use crate::context::MutationContext;
use crate::error::{ConnectionError, GraphError};
use crate::events::{BlockChange, BlockCreate, BlockDelete, ChangeElement, EventKind, PendingMove};
use crate::geometry::{Coordinate, Rect};
use crate::id::{BlockId, ConnectionId, Uid};
use crate::layout;
use crate::serialization::{self, BlockState, SaveOptions};
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use serde_json::Value;
use std::collections::HashMap;

/// Where a block sits: under a parent (by input name, `None` for a next
/// connection) or at a workspace coordinate.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockLocation {
    pub parent_id: Option<BlockId>,
    pub input_name: Option<String>,
    pub coordinate: Option<Coordinate>,
}

/// Round a coordinate to the grid, whose points sit half a pitch in.
pub fn snap_coordinate(xy: Coordinate, spacing: f64) -> Coordinate {
    let half = spacing / 2.0;
    let snap = |v: f64| ((v - half) / spacing).round() * spacing + half;
    Coordinate::new(snap(xy.x), snap(xy.y))
}

#[derive(Debug)]
pub struct BlockGraph {
    /// Parent → child edges, weighted with the parent-side connection.
    pub graph: StableDiGraph<Block, ConnectionId>,
    pub id_index: HashMap<BlockId, NodeIndex>,
    pub(crate) connections: ConnectionArena,
    dbs: [ConnectionDb; 4],
    /// Root blocks in creation order.
    top_blocks: Vec<BlockId>,
    registry: BlockRegistry,
    checker: Box<dyn ConnectionChecker>,
    pub config: DragConfig,
    /// Roots whose layout is stale.
    dirty: Vec<BlockId>,
}

impl Default for BlockGraph {
    fn default() -> Self {
        Self::new(BlockRegistry::default())
    }
}

impl BlockGraph {
    #[must_use]
    pub fn new(registry: BlockRegistry) -> Self {
        Self {
            graph: StableDiGraph::new(),
            id_index: HashMap::new(),
            connections: ConnectionArena::default(),
            dbs: Default::default(),
            top_blocks: Vec::new(),
            registry,
            checker: Box::new(DefaultConnectionChecker),
            config: DragConfig::default(),
            dirty: Vec::new(),
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut BlockRegistry {
        &mut self.registry
    }

    pub fn checker(&self) -> &dyn ConnectionChecker {
        self.checker.as_ref()
    }

    pub fn set_checker(&mut self, checker: Box<dyn ConnectionChecker>) {
        self.checker = checker;
    }

    pub fn connections(&self) -> &ConnectionArena {
        &self.connections
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    /// The spatial database holding connections of `kind`.
    pub fn db(&self, kind: ConnectionType) -> &ConnectionDb {
        &self.dbs[kind.db_index()]
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.id_index.contains_key(&id)
    }

    pub fn index_of(&self, id: BlockId) -> Option<NodeIndex> {
        self.id_index.get(&id).copied()
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.id_index.get(&id).map(|idx| &self.graph[*idx])
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.id_index
            .get(&id)
            .copied()
            .map(|idx| &mut self.graph[idx])
    }

    fn require(&self, id: BlockId) -> Result<&Block, GraphError> {
        self.block(id).ok_or(GraphError::UnknownBlock(id))
    }

    fn require_mut(&mut self, id: BlockId) -> Result<&mut Block, GraphError> {
        self.block_mut(id).ok_or(GraphError::UnknownBlock(id))
    }

    /// The block owning connection `conn`.
    pub fn block_of(&self, conn: ConnectionId) -> Option<&Block> {
        self.connections
            .get(conn)
            .and_then(|c| self.block(c.source_block))
    }

    /// The block on the other end of `conn`.
    pub fn target_block(&self, conn: ConnectionId) -> Option<&Block> {
        self.connections
            .get(conn)
            .and_then(|c| c.target)
            .and_then(|t| self.block_of(t))
    }

    pub fn is_connected(&self, conn: ConnectionId) -> bool {
        self.connections
            .get(conn)
            .is_some_and(Connection::is_connected)
    }

    pub fn len(&self) -> usize {
        self.id_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_index.is_empty()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.graph.node_weights()
    }

    pub fn top_blocks(&self) -> &[BlockId] {
        &self.top_blocks
    }

    // ─── Traversal ───────────────────────────────────────────────────────

    pub fn parent(&self, id: BlockId) -> Option<BlockId> {
        let idx = self.index_of(id)?;
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .next()
            .map(|p| self.graph[p].id)
    }

    /// The parent-side connection this block is plugged into.
    pub fn parent_connection(&self, id: BlockId) -> Option<ConnectionId> {
        let idx = self.index_of(id)?;
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .next()
            .map(|edge| *edge.weight())
    }

    /// Children in connection order: inputs first, then the next block.
    pub fn children(&self, id: BlockId) -> Vec<BlockId> {
        let Some(block) = self.block(id) else {
            return Vec::new();
        };
        block
            .inputs
            .iter()
            .filter_map(|i| i.connection)
            .chain(block.next)
            .filter_map(|c| self.target_block(c).map(|b| b.id))
            .collect()
    }

    pub fn next_block(&self, id: BlockId) -> Option<BlockId> {
        let next = self.block(id)?.next?;
        self.target_block(next).map(|b| b.id)
    }

    /// The block above in a stack, which may be the parent of a statement
    /// input.
    pub fn previous_block(&self, id: BlockId) -> Option<BlockId> {
        let previous = self.block(id)?.previous?;
        self.target_block(previous).map(|b| b.id)
    }

    pub fn root(&self, id: BlockId) -> BlockId {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// The block and everything below it, in pre-order.
    pub fn descendants(&self, id: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            out.push(current);
            let children = self.children(current);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    pub fn is_ancestor_of(&self, ancestor: BlockId, descendant: BlockId) -> bool {
        let mut current = descendant;
        while let Some(parent) = self.parent(current) {
            if parent == ancestor {
                return true;
            }
            current = parent;
        }
        false
    }

    /// The last next connection down this block's stack, stopping at an
    /// empty slot (or at a shadow when `ignore_shadows`).
    pub fn last_connection_in_stack(
        &self,
        id: BlockId,
        ignore_shadows: bool,
    ) -> Option<ConnectionId> {
        let mut next = self.block(id)?.next;
        while let Some(conn) = next {
            match self.target_block(conn) {
                Some(block) if !(ignore_shadows && block.shadow) => next = block.next,
                _ => return Some(conn),
            }
        }
        None
    }

    /// The value input, if exactly one value input is occupied.
    pub fn only_value_connection(&self, id: BlockId) -> Option<ConnectionId> {
        let block = self.block(id)?;
        let mut found = None;
        for conn in block.inputs.iter().filter_map(|i| i.connection) {
            let Some(c) = self.connections.get(conn) else {
                continue;
            };
            if c.kind == ConnectionType::InputValue && c.is_connected() {
                if found.is_some() {
                    return None;
                }
                found = Some(conn);
            }
        }
        found
    }

    /// Name of the input of `parent` that holds `child`.
    pub fn input_with_block(&self, parent: BlockId, child: BlockId) -> Option<&str> {
        let conn = self.parent_connection(child)?;
        if self.connections.get(conn)?.source_block != parent {
            return None;
        }
        self.block(parent)?.input_name_for(conn)
    }

    /// The connection a block is attached to a parent by.
    pub fn parent_facing_connection(&self, id: BlockId) -> Result<ConnectionId, GraphError> {
        let block = self.require(id)?;
        block
            .output
            .or(block.previous)
            .ok_or_else(|| GraphError::NoParentConnection(block.block_type.clone()))
    }

    /// Absolute workspace position of the block's top-left corner.
    pub fn relative_to_surface(&self, id: BlockId) -> Coordinate {
        let mut xy = Coordinate::ZERO;
        let mut current = Some(id);
        while let Some(block_id) = current {
            if let Some(block) = self.block(block_id) {
                xy = xy + block.xy;
            }
            current = self.parent(block_id);
        }
        xy
    }

    pub fn location(&self, id: BlockId) -> BlockLocation {
        match self.parent_connection(id) {
            Some(conn) => {
                let parent = self.connections.get(conn).map(|c| c.source_block);
                let input_name = parent
                    .and_then(|p| self.block(p))
                    .and_then(|p| p.input_name_for(conn))
                    .map(str::to_owned);
                BlockLocation {
                    parent_id: parent,
                    input_name,
                    coordinate: None,
                }
            }
            None => BlockLocation {
                parent_id: None,
                input_name: None,
                coordinate: self.block(id).map(|b| b.xy),
            },
        }
    }

    pub fn bounding_rect(&self, id: BlockId) -> Option<Rect> {
        let block = self.block(id)?;
        Some(Rect::from_origin_size(
            self.relative_to_surface(id),
            block.size,
        ))
    }

    /// Bounds of the block together with everything attached below it.
    pub fn stack_bounds(&self, id: BlockId) -> Option<Rect> {
        self.descendants(id)
            .into_iter()
            .filter_map(|b| self.bounding_rect(b))
            .reduce(|acc, r| acc.union(&r))
    }

    // ─── Connection search ───────────────────────────────────────────────

    pub fn can_connect(
        &self,
        a: ConnectionId,
        b: ConnectionId,
        is_dragging: bool,
        distance: f64,
    ) -> bool {
        self.checker.can_connect(self, a, b, is_dragging, distance)
    }

    /// The closest compatible connection to `conn` displaced by `delta`,
    /// within `max_radius`. `conn` is restored to its position afterwards.
    pub fn closest(&mut self, conn: ConnectionId, max_radius: f64, delta: Coordinate) -> Closest {
        let Some(c) = self.connections.get(conn) else {
            return Closest {
                connection: None,
                radius: max_radius,
            };
        };
        let (base, kind) = (c.position(), c.kind);
        let moved = base + delta;
        self.connections[conn].x = moved.x;
        self.connections[conn].y = moved.y;
        let result = self.dbs[kind.opposite().db_index()].search_for_closest(self, conn, max_radius);
        self.connections[conn].x = base.x;
        self.connections[conn].y = base.y;
        result
    }

    /// Tracked connections of any type within `radius` of `conn`.
    pub fn neighbours(&self, conn: ConnectionId, radius: f64) -> Vec<ConnectionId> {
        let Some(c) = self.connections.get(conn) else {
            return Vec::new();
        };
        let position = c.position();
        self.dbs
            .iter()
            .flat_map(|db| db.neighbours(&self.connections, position, radius))
            .filter(|other| *other != conn)
            .collect()
    }

    // ─── Tracking & positions ────────────────────────────────────────────

    fn set_tracked(&mut self, conn: ConnectionId, tracked: bool) {
        let Some(c) = self.connections.get(conn) else {
            return;
        };
        if c.tracked == tracked {
            return;
        }
        let db = c.kind.db_index();
        if tracked {
            self.connections[conn].tracked = true;
            self.dbs[db].add(&self.connections, conn);
        } else {
            self.dbs[db].remove(&self.connections, conn);
            self.connections[conn].tracked = false;
        }
    }

    fn set_position(&mut self, conn: ConnectionId, position: Coordinate) {
        let Some(c) = self.connections.get(conn) else {
            return;
        };
        if c.position() == position {
            return;
        }
        let (tracked, db) = (c.tracked, c.kind.db_index());
        if tracked {
            self.dbs[db].remove(&self.connections, conn);
        }
        self.connections[conn].x = position.x;
        self.connections[conn].y = position.y;
        if tracked {
            self.dbs[db].add(&self.connections, conn);
        }
    }

    /// Recompute absolute connection positions of the subtree from block
    /// offsets.
    pub(crate) fn refresh_positions(&mut self, id: BlockId) {
        let origin = self.relative_to_surface(id);
        self.refresh_positions_from(id, origin);
    }

    fn refresh_positions_from(&mut self, id: BlockId, origin: Coordinate) {
        let Some(block) = self.block(id) else {
            return;
        };
        for conn in block.connections(true) {
            if let Some(offset) = self.connections.get(conn).map(|c| c.offset) {
                self.set_position(conn, origin + offset);
            }
        }
        for child in self.children(id) {
            if let Some(xy) = self.block(child).map(|b| b.xy) {
                self.refresh_positions_from(child, origin + xy);
            }
        }
    }

    /// Add or remove the subtree's connections from the spatial index.
    /// Connections hidden inside a collapsed block stay untracked.
    pub fn set_connection_tracking(&mut self, id: BlockId, track: bool) {
        let Some(block) = self.block(id) else {
            return;
        };
        let hidden = block.collapsed;
        let own: Vec<ConnectionId> = block.output.into_iter().chain(block.previous).collect();
        let inputs: Vec<ConnectionId> = block.inputs.iter().filter_map(|i| i.connection).collect();
        let next = block.next;

        for conn in own {
            self.set_tracked(conn, track);
        }
        for conn in inputs {
            self.set_tracked(conn, track && !hidden);
            if let Some(child) = self.target_block(conn).map(|b| b.id) {
                self.set_connection_tracking(child, track && !hidden);
            }
        }
        if let Some(conn) = next {
            self.set_tracked(conn, track);
            if let Some(child) = self.target_block(conn).map(|b| b.id) {
                self.set_connection_tracking(child, track);
            }
        }
    }

    /// Flag the subtree as dragged. Dragged connections leave the spatial
    /// index; dropping refreshes their positions and tracks them again.
    pub fn set_dragging(&mut self, id: BlockId, dragging: bool) {
        for block_id in self.descendants(id) {
            if let Some(block) = self.block_mut(block_id) {
                block.dragging = dragging;
            }
        }
        if dragging {
            self.set_connection_tracking(id, false);
        } else {
            self.refresh_positions(id);
            self.set_connection_tracking(id, true);
            self.mark_dirty(id);
        }
    }

    /// Move a dragged root without firing events or updating connection
    /// positions; the drag searches with a displacement instead.
    pub fn move_during_drag(&mut self, id: BlockId, xy: Coordinate) -> bool {
        if self.parent(id).is_some() {
            return false;
        }
        match self.block_mut(id) {
            Some(block) => {
                block.xy = xy;
                true
            }
            None => false,
        }
    }

    pub(crate) fn mark_dirty(&mut self, id: BlockId) {
        let root = self.root(id);
        if !self.dirty.contains(&root) {
            self.dirty.push(root);
        }
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Roots needing a layout pass, deduplicated.
    pub fn take_dirty_roots(&mut self) -> Vec<BlockId> {
        let pending = std::mem::take(&mut self.dirty);
        let mut roots: Vec<BlockId> = Vec::with_capacity(pending.len());
        for id in pending {
            if !self.contains(id) {
                continue;
            }
            let root = self.root(id);
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
        roots
    }

    // ─── Creation & disposal ─────────────────────────────────────────────

    fn add_connection(&mut self, kind: ConnectionType, owner: BlockId, check: &Check) -> ConnectionId {
        let conn = self.connections.insert(kind, owner);
        self.connections[conn].check = check.clone();
        conn
    }

    /// Build a bare top block from its definition. Fires nothing.
    pub(crate) fn create_block(&mut self, block_type: &str, id: BlockId) -> Result<BlockId, GraphError> {
        let def = self.registry.get(block_type)?.clone();
        let mut block = Block::new(id, &def);

        block.output = def
            .output
            .as_ref()
            .map(|check| self.add_connection(ConnectionType::OutputValue, id, check));
        block.previous = def
            .previous
            .as_ref()
            .map(|check| self.add_connection(ConnectionType::PreviousStatement, id, check));
        block.next = def
            .next
            .as_ref()
            .map(|check| self.add_connection(ConnectionType::NextStatement, id, check));
        for input in &def.inputs {
            let connection = match input.kind {
                InputKind::Value => {
                    Some(self.add_connection(ConnectionType::InputValue, id, &input.check))
                }
                InputKind::Statement => {
                    Some(self.add_connection(ConnectionType::NextStatement, id, &input.check))
                }
                InputKind::Dummy => None,
            };
            block.inputs.push(Input {
                name: input.name.clone(),
                kind: input.kind,
                connection,
            });
        }

        let idx = self.graph.add_node(block);
        self.id_index.insert(id, idx);
        self.top_blocks.push(id);
        layout::layout_tree(self, id);
        self.set_connection_tracking(id, true);
        Ok(id)
    }

    /// Create a top block of `block_type`. An id already in use is replaced
    /// by a fresh one.
    pub fn new_block(
        &mut self,
        ctx: &mut MutationContext,
        block_type: &str,
        id: Option<BlockId>,
    ) -> Result<BlockId, GraphError> {
        let id = id
            .filter(|id| !self.contains(*id))
            .unwrap_or_else(Uid::generate);
        self.create_block(block_type, id)?;
        if ctx.is_enabled()
            && let Some(json) = serialization::save(
                self,
                id,
                SaveOptions {
                    add_coordinates: true,
                    ..SaveOptions::default()
                },
            )
        {
            ctx.fire(EventKind::BlockCreate(BlockCreate {
                block_id: id,
                json,
                ids: vec![id],
            }));
        }
        Ok(id)
    }

    /// Drop a block and everything below it without firing events.
    pub(crate) fn remove_tree(&mut self, id: BlockId) {
        if let Some(parent_conn) = self.parent_connection(id) {
            if let Some(c) = self.connections.get_mut(parent_conn) {
                c.target = None;
            }
            self.mark_dirty(id);
        }
        for block_id in self.descendants(id) {
            let Some(idx) = self.id_index.remove(&block_id) else {
                continue;
            };
            if let Some(block) = self.graph.remove_node(idx) {
                for conn in block.connections(true) {
                    self.set_tracked(conn, false);
                    self.connections.remove(conn);
                }
            }
            self.top_blocks.retain(|b| *b != block_id);
            self.dirty.retain(|b| *b != block_id);
        }
    }

    /// Delete a block and its children. With `heal`, the rest of the stack
    /// (or the single value child) closes the gap. Missing blocks are a
    /// silent no-op.
    pub fn dispose(
        &mut self,
        ctx: &mut MutationContext,
        id: BlockId,
        heal: bool,
    ) -> Result<(), GraphError> {
        if !self.contains(id) {
            return Ok(());
        }
        ctx.in_group(|ctx| {
            self.unplug(ctx, id, heal)?;
            if ctx.is_enabled() {
                let old_json = serialization::save(
                    self,
                    id,
                    SaveOptions {
                        add_coordinates: true,
                        ..SaveOptions::default()
                    },
                );
                if let Some(old_json) = old_json {
                    ctx.fire(EventKind::BlockDelete(BlockDelete {
                        block_id: id,
                        old_json,
                        ids: self.descendants(id),
                        was_shadow: self.block(id).is_some_and(|b| b.shadow),
                    }));
                }
            }
            self.remove_tree(id);
            Ok(())
        })
    }

    // ─── Connecting ──────────────────────────────────────────────────────

    /// Join two connections.
    ///
    /// The child is first detached from any old parent. A shadow occupying
    /// the parent slot is disposed; a real occupant becomes an orphan that is
    /// re-attached at the end of the new child's row or stack when it fits
    /// there, and bumped away otherwise.
    pub fn connect(
        &mut self,
        ctx: &mut MutationContext,
        a: ConnectionId,
        b: ConnectionId,
    ) -> Result<(), GraphError> {
        let conn_a = self
            .connections
            .get(a)
            .ok_or(ConnectionError::Missing(a))?;
        if !self.connections.contains(b) {
            return Err(ConnectionError::Missing(b).into());
        }
        if conn_a.target == Some(b) {
            return Ok(());
        }
        let a_superior = conn_a.is_superior();

        let reason = self.checker.can_connect_with_reason(self, a, b, false, 0.0);
        if reason != Connectability::CanConnect {
            return Err(ConnectionError::Incompatible(reason).into());
        }

        let (parent_conn, child_conn) = if a_superior { (a, b) } else { (b, a) };
        let parent = self.connections[parent_conn].source_block;
        let child = self.connections[child_conn].source_block;
        if self.is_ancestor_of(child, parent) {
            return Err(ConnectionError::Cycle { parent, child }.into());
        }

        ctx.in_group(|ctx| self.connect_internal(ctx, parent_conn, child_conn))
    }

    fn connect_internal(
        &mut self,
        ctx: &mut MutationContext,
        parent_conn: ConnectionId,
        child_conn: ConnectionId,
    ) -> Result<(), GraphError> {
        let child = self.connections[child_conn].source_block;
        let pending = PendingMove::capture(self, child);

        // Moving between slots leaves the old slot with its shadow.
        if let Some(old_parent_conn) = self.connections[child_conn].target {
            let child_is_shadow = self.block(child).is_some_and(|b| b.shadow);
            self.unlink(old_parent_conn, child_conn);
            if !child_is_shadow {
                self.respawn_shadow(ctx, old_parent_conn)?;
            }
        }

        let mut orphan = None;
        if let Some(occupant) = self.target_block(parent_conn).map(|b| (b.id, b.shadow)) {
            let shadow_state = self.current_shadow_state(parent_conn);
            self.connections[parent_conn].shadow_state = None;
            match occupant {
                (shadow, true) => self.dispose(ctx, shadow, false)?,
                (real, false) => {
                    self.disconnect_internal(ctx, parent_conn);
                    orphan = Some(real);
                }
            }
            if let Some(c) = self.connections.get_mut(parent_conn) {
                c.shadow_state = shadow_state;
            }
        }

        self.link(parent_conn, child_conn);
        ctx.fire_event(pending.record_new(self));
        self.update_disabled(child);

        if let Some(orphan) = orphan {
            self.rehome_orphan(ctx, orphan, parent_conn, child)?;
        }
        Ok(())
    }

    /// Reattach an ousted block at the end of `new_child`'s row or stack,
    /// or bump it clear of `parent_conn`.
    fn rehome_orphan(
        &mut self,
        ctx: &mut MutationContext,
        orphan: BlockId,
        parent_conn: ConnectionId,
        new_child: BlockId,
    ) -> Result<(), GraphError> {
        let Some(orphan_block) = self.block(orphan) else {
            return Ok(());
        };
        let orphan_conn = match self.connections[parent_conn].kind {
            ConnectionType::InputValue => orphan_block.output,
            _ => orphan_block.previous,
        };
        let Some(orphan_conn) = orphan_conn else {
            return Ok(());
        };
        match self.connection_for_orphaned_connection(new_child, orphan_conn) {
            Some(target) => self.connect(ctx, orphan_conn, target),
            None => self.bump_away_from(ctx, orphan_conn, parent_conn),
        }
    }

    /// Where an orphan plugged by `orphan_conn` may go below `start`:
    /// the single compatible value input down the row, or the end of the
    /// stack.
    pub fn connection_for_orphaned_connection(
        &self,
        start: BlockId,
        orphan_conn: ConnectionId,
    ) -> Option<ConnectionId> {
        let kind = self.connections.get(orphan_conn)?.kind;
        if kind == ConnectionType::OutputValue {
            let mut block = start;
            while let Some(conn) = self.single_compatible_input(block, orphan_conn) {
                match self.target_block(conn) {
                    Some(next) if !next.shadow => block = next.id,
                    _ => return Some(conn),
                }
            }
            return None;
        }
        let last = self.last_connection_in_stack(start, true)?;
        self.can_connect(orphan_conn, last, false, 0.0)
            .then_some(last)
    }

    fn single_compatible_input(&self, block: BlockId, output: ConnectionId) -> Option<ConnectionId> {
        let mut found = None;
        for conn in self.block(block)?.inputs.iter().filter_map(|i| i.connection) {
            if self.can_connect(output, conn, false, 0.0) {
                if found.is_some() {
                    return None;
                }
                found = Some(conn);
            }
        }
        found
    }

    /// Set both target links and mirror them with a graph edge. The child
    /// is positioned so the two connections coincide.
    fn link(&mut self, parent_conn: ConnectionId, child_conn: ConnectionId) {
        let parent = self.connections[parent_conn].source_block;
        let child = self.connections[child_conn].source_block;
        let (Some(p_idx), Some(c_idx)) = (self.index_of(parent), self.index_of(child)) else {
            return;
        };
        self.connections[parent_conn].target = Some(child_conn);
        self.connections[child_conn].target = Some(parent_conn);
        self.graph.add_edge(p_idx, c_idx, parent_conn);
        self.top_blocks.retain(|b| *b != child);

        let offset = self.connections[parent_conn].offset - self.connections[child_conn].offset;
        self.graph[c_idx].xy = offset;
        self.refresh_positions(child);
        self.mark_dirty(child);
    }

    /// Clear both target links. The child becomes a top block at its
    /// current absolute position.
    fn unlink(&mut self, parent_conn: ConnectionId, child_conn: ConnectionId) {
        let parent = self.connections[parent_conn].source_block;
        let child = self.connections[child_conn].source_block;
        let absolute = self.relative_to_surface(child);
        self.mark_dirty(parent);

        self.connections[parent_conn].target = None;
        self.connections[child_conn].target = None;
        if let (Some(p_idx), Some(c_idx)) = (self.index_of(parent), self.index_of(child))
            && let Some(edge) = self.graph.find_edge(p_idx, c_idx)
        {
            self.graph.remove_edge(edge);
        }
        if let Some(block) = self.block_mut(child) {
            block.xy = absolute;
        }
        if !self.top_blocks.contains(&child) {
            self.top_blocks.push(child);
        }
        self.refresh_positions(child);
        self.mark_dirty(child);
    }

    fn disconnect_internal(&mut self, ctx: &mut MutationContext, conn: ConnectionId) {
        let Some(other) = self.connections.get(conn).and_then(|c| c.target) else {
            return;
        };
        let (parent_conn, child_conn) = if self.connections[conn].is_superior() {
            (conn, other)
        } else {
            (other, conn)
        };
        let child = self.connections[child_conn].source_block;
        let pending = PendingMove::capture(self, child);
        self.unlink(parent_conn, child_conn);
        ctx.fire_event(pending.record_new(self));
        self.update_disabled(child);
    }

    /// Separate `conn` from its target; a no-op when not connected. The
    /// parent slot respawns its shadow unless the detached child was one.
    pub fn disconnect(
        &mut self,
        ctx: &mut MutationContext,
        conn: ConnectionId,
    ) -> Result<(), GraphError> {
        let c = self
            .connections
            .get(conn)
            .ok_or(ConnectionError::Missing(conn))?;
        let Some(other) = c.target else {
            return Ok(());
        };
        if self.connections.get(other).and_then(|o| o.target) != Some(conn) {
            return Err(ConnectionError::NotReciprocal(conn).into());
        }
        let (parent_conn, child_conn) = if c.is_superior() {
            (conn, other)
        } else {
            (other, conn)
        };
        let child_is_shadow = self.block_of(child_conn).is_some_and(|b| b.shadow);

        ctx.in_group(|ctx| {
            self.disconnect_internal(ctx, conn);
            if !child_is_shadow {
                self.respawn_shadow(ctx, parent_conn)?;
            }
            Ok(())
        })
    }

    // ─── Shadows ─────────────────────────────────────────────────────────

    /// The shadow state of a slot, preferring the live shadow block so any
    /// edits to it survive.
    fn current_shadow_state(&self, conn: ConnectionId) -> Option<BlockState> {
        match self.target_block(conn) {
            Some(block) if block.shadow => serialization::save(self, block.id, SaveOptions::default()),
            _ => self.connections.get(conn)?.shadow_state.clone(),
        }
    }

    fn respawn_shadow(
        &mut self,
        ctx: &mut MutationContext,
        conn: ConnectionId,
    ) -> Result<(), GraphError> {
        let Some(c) = self.connections.get(conn) else {
            return Ok(());
        };
        if c.is_connected() {
            return Ok(());
        }
        let Some(state) = c.shadow_state.clone() else {
            return Ok(());
        };
        serialization::append_internal(self, ctx, &state, Some(conn), true)?;
        Ok(())
    }

    /// Store the shadow a slot falls back to, spawning it now when the slot
    /// is empty (or replacing a current shadow).
    pub fn set_shadow_state(
        &mut self,
        ctx: &mut MutationContext,
        conn: ConnectionId,
        state: Option<BlockState>,
    ) -> Result<(), GraphError> {
        let c = self
            .connections
            .get_mut(conn)
            .ok_or(ConnectionError::Missing(conn))?;
        c.shadow_state = state;
        match self.target_block(conn).map(|b| (b.id, b.shadow)) {
            None => self.respawn_shadow(ctx, conn),
            Some((shadow, true)) => {
                self.dispose(ctx, shadow, false)?;
                self.respawn_shadow(ctx, conn)
            }
            Some((_, false)) => Ok(()),
        }
    }

    /// Replace a connection's check list. An attached block that no longer
    /// fits is detached; a shadow is disposed, a real block bumped.
    pub fn set_check(
        &mut self,
        ctx: &mut MutationContext,
        conn: ConnectionId,
        check: Check,
    ) -> Result<(), GraphError> {
        let c = self
            .connections
            .get_mut(conn)
            .ok_or(ConnectionError::Missing(conn))?;
        c.check = check;
        let (Some(target), superior) = (c.target, c.is_superior()) else {
            return Ok(());
        };
        if self.checker.do_type_checks(self, conn, target) {
            return Ok(());
        }
        let child = if superior { target } else { conn };
        let Some((child, shadow)) = self.block_of(child).map(|b| (b.id, b.shadow)) else {
            return Ok(());
        };
        self.disconnect(ctx, conn)?;
        if shadow {
            self.dispose(ctx, child, false)
        } else {
            self.bump_neighbours(ctx, child)
        }
    }

    // ─── Unplug ──────────────────────────────────────────────────────────

    /// Detach a block from its parent. With `heal`, the gap closes: a stack
    /// reconnects the next block to the old parent, a row moves the single
    /// value child up into the vacated slot.
    pub fn unplug(
        &mut self,
        ctx: &mut MutationContext,
        id: BlockId,
        heal: bool,
    ) -> Result<(), GraphError> {
        let block = self.require(id)?;
        let (output, previous) = (block.output, block.previous);
        if let Some(output) = output {
            self.unplug_from_row(ctx, id, output, heal)?;
        }
        if let Some(previous) = previous {
            self.unplug_from_stack(ctx, id, previous, heal)?;
        }
        Ok(())
    }

    fn unplug_from_row(
        &mut self,
        ctx: &mut MutationContext,
        id: BlockId,
        output: ConnectionId,
        heal: bool,
    ) -> Result<(), GraphError> {
        let Some(parent_conn) = self.connections.get(output).and_then(|c| c.target) else {
            return Ok(());
        };
        self.disconnect(ctx, output)?;
        if !heal {
            return Ok(());
        }

        let Some(this_conn) = self.only_value_connection(id) else {
            return Ok(());
        };
        let Some(child_conn) = self.connections[this_conn].target else {
            return Ok(());
        };
        if self.block_of(child_conn).is_none_or(|b| b.shadow) {
            return Ok(());
        }
        self.disconnect(ctx, child_conn)?;
        if self.can_connect(child_conn, parent_conn, false, 0.0) {
            self.connect(ctx, parent_conn, child_conn)
        } else {
            self.bump_away_from(ctx, child_conn, parent_conn)
        }
    }

    fn unplug_from_stack(
        &mut self,
        ctx: &mut MutationContext,
        id: BlockId,
        previous: ConnectionId,
        heal: bool,
    ) -> Result<(), GraphError> {
        let previous_target = self.connections.get(previous).and_then(|c| c.target);
        if previous_target.is_some() {
            self.disconnect(ctx, previous)?;
        }

        let next_is_real = self
            .next_block(id)
            .and_then(|n| self.block(n))
            .is_some_and(|n| !n.shadow);
        if !heal || !next_is_real {
            return Ok(());
        }
        let Some(next_target) = self
            .block(id)
            .and_then(|b| b.next)
            .and_then(|n| self.connections.get(n))
            .and_then(|c| c.target)
        else {
            return Ok(());
        };
        self.disconnect(ctx, next_target)?;
        if let Some(previous_target) = previous_target
            && self.can_connect(previous_target, next_target, false, 0.0)
        {
            self.connect(ctx, previous_target, next_target)?;
        }
        Ok(())
    }

    // ─── Moving ──────────────────────────────────────────────────────────

    /// Move a top block by an offset. Attached blocks move with their parent
    /// and cannot be moved on their own.
    pub fn move_by(
        &mut self,
        ctx: &mut MutationContext,
        id: BlockId,
        dx: f64,
        dy: f64,
        reason: &[&str],
    ) -> Result<(), GraphError> {
        self.require(id)?;
        if self.parent(id).is_some() {
            return Err(GraphError::AttachedToParent(id));
        }
        let pending = PendingMove::capture(self, id).with_reason(reason);
        let block = self.require_mut(id)?;
        block.xy = block.xy.translate(dx, dy);
        self.refresh_positions(id);
        self.mark_dirty(id);
        ctx.fire_event(pending.record_new(self));
        Ok(())
    }

    pub fn move_to(
        &mut self,
        ctx: &mut MutationContext,
        id: BlockId,
        xy: Coordinate,
        reason: &[&str],
    ) -> Result<(), GraphError> {
        let current = self.require(id)?.xy;
        self.move_by(ctx, id, xy.x - current.x, xy.y - current.y, reason)
    }

    /// Move the top block of `this_conn` (or, when it is immovable, the top
    /// block of `static_conn`) so the two connections are no longer within
    /// snapping distance.
    pub fn bump_away_from(
        &mut self,
        ctx: &mut MutationContext,
        this_conn: ConnectionId,
        static_conn: ConnectionId,
    ) -> Result<(), GraphError> {
        let (Some(this), Some(other)) = (
            self.connections.get(this_conn),
            self.connections.get(static_conn),
        ) else {
            return Ok(());
        };
        let snap = self.config.snap_radius;
        let (this_pos, static_pos) = (this.position(), other.position());
        let (this_block, static_block) = (this.source_block, other.source_block);

        let dx = static_pos.x + snap - this_pos.x;
        let dy = static_pos.y + snap - this_pos.y;
        let root = self.root(this_block);
        let (mover, dy) = if self.block(root).is_some_and(Block::is_movable) {
            (root, dy)
        } else {
            // Moving the static side instead: push it the other way.
            let other_root = self.root(static_block);
            if !self.block(other_root).is_some_and(Block::is_movable) {
                return Ok(());
            }
            (other_root, -dy)
        };
        if self.block(mover).is_some_and(|b| b.dragging) {
            return Ok(());
        }
        self.move_by(ctx, mover, dx, dy, &["bump"])
    }

    /// Push unconnected neighbouring blocks out of snapping range of this
    /// block's connections.
    pub fn bump_neighbours(
        &mut self,
        ctx: &mut MutationContext,
        id: BlockId,
    ) -> Result<(), GraphError> {
        let Some(block) = self.block(id) else {
            return Ok(());
        };
        if block.dragging {
            return Ok(());
        }
        let root = self.root(id);
        let snap = self.config.snap_radius;

        for conn in block.connections(false) {
            let Some(c) = self.connections.get(conn) else {
                continue;
            };
            if c.is_superior()
                && let Some(child) = self.target_block(conn).map(|b| b.id)
            {
                self.bump_neighbours(ctx, child)?;
            }
            for other in self.neighbours(conn, snap) {
                let (Some(c), Some(o)) = (self.connections.get(conn), self.connections.get(other))
                else {
                    continue;
                };
                if o.kind != c.kind.opposite() || (c.is_connected() && o.is_connected()) {
                    continue;
                }
                if self.root(o.source_block) == root {
                    continue;
                }
                if c.is_superior() {
                    self.bump_away_from(ctx, other, conn)?;
                } else {
                    self.bump_away_from(ctx, conn, other)?;
                }
            }
        }
        Ok(())
    }

    /// Snap a top block to the grid.
    pub fn snap_to_grid(
        &mut self,
        ctx: &mut MutationContext,
        id: BlockId,
        spacing: f64,
    ) -> Result<(), GraphError> {
        if spacing <= 0.0 || self.parent(id).is_some() {
            return Ok(());
        }
        let xy = self.require(id)?.xy;
        let snapped = snap_coordinate(xy, spacing);
        if snapped == xy {
            return Ok(());
        }
        self.move_by(ctx, id, snapped.x - xy.x, snapped.y - xy.y, &["snap"])
    }

    // ─── Properties ──────────────────────────────────────────────────────

    pub fn set_field_value(
        &mut self,
        ctx: &mut MutationContext,
        id: BlockId,
        name: &str,
        value: Value,
    ) -> Result<(), GraphError> {
        let block = self.require_mut(id)?;
        let slot = block
            .fields
            .get_mut(name)
            .ok_or_else(|| GraphError::UnknownField {
                block: id,
                name: name.to_owned(),
            })?;
        if *slot == value {
            return Ok(());
        }
        let old_value = std::mem::replace(slot, value.clone());
        self.mark_dirty(id);
        ctx.fire(EventKind::BlockChange(BlockChange {
            block_id: id,
            element: ChangeElement::Field,
            name: Some(name.to_owned()),
            old_value,
            new_value: value,
        }));
        Ok(())
    }

    fn fire_flag_change(ctx: &mut MutationContext, id: BlockId, element: ChangeElement, new: bool) {
        ctx.fire(EventKind::BlockChange(BlockChange {
            block_id: id,
            element,
            name: None,
            old_value: Value::Bool(!new),
            new_value: Value::Bool(new),
        }));
    }

    /// Collapse or expand. Connections inside a collapsed block leave the
    /// spatial index.
    pub fn set_collapsed(
        &mut self,
        ctx: &mut MutationContext,
        id: BlockId,
        collapsed: bool,
    ) -> Result<(), GraphError> {
        let block = self.require_mut(id)?;
        if block.collapsed == collapsed {
            return Ok(());
        }
        block.collapsed = collapsed;
        let dragging = block.dragging;
        Self::fire_flag_change(ctx, id, ChangeElement::Collapsed, collapsed);
        if !dragging {
            self.refresh_positions(id);
            self.set_connection_tracking(id, true);
        }
        self.mark_dirty(id);
        Ok(())
    }

    /// Enable or disable a block, then push the derived state down.
    pub fn set_enabled(
        &mut self,
        ctx: &mut MutationContext,
        id: BlockId,
        enabled: bool,
    ) -> Result<(), GraphError> {
        let block = self.require_mut(id)?;
        if block.disabled != enabled {
            return Ok(());
        }
        block.disabled = !enabled;
        Self::fire_flag_change(ctx, id, ChangeElement::Disabled, !enabled);
        self.update_disabled(id);
        Ok(())
    }

    pub fn set_inputs_inline(
        &mut self,
        ctx: &mut MutationContext,
        id: BlockId,
        inline: bool,
    ) -> Result<(), GraphError> {
        let block = self.require_mut(id)?;
        if block.inputs_inline == inline {
            return Ok(());
        }
        block.inputs_inline = inline;
        Self::fire_flag_change(ctx, id, ChangeElement::Inline, inline);
        self.mark_dirty(id);
        Ok(())
    }

    pub fn set_comment_text(
        &mut self,
        ctx: &mut MutationContext,
        id: BlockId,
        text: Option<String>,
    ) -> Result<(), GraphError> {
        let block = self.require_mut(id)?;
        if block.comment == text {
            return Ok(());
        }
        let old = std::mem::replace(&mut block.comment, text.clone());
        ctx.fire(EventKind::BlockChange(BlockChange {
            block_id: id,
            element: ChangeElement::Comment,
            name: None,
            old_value: old.map_or(Value::Null, Value::String),
            new_value: text.map_or(Value::Null, Value::String),
        }));
        Ok(())
    }

    /// Warnings are presentation only and fire no event.
    pub fn set_warning_text(&mut self, id: BlockId, text: Option<String>) -> Result<(), GraphError> {
        self.require_mut(id)?.warning = text;
        Ok(())
    }

    /// Recompute `inherited_disabled` for the block and its subtree.
    pub fn update_disabled(&mut self, id: BlockId) {
        let inherited = self
            .parent(id)
            .and_then(|p| self.block(p))
            .is_some_and(|p| p.disabled || p.inherited_disabled);
        let Some(block) = self.block_mut(id) else {
            return;
        };
        block.inherited_disabled = inherited;
        for child in self.children(id) {
            self.update_disabled(child);
        }
    }
}
