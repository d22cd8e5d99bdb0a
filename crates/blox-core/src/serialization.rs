//! JSON-shaped save states for blocks, comments and whole workspaces.
//!
//! `save` followed by `append` reproduces the block tree: types, ids,
//! fields, flags, shadow states and attached children.

use crate::context::MutationContext;
use crate::error::GraphError;
use crate::events::{BlockCreate, Event, EventKind};
use crate::graph::BlockGraph;
use crate::id::{BlockId, CommentId, ConnectionId, Uid, VariableId};
use crate::layout;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ─── States ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockState {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<BlockId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, ConnectionState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Box<ConnectionState>>,
}

impl BlockState {
    pub fn new(block_type: impl Into<String>) -> Self {
        Self {
            block_type: block_type.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(Uid::intern(id));
        self
    }

    #[must_use]
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_owned(), value);
        self
    }

    #[must_use]
    pub fn with_input(mut self, name: &str, state: ConnectionState) -> Self {
        self.inputs.insert(name.to_owned(), state);
        self
    }

    #[must_use]
    pub fn with_next(mut self, state: ConnectionState) -> Self {
        self.next = Some(Box::new(state));
        self
    }
}

/// What is plugged into one connection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow: Option<Box<BlockState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<Box<BlockState>>,
}

impl ConnectionState {
    pub fn with_block(block: BlockState) -> Self {
        Self {
            shadow: None,
            block: Some(Box::new(block)),
        }
    }

    pub fn with_shadow(shadow: BlockState) -> Self {
        Self {
            shadow: Some(Box::new(shadow)),
            block: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CommentId>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub collapsed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletable: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableState {
    pub id: VariableId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub var_type: String,
}

/// Everything needed to rebuild a workspace.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceState {
    pub blocks: Vec<BlockState>,
    pub comments: Vec<CommentState>,
    pub variables: Vec<VariableState>,
}

// ─── Save ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    /// Record the absolute position (top blocks only).
    pub add_coordinates: bool,
    /// Include the block's next stack.
    pub add_next_blocks: bool,
    pub save_ids: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            add_coordinates: false,
            add_next_blocks: true,
            save_ids: true,
        }
    }
}

/// Serialize a block and its children. Insertion markers are not saved.
pub fn save(graph: &BlockGraph, id: BlockId, options: SaveOptions) -> Option<BlockState> {
    let block = graph.block(id)?;
    if block.insertion_marker {
        return None;
    }

    let mut state = BlockState::new(block.block_type.clone());
    if options.save_ids {
        state.id = Some(id);
    }
    if options.add_coordinates {
        let xy = graph.relative_to_surface(id);
        state.x = Some(xy.x);
        state.y = Some(xy.y);
    }
    if block.collapsed {
        state.collapsed = Some(true);
    }
    if block.disabled {
        state.enabled = Some(false);
    }
    let inline_default = graph
        .registry()
        .get(&block.block_type)
        .map(|def| def.inputs_inline)
        .unwrap_or(false);
    if block.inputs_inline != inline_default {
        state.inline = Some(block.inputs_inline);
    }
    if !block.shadow {
        if !block.deletable {
            state.deletable = Some(false);
        }
        if !block.movable {
            state.movable = Some(false);
        }
    }
    if !block.editable {
        state.editable = Some(false);
    }
    state.comment = block.comment.clone();
    state.fields = block.fields.clone();

    let child_options = SaveOptions {
        add_coordinates: false,
        add_next_blocks: true,
        ..options
    };
    for input in &block.inputs {
        if let Some(conn) = input.connection
            && let Some(cs) = save_connection(graph, conn, child_options)
        {
            state.inputs.insert(input.name.clone(), cs);
        }
    }
    if options.add_next_blocks
        && let Some(next) = block.next
        && let Some(cs) = save_connection(graph, next, child_options)
    {
        state.next = Some(Box::new(cs));
    }
    Some(state)
}

fn save_connection(
    graph: &BlockGraph,
    conn: ConnectionId,
    options: SaveOptions,
) -> Option<ConnectionState> {
    let connection = graph.connection(conn)?;
    let target = connection.target.and_then(|t| graph.block_of(t));
    // A live shadow carries any edits made to it since it spawned.
    let shadow = match target {
        Some(block) if block.shadow => save(graph, block.id, options),
        _ => connection.shadow_state.clone(),
    };
    let block = target
        .filter(|b| !b.shadow)
        .and_then(|b| save(graph, b.id, options));
    if shadow.is_none() && block.is_none() {
        return None;
    }
    Some(ConnectionState {
        shadow: shadow.map(Box::new),
        block: block.map(Box::new),
    })
}

// ─── Load ────────────────────────────────────────────────────────────────

/// Build a block tree from `state` as a new top block.
///
/// Internal construction fires nothing; one `BlockCreate` for the root,
/// listing every created id, is fired afterwards.
pub fn append(
    graph: &mut BlockGraph,
    ctx: &mut MutationContext,
    state: &BlockState,
) -> Result<BlockId, GraphError> {
    append_internal(graph, ctx, state, None, false)
}

/// Build `state` and, when given, attach it to `parent_connection`.
pub(crate) fn append_internal(
    graph: &mut BlockGraph,
    ctx: &mut MutationContext,
    state: &BlockState,
    parent_connection: Option<ConnectionId>,
    is_shadow: bool,
) -> Result<BlockId, GraphError> {
    let id = ctx.with_events_disabled(|ctx| -> Result<BlockId, GraphError> {
        let id = build_tree(graph, ctx, state, is_shadow)?;
        if let Some(parent_conn) = parent_connection {
            let attached = graph
                .parent_facing_connection(id)
                .and_then(|attach| graph.connect(ctx, parent_conn, attach));
            if let Err(err) = attached {
                graph.remove_tree(id);
                return Err(err);
            }
        }
        Ok(id)
    })?;

    if parent_connection.is_none() {
        layout::layout_tree(graph, id);
    }
    graph.update_disabled(id);

    if ctx.is_enabled() {
        let json = save(
            graph,
            id,
            SaveOptions {
                add_coordinates: true,
                ..SaveOptions::default()
            },
        );
        if let Some(json) = json {
            let event = Event::new(EventKind::BlockCreate(BlockCreate {
                block_id: id,
                json,
                ids: graph.descendants(id),
            }));
            ctx.fire_event(event.with_record_undo(!is_shadow));
        }
    }
    Ok(id)
}

fn build_tree(
    graph: &mut BlockGraph,
    ctx: &mut MutationContext,
    state: &BlockState,
    is_shadow: bool,
) -> Result<BlockId, GraphError> {
    // A clashing id is replaced rather than rejected.
    let id = state
        .id
        .filter(|id| !graph.contains(*id))
        .unwrap_or_else(Uid::generate);
    graph.create_block(&state.block_type, id)?;
    if let Err(err) = load_into(graph, ctx, id, state, is_shadow) {
        graph.remove_tree(id);
        return Err(err);
    }
    Ok(id)
}

fn load_into(
    graph: &mut BlockGraph,
    ctx: &mut MutationContext,
    id: BlockId,
    state: &BlockState,
    is_shadow: bool,
) -> Result<(), GraphError> {
    let block = graph.block_mut(id).ok_or(GraphError::UnknownBlock(id))?;
    if let (Some(x), Some(y)) = (state.x, state.y) {
        block.xy = crate::geometry::Coordinate::new(x, y);
    }
    block.shadow = is_shadow;
    block.deletable = state.deletable.unwrap_or(true);
    block.movable = state.movable.unwrap_or(true);
    block.editable = state.editable.unwrap_or(true);
    if let Some(inline) = state.inline {
        block.inputs_inline = inline;
    }
    block.comment = state.comment.clone();
    block.disabled = state.enabled == Some(false);
    for (name, value) in &state.fields {
        match block.fields.get_mut(name) {
            Some(slot) => *slot = value.clone(),
            None => log::warn!(
                "ignoring unknown field '{name}' on block '{id}' of type '{}'",
                state.block_type
            ),
        }
    }
    graph.refresh_positions(id);

    for (name, cs) in &state.inputs {
        let conn = graph
            .block(id)
            .and_then(|b| b.input(name))
            .and_then(|input| input.connection)
            .ok_or_else(|| GraphError::UnknownInput {
                block: id,
                name: name.clone(),
            })?;
        load_connection(graph, ctx, conn, cs)?;
    }
    if let Some(cs) = &state.next {
        let conn = graph
            .block(id)
            .and_then(|b| b.next)
            .ok_or_else(|| GraphError::UnknownInput {
                block: id,
                name: "next".into(),
            })?;
        load_connection(graph, ctx, conn, cs)?;
    }

    if state.collapsed == Some(true) {
        graph.set_collapsed(ctx, id, true)?;
    }
    Ok(())
}

fn load_connection(
    graph: &mut BlockGraph,
    ctx: &mut MutationContext,
    conn: ConnectionId,
    cs: &ConnectionState,
) -> Result<(), GraphError> {
    if let Some(shadow) = &cs.shadow {
        graph.set_shadow_state(ctx, conn, Some((**shadow).clone()))?;
    }
    if let Some(child) = &cs.block {
        append_internal(graph, ctx, child, Some(conn), false)?;
    }
    Ok(())
}
