//! Applying recorded events to a workspace, forwards (redo, or mirroring a
//! remote workspace) or backwards (undo).
//!
//! Entities are looked up by id. An entity missing because of an
//! intervening delete is logged and skipped; an event that cannot be
//! applied for any other reason is an error.

use crate::workspace::Workspace;
use blox_core::connection::ConnectionType;
use blox_core::context::MutationContext;
use blox_core::error::{EventError, GraphError};
use blox_core::events::{
    BlockChange, BlockMove, ChangeElement, CommentCollapse, CommentCreate, Event, EventKind,
};
use blox_core::id::BlockId;
use blox_core::serialization::{self, BlockState};
use serde_json::Value;

pub trait Replay {
    /// Apply the event to `ws`. `forward` replays it as it happened;
    /// otherwise its inverse is applied.
    fn run(&self, ws: &mut Workspace, forward: bool) -> Result<(), EventError>;
}

impl Replay for Event {
    fn run(&self, ws: &mut Workspace, forward: bool) -> Result<(), EventError> {
        let mut ctx = ws
            .begin_in_group(self.group.clone())
            .with_record_undo(false);
        let result = apply(&self.kind, ws, &mut ctx, forward);
        ws.commit(ctx);
        result
    }
}

fn apply(
    kind: &EventKind,
    ws: &mut Workspace,
    ctx: &mut MutationContext,
    forward: bool,
) -> Result<(), EventError> {
    match kind {
        EventKind::BlockCreate(e) if forward => append(ws, ctx, &e.json),
        EventKind::BlockCreate(e) => dispose_all(ws, ctx, e.block_id, &e.ids, "uncreate"),
        EventKind::BlockDelete(e) if forward => dispose_all(ws, ctx, e.block_id, &e.ids, "delete"),
        EventKind::BlockDelete(e) => append(ws, ctx, &e.old_json),
        EventKind::BlockChange(e) => change(ws, ctx, e, forward),
        EventKind::BlockMove(e) => move_block(ws, ctx, e, forward),
        EventKind::FieldIntermediateChange(e) => {
            if !ws.graph.contains(e.block_id) {
                log::warn!("can't change field of non-existent block '{}'", e.block_id);
                return Ok(());
            }
            let value = if forward { &e.new_value } else { &e.old_value };
            ws.graph
                .set_field_value(ctx, e.block_id, &e.name, value.clone())?;
            Ok(())
        }

        EventKind::VarCreate(e) if forward => {
            ws.variables
                .create_variable(ctx, &e.var_name, &e.var_type, Some(e.var_id))?;
            Ok(())
        }
        EventKind::VarCreate(e) => delete_variable(ws, ctx, e.var_id),
        EventKind::VarDelete(e) if forward => delete_variable(ws, ctx, e.var_id),
        EventKind::VarDelete(e) => {
            ws.variables
                .create_variable(ctx, &e.var_name, &e.var_type, Some(e.var_id))?;
            Ok(())
        }
        EventKind::VarRename(e) => {
            if ws.variables.get_variable_by_id(e.var_id).is_none() {
                log::warn!("can't rename non-existent variable '{}'", e.var_id);
                return Ok(());
            }
            let name = if forward { &e.new_name } else { &e.old_name };
            ws.variables.rename_variable(ctx, e.var_id, name)?;
            Ok(())
        }

        EventKind::CommentCreate(e) if forward => {
            load_comment(ws, ctx, e);
            Ok(())
        }
        EventKind::CommentCreate(e) => {
            dispose_comment(ws, ctx, e.comment_id);
            Ok(())
        }
        EventKind::CommentDelete(e) if forward => {
            dispose_comment(ws, ctx, e.comment_id);
            Ok(())
        }
        EventKind::CommentDelete(e) => {
            ws.comments.load(ctx, &e.json);
            Ok(())
        }
        EventKind::CommentChange(e) => {
            let text = if forward { &e.new_contents } else { &e.old_contents };
            with_comment(ws, e.comment_id, "change", |ws| {
                ws.comments.set_text(ctx, e.comment_id, text)
            })
        }
        EventKind::CommentMove(e) => {
            let xy = if forward { e.new_coordinate } else { e.old_coordinate };
            with_comment(ws, e.comment_id, "move", |ws| {
                ws.comments.move_to(ctx, e.comment_id, xy, &[])
            })
        }
        EventKind::CommentResize(e) => {
            let size = if forward { e.new_size } else { e.old_size };
            with_comment(ws, e.comment_id, "resize", |ws| {
                ws.comments.resize(ctx, e.comment_id, size)
            })
        }
        EventKind::CommentCollapse(CommentCollapse {
            comment_id,
            new_collapsed,
        }) => {
            let collapsed = if forward { *new_collapsed } else { !new_collapsed };
            with_comment(ws, *comment_id, "collapse", |ws| {
                ws.comments.set_collapsed(ctx, *comment_id, collapsed)
            })
        }

        // Presentation only.
        EventKind::BlockDrag(_)
        | EventKind::Selected(_)
        | EventKind::Click(_)
        | EventKind::BubbleOpen(_)
        | EventKind::ViewportChange(_)
        | EventKind::CommentDrag(_)
        | EventKind::FinishedLoading => Ok(()),
    }
}

// ─── Blocks ──────────────────────────────────────────────────────────────

fn append(ws: &mut Workspace, ctx: &mut MutationContext, json: &BlockState) -> Result<(), EventError> {
    serialization::append(&mut ws.graph, ctx, json)?;
    Ok(())
}

/// Dispose every listed block. Children usually go with the root, so only
/// a missing root is worth a warning.
fn dispose_all(
    ws: &mut Workspace,
    ctx: &mut MutationContext,
    root: BlockId,
    ids: &[BlockId],
    verb: &str,
) -> Result<(), EventError> {
    for id in ids {
        if ws.graph.contains(*id) {
            ws.graph.dispose(ctx, *id, false)?;
        } else if *id == root {
            log::warn!("can't {verb} non-existent block '{id}'");
        }
    }
    Ok(())
}

fn change(
    ws: &mut Workspace,
    ctx: &mut MutationContext,
    e: &BlockChange,
    forward: bool,
) -> Result<(), EventError> {
    if !ws.graph.contains(e.block_id) {
        log::warn!("can't change non-existent block '{}'", e.block_id);
        return Ok(());
    }
    let value = if forward { &e.new_value } else { &e.old_value };
    let flag = value.as_bool().unwrap_or(false);
    let id = e.block_id;
    match e.element {
        ChangeElement::Field => {
            let name = e.name.as_deref().unwrap_or_default();
            ws.graph.set_field_value(ctx, id, name, value.clone())?;
        }
        ChangeElement::Comment => {
            let text = match value {
                Value::String(s) => Some(s.clone()),
                _ => None,
            };
            ws.graph.set_comment_text(ctx, id, text)?;
        }
        ChangeElement::Collapsed => ws.graph.set_collapsed(ctx, id, flag)?,
        ChangeElement::Disabled => ws.graph.set_enabled(ctx, id, !flag)?,
        ChangeElement::Inline => ws.graph.set_inputs_inline(ctx, id, flag)?,
        ChangeElement::Mutation => {
            log::warn!("block '{id}' has no mutator; ignoring mutation change");
        }
    }
    Ok(())
}

fn move_block(
    ws: &mut Workspace,
    ctx: &mut MutationContext,
    e: &BlockMove,
    forward: bool,
) -> Result<(), EventError> {
    let Some(block) = ws.graph.block(e.block_id) else {
        log::warn!("can't move non-existent block '{}'", e.block_id);
        return Ok(());
    };
    let location = if forward {
        e.new_location()
    } else {
        e.old_location()
    };
    let (output, previous) = (block.output, block.previous);

    if let Some(parent) = location.parent_id
        && !ws.graph.contains(parent)
    {
        log::warn!("can't connect to non-existent block '{parent}'");
        return Ok(());
    }
    if ws.graph.parent(e.block_id).is_some() {
        ws.graph.unplug(ctx, e.block_id, false)?;
    }

    if let Some(xy) = location.coordinate {
        let current = ws.graph.relative_to_surface(e.block_id);
        ws.graph
            .move_by(ctx, e.block_id, xy.x - current.x, xy.y - current.y, &reasons(e))?;
        return Ok(());
    }
    let Some(parent) = location.parent_id else {
        return Ok(());
    };

    let previous_connected = previous.is_some_and(|p| ws.graph.is_connected(p));
    let block_conn = match output {
        Some(output) if !previous_connected => output,
        _ => match previous {
            Some(previous) => previous,
            None => return Err(GraphError::NoParentConnection(e.block_id.to_string()).into()),
        },
    };
    let kind = ws.graph.connection(block_conn).map(|c| c.kind);
    let parent_block = ws.graph.block(parent);
    let parent_conn = match &location.input_name {
        Some(name) => parent_block
            .and_then(|b| b.input(name))
            .and_then(|input| input.connection),
        None if kind == Some(ConnectionType::PreviousStatement) => {
            parent_block.and_then(|b| b.next)
        }
        None => None,
    };
    match parent_conn {
        Some(parent_conn) => ws.graph.connect(ctx, parent_conn, block_conn)?,
        None => log::warn!(
            "can't connect to non-existent input '{}'",
            location.input_name.as_deref().unwrap_or("next")
        ),
    }
    Ok(())
}

fn reasons(e: &BlockMove) -> Vec<&str> {
    e.reason.iter().map(String::as_str).collect()
}

// ─── Variables & comments ────────────────────────────────────────────────

fn delete_variable(
    ws: &mut Workspace,
    ctx: &mut MutationContext,
    id: blox_core::id::VariableId,
) -> Result<(), EventError> {
    if ws.variables.get_variable_by_id(id).is_none() {
        log::warn!("can't delete non-existent variable '{id}'");
        return Ok(());
    }
    ws.variables.delete_variable(ctx, id)?;
    Ok(())
}

fn load_comment(ws: &mut Workspace, ctx: &mut MutationContext, e: &CommentCreate) {
    let mut state = e.json.clone();
    state.id = Some(e.comment_id);
    ws.comments.load(ctx, &state);
}

fn dispose_comment(ws: &mut Workspace, ctx: &mut MutationContext, id: blox_core::id::CommentId) {
    if !ws.comments.dispose(ctx, id) {
        log::warn!("can't delete non-existent comment '{id}'");
    }
}

fn with_comment(
    ws: &mut Workspace,
    id: blox_core::id::CommentId,
    verb: &str,
    f: impl FnOnce(&mut Workspace) -> Result<(), GraphError>,
) -> Result<(), EventError> {
    if !ws.comments.contains(id) {
        log::warn!("can't {verb} non-existent comment '{id}'");
        return Ok(());
    }
    f(ws)?;
    Ok(())
}
