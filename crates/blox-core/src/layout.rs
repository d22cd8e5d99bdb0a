//! Block measurement.
//!
//! Computes each block's size and the offsets of its connections from the
//! block origin, then places children so their parent-facing connection
//! lines up with the slot they occupy. Sizes here are model-level extents,
//! not pixel-exact renderer output.

use crate::block::InputKind;
use crate::geometry::{Coordinate, Size};
use crate::graph::BlockGraph;
use crate::id::{BlockId, ConnectionId};

/// Height of one input row.
pub const ROW_HEIGHT: f64 = 24.0;
/// Horizontal inset of a statement input's mouth.
pub const STATEMENT_INDENT: f64 = 16.0;
/// Height of an empty statement mouth.
pub const STATEMENT_MIN_HEIGHT: f64 = 24.0;
/// Bar below a statement mouth.
pub const STATEMENT_BOTTOM: f64 = 8.0;
/// Width reserved for an empty inline value slot.
pub const INLINE_SLOT_WIDTH: f64 = 24.0;
/// Gap between inline value slots.
pub const INLINE_GAP: f64 = 4.0;

/// Re-measure the tree rooted at `root` and refresh every absolute
/// connection position below it.
pub fn layout_tree(graph: &mut BlockGraph, root: BlockId) {
    measure_stack(graph, root);
    graph.refresh_positions(root);
    log::trace!("laid out tree {root}");
}

/// Measure a block and the stack hanging off its next connection.
/// Returns the combined extent.
fn measure_stack(graph: &mut BlockGraph, id: BlockId) -> Size {
    let own = measure_block(graph, id);
    let Some(next) = graph.block(id).and_then(|b| b.next) else {
        return own;
    };
    match child_of(graph, next) {
        Some(child) => {
            let below = measure_stack(graph, child);
            place_child(graph, next, child);
            Size::new(own.width.max(below.width), own.height + below.height)
        }
        None => own,
    }
}

fn measure_block(graph: &mut BlockGraph, id: BlockId) -> Size {
    let Some(block) = graph.block(id) else {
        return Size::default();
    };
    let min = block.min_size;
    let collapsed = block.collapsed;
    let inline = block.inputs_inline;
    let inputs: Vec<(InputKind, Option<ConnectionId>)> =
        block.inputs.iter().map(|i| (i.kind, i.connection)).collect();
    let own: Vec<ConnectionId> = block.output.into_iter().chain(block.previous).collect();
    let next = block.next;

    let mut width = min.width;
    let mut y = 0.0;
    // Inline value inputs share one row until a statement or label breaks it.
    let mut row_x = min.width;
    let mut row_height = 0.0_f64;

    for (kind, conn) in inputs {
        let child = conn.and_then(|c| child_of(graph, c));
        let extent = child.map_or(Size::default(), |c| measure_stack(graph, c));

        if collapsed {
            // Hidden children sit under the block's first row.
            if let Some(conn) = conn {
                set_offset(graph, conn, Coordinate::new(min.width, 0.0));
            }
        } else {
            match kind {
                InputKind::Value if inline => {
                    if let Some(conn) = conn {
                        set_offset(graph, conn, Coordinate::new(row_x, y));
                    }
                    row_x += extent.width.max(INLINE_SLOT_WIDTH) + INLINE_GAP;
                    row_height = row_height.max(ROW_HEIGHT).max(extent.height);
                    width = width.max(row_x);
                }
                InputKind::Value => {
                    if let Some(conn) = conn {
                        set_offset(graph, conn, Coordinate::new(min.width, y));
                    }
                    width = width.max(min.width + extent.width);
                    y += ROW_HEIGHT.max(extent.height);
                }
                InputKind::Statement => {
                    y += row_height;
                    row_height = 0.0;
                    row_x = min.width;
                    if let Some(conn) = conn {
                        set_offset(graph, conn, Coordinate::new(STATEMENT_INDENT, y));
                    }
                    width = width.max(STATEMENT_INDENT + extent.width);
                    y += STATEMENT_MIN_HEIGHT.max(extent.height) + STATEMENT_BOTTOM;
                }
                InputKind::Dummy => {
                    y += row_height + ROW_HEIGHT;
                    row_height = 0.0;
                    row_x = min.width;
                }
            }
        }

        if let (Some(conn), Some(child)) = (conn, child) {
            place_child(graph, conn, child);
        }
    }
    y += row_height;

    let height = if collapsed { min.height.max(ROW_HEIGHT) } else { y.max(min.height) };
    for conn in own {
        set_offset(graph, conn, Coordinate::ZERO);
    }
    if let Some(next) = next {
        set_offset(graph, next, Coordinate::new(0.0, height));
    }
    let size = Size::new(width, height);
    if let Some(block) = graph.block_mut(id) {
        block.size = size;
    }
    size
}

fn child_of(graph: &BlockGraph, conn: ConnectionId) -> Option<BlockId> {
    graph.target_block(conn).map(|b| b.id)
}

fn set_offset(graph: &mut BlockGraph, conn: ConnectionId, offset: Coordinate) {
    if let Some(c) = graph.connections.get_mut(conn) {
        c.offset = offset;
    }
}

/// Position `child` so its connection to `parent_conn` coincides with it.
fn place_child(graph: &mut BlockGraph, parent_conn: ConnectionId, child: BlockId) {
    let Some(slot) = graph.connection(parent_conn).map(|c| c.offset) else {
        return;
    };
    let plug = graph
        .connection(parent_conn)
        .and_then(|c| c.target)
        .and_then(|t| graph.connection(t))
        .map_or(Coordinate::ZERO, |c| c.offset);
    if let Some(block) = graph.block_mut(child) {
        block.xy = slot - plug;
    }
}
