//! Drag strategies: how a picked-up element follows the pointer and what
//! happens when it is dropped.
//!
//! A strategy runs one drag at a time, `Idle → Dragging → Idle`. Locations
//! passed to [`DragStrategy::drag`] are workspace coordinates of the
//! element's top-left corner.

use crate::input::Modifiers;
use crate::workspace::Workspace;
use blox_core::error::{EventError, GraphError};
use blox_core::geometry::Coordinate;
use blox_core::id::ConnectionId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DragError {
    #[error("no drag in progress")]
    NotDragging,

    #[error("a drag is already in progress")]
    AlreadyDragging,

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Replay(#[from] EventError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging,
}

pub trait DragStrategy {
    /// Whether the element may be picked up at all.
    fn is_movable(&self, ws: &Workspace) -> bool;

    /// Pick the element up. Returns `false` when it is not movable.
    fn start_drag(&mut self, ws: &mut Workspace, modifiers: Modifiers) -> Result<bool, DragError>;

    /// Follow the pointer to `new_location`.
    fn drag(&mut self, ws: &mut Workspace, new_location: Coordinate) -> Result<(), DragError>;

    /// Drop the element where it is.
    fn end_drag(&mut self, ws: &mut Workspace) -> Result<(), DragError>;

    /// Put everything back the way it was before the drag and forget the
    /// drag's undo history.
    fn revert_drag(&mut self, ws: &mut Workspace) -> Result<(), DragError>;

    fn state(&self) -> DragState;

    /// Event group of the current (or last) drag.
    fn group(&self) -> Option<&str>;
}

/// A connection the dragged block would join if dropped now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionCandidate {
    /// Connection on the dragged block.
    pub local: ConnectionId,
    /// Connection already in the workspace.
    pub neighbour: ConnectionId,
    pub distance: f64,
}

/// What a host should show for the current candidate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Preview {
    #[default]
    None,
    Connect(ConnectionCandidate),
    /// Dropping would oust `orphan` and it has nowhere to go on the
    /// dragged stack.
    Replace {
        candidate: ConnectionCandidate,
        orphan: blox_core::id::BlockId,
    },
}
