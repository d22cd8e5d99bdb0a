//! Dragging workspace comments. Same lifecycle as block drags, without
//! connections.

use crate::drag::{DragError, DragState, DragStrategy};
use crate::input::Modifiers;
use crate::workspace::Workspace;
use blox_core::context::MutationContext;
use blox_core::error::GraphError;
use blox_core::events::{CommentDrag, EventKind, PendingCommentMove};
use blox_core::geometry::Coordinate;
use blox_core::id::CommentId;

#[derive(Debug)]
pub struct CommentDragStrategy {
    comment: CommentId,
    state: DragState,
    group: Option<String>,
    start_loc: Coordinate,
}

impl CommentDragStrategy {
    pub fn new(comment: CommentId) -> Self {
        Self {
            comment,
            state: DragState::Idle,
            group: None,
            start_loc: Coordinate::ZERO,
        }
    }

    fn fire_drag(&self, ctx: &mut MutationContext, is_start: bool) {
        ctx.fire(EventKind::CommentDrag(CommentDrag {
            comment_id: self.comment,
            is_start,
        }));
    }

    fn release(&mut self, ws: &mut Workspace) {
        if let Some(comment) = ws.comments.get_mut(self.comment) {
            comment.dragging = false;
        }
        ws.dragging = false;
        ws.resume_resizes();
        self.state = DragState::Idle;
    }
}

impl DragStrategy for CommentDragStrategy {
    fn is_movable(&self, ws: &Workspace) -> bool {
        !ws.is_read_only() && ws.comments.get(self.comment).is_some_and(|c| c.movable)
    }

    fn start_drag(&mut self, ws: &mut Workspace, _modifiers: Modifiers) -> Result<bool, DragError> {
        if self.state == DragState::Dragging {
            return Err(DragError::AlreadyDragging);
        }
        if !self.is_movable(ws) {
            return Ok(false);
        }
        self.group = Some(MutationContext::new_group());
        let mut ctx = ws.begin_in_group(self.group.clone());
        self.fire_drag(&mut ctx, true);
        if let Some(comment) = ws.comments.get_mut(self.comment) {
            self.start_loc = comment.xy;
            comment.dragging = true;
        }
        ws.suspend_resizes();
        ws.dragging = true;
        ws.commit(ctx);
        self.state = DragState::Dragging;
        log::debug!("comment drag start: {}", self.comment);
        Ok(true)
    }

    fn drag(&mut self, ws: &mut Workspace, new_location: Coordinate) -> Result<(), DragError> {
        if self.state != DragState::Dragging {
            return Err(DragError::NotDragging);
        }
        ws.comments.move_during_drag(self.comment, new_location);
        Ok(())
    }

    fn end_drag(&mut self, ws: &mut Workspace) -> Result<(), DragError> {
        if self.state != DragState::Dragging {
            return Err(DragError::NotDragging);
        }
        let mut ctx = ws.begin_in_group(self.group.clone());
        self.fire_drag(&mut ctx, false);
        let result = match ws.comments.get(self.comment) {
            Some(comment) => {
                let pending = PendingCommentMove::capture(comment)
                    .with_old_coordinate(self.start_loc)
                    .with_reason(&["drag"]);
                ctx.fire_event(pending.record_new(comment));
                match ws.options.grid.snap_spacing() {
                    Some(spacing) => ws.comments.snap_to_grid(&mut ctx, self.comment, spacing),
                    None => Ok(()),
                }
            }
            None => Err(GraphError::UnknownComment(self.comment)),
        };
        self.release(ws);
        ws.commit(ctx);
        result.map_err(DragError::from)
    }

    fn revert_drag(&mut self, ws: &mut Workspace) -> Result<(), DragError> {
        if self.state != DragState::Dragging {
            return Err(DragError::NotDragging);
        }
        let mut ctx = ws.begin_in_group(self.group.clone());
        self.fire_drag(&mut ctx, false);
        let result = ws
            .comments
            .move_to(&mut ctx, self.comment, self.start_loc, &["drag"]);
        self.release(ws);
        ws.commit(ctx);
        if let Some(group) = &self.group {
            ws.discard_undo_group(group);
        }
        result.map_err(DragError::from)
    }

    fn state(&self) -> DragState {
        self.state
    }

    fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }
}
