//! Free-floating workspace comments.

use crate::context::MutationContext;
use crate::error::GraphError;
use crate::events::{
    CommentChange, CommentCollapse, CommentCreate, CommentDelete, EventKind, PendingCommentMove,
    PendingCommentResize,
};
use crate::geometry::{Coordinate, Rect, Size};
use crate::id::{CommentId, Uid};
use crate::serialization::CommentState;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceComment {
    pub id: CommentId,
    pub text: String,
    pub xy: Coordinate,
    pub size: Size,
    pub collapsed: bool,
    pub editable: bool,
    pub movable: bool,
    pub deletable: bool,
    pub dragging: bool,
}

impl WorkspaceComment {
    pub const DEFAULT_SIZE: Size = Size::new(120.0, 100.0);

    pub fn new(id: CommentId, text: impl Into<String>, xy: Coordinate) -> Self {
        Self {
            id,
            text: text.into(),
            xy,
            size: Self::DEFAULT_SIZE,
            collapsed: false,
            editable: true,
            movable: true,
            deletable: true,
            dragging: false,
        }
    }

    pub fn from_state(id: CommentId, state: &CommentState) -> Self {
        let size = if state.width > 0.0 && state.height > 0.0 {
            Size::new(state.width, state.height)
        } else {
            Self::DEFAULT_SIZE
        };
        Self {
            id,
            text: state.text.clone(),
            xy: Coordinate::new(state.x, state.y),
            size,
            collapsed: state.collapsed,
            editable: state.editable.unwrap_or(true),
            movable: state.movable.unwrap_or(true),
            deletable: state.deletable.unwrap_or(true),
            dragging: false,
        }
    }

    pub fn save(&self) -> CommentState {
        CommentState {
            id: Some(self.id),
            text: self.text.clone(),
            x: self.xy.x,
            y: self.xy.y,
            width: self.size.width,
            height: self.size.height,
            collapsed: self.collapsed,
            editable: (!self.editable).then_some(false),
            movable: (!self.movable).then_some(false),
            deletable: (!self.deletable).then_some(false),
        }
    }

    pub fn bounding_rect(&self) -> Rect {
        Rect::from_origin_size(self.xy, self.size)
    }
}

/// All comments of a workspace, in z-order (last is topmost).
#[derive(Debug, Clone, Default)]
pub struct WorkspaceComments {
    comments: Vec<WorkspaceComment>,
}

impl WorkspaceComments {
    pub fn get(&self, id: CommentId) -> Option<&WorkspaceComment> {
        self.comments.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: CommentId) -> Option<&mut WorkspaceComment> {
        self.comments.iter_mut().find(|c| c.id == id)
    }

    fn require_mut(&mut self, id: CommentId) -> Result<&mut WorkspaceComment, GraphError> {
        self.get_mut(id).ok_or(GraphError::UnknownComment(id))
    }

    pub fn contains(&self, id: CommentId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &WorkspaceComment> {
        self.comments.iter()
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn create(
        &mut self,
        ctx: &mut MutationContext,
        text: &str,
        xy: Coordinate,
        id: Option<CommentId>,
    ) -> CommentId {
        let id = id
            .filter(|id| !self.contains(*id))
            .unwrap_or_else(Uid::generate);
        self.insert(ctx, WorkspaceComment::new(id, text, xy))
    }

    pub fn load(&mut self, ctx: &mut MutationContext, state: &CommentState) -> CommentId {
        let id = state
            .id
            .filter(|id| !self.contains(*id))
            .unwrap_or_else(Uid::generate);
        self.insert(ctx, WorkspaceComment::from_state(id, state))
    }

    fn insert(&mut self, ctx: &mut MutationContext, comment: WorkspaceComment) -> CommentId {
        let id = comment.id;
        ctx.fire(EventKind::CommentCreate(CommentCreate {
            comment_id: id,
            json: comment.save(),
        }));
        self.comments.push(comment);
        id
    }

    /// Remove a comment. Returns false when it does not exist.
    pub fn dispose(&mut self, ctx: &mut MutationContext, id: CommentId) -> bool {
        let Some(index) = self.comments.iter().position(|c| c.id == id) else {
            return false;
        };
        let comment = self.comments.remove(index);
        ctx.fire(EventKind::CommentDelete(CommentDelete {
            comment_id: id,
            json: comment.save(),
        }));
        true
    }

    pub fn set_text(
        &mut self,
        ctx: &mut MutationContext,
        id: CommentId,
        text: &str,
    ) -> Result<(), GraphError> {
        let comment = self.require_mut(id)?;
        if comment.text == text {
            return Ok(());
        }
        let old = std::mem::replace(&mut comment.text, text.to_owned());
        ctx.fire(EventKind::CommentChange(CommentChange {
            comment_id: id,
            old_contents: old,
            new_contents: text.to_owned(),
        }));
        Ok(())
    }

    pub fn move_to(
        &mut self,
        ctx: &mut MutationContext,
        id: CommentId,
        xy: Coordinate,
        reason: &[&str],
    ) -> Result<(), GraphError> {
        let comment = self.require_mut(id)?;
        let pending = PendingCommentMove::capture(comment).with_reason(reason);
        comment.xy = xy;
        ctx.fire_event(pending.record_new(comment));
        Ok(())
    }

    pub fn move_by(
        &mut self,
        ctx: &mut MutationContext,
        id: CommentId,
        dx: f64,
        dy: f64,
        reason: &[&str],
    ) -> Result<(), GraphError> {
        let xy = self
            .get(id)
            .ok_or(GraphError::UnknownComment(id))?
            .xy
            .translate(dx, dy);
        self.move_to(ctx, id, xy, reason)
    }

    /// Reposition without firing; drags report one move at the end.
    pub fn move_during_drag(&mut self, id: CommentId, xy: Coordinate) {
        if let Some(comment) = self.get_mut(id) {
            comment.xy = xy;
        }
    }

    pub fn resize(
        &mut self,
        ctx: &mut MutationContext,
        id: CommentId,
        size: Size,
    ) -> Result<(), GraphError> {
        let comment = self.require_mut(id)?;
        let pending = PendingCommentResize::capture(comment);
        comment.size = size;
        ctx.fire_event(pending.record_new(comment));
        Ok(())
    }

    pub fn set_collapsed(
        &mut self,
        ctx: &mut MutationContext,
        id: CommentId,
        collapsed: bool,
    ) -> Result<(), GraphError> {
        let comment = self.require_mut(id)?;
        if comment.collapsed == collapsed {
            return Ok(());
        }
        comment.collapsed = collapsed;
        ctx.fire(EventKind::CommentCollapse(CommentCollapse {
            comment_id: id,
            new_collapsed: collapsed,
        }));
        Ok(())
    }

    /// Move to the nearest grid point.
    pub fn snap_to_grid(
        &mut self,
        ctx: &mut MutationContext,
        id: CommentId,
        spacing: f64,
    ) -> Result<(), GraphError> {
        let xy = self.get(id).ok_or(GraphError::UnknownComment(id))?.xy;
        let snapped = crate::graph::snap_coordinate(xy, spacing);
        if snapped != xy {
            self.move_to(ctx, id, snapped, &["snap"])?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.comments.clear();
    }
}
