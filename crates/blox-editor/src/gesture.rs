//! Pointer gestures.
//!
//! A press on a block or comment selects it and stays a potential click
//! until the pointer travels past the drag radius; from then on it is a
//! drag driven by the matching [`DragStrategy`]. Pointer coordinates are
//! screen pixels and are converted through the workspace metrics.

use crate::block_drag::BlockDragStrategy;
use crate::comment_drag::CommentDragStrategy;
use crate::drag::{DragError, DragStrategy};
use crate::input::{InputEvent, Modifiers};
use crate::shortcuts::{ShortcutAction, ShortcutMap};
use crate::workspace::Workspace;
use blox_core::geometry::{Coordinate, Rect};
use blox_render::{HitTarget, hit_test};

enum GestureState {
    Idle,
    /// Pointer is down but has not moved far enough to drag.
    Pending {
        target: Option<HitTarget>,
        start: (f64, f64),
        modifiers: Modifiers,
    },
    Dragging {
        target: HitTarget,
        strategy: Box<dyn DragStrategy>,
        start: (f64, f64),
        /// Workspace position of the target when the drag began.
        origin: Coordinate,
    },
    /// Moved too far to be a click, but the target could not be dragged.
    Abandoned,
}

pub struct Gesture {
    state: GestureState,
    /// Screen-space area that deletes whatever is dropped on it.
    pub delete_area: Option<Rect>,
}

impl Default for Gesture {
    fn default() -> Self {
        Self::new()
    }
}

impl Gesture {
    pub fn new() -> Self {
        Self {
            state: GestureState::Idle,
            delete_area: None,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, GestureState::Dragging { .. })
    }

    /// Feed one input event.
    pub fn handle(&mut self, ws: &mut Workspace, event: &InputEvent) -> Result<(), DragError> {
        match event {
            InputEvent::PointerDown { x, y, modifiers } => {
                if self.is_dragging() {
                    return Ok(());
                }
                let point = ws.metrics().screen_to_workspace(*x, *y);
                let target = hit_test(ws.graph(), ws.comments(), point);
                ws.select(target.map(|t| match t {
                    HitTarget::Block(id) | HitTarget::Comment(id) => id,
                }));
                self.state = GestureState::Pending {
                    target,
                    start: (*x, *y),
                    modifiers: *modifiers,
                };
                Ok(())
            }
            InputEvent::PointerMove { x, y } => self.pointer_move(ws, *x, *y),
            InputEvent::PointerUp { x, y } => self.pointer_up(ws, *x, *y),
            InputEvent::Key { key, modifiers } => match ShortcutMap::resolve(key, *modifiers) {
                Some(action) => self.shortcut(ws, action),
                None => Ok(()),
            },
        }
    }

    fn pointer_move(&mut self, ws: &mut Workspace, x: f64, y: f64) -> Result<(), DragError> {
        match &mut self.state {
            GestureState::Pending {
                target,
                start,
                modifiers,
            } => {
                let travelled = Coordinate::distance(
                    Coordinate::new(x, y),
                    Coordinate::new(start.0, start.1),
                );
                if travelled <= ws.graph().config.drag_radius {
                    return Ok(());
                }
                let (target, start, modifiers) = (*target, *start, *modifiers);
                self.state = GestureState::Abandoned;
                let Some(target) = target else {
                    return Ok(());
                };
                let (mut strategy, origin): (Box<dyn DragStrategy>, Coordinate) = match target {
                    HitTarget::Block(id) => (
                        Box::new(BlockDragStrategy::new(id)),
                        ws.graph().relative_to_surface(id),
                    ),
                    HitTarget::Comment(id) => {
                        let Some(comment) = ws.comments().get(id) else {
                            return Ok(());
                        };
                        (Box::new(CommentDragStrategy::new(id)), comment.xy)
                    }
                };
                if !strategy.start_drag(ws, modifiers)? {
                    return Ok(());
                }
                self.state = GestureState::Dragging {
                    target,
                    strategy,
                    start,
                    origin,
                };
                self.pointer_move(ws, x, y)
            }
            GestureState::Dragging {
                strategy,
                start,
                origin,
                ..
            } => {
                let delta = ws.metrics().scale_delta(x - start.0, y - start.1);
                strategy.drag(ws, *origin + delta)
            }
            GestureState::Idle | GestureState::Abandoned => Ok(()),
        }
    }

    fn pointer_up(&mut self, ws: &mut Workspace, x: f64, y: f64) -> Result<(), DragError> {
        self.pointer_move(ws, x, y)?;
        match std::mem::replace(&mut self.state, GestureState::Idle) {
            GestureState::Pending { target, .. } => {
                ws.click(match target {
                    Some(HitTarget::Block(id)) => Some(id),
                    _ => None,
                });
                Ok(())
            }
            GestureState::Dragging {
                target,
                mut strategy,
                ..
            } => {
                let group = strategy.group().map(str::to_owned);
                strategy.end_drag(ws)?;
                if self.delete_area.is_some_and(|area| area.contains(x, y)) {
                    Self::delete_dropped(ws, target, group)?;
                }
                Ok(())
            }
            GestureState::Idle | GestureState::Abandoned => Ok(()),
        }
    }

    fn delete_dropped(
        ws: &mut Workspace,
        target: HitTarget,
        group: Option<String>,
    ) -> Result<(), DragError> {
        match target {
            HitTarget::Block(id) => {
                // A shadow was carried by its nearest real ancestor.
                let mut dropped = id;
                while ws.graph().block(dropped).is_some_and(|b| b.shadow)
                    && let Some(parent) = ws.graph().parent(dropped)
                {
                    dropped = parent;
                }
                if ws.graph().block(dropped).is_some_and(|b| b.is_deletable()) {
                    ws.dispose_block_in_group(dropped, false, group)?;
                }
            }
            HitTarget::Comment(id) => {
                if ws.comments().get(id).is_some_and(|c| c.deletable) {
                    ws.dispose_comment(id);
                }
            }
        }
        Ok(())
    }

    fn shortcut(&mut self, ws: &mut Workspace, action: ShortcutAction) -> Result<(), DragError> {
        match action {
            ShortcutAction::Cancel => {
                let state = std::mem::replace(&mut self.state, GestureState::Idle);
                match state {
                    GestureState::Dragging { mut strategy, .. } => {
                        self.state = GestureState::Abandoned;
                        strategy.revert_drag(ws)?;
                    }
                    GestureState::Pending { .. } => self.state = GestureState::Abandoned,
                    other => self.state = other,
                }
                Ok(())
            }
            _ if self.is_dragging() => Ok(()),
            ShortcutAction::Undo => Ok(ws.undo(false)?),
            ShortcutAction::Redo => Ok(ws.undo(true)?),
            ShortcutAction::Delete => {
                let Some(selected) = ws.selected() else {
                    return Ok(());
                };
                if ws.comments().contains(selected) {
                    ws.dispose_comment(selected);
                } else if ws
                    .graph()
                    .block(selected)
                    .is_some_and(|b| b.is_deletable() && !b.shadow)
                {
                    ws.dispose_block(selected, true)?;
                }
                Ok(())
            }
        }
    }
}
