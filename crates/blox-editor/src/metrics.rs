//! Viewport and content metrics.
//!
//! Screen space is pixels relative to the viewport's top-left corner;
//! workspace space is what block coordinates live in. The two differ by
//! the scroll offset and the zoom scale.

use blox_core::context::MutationContext;
use blox_core::error::GraphError;
use blox_core::geometry::{Coordinate, Rect, Size, clamp};
use blox_core::graph::BlockGraph;
use blox_core::id::BlockId;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsManager {
    /// Viewport size in screen pixels.
    pub viewport: Size,
    /// Workspace coordinate shown at the viewport's top-left corner.
    pub scroll: Coordinate,
    pub scale: f64,
    /// Union of all top block bounds, in workspace units.
    pub content: Option<Rect>,
}

impl Default for MetricsManager {
    fn default() -> Self {
        Self {
            viewport: Size::new(800.0, 600.0),
            scroll: Coordinate::ZERO,
            scale: 1.0,
            content: None,
        }
    }
}

impl MetricsManager {
    /// The visible area in workspace units.
    pub fn view_rect(&self) -> Rect {
        let size = Size::new(
            self.viewport.width / self.scale,
            self.viewport.height / self.scale,
        );
        Rect::from_origin_size(self.scroll, size)
    }

    /// Area the user can scroll over: the content padded by half a view on
    /// every side, and never smaller than the view itself.
    pub fn scroll_metrics(&self) -> Rect {
        let view = self.view_rect();
        let Some(content) = self.content else {
            return view;
        };
        let half_w = view.width() / 2.0;
        let half_h = view.height() / 2.0;
        let padded = Rect::new(
            content.top - half_h,
            content.bottom + half_h,
            content.left - half_w,
            content.right + half_w,
        );
        padded.union(&view)
    }

    pub fn screen_to_workspace(&self, x: f64, y: f64) -> Coordinate {
        Coordinate::new(
            self.scroll.x + x / self.scale,
            self.scroll.y + y / self.scale,
        )
    }

    /// Screen-pixel delta to workspace units.
    pub fn scale_delta(&self, dx: f64, dy: f64) -> Coordinate {
        Coordinate::new(dx / self.scale, dy / self.scale)
    }

    /// Recompute `content` from the graph's top blocks.
    pub fn update_content(&mut self, graph: &BlockGraph) {
        self.content = graph
            .top_blocks()
            .iter()
            .filter_map(|root| graph.stack_bounds(*root))
            .reduce(|acc, r| acc.union(&r));
    }
}

/// Move a top block so its stack lies inside `bounds`, or as much of it as
/// fits: the top-left edge wins when the stack is larger than the bounds.
/// Returns whether the block moved.
pub fn bump_into_bounds(
    graph: &mut BlockGraph,
    ctx: &mut MutationContext,
    bounds: &Rect,
    id: BlockId,
) -> Result<bool, GraphError> {
    if graph.parent(id).is_some() {
        return Ok(false);
    }
    let Some(stack) = graph.stack_bounds(id) else {
        return Ok(false);
    };
    let top = clamp(bounds.top, stack.top, bounds.bottom - stack.height());
    let left = clamp(bounds.left, stack.left, bounds.right - stack.width());
    let (dx, dy) = (left - stack.left, top - stack.top);
    if dx == 0.0 && dy == 0.0 {
        return Ok(false);
    }
    graph.move_by(ctx, id, dx, dy, &["inbounds"])?;
    Ok(true)
}
