//! Hit testing: point → block or comment lookup.
//!
//! Later top blocks paint over earlier ones and children paint over their
//! parents, so the walk goes front-to-back: top blocks in reverse, children
//! before the block itself. Comments sit above all blocks.

use blox_core::comment::WorkspaceComments;
use blox_core::geometry::{Coordinate, Rect};
use blox_core::graph::BlockGraph;
use blox_core::id::{BlockId, CommentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    Block(BlockId),
    Comment(CommentId),
}

/// The topmost comment or block at `point`, or `None` for the background.
pub fn hit_test(
    graph: &BlockGraph,
    comments: &WorkspaceComments,
    point: Coordinate,
) -> Option<HitTarget> {
    if let Some(comment) = comments
        .iter()
        .rev()
        .find(|c| c.bounding_rect().contains(point.x, point.y))
    {
        return Some(HitTarget::Comment(comment.id));
    }
    graph
        .top_blocks()
        .iter()
        .rev()
        .find_map(|root| hit_block(graph, *root, point))
        .map(HitTarget::Block)
}

fn hit_block(graph: &BlockGraph, id: BlockId, point: Coordinate) -> Option<BlockId> {
    let collapsed = graph.block(id)?.collapsed;
    if !collapsed {
        for child in graph.children(id).into_iter().rev() {
            if let Some(hit) = hit_block(graph, child, point) {
                return Some(hit);
            }
        }
    } else if let Some(next) = graph.next_block(id)
        && let Some(hit) = hit_block(graph, next, point)
    {
        return Some(hit);
    }
    graph
        .bounding_rect(id)
        .filter(|r| r.contains(point.x, point.y))
        .map(|_| id)
}

/// Every block whose bounds intersect `rect`, for marquee selection.
pub fn hit_test_rect(graph: &BlockGraph, rect: &Rect) -> Vec<BlockId> {
    let mut out = Vec::new();
    for root in graph.top_blocks() {
        for id in graph.descendants(*root) {
            if graph.bounding_rect(id).is_some_and(|b| b.intersects(rect)) {
                out.push(id);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use blox_core::block::{BlockDefinition, BlockRegistry};
    use blox_core::context::MutationContext;
    use pretty_assertions::assert_eq;

    fn setup() -> (BlockGraph, BlockId, BlockId) {
        let mut registry = BlockRegistry::new();
        registry.define(
            BlockDefinition::new("holder")
                .previous(None)
                .next(None)
                .value_input("VALUE", None),
        );
        registry.define(BlockDefinition::new("num").output(None).min_size(40.0, 24.0));
        let mut graph = BlockGraph::new(registry);
        let mut ctx = MutationContext::silent();
        let holder = graph.new_block(&mut ctx, "holder", None).unwrap();
        let num = graph.new_block(&mut ctx, "num", None).unwrap();
        let slot = graph.block(holder).unwrap().input("VALUE").unwrap().connection.unwrap();
        let out = graph.block(num).unwrap().output.unwrap();
        graph.connect(&mut ctx, slot, out).unwrap();
        blox_core::layout::layout_tree(&mut graph, holder);
        (graph, holder, num)
    }

    #[test]
    fn child_wins_over_parent() {
        let (graph, holder, num) = setup();
        let comments = WorkspaceComments::default();
        assert_eq!(
            hit_test(&graph, &comments, Coordinate::new(90.0, 5.0)),
            Some(HitTarget::Block(num))
        );
        assert_eq!(
            hit_test(&graph, &comments, Coordinate::new(5.0, 5.0)),
            Some(HitTarget::Block(holder))
        );
        assert_eq!(hit_test(&graph, &comments, Coordinate::new(500.0, 500.0)), None);
    }

    #[test]
    fn comments_sit_above_blocks() {
        let (graph, _, _) = setup();
        let mut comments = WorkspaceComments::default();
        let note = comments.create(
            &mut MutationContext::silent(),
            "note",
            Coordinate::ZERO,
            None,
        );
        assert_eq!(
            hit_test(&graph, &comments, Coordinate::new(5.0, 5.0)),
            Some(HitTarget::Comment(note))
        );
    }

    #[test]
    fn marquee_collects_intersecting_blocks() {
        let (graph, holder, num) = setup();
        let all = hit_test_rect(&graph, &Rect::new(0.0, 30.0, 0.0, 200.0));
        assert_eq!(all, vec![holder, num]);
        let below = hit_test_rect(&graph, &Rect::new(100.0, 200.0, 0.0, 200.0));
        assert!(below.is_empty());
    }
}
