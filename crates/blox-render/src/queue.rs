//! Batched re-layout.
//!
//! Callers queue trees and get a ticket back; a later `flush` lays out
//! every queued (or graph-dirty) root once and completes all outstanding
//! tickets together.

use blox_core::graph::BlockGraph;
use blox_core::id::BlockId;
use blox_core::layout;

/// Resolves once the flush it was issued for has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTicket(u64);

#[derive(Debug, Default)]
pub struct RenderQueue {
    queued: Vec<BlockId>,
    /// Number of completed flushes.
    generation: u64,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the tree containing `id` for re-layout.
    pub fn queue(&mut self, id: BlockId) -> RenderTicket {
        if !self.queued.contains(&id) {
            self.queued.push(id);
        }
        self.ticket()
    }

    /// A ticket for the next flush, without queueing anything.
    pub fn ticket(&self) -> RenderTicket {
        RenderTicket(self.generation + 1)
    }

    pub fn is_complete(&self, ticket: RenderTicket) -> bool {
        ticket.0 <= self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_pending(&self, graph: &BlockGraph) -> bool {
        !self.queued.is_empty() || graph.has_dirty()
    }

    /// Lay out every queued and dirty root once. Returns the completed
    /// generation.
    pub fn flush(&mut self, graph: &mut BlockGraph) -> u64 {
        let mut roots: Vec<BlockId> = Vec::new();
        let queued = std::mem::take(&mut self.queued);
        for id in queued.into_iter().filter(|id| graph.contains(*id)) {
            let root = graph.root(id);
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
        for root in graph.take_dirty_roots() {
            if !roots.contains(&root) {
                roots.push(root);
            }
        }

        for root in &roots {
            layout::layout_tree(graph, *root);
        }
        self.generation += 1;
        log::trace!(
            "render flush #{}: {} tree(s) laid out",
            self.generation,
            roots.len()
        );
        self.generation
    }
}
