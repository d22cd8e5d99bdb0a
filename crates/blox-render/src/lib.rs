//! Deferred layout and hit testing for the block graph.
//!
//! Structural edits only mark trees dirty; the [`RenderQueue`] re-measures
//! them in one batch per frame.

pub mod hit;
pub mod queue;

pub use hit::{HitTarget, hit_test, hit_test_rect};
pub use queue::{RenderQueue, RenderTicket};
