//! Blox editor: the interactive layer over the block graph.
//!
//! - [`workspace`]: owns the graph, dispatches events, keeps undo history
//! - [`replay`]: applies recorded events forwards and backwards
//! - [`drag`], [`block_drag`], [`comment_drag`]: drag strategies
//! - [`gesture`], [`input`], [`shortcuts`]: pointer and keyboard handling
//! - [`metrics`], [`warnings`]: viewport bounds and deferred warning text

pub mod block_drag;
pub mod comment_drag;
pub mod drag;
pub mod gesture;
pub mod history;
pub mod input;
pub mod metrics;
pub mod replay;
pub mod shortcuts;
pub mod warnings;
pub mod workspace;

pub use block_drag::BlockDragStrategy;
pub use comment_drag::CommentDragStrategy;
pub use drag::{ConnectionCandidate, DragError, DragState, DragStrategy, Preview};
pub use gesture::Gesture;
pub use history::UndoStack;
pub use input::{InputEvent, Modifiers};
pub use metrics::{MetricsManager, bump_into_bounds};
pub use replay::Replay;
pub use shortcuts::{ShortcutAction, ShortcutMap};
pub use warnings::WarningScheduler;
pub use workspace::{ListenerId, Workspace, WorkspaceOptions};
