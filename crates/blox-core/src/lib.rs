pub mod block;
pub mod comment;
pub mod config;
pub mod connection;
pub mod connection_db;
pub mod context;
pub mod error;
pub mod events;
pub mod geometry;
pub mod graph;
pub mod id;
pub mod layout;
pub mod serialization;
pub mod variables;

pub use block::{Block, BlockDefinition, BlockRegistry, Input, InputKind};
pub use comment::{WorkspaceComment, WorkspaceComments};
pub use config::{DragConfig, GridOptions};
pub use connection::{
    Closest, Connectability, Connection, ConnectionChecker, ConnectionType,
    DefaultConnectionChecker,
};
pub use context::MutationContext;
pub use error::{ConnectionError, EventError, GraphError, RegistryError, VariableError};
pub use events::{Event, EventKind};
pub use geometry::{Coordinate, Rect, Size};
pub use graph::{BlockGraph, BlockLocation};
pub use id::{BlockId, CommentId, ConnectionId, Uid, VariableId};
pub use serialization::{BlockState, CommentState, SaveOptions, WorkspaceState};
pub use variables::{VariableMap, VariableModel};

// Re-export petgraph types so downstream crates don't need a direct dependency
pub use petgraph::stable_graph::NodeIndex;
