use crate::connection::Connectability;
use crate::id::{BlockId, CommentId, ConnectionId, VariableId};
use thiserror::Error;

/// Errors raised while joining or separating two connections.
///
/// All of these are programmer errors: the drag layer pre-validates its
/// candidates, so a failure here means the caller skipped a check.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("incompatible connections: {0}")]
    Incompatible(Connectability),

    #[error("connecting block '{child}' under '{parent}' would create a cycle")]
    Cycle { parent: BlockId, child: BlockId },

    #[error("connection {0:?} does not exist")]
    Missing(ConnectionId),

    #[error("connection {0:?} is not connected back to its target")]
    NotReciprocal(ConnectionId),
}

/// Errors from the block definition registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("no block definition registered for type '{0}'")]
    UnknownBlockType(String),

    #[error("block type '{0}' is already registered")]
    Duplicate(String),
}

/// Errors from structural operations on the block graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("block '{0}' does not exist")]
    UnknownBlock(BlockId),

    #[error("block '{0}' is attached to a parent; unplug it before moving")]
    AttachedToParent(BlockId),

    #[error("block '{block}' has no field named '{name}'")]
    UnknownField { block: BlockId, name: String },

    #[error("block '{block}' has no input named '{name}'")]
    UnknownInput { block: BlockId, name: String },

    #[error("block of type '{0}' has no output or previous connection to attach with")]
    NoParentConnection(String),

    #[error("comment '{0}' does not exist")]
    UnknownComment(CommentId),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Variable(#[from] VariableError),
}

/// Errors from the variable map.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VariableError {
    #[error("variable id '{id}' is already used by '{existing}'")]
    IdInUse { id: VariableId, existing: String },

    #[error("variable name '{name}' is already used with type '{existing_type}'")]
    NameInUse { name: String, existing_type: String },

    #[error("variable '{0}' does not exist")]
    NotFound(VariableId),
}

/// Errors from event (de)serialization and replay.
#[derive(Error, Debug)]
pub enum EventError {
    #[error("invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown event type '{0}'")]
    UnknownType(String),

    #[error("event JSON is not an object")]
    NotAnObject,

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl From<ConnectionError> for EventError {
    fn from(err: ConnectionError) -> Self {
        EventError::Graph(GraphError::Connection(err))
    }
}

impl From<VariableError> for EventError {
    fn from(err: VariableError) -> Self {
        EventError::Graph(GraphError::Variable(err))
    }
}
