//! Typed connection points and the rules for joining them.
//!
//! A connection is owned by exactly one block. Two connections are joined
//! by setting each one's `target` to the other; the superior side (input or
//! next) belongs to the parent block.

use crate::geometry::Coordinate;
use crate::graph::BlockGraph;
use crate::id::{BlockId, ConnectionId};
use crate::serialization::BlockState;
use smallvec::SmallVec;
use std::fmt;
use std::ops::{Index, IndexMut};

/// Optional list of type names. `None` accepts anything.
pub type Check = Option<SmallVec<[String; 2]>>;

/// Build a [`Check`] from string slices.
pub fn check_of(types: &[&str]) -> Check {
    Some(types.iter().map(|t| (*t).to_owned()).collect())
}

// ─── Connection type ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionType {
    InputValue,
    OutputValue,
    NextStatement,
    PreviousStatement,
}

impl ConnectionType {
    pub const ALL: [ConnectionType; 4] = [
        ConnectionType::InputValue,
        ConnectionType::OutputValue,
        ConnectionType::NextStatement,
        ConnectionType::PreviousStatement,
    ];

    /// The only type this one may pair with.
    pub fn opposite(self) -> ConnectionType {
        match self {
            ConnectionType::InputValue => ConnectionType::OutputValue,
            ConnectionType::OutputValue => ConnectionType::InputValue,
            ConnectionType::NextStatement => ConnectionType::PreviousStatement,
            ConnectionType::PreviousStatement => ConnectionType::NextStatement,
        }
    }

    /// Superior connections belong to the parent side of a link.
    pub fn is_superior(self) -> bool {
        matches!(
            self,
            ConnectionType::InputValue | ConnectionType::NextStatement
        )
    }

    pub(crate) fn db_index(self) -> usize {
        match self {
            ConnectionType::InputValue => 0,
            ConnectionType::OutputValue => 1,
            ConnectionType::NextStatement => 2,
            ConnectionType::PreviousStatement => 3,
        }
    }
}

// ─── Connection ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub id: ConnectionId,
    pub kind: ConnectionType,
    pub source_block: BlockId,
    pub target: Option<ConnectionId>,
    /// Absolute workspace position.
    pub x: f64,
    pub y: f64,
    /// Position relative to the owning block's top-left corner.
    pub offset: Coordinate,
    pub check: Check,
    /// State used to respawn a shadow block when the slot empties.
    pub shadow_state: Option<BlockState>,
    /// Whether the connection is present in its spatial database.
    pub tracked: bool,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, kind: ConnectionType, source_block: BlockId) -> Self {
        Self {
            id,
            kind,
            source_block,
            target: None,
            x: 0.0,
            y: 0.0,
            offset: Coordinate::ZERO,
            check: None,
            shadow_state: None,
            tracked: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.target.is_some()
    }

    pub fn is_superior(&self) -> bool {
        self.kind.is_superior()
    }

    pub fn position(&self) -> Coordinate {
        Coordinate::new(self.x, self.y)
    }

    /// Euclidean distance to another connection.
    pub fn distance_from(&self, other: &Connection) -> f64 {
        Coordinate::distance(self.position(), other.position())
    }
}

// ─── Arena ───────────────────────────────────────────────────────────────

/// Append-only storage for connections. Disposed connections leave a
/// `None` slot behind.
#[derive(Debug, Clone, Default)]
pub struct ConnectionArena {
    slots: Vec<Option<Connection>>,
}

impl ConnectionArena {
    pub(crate) fn insert(&mut self, kind: ConnectionType, source_block: BlockId) -> ConnectionId {
        let id = ConnectionId(self.slots.len() as u32);
        self.slots.push(Some(Connection::new(id, kind, source_block)));
        id
    }

    pub(crate) fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.slots.get_mut(id.index()).and_then(Option::take)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.get(id).is_some()
    }

    /// Live connections.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.slots.iter().flatten()
    }
}

/// Indexing a disposed connection is a bug in the caller.
impl Index<ConnectionId> for ConnectionArena {
    type Output = Connection;

    fn index(&self, id: ConnectionId) -> &Connection {
        match self.get(id) {
            Some(conn) => conn,
            None => panic!("connection {id:?} was disposed"),
        }
    }
}

impl IndexMut<ConnectionId> for ConnectionArena {
    fn index_mut(&mut self, id: ConnectionId) -> &mut Connection {
        match self.get_mut(id) {
            Some(conn) => conn,
            None => panic!("connection {id:?} was disposed"),
        }
    }
}

// ─── Checker ─────────────────────────────────────────────────────────────

/// Why two connections can or cannot be joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectability {
    CanConnect,
    SelfConnection,
    WrongType,
    ShadowParent,
    PreviousAndOutput,
    ChecksFailed,
    DragChecksFailed,
}

impl fmt::Display for Connectability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Connectability::CanConnect => "connections are compatible",
            Connectability::SelfConnection => "attempt to connect a block to itself",
            Connectability::WrongType => "attempt to connect incompatible connection types",
            Connectability::ShadowParent => "a shadow block cannot have a non-shadow child",
            Connectability::PreviousAndOutput => {
                "a block cannot be attached by both its previous and output connections"
            }
            Connectability::ChecksFailed => "connection type checks failed",
            Connectability::DragChecksFailed => "connection rejected for dragging",
        };
        f.write_str(msg)
    }
}

/// Decides whether two connections may be joined.
///
/// `a` is the connection being moved (the dragged block's, during a drag)
/// and `b` the candidate it would join. `distance` only matters when
/// `is_dragging` is set.
pub trait ConnectionChecker: fmt::Debug {
    fn can_connect_with_reason(
        &self,
        graph: &BlockGraph,
        a: ConnectionId,
        b: ConnectionId,
        is_dragging: bool,
        distance: f64,
    ) -> Connectability;

    fn can_connect(
        &self,
        graph: &BlockGraph,
        a: ConnectionId,
        b: ConnectionId,
        is_dragging: bool,
        distance: f64,
    ) -> bool {
        self.can_connect_with_reason(graph, a, b, is_dragging, distance)
            == Connectability::CanConnect
    }

    /// Check-list compatibility only.
    fn do_type_checks(&self, graph: &BlockGraph, a: ConnectionId, b: ConnectionId) -> bool;
}

/// The stock rules: safety, then types, then (while dragging) proximity and
/// occupancy.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConnectionChecker;

impl DefaultConnectionChecker {
    fn do_safety_checks(
        &self,
        graph: &BlockGraph,
        a: ConnectionId,
        b: ConnectionId,
    ) -> Connectability {
        let (Some(conn_a), Some(conn_b)) = (graph.connection(a), graph.connection(b)) else {
            return Connectability::WrongType;
        };
        if conn_a.source_block == conn_b.source_block {
            return Connectability::SelfConnection;
        }
        if conn_b.kind != conn_a.kind.opposite() {
            return Connectability::WrongType;
        }

        let (superior, inferior) = if conn_a.is_superior() {
            (conn_a, conn_b)
        } else {
            (conn_b, conn_a)
        };
        let (Some(sup_block), Some(inf_block)) = (
            graph.block(superior.source_block),
            graph.block(inferior.source_block),
        ) else {
            return Connectability::WrongType;
        };

        if sup_block.shadow && !inf_block.shadow {
            return Connectability::ShadowParent;
        }
        let attached = |conn: Option<ConnectionId>| {
            conn.and_then(|c| graph.connection(c))
                .is_some_and(Connection::is_connected)
        };
        match inferior.kind {
            ConnectionType::OutputValue if attached(inf_block.previous) => {
                Connectability::PreviousAndOutput
            }
            ConnectionType::PreviousStatement if attached(inf_block.output) => {
                Connectability::PreviousAndOutput
            }
            _ => Connectability::CanConnect,
        }
    }

    /// Proximity and occupancy rules for a prospective drop of `a` onto `b`.
    fn do_drag_checks(
        &self,
        graph: &BlockGraph,
        a: ConnectionId,
        b: ConnectionId,
        distance: f64,
    ) -> bool {
        let (Some(conn_a), Some(conn_b)) = (graph.connection(a), graph.connection(b)) else {
            return false;
        };
        if conn_a.distance_from(conn_b) > distance {
            return false;
        }
        let Some(block_b) = graph.block(conn_b.source_block) else {
            return false;
        };
        if block_b.insertion_marker {
            return false;
        }
        let target_b = conn_b.target.and_then(|t| graph.block_of(t));

        match conn_b.kind {
            ConnectionType::PreviousStatement => {
                return self.can_connect_to_previous(graph, conn_a, conn_b);
            }
            ConnectionType::OutputValue => {
                // Don't offer to connect an already connected left (male)
                // value plug to an available right (female) value plug.
                let b_taken = target_b.is_some_and(|t| !t.insertion_marker);
                if b_taken || conn_a.is_connected() {
                    return false;
                }
            }
            ConnectionType::InputValue => {
                // Offering to connect the left (male) of a value block to an
                // already connected value pair is ok, unless the occupant is
                // immovable and real.
                if let Some(t) = target_b
                    && !t.is_movable()
                    && !t.shadow
                {
                    return false;
                }
            }
            ConnectionType::NextStatement => {
                if let Some(t) = target_b {
                    // A block without a next connection cannot push a real
                    // stack out of the way.
                    let a_has_next = graph
                        .block(conn_a.source_block)
                        .is_some_and(|blk| blk.next.is_some());
                    if !a_has_next && !t.shadow && t.next.is_some() {
                        return false;
                    }
                    if !t.is_movable() && !t.shadow {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// `a` is a next connection being dropped onto previous connection `b`.
    fn can_connect_to_previous(&self, graph: &BlockGraph, a: &Connection, b: &Connection) -> bool {
        if a.is_connected() {
            // Only the last block in the dragged stack may attach above.
            return false;
        }
        let Some(target) = b.target.and_then(|t| graph.block_of(t)) else {
            return true;
        };
        // Replacing an insertion marker is fine as long as it sits alone.
        if target.insertion_marker {
            return graph.previous_block(target.id).is_none();
        }
        false
    }
}

impl ConnectionChecker for DefaultConnectionChecker {
    fn can_connect_with_reason(
        &self,
        graph: &BlockGraph,
        a: ConnectionId,
        b: ConnectionId,
        is_dragging: bool,
        distance: f64,
    ) -> Connectability {
        let safety = self.do_safety_checks(graph, a, b);
        if safety != Connectability::CanConnect {
            return safety;
        }
        if !self.do_type_checks(graph, a, b) {
            return Connectability::ChecksFailed;
        }
        if is_dragging && !self.do_drag_checks(graph, a, b, distance) {
            return Connectability::DragChecksFailed;
        }
        Connectability::CanConnect
    }

    fn do_type_checks(&self, graph: &BlockGraph, a: ConnectionId, b: ConnectionId) -> bool {
        let (Some(conn_a), Some(conn_b)) = (graph.connection(a), graph.connection(b)) else {
            return false;
        };
        match (&conn_a.check, &conn_b.check) {
            (Some(check_a), Some(check_b)) => check_a.iter().any(|t| check_b.contains(t)),
            _ => true,
        }
    }
}

/// Result of a closest-connection search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Closest {
    pub connection: Option<ConnectionId>,
    pub radius: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_is_an_involution() {
        for kind in ConnectionType::ALL {
            assert_eq!(kind.opposite().opposite(), kind);
            assert_ne!(kind.is_superior(), kind.opposite().is_superior());
        }
    }

    #[test]
    fn superior_side_is_input_or_next() {
        assert!(ConnectionType::InputValue.is_superior());
        assert!(ConnectionType::NextStatement.is_superior());
        assert!(!ConnectionType::OutputValue.is_superior());
        assert!(!ConnectionType::PreviousStatement.is_superior());
    }

    #[test]
    fn arena_never_reuses_slots() {
        let mut arena = ConnectionArena::default();
        let owner = BlockId::intern("arena_owner");
        let a = arena.insert(ConnectionType::NextStatement, owner);
        arena.remove(a);
        let b = arena.insert(ConnectionType::NextStatement, owner);
        assert_ne!(a, b);
        assert!(arena.get(a).is_none());
        assert_eq!(arena[b].kind, ConnectionType::NextStatement);
    }

    #[test]
    fn check_of_builds_owned_list() {
        let check = check_of(&["Number", "String"]);
        assert_eq!(check.as_deref().map(<[String]>::len), Some(2));
    }
}
