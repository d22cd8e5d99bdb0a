//! Spatial index of tracked connections, one database per connection type.
//!
//! Each database keeps its connections sorted by `y`, so a proximity search
//! can binary-search to the right row and scan outwards while the vertical
//! distance alone is still within range.

use crate::connection::{Closest, ConnectionArena};
use crate::geometry::Coordinate;
use crate::graph::BlockGraph;
use crate::id::ConnectionId;

#[derive(Debug, Clone, Default)]
pub struct ConnectionDb {
    connections: Vec<ConnectionId>,
}

impl ConnectionDb {
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.iter().copied()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains(&id)
    }

    /// First index whose connection is at or below `y`.
    fn index_for_y(&self, arena: &ConnectionArena, y: f64) -> usize {
        self.connections
            .partition_point(|c| arena.get(*c).is_some_and(|conn| conn.y < y))
    }

    fn find_index(&self, arena: &ConnectionArena, id: ConnectionId) -> Option<usize> {
        if let Some(conn) = arena.get(id) {
            let mut i = self.index_for_y(arena, conn.y);
            while let Some(&candidate) = self.connections.get(i) {
                if candidate == id {
                    return Some(i);
                }
                if arena.get(candidate).is_none_or(|c| c.y != conn.y) {
                    break;
                }
                i += 1;
            }
        }
        // Position changed while tracked, or the slot is gone.
        self.connections.iter().position(|c| *c == id)
    }

    /// Insert at the position given by the connection's current `y`.
    pub(crate) fn add(&mut self, arena: &ConnectionArena, id: ConnectionId) {
        let Some(conn) = arena.get(id) else {
            return;
        };
        let index = self.index_for_y(arena, conn.y);
        self.connections.insert(index, id);
    }

    pub(crate) fn remove(&mut self, arena: &ConnectionArena, id: ConnectionId) -> bool {
        match self.find_index(arena, id) {
            Some(index) => {
                self.connections.remove(index);
                true
            }
            None => false,
        }
    }

    /// Find the closest connection in this database that `conn` may join,
    /// within `max_radius` of the connection's current position.
    ///
    /// Every accepted match narrows the radius for the remaining scan; a
    /// match at exactly the current best distance replaces it.
    pub fn search_for_closest(
        &self,
        graph: &BlockGraph,
        conn: ConnectionId,
        max_radius: f64,
    ) -> Closest {
        let mut best = Closest {
            connection: None,
            radius: max_radius,
        };
        let Some(base) = graph.connection(conn) else {
            return best;
        };
        if self.connections.is_empty() {
            return best;
        }

        let arena = graph.connections();
        let base_y = base.y;
        let in_y_range = |index: usize| {
            arena
                .get(self.connections[index])
                .is_some_and(|c| (c.y - base_y).abs() <= max_radius)
        };
        let consider = |index: usize, best: &mut Closest| {
            let candidate = self.connections[index];
            if graph
                .checker()
                .can_connect(graph, conn, candidate, true, best.radius)
                && let Some(other) = arena.get(candidate)
            {
                best.connection = Some(candidate);
                best.radius = base.distance_from(other);
            }
        };

        let start = self.index_for_y(arena, base_y);

        let mut lower = start;
        while lower > 0 && in_y_range(lower - 1) {
            consider(lower - 1, &mut best);
            lower -= 1;
        }

        let mut upper = start;
        while upper < self.connections.len() && in_y_range(upper) {
            consider(upper, &mut best);
            upper += 1;
        }

        log::trace!(
            "search_for_closest({conn:?}, r={max_radius}) scanned [{lower}, {upper}) -> {:?}",
            best.connection
        );
        best
    }

    /// Every connection within `max_radius` of `position`, without any
    /// compatibility filtering.
    pub fn neighbours(
        &self,
        arena: &ConnectionArena,
        position: Coordinate,
        max_radius: f64,
    ) -> Vec<ConnectionId> {
        let start = self.index_for_y(arena, position.y);
        let mut found = Vec::new();
        let mut visit = |index: usize| -> bool {
            let id = self.connections[index];
            let Some(conn) = arena.get(id) else {
                return true;
            };
            let dy = conn.y - position.y;
            if dy.abs() > max_radius {
                return false;
            }
            if Coordinate::distance(conn.position(), position) <= max_radius {
                found.push(id);
            }
            true
        };

        let mut lower = start;
        while lower > 0 && visit(lower - 1) {
            lower -= 1;
        }
        let mut upper = start;
        while upper < self.connections.len() && visit(upper) {
            upper += 1;
        }
        found
    }
}
