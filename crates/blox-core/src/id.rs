use lasso::{Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide interner shared by every id kind.
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::default);

/// A lightweight, interned identifier for blocks, comments, variables and
/// workspaces: a 4-byte `Spur` into the global interner.
///
/// Events and serialized state refer to entities only through these ids,
/// so an event can be replayed after the original objects were replaced by
/// a reload.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uid(Spur);

/// Id of a block in a [`crate::graph::BlockGraph`].
pub type BlockId = Uid;
/// Id of a workspace comment.
pub type CommentId = Uid;
/// Id of a variable model.
pub type VariableId = Uid;

impl Uid {
    /// Intern a string as a Uid, or return the existing one.
    pub fn intern(s: &str) -> Self {
        Uid(INTERNER.get_or_intern(s))
    }

    /// Resolve back to a string slice.
    pub fn as_str(&self) -> &str {
        INTERNER.resolve(&self.0)
    }

    /// Generate a fresh id that has never been interned before.
    ///
    /// Ids loaded from saved state are interned too, so a plain counter could
    /// collide with them; candidates already known to the interner are skipped.
    pub fn generate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        loop {
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            let candidate = format!("uid_{n:x}");
            if INTERNER.get(&candidate).is_none() {
                return Self::intern(&candidate);
            }
        }
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.as_str())
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Uid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Uid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Uid::intern(&s))
    }
}

/// Index of a connection in the graph's connection arena.
///
/// Connections are owned by exactly one block and never outlive it. Slots
/// are never reused, so an id held across a dispose resolves to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u32);

impl ConnectionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_roundtrip() {
        let a = Uid::intern("controls_if");
        let b = Uid::intern("controls_if");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "controls_if");
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = Uid::generate();
        let b = Uid::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = Uid::intern("block_a");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"block_a\"");
        let back: Uid = serde_json::from_str("\"block_a\"").unwrap();
        assert_eq!(back, id);
    }
}
