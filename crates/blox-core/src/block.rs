//! Blocks, their inputs, and the definition registry they are built from.

use crate::connection::{Check, check_of};
use crate::error::RegistryError;
use crate::geometry::{Coordinate, Size};
use crate::id::{BlockId, ConnectionId};
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};

// ─── Inputs ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Holds one value block by its output connection.
    Value,
    /// Holds a stack of statement blocks by the first one's previous connection.
    Statement,
    /// Label row without a connection.
    Dummy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub name: String,
    pub kind: InputKind,
    pub connection: Option<ConnectionId>,
}

// ─── Block ───────────────────────────────────────────────────────────────

/// A node in the block graph.
///
/// Structural links live on the connections; a block only names the
/// connections it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub block_type: String,
    pub inputs: SmallVec<[Input; 4]>,
    pub output: Option<ConnectionId>,
    pub previous: Option<ConnectionId>,
    pub next: Option<ConnectionId>,
    pub fields: BTreeMap<String, Value>,
    pub collapsed: bool,
    pub disabled: bool,
    pub editable: bool,
    pub movable: bool,
    pub deletable: bool,
    pub shadow: bool,
    pub insertion_marker: bool,
    pub inputs_inline: bool,
    pub comment: Option<String>,
    pub warning: Option<String>,
    /// Offset from the parent block, or workspace position for a root.
    pub xy: Coordinate,
    pub size: Size,
    pub min_size: Size,
    /// Disabled because some ancestor is.
    pub inherited_disabled: bool,
    pub dragging: bool,
}

impl Block {
    pub(crate) fn new(id: BlockId, def: &BlockDefinition) -> Self {
        Self {
            id,
            block_type: def.type_name.clone(),
            inputs: SmallVec::new(),
            output: None,
            previous: None,
            next: None,
            fields: def.fields.iter().cloned().collect(),
            collapsed: false,
            disabled: false,
            editable: true,
            movable: true,
            deletable: true,
            shadow: false,
            insertion_marker: false,
            inputs_inline: def.inputs_inline,
            comment: None,
            warning: None,
            xy: Coordinate::ZERO,
            size: def.min_size,
            min_size: def.min_size,
            inherited_disabled: false,
            dragging: false,
        }
    }

    /// Movable by the user: shadows always follow their parent.
    pub fn is_movable(&self) -> bool {
        self.movable && !self.shadow
    }

    pub fn is_deletable(&self) -> bool {
        self.deletable && !self.shadow
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled && !self.inherited_disabled
    }

    /// Connections in order: output, previous, next, then inputs. Inputs of a
    /// collapsed block are hidden unless `all` is set.
    pub fn connections(&self, all: bool) -> SmallVec<[ConnectionId; 8]> {
        let mut list: SmallVec<[ConnectionId; 8]> = SmallVec::new();
        list.extend(self.output);
        list.extend(self.previous);
        list.extend(self.next);
        if all || !self.collapsed {
            list.extend(self.inputs.iter().filter_map(|i| i.connection));
        }
        list
    }

    pub fn input(&self, name: &str) -> Option<&Input> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// Name of the input owning `conn`, if any.
    pub fn input_name_for(&self, conn: ConnectionId) -> Option<&str> {
        self.inputs
            .iter()
            .find(|i| i.connection == Some(conn))
            .map(|i| i.name.as_str())
    }
}

// ─── Definitions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct InputDefinition {
    pub name: String,
    pub kind: InputKind,
    pub check: Check,
}

/// Shape of a block type: which connections it has and what they accept.
///
/// ```
/// use blox_core::block::BlockDefinition;
///
/// let def = BlockDefinition::new("math_arithmetic")
///     .output(Some(&["Number"]))
///     .value_input("A", Some(&["Number"]))
///     .value_input("B", Some(&["Number"]))
///     .field("OP", "ADD".into());
/// assert_eq!(def.inputs.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDefinition {
    pub type_name: String,
    /// `Some(check)` when the block has that connection.
    pub output: Option<Check>,
    pub previous: Option<Check>,
    pub next: Option<Check>,
    pub inputs: Vec<InputDefinition>,
    pub fields: Vec<(String, Value)>,
    pub inputs_inline: bool,
    pub min_size: Size,
}

impl BlockDefinition {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            output: None,
            previous: None,
            next: None,
            inputs: Vec::new(),
            fields: Vec::new(),
            inputs_inline: false,
            min_size: Size::new(80.0, 24.0),
        }
    }

    #[must_use]
    pub fn output(mut self, check: Option<&[&str]>) -> Self {
        self.output = Some(check.and_then(check_of));
        self
    }

    #[must_use]
    pub fn previous(mut self, check: Option<&[&str]>) -> Self {
        self.previous = Some(check.and_then(check_of));
        self
    }

    #[must_use]
    pub fn next(mut self, check: Option<&[&str]>) -> Self {
        self.next = Some(check.and_then(check_of));
        self
    }

    #[must_use]
    pub fn value_input(self, name: &str, check: Option<&[&str]>) -> Self {
        self.input(name, InputKind::Value, check)
    }

    #[must_use]
    pub fn statement_input(self, name: &str, check: Option<&[&str]>) -> Self {
        self.input(name, InputKind::Statement, check)
    }

    #[must_use]
    pub fn dummy_input(self, name: &str) -> Self {
        self.input(name, InputKind::Dummy, None)
    }

    fn input(mut self, name: &str, kind: InputKind, check: Option<&[&str]>) -> Self {
        self.inputs.push(InputDefinition {
            name: name.to_owned(),
            kind,
            check: check.and_then(check_of),
        });
        self
    }

    #[must_use]
    pub fn field(mut self, name: &str, default: Value) -> Self {
        self.fields.push((name.to_owned(), default));
        self
    }

    #[must_use]
    pub fn inline(mut self, inline: bool) -> Self {
        self.inputs_inline = inline;
        self
    }

    #[must_use]
    pub fn min_size(mut self, width: f64, height: f64) -> Self {
        self.min_size = Size::new(width, height);
        self
    }
}

// ─── Registry ────────────────────────────────────────────────────────────

/// Maps block type names to their definitions.
#[derive(Debug, Clone, Default)]
pub struct BlockRegistry {
    definitions: HashMap<String, BlockDefinition>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: BlockDefinition) -> Result<(), RegistryError> {
        if self.definitions.contains_key(&def.type_name) {
            return Err(RegistryError::Duplicate(def.type_name));
        }
        self.definitions.insert(def.type_name.clone(), def);
        Ok(())
    }

    /// Register, replacing any existing definition of the same type.
    pub fn define(&mut self, def: BlockDefinition) {
        self.definitions.insert(def.type_name.clone(), def);
    }

    pub fn get(&self, type_name: &str) -> Result<&BlockDefinition, RegistryError> {
        self.definitions
            .get(type_name)
            .ok_or_else(|| RegistryError::UnknownBlockType(type_name.to_owned()))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.definitions.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
