//! Change events: what happened to the workspace, in a form that can be
//! serialized, replayed forwards and backwards, and merged for undo.
//!
//! Events are built complete. A move is captured in two steps through
//! [`PendingMove`], whose `record_new` consumes it, so the new location is
//! recorded exactly once.

use crate::comment::WorkspaceComment;
use crate::error::EventError;
use crate::geometry::{Coordinate, Size};
use crate::graph::{BlockGraph, BlockLocation};
use crate::id::{BlockId, CommentId, Uid, VariableId};
use crate::serialization::{BlockState, CommentState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ─── Payloads ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockCreate {
    pub block_id: BlockId,
    pub json: BlockState,
    /// The root and every descendant created with it.
    pub ids: Vec<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDelete {
    pub block_id: BlockId,
    pub old_json: BlockState,
    pub ids: Vec<BlockId>,
    #[serde(default)]
    pub was_shadow: bool,
}

/// Which property a [`BlockChange`] touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeElement {
    Field,
    Comment,
    Collapsed,
    Disabled,
    Inline,
    Mutation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockChange {
    pub block_id: BlockId,
    pub element: ChangeElement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub old_value: Value,
    #[serde(default)]
    pub new_value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMove {
    pub block_id: BlockId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_parent_id: Option<BlockId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_input_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_coordinate: Option<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_parent_id: Option<BlockId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_input_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_coordinate: Option<Coordinate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reason: Vec<String>,
}

impl BlockMove {
    pub fn old_location(&self) -> BlockLocation {
        BlockLocation {
            parent_id: self.old_parent_id,
            input_name: self.old_input_name.clone(),
            coordinate: self.old_coordinate,
        }
    }

    pub fn new_location(&self) -> BlockLocation {
        BlockLocation {
            parent_id: self.new_parent_id,
            input_name: self.new_input_name.clone(),
            coordinate: self.new_coordinate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDrag {
    pub block_id: BlockId,
    pub is_start: bool,
    #[serde(default)]
    pub blocks: Vec<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldIntermediateChange {
    pub block_id: BlockId,
    pub name: String,
    #[serde(default)]
    pub old_value: Value,
    #[serde(default)]
    pub new_value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarCreate {
    pub var_id: VariableId,
    #[serde(default)]
    pub var_type: String,
    pub var_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarDelete {
    pub var_id: VariableId,
    #[serde(default)]
    pub var_type: String,
    pub var_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarRename {
    pub var_id: VariableId,
    pub old_name: String,
    pub new_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selected {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_element_id: Option<Uid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_element_id: Option<Uid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickTarget {
    Block,
    Workspace,
    Zoom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Click {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<BlockId>,
    pub target_type: ClickTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BubbleOpen {
    pub block_id: BlockId,
    pub is_open: bool,
    pub bubble_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportChange {
    pub viewport_top: f64,
    pub viewport_left: f64,
    pub scale: f64,
    pub old_scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentCreate {
    pub comment_id: CommentId,
    pub json: CommentState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDelete {
    pub comment_id: CommentId,
    pub json: CommentState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentChange {
    pub comment_id: CommentId,
    pub old_contents: String,
    pub new_contents: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentMove {
    pub comment_id: CommentId,
    pub old_coordinate: Coordinate,
    pub new_coordinate: Coordinate,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reason: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResize {
    pub comment_id: CommentId,
    pub old_size: Size,
    pub new_size: Size,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDrag {
    pub comment_id: CommentId,
    pub is_start: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentCollapse {
    pub comment_id: CommentId,
    pub new_collapsed: bool,
}

// ─── EventKind ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    #[serde(rename = "create")]
    BlockCreate(BlockCreate),
    #[serde(rename = "delete")]
    BlockDelete(BlockDelete),
    #[serde(rename = "change")]
    BlockChange(BlockChange),
    #[serde(rename = "move")]
    BlockMove(BlockMove),
    #[serde(rename = "drag")]
    BlockDrag(BlockDrag),
    #[serde(rename = "block_field_intermediate_change")]
    FieldIntermediateChange(FieldIntermediateChange),
    #[serde(rename = "var_create")]
    VarCreate(VarCreate),
    #[serde(rename = "var_delete")]
    VarDelete(VarDelete),
    #[serde(rename = "var_rename")]
    VarRename(VarRename),
    #[serde(rename = "selected")]
    Selected(Selected),
    #[serde(rename = "click")]
    Click(Click),
    #[serde(rename = "bubble_open")]
    BubbleOpen(BubbleOpen),
    #[serde(rename = "viewport_change")]
    ViewportChange(ViewportChange),
    #[serde(rename = "comment_create")]
    CommentCreate(CommentCreate),
    #[serde(rename = "comment_delete")]
    CommentDelete(CommentDelete),
    #[serde(rename = "comment_change")]
    CommentChange(CommentChange),
    #[serde(rename = "comment_move")]
    CommentMove(CommentMove),
    #[serde(rename = "comment_resize")]
    CommentResize(CommentResize),
    #[serde(rename = "comment_drag")]
    CommentDrag(CommentDrag),
    #[serde(rename = "comment_collapse")]
    CommentCollapse(CommentCollapse),
    #[serde(rename = "finished_loading")]
    FinishedLoading,
}

impl EventKind {
    /// Every serialized `type` string.
    pub const TYPE_NAMES: [&'static str; 21] = [
        "create",
        "delete",
        "change",
        "move",
        "drag",
        "block_field_intermediate_change",
        "var_create",
        "var_delete",
        "var_rename",
        "selected",
        "click",
        "bubble_open",
        "viewport_change",
        "comment_create",
        "comment_delete",
        "comment_change",
        "comment_move",
        "comment_resize",
        "comment_drag",
        "comment_collapse",
        "finished_loading",
    ];

    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::BlockCreate(_) => "create",
            EventKind::BlockDelete(_) => "delete",
            EventKind::BlockChange(_) => "change",
            EventKind::BlockMove(_) => "move",
            EventKind::BlockDrag(_) => "drag",
            EventKind::FieldIntermediateChange(_) => "block_field_intermediate_change",
            EventKind::VarCreate(_) => "var_create",
            EventKind::VarDelete(_) => "var_delete",
            EventKind::VarRename(_) => "var_rename",
            EventKind::Selected(_) => "selected",
            EventKind::Click(_) => "click",
            EventKind::BubbleOpen(_) => "bubble_open",
            EventKind::ViewportChange(_) => "viewport_change",
            EventKind::CommentCreate(_) => "comment_create",
            EventKind::CommentDelete(_) => "comment_delete",
            EventKind::CommentChange(_) => "comment_change",
            EventKind::CommentMove(_) => "comment_move",
            EventKind::CommentResize(_) => "comment_resize",
            EventKind::CommentDrag(_) => "comment_drag",
            EventKind::CommentCollapse(_) => "comment_collapse",
            EventKind::FinishedLoading => "finished_loading",
        }
    }

    /// UI events describe presentation, never model state.
    pub fn is_ui(&self) -> bool {
        matches!(
            self,
            EventKind::BlockDrag(_)
                | EventKind::Selected(_)
                | EventKind::Click(_)
                | EventKind::BubbleOpen(_)
                | EventKind::ViewportChange(_)
                | EventKind::CommentDrag(_)
                | EventKind::FinishedLoading
        )
    }

    pub fn default_record_undo(&self) -> bool {
        match self {
            EventKind::FieldIntermediateChange(_) => false,
            EventKind::BlockDelete(e) => !e.was_shadow,
            kind => !kind.is_ui(),
        }
    }

    /// True when applying the event would change nothing.
    pub fn is_null(&self) -> bool {
        match self {
            EventKind::BlockMove(e) => e.old_location() == e.new_location(),
            EventKind::BlockChange(e) => e.old_value == e.new_value,
            EventKind::FieldIntermediateChange(e) => e.old_value == e.new_value,
            EventKind::CommentChange(e) => e.old_contents == e.new_contents,
            EventKind::CommentMove(e) => e.old_coordinate == e.new_coordinate,
            EventKind::CommentResize(e) => e.old_size == e.new_size,
            _ => false,
        }
    }

    /// The block, comment or variable the event is about.
    pub fn entity_id(&self) -> Option<Uid> {
        match self {
            EventKind::BlockCreate(e) => Some(e.block_id),
            EventKind::BlockDelete(e) => Some(e.block_id),
            EventKind::BlockChange(e) => Some(e.block_id),
            EventKind::BlockMove(e) => Some(e.block_id),
            EventKind::BlockDrag(e) => Some(e.block_id),
            EventKind::FieldIntermediateChange(e) => Some(e.block_id),
            EventKind::VarCreate(e) => Some(e.var_id),
            EventKind::VarDelete(e) => Some(e.var_id),
            EventKind::VarRename(e) => Some(e.var_id),
            EventKind::Selected(e) => e.new_element_id,
            EventKind::Click(e) => e.block_id,
            EventKind::BubbleOpen(e) => Some(e.block_id),
            EventKind::ViewportChange(_) | EventKind::FinishedLoading => None,
            EventKind::CommentCreate(e) => Some(e.comment_id),
            EventKind::CommentDelete(e) => Some(e.comment_id),
            EventKind::CommentChange(e) => Some(e.comment_id),
            EventKind::CommentMove(e) => Some(e.comment_id),
            EventKind::CommentResize(e) => Some(e.comment_id),
            EventKind::CommentDrag(e) => Some(e.comment_id),
            EventKind::CommentCollapse(e) => Some(e.comment_id),
        }
    }
}

// ─── Event ───────────────────────────────────────────────────────────────

/// A fired event. Never mutated after it reaches listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub workspace_id: Option<Uid>,
    /// Correlates the events of one user gesture for undo.
    pub group: Option<String>,
    pub record_undo: bool,
    pub kind: EventKind,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventHeader {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    record_undo: Option<bool>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            workspace_id: None,
            group: None,
            record_undo: kind.default_record_undo(),
            kind,
        }
    }

    #[must_use]
    pub fn with_record_undo(mut self, record_undo: bool) -> Self {
        self.record_undo = record_undo;
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: Option<String>) -> Self {
        self.group = group;
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn is_ui(&self) -> bool {
        self.kind.is_ui()
    }

    pub fn is_null(&self) -> bool {
        self.kind.is_null()
    }

    /// JSON object with a `type` tag, camelCase fields, `group` when set and
    /// `recordUndo` only when false.
    pub fn to_json(&self) -> Result<Value, EventError> {
        let mut value = serde_json::to_value(&self.kind)?;
        let Value::Object(map) = &mut value else {
            return Err(EventError::NotAnObject);
        };
        if let Some(group) = &self.group {
            map.insert("group".into(), Value::String(group.clone()));
        }
        if !self.record_undo {
            map.insert("recordUndo".into(), Value::Bool(false));
        }
        Ok(value)
    }

    /// Rebuild an event from [`Event::to_json`] output. The workspace id is
    /// not part of the JSON and is supplied by the caller.
    pub fn from_json(value: &Value, workspace_id: Option<Uid>) -> Result<Event, EventError> {
        if !value.is_object() {
            return Err(EventError::NotAnObject);
        }
        let header = EventHeader::deserialize(value)?;
        if !EventKind::TYPE_NAMES.contains(&header.type_name.as_str()) {
            return Err(EventError::UnknownType(header.type_name));
        }
        let kind = EventKind::deserialize(value)?;
        let record_undo = header
            .record_undo
            .unwrap_or_else(|| kind.default_record_undo());
        Ok(Event {
            workspace_id,
            group: header.group,
            record_undo,
            kind,
        })
    }
}

// ─── Pending captures ────────────────────────────────────────────────────

/// First half of a block move: the location before the mutation.
#[derive(Debug, Clone)]
#[must_use = "a pending move records nothing until `record_new` is called"]
pub struct PendingMove {
    block_id: BlockId,
    old: BlockLocation,
    reason: Vec<String>,
}

impl PendingMove {
    pub fn capture(graph: &BlockGraph, block_id: BlockId) -> Self {
        Self {
            block_id,
            old: graph.location(block_id),
            reason: Vec::new(),
        }
    }

    pub fn with_reason(mut self, reason: &[&str]) -> Self {
        self.reason = reason.iter().map(|r| (*r).to_owned()).collect();
        self
    }

    /// Override the recorded start coordinate (a drag records where the
    /// pointer picked the block up, not where it was unplugged).
    pub fn with_old_coordinate(mut self, coordinate: Coordinate) -> Self {
        self.old.coordinate = Some(coordinate);
        self
    }

    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    /// Complete the move with the block's current location. Moves of
    /// shadow blocks are never recorded for undo.
    pub fn record_new(self, graph: &BlockGraph) -> Event {
        let new = graph.location(self.block_id);
        let shadow = graph.block(self.block_id).is_some_and(|b| b.shadow);
        let event = Event::new(EventKind::BlockMove(BlockMove {
            block_id: self.block_id,
            old_parent_id: self.old.parent_id,
            old_input_name: self.old.input_name,
            old_coordinate: self.old.coordinate,
            new_parent_id: new.parent_id,
            new_input_name: new.input_name,
            new_coordinate: new.coordinate,
            reason: self.reason,
        }));
        if shadow {
            event.with_record_undo(false)
        } else {
            event
        }
    }
}

#[derive(Debug, Clone)]
#[must_use = "a pending move records nothing until `record_new` is called"]
pub struct PendingCommentMove {
    comment_id: CommentId,
    old: Coordinate,
    reason: Vec<String>,
}

impl PendingCommentMove {
    pub fn capture(comment: &WorkspaceComment) -> Self {
        Self {
            comment_id: comment.id,
            old: comment.xy,
            reason: Vec::new(),
        }
    }

    pub fn with_reason(mut self, reason: &[&str]) -> Self {
        self.reason = reason.iter().map(|r| (*r).to_owned()).collect();
        self
    }

    pub fn with_old_coordinate(mut self, coordinate: Coordinate) -> Self {
        self.old = coordinate;
        self
    }

    pub fn record_new(self, comment: &WorkspaceComment) -> Event {
        Event::new(EventKind::CommentMove(CommentMove {
            comment_id: self.comment_id,
            old_coordinate: self.old,
            new_coordinate: comment.xy,
            reason: self.reason,
        }))
    }
}

#[derive(Debug, Clone)]
#[must_use = "a pending resize records nothing until `record_new` is called"]
pub struct PendingCommentResize {
    comment_id: CommentId,
    old: Size,
}

impl PendingCommentResize {
    pub fn capture(comment: &WorkspaceComment) -> Self {
        Self {
            comment_id: comment.id,
            old: comment.size,
        }
    }

    pub fn record_new(self, comment: &WorkspaceComment) -> Event {
        Event::new(EventKind::CommentResize(CommentResize {
            comment_id: self.comment_id,
            old_size: self.old,
            new_size: comment.size,
        }))
    }
}

// ─── Filtering ───────────────────────────────────────────────────────────

/// Fold `event` into `last` when they describe one continued change.
/// Returns `Some(advance)` when merged, where `advance` says whether the
/// merge slot now ends at the folded event.
fn merge_into(last: &mut Event, event: &Event, adjacent: bool) -> Option<bool> {
    match (&mut last.kind, &event.kind) {
        (EventKind::BlockMove(last), EventKind::BlockMove(next)) if adjacent => {
            last.new_parent_id = next.new_parent_id;
            last.new_input_name = next.new_input_name.clone();
            last.new_coordinate = next.new_coordinate;
            last.reason.extend(next.reason.iter().cloned());
            Some(true)
        }
        (EventKind::BlockChange(last), EventKind::BlockChange(next))
            if last.element == next.element && last.name == next.name =>
        {
            last.new_value = next.new_value.clone();
            Some(false)
        }
        (EventKind::ViewportChange(last), EventKind::ViewportChange(next)) => {
            last.viewport_top = next.viewport_top;
            last.viewport_left = next.viewport_left;
            last.scale = next.scale;
            Some(true)
        }
        _ => None,
    }
}

/// Merge continued changes and drop events that ended up changing nothing.
///
/// `forward` is the order the events will be applied in; `false` means the
/// slice is in reverse chronological order (an undo batch).
pub fn filter(events: &[Event], forward: bool) -> Vec<Event> {
    let mut queue = events.to_vec();
    if !forward {
        queue.reverse();
    }

    let mut merged: Vec<Event> = Vec::with_capacity(queue.len());
    // (type, entity) -> (slot in `merged`, index of the last folded event)
    let mut slots: HashMap<(&'static str, Option<Uid>), (usize, usize)> = HashMap::new();

    for (i, event) in queue.into_iter().enumerate() {
        if event.is_null() {
            continue;
        }
        let key = (event.type_name(), event.kind.entity_id());
        let folded = slots
            .get(&key)
            .and_then(|&(slot, last)| merge_into(&mut merged[slot], &event, last + 1 == i));
        match folded {
            Some(advance) => {
                if advance && let Some(entry) = slots.get_mut(&key) {
                    entry.1 = i;
                }
            }
            None => {
                slots.insert(key, (merged.len(), i));
                merged.push(event);
            }
        }
    }

    merged.retain(|e| !e.is_null());
    if !forward {
        merged.reverse();
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn moved(id: &str, from: (f64, f64), to: (f64, f64)) -> Event {
        Event::new(EventKind::BlockMove(BlockMove {
            block_id: BlockId::intern(id),
            old_parent_id: None,
            old_input_name: None,
            old_coordinate: Some(Coordinate::new(from.0, from.1)),
            new_parent_id: None,
            new_input_name: None,
            new_coordinate: Some(Coordinate::new(to.0, to.1)),
            reason: vec!["drag".into()],
        }))
        .with_group(Some("g1".into()))
    }

    #[test]
    fn move_json_uses_camel_case_and_type_tag() {
        let json = moved("b1", (0.0, 0.0), (10.0, 5.0)).to_json().unwrap();
        assert_eq!(
            json,
            json!({
                "type": "move",
                "blockId": "b1",
                "oldCoordinate": {"x": 0.0, "y": 0.0},
                "newCoordinate": {"x": 10.0, "y": 5.0},
                "reason": ["drag"],
                "group": "g1",
            })
        );
    }

    #[test]
    fn record_undo_serialized_only_when_false() {
        let event = moved("b1", (0.0, 0.0), (1.0, 1.0));
        assert!(event.to_json().unwrap().get("recordUndo").is_none());

        let silent = event.with_record_undo(false);
        let json = silent.to_json().unwrap();
        assert_eq!(json["recordUndo"], json!(false));
        assert!(!Event::from_json(&json, None).unwrap().record_undo);
    }

    #[test]
    fn ui_events_default_to_not_recorded() {
        let json = json!({"type": "click", "targetType": "workspace"});
        let event = Event::from_json(&json, None).unwrap();
        assert!(event.is_ui());
        assert!(!event.record_undo);
    }

    #[test]
    fn from_json_rejects_unknown_type_and_missing_fields() {
        let unknown = Event::from_json(&json!({"type": "teleport"}), None);
        assert!(matches!(unknown, Err(EventError::UnknownType(t)) if t == "teleport"));

        let missing = Event::from_json(&json!({"type": "var_rename", "varId": "v"}), None);
        assert!(matches!(missing, Err(EventError::Json(_))));

        assert!(matches!(
            Event::from_json(&json!([1, 2]), None),
            Err(EventError::NotAnObject)
        ));
    }

    #[test]
    fn change_is_null_when_values_match() {
        let change = EventKind::BlockChange(BlockChange {
            block_id: BlockId::intern("b1"),
            element: ChangeElement::Field,
            name: Some("NUM".into()),
            old_value: json!(1),
            new_value: json!(1),
        });
        assert!(change.is_null());
    }

    #[test]
    fn filter_merges_adjacent_moves_of_one_block() {
        let events = vec![
            moved("b1", (0.0, 0.0), (5.0, 0.0)),
            moved("b1", (5.0, 0.0), (9.0, 0.0)),
            moved("b2", (0.0, 0.0), (1.0, 0.0)),
        ];
        let filtered = filter(&events, true);
        assert_eq!(filtered.len(), 2);
        let EventKind::BlockMove(first) = &filtered[0].kind else {
            panic!("expected a move");
        };
        assert_eq!(first.old_coordinate, Some(Coordinate::new(0.0, 0.0)));
        assert_eq!(first.new_coordinate, Some(Coordinate::new(9.0, 0.0)));
        assert_eq!(first.reason, vec!["drag".to_string(), "drag".to_string()]);
    }

    #[test]
    fn filter_drops_moves_that_cancel_out() {
        let events = vec![
            moved("b1", (0.0, 0.0), (5.0, 0.0)),
            moved("b1", (5.0, 0.0), (0.0, 0.0)),
        ];
        assert!(filter(&events, true).is_empty());
    }

    #[test]
    fn filter_backward_preserves_reverse_order() {
        let events = vec![
            moved("b2", (0.0, 0.0), (1.0, 0.0)),
            moved("b1", (0.0, 0.0), (5.0, 0.0)),
        ];
        let filtered = filter(&events, false);
        assert_eq!(filtered, events);
    }
}
