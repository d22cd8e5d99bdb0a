//! Integration tests: undo/redo and event replay (blox-editor).
//!
//! Drives the workspace through user-level operations and checks that
//! grouped events undo as one unit and survive a JSON round trip.

use blox_core::block::{BlockDefinition, BlockRegistry};
use blox_core::events::Event;
use blox_core::geometry::Coordinate;
use blox_core::id::BlockId;
use blox_core::serialization::{BlockState, ConnectionState};
use blox_editor::block_drag::BlockDragStrategy;
use blox_editor::drag::DragStrategy;
use blox_editor::input::Modifiers;
use blox_editor::replay::Replay;
use blox_editor::workspace::{Workspace, WorkspaceOptions};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

fn registry() -> BlockRegistry {
    let mut registry = BlockRegistry::new();
    registry.define(
        BlockDefinition::new("stmt")
            .previous(None)
            .next(None)
            .field("TEXT", json!("")),
    );
    registry.define(BlockDefinition::new("num").output(None).field("NUM", json!(0)));
    registry
}

fn workspace() -> Workspace {
    Workspace::new(registry(), WorkspaceOptions::default())
}

fn place(ws: &mut Workspace, state: BlockState) -> BlockId {
    let id = ws.append_block(&state).unwrap();
    ws.flush_render();
    id
}

fn stmt(id: &str) -> BlockState {
    BlockState::new("stmt").with_id(id)
}

// ─── Basic undo/redo ────────────────────────────────────────────────────

#[test]
fn undo_restores_previous_field_value() {
    let mut ws = workspace();
    let a = place(&mut ws, stmt("fv_a"));

    ws.set_field_value(a, "TEXT", json!("hello")).unwrap();
    assert_eq!(ws.graph().block(a).unwrap().fields.get("TEXT"), Some(&json!("hello")));

    ws.undo(false).unwrap();
    assert_eq!(ws.graph().block(a).unwrap().fields.get("TEXT"), Some(&json!("")));

    ws.undo(true).unwrap();
    assert_eq!(ws.graph().block(a).unwrap().fields.get("TEXT"), Some(&json!("hello")));
}

#[test]
fn undo_of_connect_returns_child_to_its_spot() {
    let mut ws = workspace();
    let a = place(&mut ws, stmt("uc_a").at(0.0, 0.0));
    let b = place(&mut ws, stmt("uc_b").at(150.0, 90.0));
    let a_next = ws.graph().block(a).unwrap().next.unwrap();
    let b_prev = ws.graph().block(b).unwrap().previous.unwrap();

    ws.connect(a_next, b_prev).unwrap();
    assert_eq!(ws.graph().parent(b), Some(a));

    ws.undo(false).unwrap();
    assert_eq!(ws.graph().parent(b), None);
    assert_eq!(
        ws.graph().relative_to_surface(b),
        Coordinate::new(150.0, 90.0)
    );

    ws.undo(true).unwrap();
    assert_eq!(ws.graph().parent(b), Some(a));
}

#[test]
fn undo_of_healing_delete_restores_the_stack() {
    let mut ws = workspace();
    let a = place(
        &mut ws,
        stmt("hd_a").with_next(ConnectionState::with_block(
            stmt("hd_b").with_next(ConnectionState::with_block(stmt("hd_c"))),
        )),
    );
    let (b, c) = (BlockId::intern("hd_b"), BlockId::intern("hd_c"));

    ws.dispose_block(b, true).unwrap();
    assert!(!ws.graph().contains(b));
    assert_eq!(ws.graph().next_block(a), Some(c));

    ws.undo(false).unwrap();
    assert!(ws.graph().contains(b));
    assert_eq!(ws.graph().next_block(a), Some(b));
    assert_eq!(ws.graph().next_block(b), Some(c));

    ws.undo(true).unwrap();
    assert!(!ws.graph().contains(b));
    assert_eq!(ws.graph().next_block(a), Some(c));
}

#[test]
fn new_action_clears_redo() {
    let mut ws = workspace();
    let a = place(&mut ws, stmt("nr_a"));

    ws.move_block_by(a, 10.0, 0.0).unwrap();
    ws.undo(false).unwrap();
    assert!(ws.history().can_redo());

    ws.move_block_by(a, 0.0, 10.0).unwrap();
    assert!(!ws.history().can_redo());
}

#[test]
fn undo_on_empty_history_is_a_no_op() {
    let mut ws = workspace();
    ws.clear_undo();
    assert!(!ws.history().can_undo());
    ws.undo(false).unwrap();
    ws.undo(true).unwrap();
}

// ─── Group atomicity ────────────────────────────────────────────────────

#[test]
fn clear_undoes_as_one_group() {
    let mut ws = workspace();
    place(&mut ws, stmt("ga_a").at(0.0, 0.0));
    place(&mut ws, stmt("ga_b").at(200.0, 0.0));
    place(
        &mut ws,
        BlockState::new("num").with_id("ga_c").at(0.0, 200.0),
    );
    let before = ws.save();

    ws.clear().unwrap();
    assert!(ws.graph().is_empty());

    ws.undo(false).unwrap();
    assert_eq!(ws.graph().len(), 3);
    // Restored in reverse deletion order.
    let after = ws.save();
    assert_eq!(after.blocks.len(), before.blocks.len());
    for block in &before.blocks {
        assert!(after.blocks.contains(block), "missing {:?}", block.id);
    }

    ws.undo(true).unwrap();
    assert!(ws.graph().is_empty());
}

#[test]
fn a_drag_is_one_undo_step() {
    let mut ws = workspace();
    let a = place(&mut ws, stmt("ds_a").at(0.0, 0.0));
    let b = place(&mut ws, stmt("ds_b").at(300.0, 300.0));
    let undo_before = ws.history().undo_len();

    let mut strategy = BlockDragStrategy::new(b);
    strategy.start_drag(&mut ws, Modifiers::NONE).unwrap();
    strategy.drag(&mut ws, Coordinate::new(2.0, 25.0)).unwrap();
    strategy.end_drag(&mut ws).unwrap();
    assert_eq!(ws.graph().parent(b), Some(a));
    assert!(ws.history().undo_len() > undo_before + 1);

    ws.undo(false).unwrap();
    assert_eq!(ws.history().undo_len(), undo_before);
    assert_eq!(ws.graph().parent(b), None);
    assert_eq!(
        ws.graph().relative_to_surface(b),
        Coordinate::new(300.0, 300.0)
    );
}

// ─── Replay ─────────────────────────────────────────────────────────────

fn record(ws: &mut Workspace) -> Rc<RefCell<Vec<Event>>> {
    let events: Rc<RefCell<Vec<Event>>> = Rc::default();
    let sink = Rc::clone(&events);
    ws.add_change_listener(move |_, e| sink.borrow_mut().push(e.clone()));
    events
}

fn through_json(events: &[Event]) -> Vec<Event> {
    events
        .iter()
        .map(|e| Event::from_json(&e.to_json().unwrap(), e.workspace_id).unwrap())
        .collect()
}

#[test]
fn json_round_tripped_events_mirror_a_session() {
    let mut source = workspace();
    let a = place(&mut source, stmt("rt_a").at(0.0, 0.0));
    let b = place(&mut source, stmt("rt_b").at(300.0, 300.0));
    let initial = source.save();

    let mut mirror = workspace();
    mirror.load(&initial).unwrap();

    let events = record(&mut source);
    let mut strategy = BlockDragStrategy::new(b);
    strategy.start_drag(&mut source, Modifiers::NONE).unwrap();
    strategy.drag(&mut source, Coordinate::new(1.0, 26.0)).unwrap();
    strategy.end_drag(&mut source).unwrap();
    source.set_field_value(a, "TEXT", json!("top")).unwrap();
    assert_eq!(source.graph().parent(b), Some(a));

    let replayed = through_json(&events.borrow());
    assert_eq!(replayed, *events.borrow());

    for event in &replayed {
        event.run(&mut mirror, true).unwrap();
    }
    assert_eq!(mirror.save(), source.save());

    for event in replayed.iter().rev() {
        event.run(&mut mirror, false).unwrap();
    }
    assert_eq!(mirror.save(), initial);
}

#[test]
fn replay_does_not_touch_the_mirror_history() {
    let mut source = workspace();
    let a = place(&mut source, stmt("rh_a"));
    let mut mirror = workspace();
    mirror.load(&source.save()).unwrap();
    mirror.clear_undo();

    let events = record(&mut source);
    source.move_block_by(a, 40.0, 0.0).unwrap();

    for event in through_json(&events.borrow()) {
        event.run(&mut mirror, true).unwrap();
    }
    assert_eq!(
        mirror.graph().relative_to_surface(a),
        Coordinate::new(40.0, 0.0)
    );
    assert!(!mirror.history().can_undo());
}
