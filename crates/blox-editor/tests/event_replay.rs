//! Integration tests: every event type survives JSON and replays both ways.
//!
//! One session touches blocks, comments, variables and UI state. Its events
//! go through `to_json`/`from_json`, then run forwards on a mirror
//! workspace and backwards again.

use blox_core::block::{BlockDefinition, BlockRegistry};
use blox_core::events::{BubbleOpen, ChangeElement, Event, EventKind, FieldIntermediateChange};
use blox_core::geometry::{Coordinate, Size};
use blox_core::id::BlockId;
use blox_core::serialization::BlockState;
use blox_editor::block_drag::BlockDragStrategy;
use blox_editor::comment_drag::CommentDragStrategy;
use blox_editor::drag::DragStrategy;
use blox_editor::input::Modifiers;
use blox_editor::replay::Replay;
use blox_editor::workspace::{Workspace, WorkspaceOptions};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

fn registry() -> BlockRegistry {
    let mut registry = BlockRegistry::new();
    registry.define(
        BlockDefinition::new("stmt")
            .previous(None)
            .next(None)
            .field("TEXT", json!("")),
    );
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

fn record(ws: &mut Workspace) -> Rc<RefCell<Vec<Event>>> {
    let events: Rc<RefCell<Vec<Event>>> = Rc::default();
    let sink = Rc::clone(&events);
    ws.add_change_listener(move |_, e| sink.borrow_mut().push(e.clone()));
    events
}

/// Drive `ws` through one of everything. Events with no workspace
/// operation behind them are appended to `events` by hand at the point a
/// host would fire them.
fn run_session(ws: &mut Workspace, events: &Rc<RefCell<Vec<Event>>>) {
    let a = BlockId::intern("ev_a");
    let b = BlockId::intern("ev_b");

    // Blocks.
    let mut strategy = BlockDragStrategy::new(b);
    strategy.start_drag(ws, Modifiers::NONE).unwrap();
    strategy.drag(ws, Coordinate::new(2.0, 25.0)).unwrap();
    strategy.end_drag(ws).unwrap();
    assert_eq!(ws.graph().parent(b), Some(a));

    let c = ws.new_block("stmt", Some("ev_c")).unwrap();
    ws.move_block_to(c, Coordinate::new(400.0, 0.0)).unwrap();
    events.borrow_mut().push(Event::new(EventKind::FieldIntermediateChange(
        FieldIntermediateChange {
            block_id: c,
            name: "TEXT".into(),
            old_value: json!(""),
            new_value: json!("dra"),
        },
    )));
    ws.set_field_value(c, "TEXT", json!("draft")).unwrap();
    ws.set_block_comment(c, Some("why".into())).unwrap();
    events
        .borrow_mut()
        .push(Event::new(EventKind::BubbleOpen(BubbleOpen {
            block_id: c,
            is_open: true,
            bubble_type: "comment".into(),
        })));
    ws.set_collapsed(c, true).unwrap();
    ws.set_enabled(c, false).unwrap();
    ws.set_inputs_inline(c, true).unwrap();
    ws.set_field_value(a, "TEXT", json!("top")).unwrap();
    ws.dispose_block(c, false).unwrap();

    // Variables.
    let kept = ws.create_variable("count", "", Some("ev_var_kept")).unwrap();
    ws.rename_variable(kept, "total").unwrap();
    let dropped = ws.create_variable("tmp", "", Some("ev_var_dropped")).unwrap();
    ws.delete_variable(dropped).unwrap();

    // Comments.
    let note = ws.create_comment("note", Coordinate::new(0.0, 300.0));
    ws.set_comment_text(note, "noted").unwrap();
    ws.resize_comment(note, Size::new(160.0, 90.0)).unwrap();
    ws.set_comment_collapsed(note, true).unwrap();
    let mut drag = CommentDragStrategy::new(note);
    drag.start_drag(ws, Modifiers::NONE).unwrap();
    drag.drag(ws, Coordinate::new(40.0, 0.0)).unwrap();
    drag.end_drag(ws).unwrap();
    let scrap = ws.create_comment("scrap", Coordinate::new(500.0, 500.0));
    ws.move_comment_to(scrap, Coordinate::new(520.0, 500.0)).unwrap();
    assert!(ws.dispose_comment(scrap));

    // Presentation.
    ws.select(Some(a));
    ws.click(Some(a));
    ws.click(None);
    ws.set_viewport(Coordinate::new(10.0, 20.0), 1.5);
    events.borrow_mut().push(Event::new(EventKind::FinishedLoading));
}

fn through_json(events: &[Event]) -> Vec<Event> {
    events
        .iter()
        .map(|e| Event::from_json(&e.to_json().unwrap(), e.workspace_id).unwrap())
        .collect()
}

// ─── Every type ─────────────────────────────────────────────────────────

#[test]
fn session_covers_every_event_type() {
    let mut source = workspace();
    place(&mut source, BlockState::new("stmt").with_id("ev_a").at(0.0, 0.0));
    place(&mut source, BlockState::new("stmt").with_id("ev_b").at(300.0, 300.0));
    let events = record(&mut source);
    run_session(&mut source, &events);

    let seen: BTreeSet<&str> = events.borrow().iter().map(|e| e.type_name()).collect();
    let all: BTreeSet<&str> = EventKind::TYPE_NAMES.into_iter().collect();
    assert_eq!(seen, all);

    let elements: Vec<ChangeElement> = events
        .borrow()
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::BlockChange(change) => Some(change.element),
            _ => None,
        })
        .collect();
    for element in [
        ChangeElement::Field,
        ChangeElement::Comment,
        ChangeElement::Collapsed,
        ChangeElement::Disabled,
        ChangeElement::Inline,
    ] {
        assert!(elements.contains(&element), "no {element:?} change");
    }
}

#[test]
fn every_event_type_survives_json() {
    let mut source = workspace();
    place(&mut source, BlockState::new("stmt").with_id("ev_a").at(0.0, 0.0));
    place(&mut source, BlockState::new("stmt").with_id("ev_b").at(300.0, 300.0));
    let events = record(&mut source);
    run_session(&mut source, &events);

    let replayed = through_json(&events.borrow());
    assert_eq!(replayed, *events.borrow());
}

// ─── Replay ─────────────────────────────────────────────────────────────

#[test]
fn mirror_replays_every_event_type_both_ways() {
    let mut source = workspace();
    place(&mut source, BlockState::new("stmt").with_id("ev_a").at(0.0, 0.0));
    place(&mut source, BlockState::new("stmt").with_id("ev_b").at(300.0, 300.0));
    let initial = source.save();

    let mut mirror = workspace();
    mirror.load(&initial).unwrap();
    mirror.clear_undo();

    let events = record(&mut source);
    run_session(&mut source, &events);
    let replayed = through_json(&events.borrow());

    for event in &replayed {
        event.run(&mut mirror, true).unwrap();
    }
    assert_eq!(mirror.save(), source.save());

    for event in replayed.iter().rev() {
        event.run(&mut mirror, false).unwrap();
    }
    assert_eq!(mirror.save(), initial);
    assert!(!mirror.history().can_undo());
}
