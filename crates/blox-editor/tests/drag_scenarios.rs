//! Integration tests: end-to-end block drags (blox-editor).

use blox_core::block::{BlockDefinition, BlockRegistry};
use blox_core::events::{Event, EventKind};
use blox_core::geometry::Coordinate;
use blox_core::id::BlockId;
use blox_core::serialization::{BlockState, ConnectionState};
use blox_editor::block_drag::BlockDragStrategy;
use blox_editor::drag::{DragStrategy, Preview};
use blox_editor::input::Modifiers;
use blox_editor::workspace::{Workspace, WorkspaceOptions};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

fn workspace() -> Workspace {
    let mut registry = BlockRegistry::new();
    registry.define(BlockDefinition::new("stmt").previous(None).next(None));
    registry.define(BlockDefinition::new("num").output(Some(&["Number"])));
    registry.define(
        BlockDefinition::new("negate")
            .output(Some(&["Number"]))
            .value_input("NUM", Some(&["Number"])),
    );
    registry.define(
        BlockDefinition::new("holder")
            .previous(None)
            .next(None)
            .value_input("VALUE", Some(&["Number"])),
    );
    Workspace::new(registry, WorkspaceOptions::default())
}

fn place(ws: &mut Workspace, state: BlockState) -> BlockId {
    let id = ws.append_block(&state).unwrap();
    ws.flush_render();
    id
}

fn id(name: &str) -> BlockId {
    BlockId::intern(name)
}

fn record(ws: &mut Workspace) -> Rc<RefCell<Vec<Event>>> {
    let events: Rc<RefCell<Vec<Event>>> = Rc::default();
    let sink = Rc::clone(&events);
    ws.add_change_listener(move |_, e| sink.borrow_mut().push(e.clone()));
    events
}

// ─── Simple connect ──────────────────────────────────────────────────────

#[test]
fn next_connection_dropped_near_previous_connects() {
    let mut ws = workspace();
    let a = place(&mut ws, BlockState::new("stmt").with_id("sc_a").at(0.0, 0.0));
    let b = place(&mut ws, BlockState::new("stmt").with_id("sc_b").at(200.0, 200.0));
    let a_next = ws.graph().block(a).unwrap().next.unwrap();
    let b_prev = ws.graph().block(b).unwrap().previous.unwrap();
    let events = record(&mut ws);

    // A's next sits 24 below its origin; land it 5 units from B's previous.
    let mut strategy = BlockDragStrategy::new(a);
    assert!(strategy.start_drag(&mut ws, Modifiers::NONE).unwrap());
    strategy.drag(&mut ws, Coordinate::new(197.0, 172.0)).unwrap();

    let candidate = strategy.candidate().unwrap();
    assert_eq!(candidate.local, a_next);
    assert_eq!(candidate.neighbour, b_prev);
    assert_eq!(candidate.distance, 5.0);

    strategy.end_drag(&mut ws).unwrap();

    assert_eq!(ws.graph().connection(a_next).unwrap().target, Some(b_prev));
    assert_eq!(ws.graph().connection(b_prev).unwrap().target, Some(a_next));
    assert_eq!(ws.graph().parent(b), Some(a));
    assert_eq!(ws.graph().top_blocks(), &[a]);

    let moves: Vec<(BlockId, Vec<String>)> = events
        .borrow()
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::BlockMove(m) => Some((m.block_id, m.reason.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(moves[0], (a, vec!["drag".to_owned()]));
    assert!(moves.iter().any(|(block, _)| *block == b));
}

#[test]
fn one_undo_reverts_the_whole_drag() {
    let mut ws = workspace();
    let a = place(&mut ws, BlockState::new("stmt").with_id("undo_a").at(0.0, 0.0));
    let b = place(&mut ws, BlockState::new("stmt").with_id("undo_b").at(200.0, 200.0));

    let mut strategy = BlockDragStrategy::new(a);
    strategy.start_drag(&mut ws, Modifiers::NONE).unwrap();
    strategy.drag(&mut ws, Coordinate::new(197.0, 172.0)).unwrap();
    strategy.end_drag(&mut ws).unwrap();
    assert_eq!(ws.graph().parent(b), Some(a));

    ws.undo(false).unwrap();
    assert_eq!(ws.graph().parent(b), None);
    assert_eq!(ws.graph().relative_to_surface(a), Coordinate::ZERO);
    assert_eq!(
        ws.graph().relative_to_surface(b),
        Coordinate::new(200.0, 200.0)
    );

    ws.undo(true).unwrap();
    assert_eq!(ws.graph().parent(b), Some(a));
    assert_eq!(
        ws.graph().relative_to_surface(a),
        Coordinate::new(197.0, 172.0)
    );
}

// ─── Replacement ─────────────────────────────────────────────────────────

#[test]
fn dropping_on_an_occupied_input_replaces_the_occupant() {
    let mut ws = workspace();
    let p = place(
        &mut ws,
        BlockState::new("holder")
            .with_id("rp_p")
            .at(0.0, 0.0)
            .with_input(
                "VALUE",
                ConnectionState::with_block(BlockState::new("num").with_id("rp_c")),
            ),
    );
    let c = id("rp_c");
    let d = place(&mut ws, BlockState::new("num").with_id("rp_d").at(300.0, 300.0));
    let slot = ws.graph().block(p).unwrap().input("VALUE").unwrap().connection.unwrap();
    let slot_at = ws.graph().connection(slot).unwrap().position();

    let mut strategy = BlockDragStrategy::new(d);
    strategy.start_drag(&mut ws, Modifiers::NONE).unwrap();
    strategy.drag(&mut ws, slot_at.translate(3.0, 4.0)).unwrap();

    match strategy.preview() {
        Preview::Replace { candidate, orphan } => {
            assert_eq!(candidate.neighbour, slot);
            assert_eq!(orphan, c);
        }
        other => panic!("expected a replacement preview, got {other:?}"),
    }

    strategy.end_drag(&mut ws).unwrap();

    let d_output = ws.graph().block(d).unwrap().output.unwrap();
    assert_eq!(ws.graph().connection(slot).unwrap().target, Some(d_output));
    assert_eq!(ws.graph().parent(d), Some(p));
    assert_eq!(ws.graph().relative_to_surface(d), slot_at);
    assert_eq!(ws.graph().parent(c), None);
    assert!(ws.graph().top_blocks().contains(&c));
}

#[test]
fn occupant_rejoins_a_single_compatible_input() {
    let mut ws = workspace();
    let p = place(
        &mut ws,
        BlockState::new("holder")
            .with_id("rj_p")
            .at(0.0, 0.0)
            .with_input(
                "VALUE",
                ConnectionState::with_block(BlockState::new("num").with_id("rj_c")),
            ),
    );
    let c = id("rj_c");
    let d = place(&mut ws, BlockState::new("negate").with_id("rj_d").at(300.0, 300.0));
    let slot = ws.graph().block(p).unwrap().input("VALUE").unwrap().connection.unwrap();
    let slot_at = ws.graph().connection(slot).unwrap().position();

    let mut strategy = BlockDragStrategy::new(d);
    strategy.start_drag(&mut ws, Modifiers::NONE).unwrap();
    strategy.drag(&mut ws, slot_at.translate(3.0, 4.0)).unwrap();
    assert!(matches!(strategy.preview(), Preview::Connect(_)));
    strategy.end_drag(&mut ws).unwrap();

    assert_eq!(ws.graph().parent(d), Some(p));
    assert_eq!(ws.graph().parent(c), Some(d));
    assert_eq!(ws.graph().input_with_block(d, c), Some("NUM"));
}

// ─── Revert ──────────────────────────────────────────────────────────────

#[test]
fn revert_reattaches_to_the_original_slot() {
    let mut ws = workspace();
    let f = place(
        &mut ws,
        BlockState::new("holder")
            .with_id("rv_f")
            .at(40.0, 40.0)
            .with_input(
                "VALUE",
                ConnectionState::with_block(BlockState::new("num").with_id("rv_e")),
            ),
    );
    let e = id("rv_e");
    let offset = ws.graph().block(e).unwrap().xy;
    let undo_before = ws.history().undo_len();
    let redo_before = ws.history().redo_len();

    let mut strategy = BlockDragStrategy::new(e);
    strategy.start_drag(&mut ws, Modifiers::NONE).unwrap();
    assert_eq!(ws.graph().parent(e), None);
    strategy.drag(&mut ws, Coordinate::new(400.0, 250.0)).unwrap();
    strategy.revert_drag(&mut ws).unwrap();

    assert_eq!(ws.graph().parent(e), Some(f));
    assert_eq!(ws.graph().input_with_block(f, e), Some("VALUE"));
    assert_eq!(ws.graph().block(e).unwrap().xy, offset);
    assert_eq!(ws.history().undo_len(), undo_before);
    assert_eq!(ws.history().redo_len(), redo_before);
    assert!(!ws.is_dragging());
}

#[test]
fn revert_of_a_top_block_returns_it_home() {
    let mut ws = workspace();
    let a = place(&mut ws, BlockState::new("stmt").with_id("rt_a").at(30.0, 60.0));
    let undo_before = ws.history().undo_len();

    let mut strategy = BlockDragStrategy::new(a);
    strategy.start_drag(&mut ws, Modifiers::NONE).unwrap();
    strategy.drag(&mut ws, Coordinate::new(500.0, 10.0)).unwrap();
    strategy.revert_drag(&mut ws).unwrap();

    assert_eq!(
        ws.graph().relative_to_surface(a),
        Coordinate::new(30.0, 60.0)
    );
    assert_eq!(ws.history().undo_len(), undo_before);
}

#[test]
fn reverted_drag_clears_pending_redo() {
    let mut ws = workspace();
    let a = place(&mut ws, BlockState::new("stmt").with_id("rr_a").at(30.0, 60.0));
    ws.move_block_by(a, 10.0, 0.0).unwrap();
    ws.undo(false).unwrap();
    assert!(ws.history().can_redo());
    let undo_before = ws.history().undo_len();

    let mut strategy = BlockDragStrategy::new(a);
    strategy.start_drag(&mut ws, Modifiers::NONE).unwrap();
    strategy.drag(&mut ws, Coordinate::new(500.0, 10.0)).unwrap();
    strategy.revert_drag(&mut ws).unwrap();

    // The move home is a new action even though its undo entries are
    // dropped, so the old redo branch is gone.
    assert_eq!(
        ws.graph().relative_to_surface(a),
        Coordinate::new(30.0, 60.0)
    );
    assert_eq!(ws.history().undo_len(), undo_before);
    assert_eq!(ws.history().redo_len(), 0);
    assert!(!ws.history().can_redo());

    ws.undo(true).unwrap();
    assert_eq!(
        ws.graph().relative_to_surface(a),
        Coordinate::new(30.0, 60.0)
    );
}

// ─── Heal stack ──────────────────────────────────────────────────────────

fn stack_of_three(ws: &mut Workspace, prefix: &str) -> (BlockId, BlockId, BlockId) {
    let (a, b, c) = (
        format!("{prefix}_a"),
        format!("{prefix}_b"),
        format!("{prefix}_c"),
    );
    place(
        ws,
        BlockState::new("stmt").with_id(&a).at(0.0, 0.0).with_next(
            ConnectionState::with_block(
                BlockState::new("stmt")
                    .with_id(&b)
                    .with_next(ConnectionState::with_block(
                        BlockState::new("stmt").with_id(&c),
                    )),
            ),
        ),
    );
    (id(&a), id(&b), id(&c))
}

#[test]
fn heal_modifier_leaves_the_child_with_the_former_parent() {
    let mut ws = workspace();
    let (a, b, c) = stack_of_three(&mut ws, "heal");
    let alt = Modifiers {
        alt: true,
        ..Modifiers::NONE
    };

    let mut strategy = BlockDragStrategy::new(b);
    strategy.start_drag(&mut ws, alt).unwrap();
    assert_eq!(ws.graph().next_block(a), Some(c));
    assert_eq!(ws.graph().next_block(b), None);

    strategy.drag(&mut ws, Coordinate::new(400.0, 400.0)).unwrap();
    strategy.end_drag(&mut ws).unwrap();

    assert_eq!(ws.graph().parent(c), Some(a));
    assert_eq!(ws.graph().parent(b), None);
    assert_eq!(ws.graph().next_block(b), None);
}

#[test]
fn plain_drag_carries_the_rest_of_the_stack() {
    let mut ws = workspace();
    let (a, b, c) = stack_of_three(&mut ws, "carry");

    let mut strategy = BlockDragStrategy::new(b);
    strategy.start_drag(&mut ws, Modifiers::NONE).unwrap();
    strategy.drag(&mut ws, Coordinate::new(400.0, 400.0)).unwrap();
    strategy.end_drag(&mut ws).unwrap();

    assert_eq!(ws.graph().next_block(a), None);
    assert_eq!(ws.graph().parent(b), None);
    assert_eq!(ws.graph().next_block(b), Some(c));
}

// ─── Stickiness ──────────────────────────────────────────────────────────

#[test]
fn held_candidate_survives_small_improvements() {
    let mut ws = workspace();
    let a = place(&mut ws, BlockState::new("stmt").with_id("st_a").at(0.0, 0.0));
    let t = place(&mut ws, BlockState::new("stmt").with_id("st_t").at(12.0, 0.0));
    let dragged = place(&mut ws, BlockState::new("stmt").with_id("st_d").at(300.0, 300.0));
    let a_next = ws.graph().block(a).unwrap().next.unwrap();
    let t_next = ws.graph().block(t).unwrap().next.unwrap();
    let below_a = ws.graph().connection(a_next).unwrap().position();

    let mut strategy = BlockDragStrategy::new(dragged);
    strategy.start_drag(&mut ws, Modifiers::NONE).unwrap();

    strategy.drag(&mut ws, below_a.translate(0.0, 2.0)).unwrap();
    assert_eq!(strategy.candidate().unwrap().neighbour, a_next);

    // 7 from A, 5 from T: not closer by the preference margin.
    strategy.drag(&mut ws, below_a.translate(7.0, 0.0)).unwrap();
    assert_eq!(strategy.candidate().unwrap().neighbour, a_next);

    // 12 from A, 0 from T.
    strategy.drag(&mut ws, below_a.translate(12.0, 0.0)).unwrap();
    assert_eq!(strategy.candidate().unwrap().neighbour, t_next);

    strategy.end_drag(&mut ws).unwrap();
    assert_eq!(ws.graph().parent(dragged), Some(t));
}

#[test]
fn moving_out_of_range_drops_the_candidate() {
    let mut ws = workspace();
    let a = place(&mut ws, BlockState::new("stmt").with_id("or_a").at(0.0, 0.0));
    let dragged = place(&mut ws, BlockState::new("stmt").with_id("or_d").at(300.0, 300.0));
    let below_a = ws
        .graph()
        .connection(ws.graph().block(a).unwrap().next.unwrap())
        .unwrap()
        .position();

    let mut strategy = BlockDragStrategy::new(dragged);
    strategy.start_drag(&mut ws, Modifiers::NONE).unwrap();
    strategy.drag(&mut ws, below_a.translate(1.0, 1.0)).unwrap();
    assert!(strategy.candidate().is_some());

    strategy.drag(&mut ws, below_a.translate(150.0, 150.0)).unwrap();
    assert_eq!(strategy.candidate(), None);
    assert_eq!(strategy.preview(), Preview::None);

    strategy.end_drag(&mut ws).unwrap();
    assert_eq!(ws.graph().parent(dragged), None);
}
