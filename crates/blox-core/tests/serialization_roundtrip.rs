//! Integration tests: JSON state → block graph → JSON state.

use blox_core::context::MutationContext;
use blox_core::events::EventKind;
use blox_core::serialization::{self, BlockState, SaveOptions};
use blox_core::{BlockDefinition, BlockGraph, BlockId, BlockRegistry};
use pretty_assertions::assert_eq;
use serde_json::json;

fn registry() -> BlockRegistry {
    let mut registry = BlockRegistry::new();
    registry.define(
        BlockDefinition::new("controls_repeat")
            .previous(None)
            .next(None)
            .value_input("TIMES", Some(&["Number"]))
            .statement_input("DO", None),
    );
    registry.define(
        BlockDefinition::new("text_print")
            .previous(None)
            .next(None)
            .value_input("TEXT", None),
    );
    registry.define(
        BlockDefinition::new("text")
            .output(Some(&["String"]))
            .field("TEXT", json!("")),
    );
    registry.define(
        BlockDefinition::new("math_number")
            .output(Some(&["Number"]))
            .field("NUM", json!(0)),
    );
    registry.define(
        BlockDefinition::new("math_arithmetic")
            .output(Some(&["Number"]))
            .value_input("A", Some(&["Number"]))
            .value_input("B", Some(&["Number"]))
            .field("OP", json!("ADD")),
    );
    registry
}

fn fixture() -> BlockState {
    serde_json::from_str(include_str!("fixtures/repeat_print.json")).unwrap()
}

fn with_coordinates() -> SaveOptions {
    SaveOptions {
        add_coordinates: true,
        ..SaveOptions::default()
    }
}

fn id(s: &str) -> BlockId {
    BlockId::intern(s)
}

// ─── Round trip ──────────────────────────────────────────────────────────

#[test]
fn save_reproduces_loaded_state() {
    let mut graph = BlockGraph::new(registry());
    let state = fixture();
    let root = serialization::append(&mut graph, &mut MutationContext::silent(), &state).unwrap();

    assert_eq!(root, id("loop"));
    let saved = serialization::save(&graph, root, with_coordinates()).unwrap();
    assert_eq!(saved, state);
}

#[test]
fn loading_builds_every_block_and_shadow() {
    let mut graph = BlockGraph::new(registry());
    serialization::append(&mut graph, &mut MutationContext::silent(), &fixture()).unwrap();

    // text_shadow was replaced by the real `sum` block and only lives on as
    // stored state.
    for present in ["loop", "times_shadow", "print", "sum", "a", "b", "print2"] {
        assert!(graph.contains(id(present)), "missing block {present}");
    }
    assert!(!graph.contains(id("text_shadow")));
    assert!(graph.block(id("times_shadow")).unwrap().shadow);
    assert_eq!(graph.top_blocks(), &[id("loop")]);
    assert_eq!(graph.next_block(id("print")), Some(id("print2")));
    assert_eq!(graph.input_with_block(id("print"), id("sum")), Some("TEXT"));
}

#[test]
fn append_fires_one_create_listing_the_whole_tree() {
    let mut graph = BlockGraph::new(registry());
    let mut ctx = MutationContext::default();
    serialization::append(&mut graph, &mut ctx, &fixture()).unwrap();

    let events = ctx.take_events();
    assert_eq!(events.len(), 1);
    let EventKind::BlockCreate(create) = &events[0].kind else {
        panic!("expected create, got {:?}", events[0].kind);
    };
    assert_eq!(create.block_id, id("loop"));
    assert_eq!(create.ids.len(), 7);
    assert!(events[0].record_undo);
}

#[test]
fn clashing_id_is_replaced_on_load() {
    let mut graph = BlockGraph::new(registry());
    let mut ctx = MutationContext::silent();
    let state = BlockState::new("math_number").with_id("dup");
    let first = serialization::append(&mut graph, &mut ctx, &state).unwrap();
    let second = serialization::append(&mut graph, &mut ctx, &state).unwrap();

    assert_eq!(first, id("dup"));
    assert_ne!(second, first);
    assert_eq!(graph.len(), 2);
}

#[test]
fn unknown_block_type_fails_without_leaving_blocks_behind() {
    let mut graph = BlockGraph::new(registry());
    let state = BlockState::new("text_print").with_next(
        serialization::ConnectionState::with_block(BlockState::new("no_such_block")),
    );
    let err = serialization::append(&mut graph, &mut MutationContext::silent(), &state);

    assert!(err.is_err());
    assert!(graph.is_empty());
}

// ─── Shadows ─────────────────────────────────────────────────────────────

#[test]
fn disconnecting_real_block_respawns_shadow() {
    let mut graph = BlockGraph::new(registry());
    serialization::append(&mut graph, &mut MutationContext::silent(), &fixture()).unwrap();
    let sum_output = graph.block(id("sum")).unwrap().output.unwrap();

    let mut ctx = MutationContext::default();
    graph.disconnect(&mut ctx, sum_output).unwrap();

    let shadow = graph.block(id("text_shadow")).expect("shadow respawned");
    assert!(shadow.shadow);
    assert_eq!(shadow.fields["TEXT"], json!("hi"));
    assert_eq!(graph.parent(id("text_shadow")), Some(id("print")));
    assert_eq!(graph.parent(id("sum")), None);

    let events = ctx.take_events();
    let group = events[0].group.clone();
    assert!(group.is_some());
    assert!(events.iter().all(|e| e.group == group));
    let kinds: Vec<(&str, bool)> = events
        .iter()
        .map(|e| (e.type_name(), e.record_undo))
        .collect();
    assert_eq!(kinds, vec![("move", true), ("create", false)]);
}

#[test]
fn moving_block_to_another_slot_respawns_old_shadow() {
    let mut graph = BlockGraph::new(registry());
    serialization::append(&mut graph, &mut MutationContext::silent(), &fixture()).unwrap();
    let sum_output = graph.block(id("sum")).unwrap().output.unwrap();
    let print2_text = graph
        .block(id("print2"))
        .unwrap()
        .input("TEXT")
        .unwrap()
        .connection
        .unwrap();

    let mut ctx = MutationContext::default();
    graph.connect(&mut ctx, sum_output, print2_text).unwrap();

    assert_eq!(graph.input_with_block(id("print2"), id("sum")), Some("TEXT"));
    let shadow = graph.block(id("text_shadow")).expect("shadow respawned");
    assert!(shadow.shadow);
    assert_eq!(graph.input_with_block(id("print"), id("text_shadow")), Some("TEXT"));

    let mut kinds: Vec<(&str, bool)> = ctx
        .take_events()
        .iter()
        .map(|e| (e.type_name(), e.record_undo))
        .collect();
    kinds.sort();
    assert_eq!(kinds, vec![("create", false), ("move", true)]);
}

#[test]
fn disposing_shadow_records_no_undo() {
    let mut graph = BlockGraph::new(registry());
    serialization::append(&mut graph, &mut MutationContext::silent(), &fixture()).unwrap();

    let mut ctx = MutationContext::default();
    graph.dispose(&mut ctx, id("times_shadow"), false).unwrap();

    let delete = ctx
        .events()
        .iter()
        .find(|e| e.type_name() == "delete")
        .unwrap();
    assert!(!delete.record_undo);
}

#[test]
fn saved_json_omits_default_flags() {
    let mut graph = BlockGraph::new(registry());
    let mut ctx = MutationContext::silent();
    let num = graph.new_block(&mut ctx, "math_number", None).unwrap();
    let saved = serialization::save(&graph, num, SaveOptions::default()).unwrap();

    let json = serde_json::to_value(&saved).unwrap();
    assert_eq!(
        json,
        json!({"type": "math_number", "id": num.as_str(), "fields": {"NUM": 0}})
    );
}
