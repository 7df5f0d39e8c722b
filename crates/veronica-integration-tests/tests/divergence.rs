//! Divergence heuristics over the execution graph.

#![allow(clippy::arithmetic_side_effects)]

use veronica_core::{CallKind, ChainId};
use veronica_graph::ExecutionGraph;

fn run_once(graph: &ExecutionGraph, parent: &veronica_graph::NodeId, name: &str) {
    let id = graph
        .begin_node(parent, CallKind::Tool, name)
        .expect("begin node");
    graph.mark_running(&id).expect("mark running");
    graph.mark_success(&id, 0.0, None, None).expect("mark success");
}

#[test]
fn five_identical_tool_calls_emit_one_event_at_the_third() {
    let graph = ExecutionGraph::new(ChainId::from_string("c1"));
    let root = graph.create_root().expect("root");

    let mut emissions = Vec::new();
    for i in 0..5 {
        run_once(&graph, &root, "X");
        let staged = graph.drain_staged_events();
        for event in staged {
            if event.event_type == "divergence_suspected" {
                emissions.push((i, event));
            }
        }
    }

    assert_eq!(emissions.len(), 1);
    let (call_index, event) = &emissions[0];
    // Third call (index 2) is the trigger point.
    assert_eq!(*call_index, 2);
    assert_eq!(event.signature.as_deref(), Some("tool:X"));
    assert_eq!(event.repeat_count, Some(3));
    assert_eq!(event.severity.as_deref(), Some("warn"));

    assert_eq!(graph.aggregates().divergence_emitted_count, 1);
}

#[test]
fn alternating_signatures_never_trigger() {
    let graph = ExecutionGraph::new(ChainId::from_string("c1"));
    let root = graph.create_root().expect("root");

    for _ in 0..50 {
        run_once(&graph, &root, "A");
        run_once(&graph, &root, "B");
    }

    let events = graph.drain_staged_events();
    assert!(
        events.iter().all(|e| e.event_type != "divergence_suspected"),
        "A,B,A,B,… must never look like a trailing run"
    );
}

#[test]
fn per_signature_dedup_across_interleaving() {
    let graph = ExecutionGraph::new(ChainId::from_string("c1"));
    let root = graph.create_root().expect("root");

    // First run of X triggers once.
    for _ in 0..3 {
        run_once(&graph, &root, "X");
    }
    // Break the run, then run X again past the threshold.
    run_once(&graph, &root, "Y");
    for _ in 0..4 {
        run_once(&graph, &root, "X");
    }

    let divergence: Vec<_> = graph
        .drain_staged_events()
        .into_iter()
        .filter(|e| e.event_type == "divergence_suspected")
        .collect();
    assert_eq!(
        divergence.len(),
        1,
        "one event per (chain, signature), ever"
    );
}

#[test]
fn near_zero_elapsed_skips_rate_heuristics() {
    let graph = ExecutionGraph::new(ChainId::from_string("c1"));
    let root = graph.create_root_at(0).expect("root");
    let id = graph
        .begin_node_at(
            &root,
            CallKind::Llm,
            "burn",
            None,
            std::collections::HashMap::new(),
            0,
        )
        .expect("begin");
    graph.mark_running(&id).expect("running");
    // Enormous cost but only half a millisecond of elapsed time.
    graph
        .mark_success_at(&id, 1000.0, None, Some(1_000_000), 0)
        .expect("success");

    let events = graph.drain_staged_events();
    assert!(events.iter().all(|e| e.event_type != "COST_RATE_EXCEEDED"));
    assert!(events
        .iter()
        .all(|e| e.event_type != "TOKEN_VELOCITY_EXCEEDED"));
}

#[test]
fn rate_events_fire_once_each() {
    let graph = ExecutionGraph::new(ChainId::from_string("c1"));
    let root = graph.create_root_at(0).expect("root");

    for i in 0..3 {
        let id = graph
            .begin_node_at(
                &root,
                CallKind::Llm,
                "burn",
                None,
                std::collections::HashMap::new(),
                0,
            )
            .expect("begin");
        graph.mark_running(&id).expect("running");
        // 5 USD and 600k tokens per call, 10 s in: both rates exceeded.
        graph
            .mark_success_at(&id, 5.0, None, Some(600_000), 10_000 * (i + 1))
            .expect("success");
    }

    let events = graph.drain_staged_events();
    let cost_rate = events
        .iter()
        .filter(|e| e.event_type == "COST_RATE_EXCEEDED")
        .count();
    let velocity = events
        .iter()
        .filter(|e| e.event_type == "TOKEN_VELOCITY_EXCEEDED")
        .count();
    assert_eq!(cost_rate, 1);
    assert_eq!(velocity, 1);
}
