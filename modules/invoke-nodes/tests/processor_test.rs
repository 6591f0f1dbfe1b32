//! End-to-end tests: sessions queued through `session`, run by the
//! DefaultInvocationProcessor against in-memory services.

use std::sync::Arc;
use std::time::Duration;

use invoke_common::{BaseModelType, Graph, GraphNode, InvocationEvent, LibraryGraph, ModelType};
use invoke_core::testing::TestServices;
use invoke_core::{InvocationProcessor, InvocationServices, ItemStorage, ModelConfig, ServiceError};
use invoke_nodes::{session, DefaultInvocationProcessor};
use serde_json::json;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Harness {
    t: TestServices,
    services: Arc<InvocationServices>,
    processor: Arc<DefaultInvocationProcessor>,
    events: broadcast::Receiver<InvocationEvent>,
}

fn harness() -> Harness {
    let t = TestServices::new().with_models([
        ModelConfig::new("sd15", BaseModelType::StableDiffusion1, ModelType::Main),
        ModelConfig::new("ft-mse", BaseModelType::StableDiffusion1, ModelType::Vae),
    ]);
    let processor = Arc::new(DefaultInvocationProcessor::new());
    let services = Arc::new(t.build_with(processor.clone()));
    let events = t.events.subscribe();
    Harness {
        t,
        services,
        processor,
        events,
    }
}

fn main_loader(name: &str) -> serde_json::Value {
    json!({
        "type": "main_model_loader",
        "model": { "model_name": name, "base_model": "sd-1", "model_type": "main" }
    })
}

fn vae_loader() -> serde_json::Value {
    json!({
        "type": "vae_loader",
        "vae_model": { "model_name": "ft-mse", "base_model": "sd-1" }
    })
}

fn two_node_graph(model: &str) -> Graph {
    Graph::new()
        .with_node(GraphNode::new("load", main_loader(model)))
        .with_node(GraphNode::new("vae", vae_loader()))
}

async fn next_event(rx: &mut broadcast::Receiver<InvocationEvent>) -> InvocationEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Events up to and including the completion of `session_id`.
async fn events_until_complete(rx: &mut broadcast::Receiver<InvocationEvent>, session_id: &str) -> Vec<InvocationEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = matches!(
            &event,
            InvocationEvent::GraphExecutionStateComplete { graph_execution_state_id, .. }
                if graph_execution_state_id == session_id
        );
        seen.push(event);
        if done {
            return seen;
        }
    }
}

fn event_kinds(events: &[InvocationEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.event_type_str()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn runs_every_node_and_reports_completion() {
    let mut h = harness();
    h.services.processor().start(h.services.clone()).unwrap();

    let state = session::invoke_graph(&h.services, two_node_graph("sd15"), true)
        .await
        .unwrap();
    let events = events_until_complete(&mut h.events, &state.id).await;

    assert_eq!(
        event_kinds(&events),
        vec![
            "invocation_started",
            "invocation_complete",
            "invocation_started",
            "invocation_complete",
            "graph_execution_state_complete",
        ]
    );

    let stored = h.t.graph_execution_manager.get(&state.id).await.unwrap().unwrap();
    assert_eq!(stored.executed, vec!["load".to_string(), "vae".to_string()]);
    assert_eq!(stored.results["load"]["type"], "model_loader_output");
    assert_eq!(stored.results["vae"]["vae"]["vae"]["model_type"], "vae");
    assert!(!stored.has_error());

    h.processor.stop().await;
}

#[tokio::test]
async fn single_step_mode_runs_only_the_first_node() {
    let mut h = harness();
    h.services.processor().start(h.services.clone()).unwrap();

    let state = session::invoke_graph(&h.services, two_node_graph("sd15"), false)
        .await
        .unwrap();

    assert_eq!(next_event(&mut h.events).await.event_type_str(), "invocation_started");
    assert_eq!(next_event(&mut h.events).await.event_type_str(), "invocation_complete");
    assert!(tokio::time::timeout(Duration::from_millis(200), h.events.recv())
        .await
        .is_err());

    let stored = h.t.graph_execution_manager.get(&state.id).await.unwrap().unwrap();
    assert_eq!(stored.executed, vec!["load".to_string()]);
    assert!(!stored.is_complete());

    h.processor.stop().await;
}

#[tokio::test]
async fn stepping_twice_finishes_a_two_node_session() {
    let mut h = harness();
    h.services.processor().start(h.services.clone()).unwrap();

    let state = session::invoke_graph(&h.services, two_node_graph("sd15"), false)
        .await
        .unwrap();
    assert_eq!(next_event(&mut h.events).await.event_type_str(), "invocation_started");
    assert_eq!(next_event(&mut h.events).await.event_type_str(), "invocation_complete");

    session::invoke_next(&h.services, &state.id, false).await.unwrap();
    let events = events_until_complete(&mut h.events, &state.id).await;
    assert_eq!(
        event_kinds(&events),
        vec!["invocation_started", "invocation_complete", "graph_execution_state_complete"]
    );

    let stored = h.t.graph_execution_manager.get(&state.id).await.unwrap().unwrap();
    assert_eq!(stored.executed, vec!["load".to_string(), "vae".to_string()]);
    assert!(stored.is_complete());

    // stepping a finished session only repeats the completion
    session::invoke_next(&h.services, &state.id, false).await.unwrap();
    assert_eq!(
        next_event(&mut h.events).await.event_type_str(),
        "graph_execution_state_complete"
    );

    h.processor.stop().await;
}

#[tokio::test]
async fn stepping_an_unknown_or_canceled_session() {
    let mut h = harness();

    let missing = session::invoke_next(&h.services, "nope", false).await;
    assert!(matches!(missing, Err(ServiceError::NotFound { .. })));

    let state = session::invoke_graph(&h.services, two_node_graph("sd15"), false)
        .await
        .unwrap();
    session::cancel(&h.services, &state.id);
    session::invoke_next(&h.services, &state.id, false).await.unwrap();

    h.services.processor().start(h.services.clone()).unwrap();
    assert!(tokio::time::timeout(Duration::from_millis(200), h.events.recv())
        .await
        .is_err());
    let stored = h.t.graph_execution_manager.get(&state.id).await.unwrap().unwrap();
    assert!(stored.executed.is_empty());

    h.processor.stop().await;
}

#[tokio::test]
async fn failing_node_ends_the_session() {
    let mut h = harness();
    h.services.processor().start(h.services.clone()).unwrap();

    let state = session::invoke_graph(&h.services, two_node_graph("missing"), true)
        .await
        .unwrap();
    let events = events_until_complete(&mut h.events, &state.id).await;

    assert_eq!(
        event_kinds(&events),
        vec!["invocation_started", "invocation_error", "graph_execution_state_complete"]
    );
    match &events[1] {
        InvocationEvent::InvocationError { node_id, error, .. } => {
            assert_eq!(node_id, "load");
            assert_eq!(error, "unknown sd-1 main model: missing");
        }
        other => panic!("expected invocation_error, got {other:?}"),
    }

    let stored = h.t.graph_execution_manager.get(&state.id).await.unwrap().unwrap();
    assert!(stored.errors.contains_key("load"));
    assert!(!stored.results.contains_key("vae"));

    h.processor.stop().await;
}

#[tokio::test]
async fn unparseable_node_is_recorded_as_an_error() {
    let mut h = harness();
    h.services.processor().start(h.services.clone()).unwrap();

    let graph = Graph::new().with_node(GraphNode::new("odd", json!({ "type": "no_such_node" })));
    let state = session::invoke_graph(&h.services, graph, true).await.unwrap();
    let events = events_until_complete(&mut h.events, &state.id).await;

    match &events[0] {
        InvocationEvent::InvocationStarted { invocation_type, .. } => assert_eq!(invocation_type, "no_such_node"),
        other => panic!("expected invocation_started, got {other:?}"),
    }
    assert_eq!(events[1].event_type_str(), "invocation_error");

    h.processor.stop().await;
}

#[tokio::test]
async fn canceled_sessions_are_skipped() {
    let mut h = harness();

    let canceled = session::invoke_graph(&h.services, two_node_graph("sd15"), true)
        .await
        .unwrap();
    session::cancel(&h.services, &canceled.id);
    let kept = session::invoke_graph(&h.services, two_node_graph("sd15"), true)
        .await
        .unwrap();

    h.services.processor().start(h.services.clone()).unwrap();
    let events = events_until_complete(&mut h.events, &kept.id).await;

    assert!(events.iter().all(|e| e.graph_execution_state_id() == kept.id));
    let stored = h.t.graph_execution_manager.get(&canceled.id).await.unwrap().unwrap();
    assert!(stored.executed.is_empty());

    h.processor.stop().await;
}

#[tokio::test]
async fn empty_graph_completes_without_the_processor() {
    let mut h = harness();

    let state = session::invoke_graph(&h.services, Graph::new(), true).await.unwrap();

    match next_event(&mut h.events).await {
        InvocationEvent::GraphExecutionStateComplete { graph_execution_state_id, .. } => {
            assert_eq!(graph_execution_state_id, state.id)
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert!(!h.processor.is_running());
}

#[tokio::test]
async fn library_graphs_can_be_invoked_by_id() {
    let mut h = harness();
    h.services.processor().start(h.services.clone()).unwrap();

    let library = LibraryGraph::new("loaders", two_node_graph("sd15"));
    let library_id = library.id.clone();
    h.services.graph_library().set(library).await.unwrap();

    let state = session::invoke_library_graph(&h.services, &library_id, true)
        .await
        .unwrap();
    let events = events_until_complete(&mut h.events, &state.id).await;
    assert_eq!(events.len(), 5);

    let missing = session::invoke_library_graph(&h.services, "nope", true).await;
    assert!(matches!(missing, Err(ServiceError::NotFound { .. })));

    h.processor.stop().await;
}

#[tokio::test]
async fn start_stop_lifecycle_releases_the_registry() {
    let h = harness();

    h.services.processor().start(h.services.clone()).unwrap();
    assert!(h.processor.is_running());
    assert!(matches!(
        h.services.processor().start(h.services.clone()),
        Err(ServiceError::AlreadyRunning)
    ));

    h.processor.stop().await;
    assert!(!h.processor.is_running());
    assert_eq!(Arc::strong_count(&h.services), 1);

    h.services.processor().start(h.services.clone()).unwrap();
    assert!(h.processor.is_running());
    h.processor.stop().await;
    h.processor.stop().await;
    assert!(!h.processor.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_racing_start_never_hangs() {
    let h = harness();

    for _ in 0..50 {
        let processor = h.processor.clone();
        let services = h.services.clone();
        let starter = tokio::spawn(async move {
            let _ = processor.start(services);
        });
        tokio::time::timeout(Duration::from_secs(5), h.processor.stop())
            .await
            .expect("stop hung while start was in progress");
        starter.await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), h.processor.stop())
            .await
            .expect("stop hung after start returned");
        assert!(!h.processor.is_running());
    }

    assert_eq!(Arc::strong_count(&h.services), 1);
}
