//! Starting and canceling graph runs.

use chrono::Utc;
use invoke_common::{Graph, GraphExecutionState, InvocationEvent};
use invoke_core::{InvocationQueueItem, InvocationServices, ServiceError, ServiceResult};
use tracing::info;

/// Store a new session for `graph` and queue its first node.
///
/// An empty graph is reported complete straight away.
pub async fn invoke_graph(
    services: &InvocationServices,
    graph: Graph,
    invoke_all: bool,
) -> ServiceResult<GraphExecutionState> {
    let state = GraphExecutionState::new(graph);
    let first = state.next().map(|n| n.id.clone());
    services.graph_execution_manager().set(state.clone()).await?;

    let _span = services.logger().enter();
    match first {
        Some(node_id) => {
            info!(session_id = %state.id, node_id = %node_id, invoke_all, "Session queued");
            services
                .queue()
                .put(InvocationQueueItem::new(state.id.clone(), node_id, invoke_all))?;
        }
        None => {
            info!(session_id = %state.id, "Empty session, nothing to run");
            services.events().dispatch(InvocationEvent::GraphExecutionStateComplete {
                graph_execution_state_id: state.id.clone(),
                ts: Utc::now(),
            });
        }
    }

    Ok(state)
}

/// Run a graph saved in the graph library.
pub async fn invoke_library_graph(
    services: &InvocationServices,
    library_id: &str,
    invoke_all: bool,
) -> ServiceResult<GraphExecutionState> {
    let library = services
        .graph_library()
        .get(library_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("library graph", library_id))?;
    invoke_graph(services, library.graph, invoke_all).await
}

/// Queue the next node of a stored session, or report it complete when
/// every node has run. Used to step through a session started with
/// `invoke_all = false`; call it once the previous step has reported.
pub async fn invoke_next(
    services: &InvocationServices,
    graph_execution_state_id: &str,
    invoke_all: bool,
) -> ServiceResult<GraphExecutionState> {
    let state = services
        .graph_execution_manager()
        .get(graph_execution_state_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("graph execution state", graph_execution_state_id))?;

    let _span = services.logger().enter();
    if services.queue().is_canceled(&state.id) {
        info!(session_id = %state.id, "Session canceled, not stepping");
        return Ok(state);
    }

    match state.next() {
        Some(node) => {
            info!(session_id = %state.id, node_id = %node.id, invoke_all, "Next node queued");
            services
                .queue()
                .put(InvocationQueueItem::new(state.id.clone(), node.id.clone(), invoke_all))?;
        }
        None => {
            info!(session_id = %state.id, "Nothing left to run");
            services.events().dispatch(InvocationEvent::GraphExecutionStateComplete {
                graph_execution_state_id: state.id.clone(),
                ts: Utc::now(),
            });
        }
    }

    Ok(state)
}

/// Drop every queued node of a session. The node in flight, if any, finishes.
pub fn cancel(services: &InvocationServices, graph_execution_state_id: &str) {
    let _span = services.logger().enter();
    info!(session_id = %graph_execution_state_id, "Canceling session");
    services.queue().cancel(graph_execution_state_id);
}
