use anyhow::{bail, Context, Result};
use invoke_common::{Graph, GraphExecutionState, InvocationEvent};
use invoke_nodes::session;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::bootstrap::AppServices;

/// Queue `graph` and wait for its session to finish, or for its first node
/// when `invoke_all` is off. The processor must already be running.
pub async fn run_to_completion(app: &AppServices, graph: Graph) -> Result<GraphExecutionState> {
    let mut events = app.events.subscribe();
    let state = session::invoke_graph(&app.services, graph, app.invoke_all)
        .await
        .context("Failed to queue graph")?;

    loop {
        match events.recv().await {
            Ok(event) if event.graph_execution_state_id() == state.id && is_final(&event, app.invoke_all) => break,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event subscriber lagged");
                let current = load(app, &state.id).await?;
                if current.is_complete() || (!app.invoke_all && !current.executed.is_empty()) {
                    break;
                }
            }
            Err(RecvError::Closed) => bail!("Event channel closed before session {} finished", state.id),
        }
    }

    load(app, &state.id).await
}

fn is_final(event: &InvocationEvent, invoke_all: bool) -> bool {
    match event {
        InvocationEvent::GraphExecutionStateComplete { .. } => true,
        InvocationEvent::InvocationComplete { .. } | InvocationEvent::InvocationError { .. } => !invoke_all,
        InvocationEvent::InvocationStarted { .. } => false,
    }
}

async fn load(app: &AppServices, session_id: &str) -> Result<GraphExecutionState> {
    app.services
        .graph_execution_manager()
        .get(session_id)
        .await
        .with_context(|| format!("Failed to load session {session_id}"))?
        .with_context(|| format!("Session {session_id} not found"))
}
