//! Background worker that drains the invocation queue.
//!
//! For every queue item the worker loads the session, runs the node, writes
//! the result back and either queues the next node or reports the session
//! complete. Nodes run one at a time in declaration order.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use invoke_common::{GraphNode, InvocationEvent};
use invoke_core::{InvocationProcessor, InvocationQueueItem, InvocationServices, ServiceError, ServiceResult};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::context::InvocationContext;
use crate::error::InvocationResult;
use crate::invocations::AnyInvocation;

/// A running worker: its stop signal and its task, always set together.
struct Worker {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct DefaultInvocationProcessor {
    worker: Mutex<Option<Worker>>,
}

impl DefaultInvocationProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvocationProcessor for DefaultInvocationProcessor {
    /// Spawns the worker on the current Tokio runtime.
    fn start(&self, services: Arc<InvocationServices>) -> ServiceResult<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return Err(ServiceError::AlreadyRunning);
        }

        let (stop_tx, rx) = watch::channel(false);
        let span = services.logger().clone();
        let handle = tokio::spawn(process_loop(services, rx).instrument(span));
        *worker = Some(Worker { stop_tx, handle });
        Ok(())
    }

    /// Lets the node in flight finish, then waits for the worker to exit.
    async fn stop(&self) {
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(Worker { stop_tx, handle }) = worker else {
            return;
        };
        let _ = stop_tx.send(true);
        if let Err(e) = handle.await {
            warn!(error = %e, "Invocation processor task ended abnormally");
        }
    }

    fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }
}

async fn process_loop(services: Arc<InvocationServices>, mut stop: watch::Receiver<bool>) {
    info!("Invocation processor started");

    loop {
        let item = tokio::select! {
            _ = stop.changed() => break,
            item = services.queue().get() => item,
        };

        match item {
            Ok(item) => {
                let span = info_span!(
                    "invocation",
                    session_id = %item.graph_execution_state_id,
                    node_id = %item.invocation_id,
                );
                if let Err(e) = process_item(&services, item).instrument(span).await {
                    error!(error = %e, "Failed to process queue item");
                }
            }
            Err(ServiceError::QueueClosed) => {
                info!("Invocation queue closed");
                break;
            }
            Err(e) => {
                error!(error = %e, "Failed to read from invocation queue");
                break;
            }
        }
    }

    info!("Invocation processor stopped");
}

async fn process_item(services: &Arc<InvocationServices>, item: InvocationQueueItem) -> ServiceResult<()> {
    let session_id = item.graph_execution_state_id.as_str();

    if services.queue().is_canceled(session_id) {
        debug!("Session canceled, dropping item");
        return Ok(());
    }

    let Some(mut state) = services.graph_execution_manager().get(session_id).await? else {
        warn!("Session not found, dropping item");
        return Ok(());
    };
    let Some(node) = state.graph.node(&item.invocation_id).cloned() else {
        warn!("Node not found in session graph, dropping item");
        return Ok(());
    };

    services.events().dispatch(InvocationEvent::InvocationStarted {
        graph_execution_state_id: session_id.to_string(),
        node_id: node.id.clone(),
        invocation_type: node.invocation_type().unwrap_or("unknown").to_string(),
        ts: Utc::now(),
    });

    let ctx = InvocationContext::new(services.clone(), session_id);
    let outcome = run_node(&ctx, &node).await;

    let event = match outcome {
        Ok(result) => {
            debug!("Invocation complete");
            state.complete(&node.id, result.clone());
            InvocationEvent::InvocationComplete {
                graph_execution_state_id: session_id.to_string(),
                node_id: node.id.clone(),
                result,
                ts: Utc::now(),
            }
        }
        Err(e) => {
            warn!(error = %e, "Invocation failed");
            state.set_error(&node.id, e.to_string());
            InvocationEvent::InvocationError {
                graph_execution_state_id: session_id.to_string(),
                node_id: node.id.clone(),
                error: e.to_string(),
                ts: Utc::now(),
            }
        }
    };

    let next = state.next().map(|n| n.id.clone());
    let complete = state.is_complete();
    services.graph_execution_manager().set(state).await?;
    services.events().dispatch(event);

    match next {
        Some(next) if item.invoke_all => {
            services
                .queue()
                .put(InvocationQueueItem::new(session_id, next, true))?;
        }
        _ if complete => {
            info!("Session complete");
            services.events().dispatch(InvocationEvent::GraphExecutionStateComplete {
                graph_execution_state_id: session_id.to_string(),
                ts: Utc::now(),
            });
        }
        _ => {}
    }

    Ok(())
}

async fn run_node(ctx: &InvocationContext, node: &GraphNode) -> InvocationResult<serde_json::Value> {
    let invocation = AnyInvocation::from_node(node)?;
    let output = invocation.invoke(ctx).await?;
    Ok(serde_json::to_value(output)?)
}
