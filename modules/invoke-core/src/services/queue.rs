use std::collections::HashSet;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use super::lock_unpoisoned;
use crate::error::{ServiceError, ServiceResult};

/// One unit of work: run `invocation_id` within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationQueueItem {
    pub graph_execution_state_id: String,
    pub invocation_id: String,
    /// Keep going through the session after this node finishes.
    pub invoke_all: bool,
    pub timestamp: DateTime<Utc>,
}

impl InvocationQueueItem {
    pub fn new(
        graph_execution_state_id: impl Into<String>,
        invocation_id: impl Into<String>,
        invoke_all: bool,
    ) -> Self {
        Self {
            graph_execution_state_id: graph_execution_state_id.into(),
            invocation_id: invocation_id.into(),
            invoke_all,
            timestamp: Utc::now(),
        }
    }
}

/// Work queue feeding the invocation processor.
#[async_trait]
pub trait InvocationQueue: Send + Sync {
    /// Wait for the next item whose session has not been canceled.
    async fn get(&self) -> ServiceResult<InvocationQueueItem>;

    fn put(&self, item: InvocationQueueItem) -> ServiceResult<()>;

    /// Cancel a session for good. Its items are never handed out by `get`,
    /// whether they were queued before or after the cancel.
    fn cancel(&self, graph_execution_state_id: &str);

    fn is_canceled(&self, graph_execution_state_id: &str) -> bool;
}

/// Unbounded in-process queue.
pub struct MemoryInvocationQueue {
    sender: StdMutex<Option<mpsc::UnboundedSender<InvocationQueueItem>>>,
    receiver: Mutex<mpsc::UnboundedReceiver<InvocationQueueItem>>,
    canceled: StdMutex<HashSet<String>>,
}

impl MemoryInvocationQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sender: StdMutex::new(Some(tx)),
            receiver: Mutex::new(rx),
            canceled: StdMutex::new(HashSet::new()),
        }
    }

    /// Stop accepting items. `get` drains what is left, then fails with `QueueClosed`.
    pub fn close(&self) {
        lock_unpoisoned(&self.sender).take();
    }
}

impl Default for MemoryInvocationQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvocationQueue for MemoryInvocationQueue {
    async fn get(&self) -> ServiceResult<InvocationQueueItem> {
        let mut rx = self.receiver.lock().await;
        loop {
            let item = rx.recv().await.ok_or(ServiceError::QueueClosed)?;
            if !self.is_canceled(&item.graph_execution_state_id) {
                return Ok(item);
            }
            debug!(
                session_id = %item.graph_execution_state_id,
                node_id = %item.invocation_id,
                "Skipping canceled queue item"
            );
        }
    }

    fn put(&self, item: InvocationQueueItem) -> ServiceResult<()> {
        let sender = lock_unpoisoned(&self.sender);
        let tx = sender.as_ref().ok_or(ServiceError::QueueClosed)?;
        tx.send(item).map_err(|_| ServiceError::QueueClosed)
    }

    fn cancel(&self, graph_execution_state_id: &str) {
        lock_unpoisoned(&self.canceled).insert(graph_execution_state_id.to_string());
    }

    fn is_canceled(&self, graph_execution_state_id: &str) -> bool {
        lock_unpoisoned(&self.canceled).contains(graph_execution_state_id)
    }
}
