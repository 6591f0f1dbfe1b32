use std::sync::Arc;

use invoke_core::InvocationServices;

/// What a running node gets to see: the shared services and its session.
#[derive(Clone)]
pub struct InvocationContext {
    pub services: Arc<InvocationServices>,
    pub graph_execution_state_id: String,
}

impl InvocationContext {
    pub fn new(services: Arc<InvocationServices>, graph_execution_state_id: impl Into<String>) -> Self {
        Self {
            services,
            graph_execution_state_id: graph_execution_state_id.into(),
        }
    }
}
