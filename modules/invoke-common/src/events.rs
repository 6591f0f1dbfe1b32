use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle notifications emitted while sessions run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InvocationEvent {
    InvocationStarted {
        graph_execution_state_id: String,
        node_id: String,
        invocation_type: String,
        ts: DateTime<Utc>,
    },
    InvocationComplete {
        graph_execution_state_id: String,
        node_id: String,
        result: serde_json::Value,
        ts: DateTime<Utc>,
    },
    InvocationError {
        graph_execution_state_id: String,
        node_id: String,
        error: String,
        ts: DateTime<Utc>,
    },
    GraphExecutionStateComplete {
        graph_execution_state_id: String,
        ts: DateTime<Utc>,
    },
}

impl InvocationEvent {
    pub fn event_type_str(&self) -> &'static str {
        match self {
            InvocationEvent::InvocationStarted { .. } => "invocation_started",
            InvocationEvent::InvocationComplete { .. } => "invocation_complete",
            InvocationEvent::InvocationError { .. } => "invocation_error",
            InvocationEvent::GraphExecutionStateComplete { .. } => "graph_execution_state_complete",
        }
    }

    pub fn graph_execution_state_id(&self) -> &str {
        match self {
            InvocationEvent::InvocationStarted { graph_execution_state_id, .. }
            | InvocationEvent::InvocationComplete { graph_execution_state_id, .. }
            | InvocationEvent::InvocationError { graph_execution_state_id, .. }
            | InvocationEvent::GraphExecutionStateComplete { graph_execution_state_id, .. } => {
                graph_execution_state_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_tag_matches_event_type_str() {
        let event = InvocationEvent::GraphExecutionStateComplete {
            graph_execution_state_id: "s1".into(),
            ts: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], event.event_type_str());
        assert_eq!(event.graph_execution_state_id(), "s1");
    }
}
