use async_trait::async_trait;
use serde::Serialize;

use crate::context::InvocationContext;
use crate::error::InvocationResult;
use crate::invocations::InvocationOutput;

/// Static description of a node type, shown in the node catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InvocationInfo {
    #[serde(rename = "type")]
    pub invocation_type: &'static str,
    pub title: &'static str,
    pub tags: &'static [&'static str],
    pub category: &'static str,
    pub version: &'static str,
}

/// A single unit of work in a graph.
#[async_trait]
pub trait Invocation: Send + Sync {
    const INFO: InvocationInfo;

    type Output: Into<InvocationOutput> + Send;

    async fn invoke(&self, ctx: &InvocationContext) -> InvocationResult<Self::Output>;
}
