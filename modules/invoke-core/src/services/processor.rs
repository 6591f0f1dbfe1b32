use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ServiceResult;
use crate::registry::InvocationServices;

/// Drains the invocation queue and runs nodes.
///
/// The processor is itself one of the registered services, so it is built
/// without the registry and receives it later through `start`.
#[async_trait]
pub trait InvocationProcessor: Send + Sync {
    /// Attach the registry and begin processing. Fails with `AlreadyRunning`
    /// if called twice without an intervening `stop`.
    fn start(&self, services: Arc<InvocationServices>) -> ServiceResult<()>;

    /// Stop processing and release the registry. Idempotent.
    async fn stop(&self);

    fn is_running(&self) -> bool;
}
