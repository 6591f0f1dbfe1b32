//! Node implementations and the processor that runs them against
//! `InvocationServices`.

pub mod context;
pub mod error;
pub mod invocation;
pub mod invocations;
pub mod processor;
pub mod session;

pub use context::InvocationContext;
pub use error::{InvocationError, InvocationResult};
pub use invocation::{Invocation, InvocationInfo};
pub use invocations::{AnyInvocation, InvocationOutput};
pub use processor::DefaultInvocationProcessor;
