//! Invocation services: the collaborator interfaces an image-generation node
//! graph runs against, their in-process implementations, and the
//! `InvocationServices` registry that hands them to invocations.

pub mod config;
pub mod error;
pub mod file_config;
pub mod registry;
pub mod services;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::AppConfig;
pub use error::{RegistryError, ServiceError, ServiceResult};
pub use file_config::{FileConfig, StorageBackend};
pub use registry::{InvocationServices, InvocationServicesBuilder};
pub use services::*;
