use invoke_common::{BaseModelType, ModelType};
use invoke_core::ServiceError;
use thiserror::Error;

/// Why a node failed. The message is what lands in the session's error map.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("unknown {base_model} {model_type} model: {model_name}")]
    UnknownModel {
        base_model: BaseModelType,
        model_type: ModelType,
        model_name: String,
    },

    #[error("LoRA \"{lora}\" already applied to {target}")]
    LoraAlreadyApplied { lora: String, target: &'static str },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Node payload did not match any known invocation
    #[error("invalid invocation payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

pub type InvocationResult<T> = std::result::Result<T, InvocationError>;
