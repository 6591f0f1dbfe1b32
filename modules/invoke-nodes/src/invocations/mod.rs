pub mod model;

use invoke_common::GraphNode;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::context::InvocationContext;
use crate::error::InvocationResult;
use crate::invocation::{Invocation, InvocationInfo};

pub use model::*;

/// Every node type the processor knows how to run, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnyInvocation {
    MainModelLoader(MainModelLoaderInvocation),
    LoraLoader(LoraLoaderInvocation),
    SdxlLoraLoader(SdxlLoraLoaderInvocation),
    VaeLoader(VaeLoaderInvocation),
    Seamless(SeamlessModeInvocation),
    #[serde(rename = "freeu")]
    FreeU(FreeUInvocation),
}

impl AnyInvocation {
    /// Parse the opaque payload stored on a graph node.
    pub fn from_node(node: &GraphNode) -> InvocationResult<Self> {
        Ok(serde_json::from_value(node.invocation.clone())?)
    }

    pub fn info(&self) -> InvocationInfo {
        match self {
            AnyInvocation::MainModelLoader(_) => MainModelLoaderInvocation::INFO,
            AnyInvocation::LoraLoader(_) => LoraLoaderInvocation::INFO,
            AnyInvocation::SdxlLoraLoader(_) => SdxlLoraLoaderInvocation::INFO,
            AnyInvocation::VaeLoader(_) => VaeLoaderInvocation::INFO,
            AnyInvocation::Seamless(_) => SeamlessModeInvocation::INFO,
            AnyInvocation::FreeU(_) => FreeUInvocation::INFO,
        }
    }

    pub async fn invoke(&self, ctx: &InvocationContext) -> InvocationResult<InvocationOutput> {
        Ok(match self {
            AnyInvocation::MainModelLoader(i) => i.invoke(ctx).await?.into(),
            AnyInvocation::LoraLoader(i) => i.invoke(ctx).await?.into(),
            AnyInvocation::SdxlLoraLoader(i) => i.invoke(ctx).await?.into(),
            AnyInvocation::VaeLoader(i) => i.invoke(ctx).await?.into(),
            AnyInvocation::Seamless(i) => i.invoke(ctx).await?.into(),
            AnyInvocation::FreeU(i) => i.invoke(ctx).await?.into(),
        })
    }

    /// All registered node types, in catalog order.
    pub fn catalog() -> Vec<InvocationInfo> {
        vec![
            MainModelLoaderInvocation::INFO,
            LoraLoaderInvocation::INFO,
            SdxlLoraLoaderInvocation::INFO,
            VaeLoaderInvocation::INFO,
            SeamlessModeInvocation::INFO,
            FreeUInvocation::INFO,
        ]
    }

    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnyInvocation)
    }
}

/// Result of running any node, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvocationOutput {
    ModelLoaderOutput(ModelLoaderOutput),
    LoraLoaderOutput(LoraLoaderOutput),
    SdxlLoraLoaderOutput(SdxlLoraLoaderOutput),
    VaeOutput(VaeOutput),
    SeamlessOutput(SeamlessModeOutput),
    #[serde(rename = "unet_output")]
    UNetOutput(UNetOutput),
}

macro_rules! impl_output_from {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for InvocationOutput {
                fn from(out: $ty) -> Self {
                    InvocationOutput::$variant(out)
                }
            }
        )*
    };
}

impl_output_from! {
    ModelLoaderOutput => ModelLoaderOutput,
    LoraLoaderOutput => LoraLoaderOutput,
    SdxlLoraLoaderOutput => SdxlLoraLoaderOutput,
    VaeOutput => VaeOutput,
    SeamlessOutput => SeamlessModeOutput,
    UNetOutput => UNetOutput,
}
