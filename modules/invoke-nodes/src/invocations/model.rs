//! Model loading nodes. These only resolve and annotate model references;
//! weights are loaded later by whichever node consumes the fields.

use async_trait::async_trait;
use invoke_common::{
    BaseModelType, ClipField, FreeUConfig, HasLoras, LoRAModelField, LoraInfo, MainModelField, ModelInfo,
    ModelType, SeamlessSettings, SubModelType, UNetField, VAEModelField, VaeField,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;
use typed_builder::TypedBuilder;

use crate::context::InvocationContext;
use crate::error::{InvocationError, InvocationResult};
use crate::invocation::{Invocation, InvocationInfo};

fn require_model(
    ctx: &InvocationContext,
    model_name: &str,
    base_model: BaseModelType,
    model_type: ModelType,
) -> InvocationResult<()> {
    if ctx
        .services
        .model_manager()
        .model_exists(model_name, base_model, model_type)
    {
        Ok(())
    } else {
        Err(InvocationError::UnknownModel {
            base_model,
            model_type,
            model_name: model_name.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelLoaderOutput {
    pub unet: UNetField,
    pub clip: ClipField,
    pub vae: VaeField,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LoraLoaderOutput {
    #[serde(default)]
    pub unet: Option<UNetField>,
    #[serde(default)]
    pub clip: Option<ClipField>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SdxlLoraLoaderOutput {
    #[serde(default)]
    pub unet: Option<UNetField>,
    #[serde(default)]
    pub clip: Option<ClipField>,
    #[serde(default)]
    pub clip2: Option<ClipField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VaeOutput {
    pub vae: VaeField,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeamlessModeOutput {
    #[serde(default)]
    pub unet: Option<UNetField>,
    #[serde(default)]
    pub vae: Option<VaeField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UNetOutput {
    pub unet: UNetField,
}

// ---------------------------------------------------------------------------
// main_model_loader
// ---------------------------------------------------------------------------

/// Loads a main model, outputting its submodels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, TypedBuilder)]
pub struct MainModelLoaderInvocation {
    pub model: MainModelField,
}

#[async_trait]
impl Invocation for MainModelLoaderInvocation {
    const INFO: InvocationInfo = InvocationInfo {
        invocation_type: "main_model_loader",
        title: "Main Model",
        tags: &["model"],
        category: "model",
        version: "1.0.0",
    };

    type Output = ModelLoaderOutput;

    async fn invoke(&self, ctx: &InvocationContext) -> InvocationResult<ModelLoaderOutput> {
        let name = &self.model.model_name;
        let base = self.model.base_model;
        require_model(ctx, name, base, ModelType::Main)?;

        let submodel = |sub| ModelInfo::new(name.clone(), base, ModelType::Main).with_submodel(sub);

        Ok(ModelLoaderOutput {
            unet: UNetField {
                unet: submodel(SubModelType::Unet),
                scheduler: submodel(SubModelType::Scheduler),
                loras: Vec::new(),
                freeu_config: None,
                seamless: None,
            },
            clip: ClipField {
                tokenizer: submodel(SubModelType::Tokenizer),
                text_encoder: submodel(SubModelType::TextEncoder),
                skipped_layers: 0,
                loras: Vec::new(),
            },
            vae: VaeField {
                vae: submodel(SubModelType::Vae),
                seamless: None,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// lora_loader / sdxl_lora_loader
// ---------------------------------------------------------------------------

fn default_lora_weight() -> f64 {
    0.75
}

fn lora_info(lora: &LoRAModelField, weight: f64) -> LoraInfo {
    LoraInfo {
        model: ModelInfo::new(lora.model_name.clone(), lora.base_model, ModelType::Lora),
        weight,
    }
}

fn ensure_not_applied<F: HasLoras>(field: Option<&F>, lora: &str, target: &'static str) -> InvocationResult<()> {
    match field {
        Some(f) if f.has_lora(lora) => Err(InvocationError::LoraAlreadyApplied {
            lora: lora.to_string(),
            target,
        }),
        _ => Ok(()),
    }
}

/// Copy of `field` with `lora` appended.
fn with_lora<F: HasLoras + Clone>(field: Option<&F>, lora: &LoraInfo) -> Option<F> {
    field.map(|f| {
        let mut f = f.clone();
        f.loras_mut().push(lora.clone());
        f
    })
}

/// Apply selected lora to unet and text_encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, TypedBuilder)]
pub struct LoraLoaderInvocation {
    pub lora: LoRAModelField,
    #[serde(default = "default_lora_weight")]
    #[builder(default = 0.75)]
    pub weight: f64,
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub unet: Option<UNetField>,
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub clip: Option<ClipField>,
}

#[async_trait]
impl Invocation for LoraLoaderInvocation {
    const INFO: InvocationInfo = InvocationInfo {
        invocation_type: "lora_loader",
        title: "LoRA",
        tags: &["model"],
        category: "model",
        version: "1.0.0",
    };

    type Output = LoraLoaderOutput;

    async fn invoke(&self, ctx: &InvocationContext) -> InvocationResult<LoraLoaderOutput> {
        let name = &self.lora.model_name;
        require_model(ctx, name, self.lora.base_model, ModelType::Lora)?;
        ensure_not_applied(self.unet.as_ref(), name, "unet")?;
        ensure_not_applied(self.clip.as_ref(), name, "clip")?;

        let lora = lora_info(&self.lora, self.weight);
        debug!(lora = %name, weight = self.weight, "Applying LoRA");

        Ok(LoraLoaderOutput {
            unet: with_lora(self.unet.as_ref(), &lora),
            clip: with_lora(self.clip.as_ref(), &lora),
        })
    }
}

/// Apply selected lora to unet and both SDXL text encoders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, TypedBuilder)]
pub struct SdxlLoraLoaderInvocation {
    pub lora: LoRAModelField,
    #[serde(default = "default_lora_weight")]
    #[builder(default = 0.75)]
    pub weight: f64,
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub unet: Option<UNetField>,
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub clip: Option<ClipField>,
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub clip2: Option<ClipField>,
}

#[async_trait]
impl Invocation for SdxlLoraLoaderInvocation {
    const INFO: InvocationInfo = InvocationInfo {
        invocation_type: "sdxl_lora_loader",
        title: "SDXL LoRA",
        tags: &["lora", "model"],
        category: "model",
        version: "1.0.0",
    };

    type Output = SdxlLoraLoaderOutput;

    async fn invoke(&self, ctx: &InvocationContext) -> InvocationResult<SdxlLoraLoaderOutput> {
        let name = &self.lora.model_name;
        require_model(ctx, name, self.lora.base_model, ModelType::Lora)?;
        ensure_not_applied(self.unet.as_ref(), name, "unet")?;
        ensure_not_applied(self.clip.as_ref(), name, "clip")?;
        ensure_not_applied(self.clip2.as_ref(), name, "clip2")?;

        let lora = lora_info(&self.lora, self.weight);
        debug!(lora = %name, weight = self.weight, "Applying SDXL LoRA");

        Ok(SdxlLoraLoaderOutput {
            unet: with_lora(self.unet.as_ref(), &lora),
            clip: with_lora(self.clip.as_ref(), &lora),
            clip2: with_lora(self.clip2.as_ref(), &lora),
        })
    }
}

// ---------------------------------------------------------------------------
// vae_loader
// ---------------------------------------------------------------------------

/// Loads a VAE model, outputting a VaeLoaderOutput.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, TypedBuilder)]
pub struct VaeLoaderInvocation {
    pub vae_model: VAEModelField,
}

#[async_trait]
impl Invocation for VaeLoaderInvocation {
    const INFO: InvocationInfo = InvocationInfo {
        invocation_type: "vae_loader",
        title: "VAE",
        tags: &["vae", "model"],
        category: "model",
        version: "1.0.0",
    };

    type Output = VaeOutput;

    async fn invoke(&self, ctx: &InvocationContext) -> InvocationResult<VaeOutput> {
        let name = &self.vae_model.model_name;
        let base = self.vae_model.base_model;
        require_model(ctx, name, base, ModelType::Vae)?;

        Ok(VaeOutput {
            vae: VaeField {
                vae: ModelInfo::new(name.clone(), base, ModelType::Vae),
                seamless: None,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// seamless
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

/// Applies the seamless transformation to the Model UNet and VAE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, TypedBuilder)]
pub struct SeamlessModeInvocation {
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub unet: Option<UNetField>,
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub vae: Option<VaeField>,
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub seamless_x: bool,
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub seamless_y: bool,
    /// How many of the model's down layers to skip.
    #[serde(default)]
    #[builder(default)]
    pub skipped_layers: u32,
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub skip_second_resnet: bool,
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub skip_conv2: bool,
}

impl SeamlessModeInvocation {
    fn settings(&self) -> SeamlessSettings {
        let mut axes = Vec::new();
        if self.seamless_x {
            axes.push("x".to_string());
        }
        if self.seamless_y {
            axes.push("y".to_string());
        }
        SeamlessSettings {
            axes,
            skipped_layers: self.skipped_layers,
            skip_second_resnet: self.skip_second_resnet,
            skip_conv2: self.skip_conv2,
        }
    }
}

#[async_trait]
impl Invocation for SeamlessModeInvocation {
    const INFO: InvocationInfo = InvocationInfo {
        invocation_type: "seamless",
        title: "Seamless",
        tags: &["seamless", "model"],
        category: "model",
        version: "1.0.0",
    };

    type Output = SeamlessModeOutput;

    async fn invoke(&self, _ctx: &InvocationContext) -> InvocationResult<SeamlessModeOutput> {
        let settings = self.settings();

        let unet = self.unet.clone().map(|mut unet| {
            unet.seamless = Some(settings.clone());
            unet
        });
        let vae = self.vae.clone().map(|mut vae| {
            vae.seamless = Some(settings);
            vae
        });

        Ok(SeamlessModeOutput { unet, vae })
    }
}

// ---------------------------------------------------------------------------
// freeu
// ---------------------------------------------------------------------------

const FREEU_MIN: f64 = -1.0;
const FREEU_MAX: f64 = 3.0;

fn default_b1() -> f64 {
    1.2
}

fn default_b2() -> f64 {
    1.4
}

fn default_s1() -> f64 {
    0.9
}

fn default_s2() -> f64 {
    0.2
}

/// Applies FreeU to the UNet. Suggested values (b1/b2/s1/s2):
///
/// SD1.5: 1.2/1.4/0.9/0.2,
/// SD2: 1.1/1.2/0.9/0.2,
/// SDXL: 1.1/1.2/0.6/0.4,
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, TypedBuilder)]
pub struct FreeUInvocation {
    pub unet: UNetField,
    #[serde(default = "default_b1")]
    #[builder(default = 1.2)]
    pub b1: f64,
    #[serde(default = "default_b2")]
    #[builder(default = 1.4)]
    pub b2: f64,
    #[serde(default = "default_s1")]
    #[builder(default = 0.9)]
    pub s1: f64,
    #[serde(default = "default_s2")]
    #[builder(default = 0.2)]
    pub s2: f64,
}

impl FreeUInvocation {
    fn validate(&self) -> InvocationResult<()> {
        for (name, value) in [("b1", self.b1), ("b2", self.b2), ("s1", self.s1), ("s2", self.s2)] {
            if !(FREEU_MIN..=FREEU_MAX).contains(&value) {
                return Err(InvocationError::InvalidInput(format!(
                    "{name} must be between {FREEU_MIN} and {FREEU_MAX}, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Invocation for FreeUInvocation {
    const INFO: InvocationInfo = InvocationInfo {
        invocation_type: "freeu",
        title: "FreeU",
        tags: &["freeu"],
        category: "unet",
        version: "1.0.0",
    };

    type Output = UNetOutput;

    async fn invoke(&self, _ctx: &InvocationContext) -> InvocationResult<UNetOutput> {
        self.validate()?;

        let mut unet = self.unet.clone();
        unet.freeu_config = Some(FreeUConfig {
            s1: self.s1,
            s2: self.s2,
            b1: self.b1,
            b2: self.b2,
        });
        Ok(UNetOutput { unet })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoke_core::testing::{RecordingProcessor, TestServices};
    use invoke_core::ModelConfig;
    use std::sync::Arc;

    const SD1: BaseModelType = BaseModelType::StableDiffusion1;

    fn ctx() -> InvocationContext {
        let t = TestServices::new().with_models([
            ModelConfig::new("sd15", SD1, ModelType::Main),
            ModelConfig::new("detail", SD1, ModelType::Lora),
            ModelConfig::new("ft-mse", SD1, ModelType::Vae),
        ]);
        let services = Arc::new(t.build_with(Arc::new(RecordingProcessor::new())));
        InvocationContext::new(services, "session-1")
    }

    async fn load_sd15(ctx: &InvocationContext) -> ModelLoaderOutput {
        MainModelLoaderInvocation::builder()
            .model(MainModelField {
                model_name: "sd15".into(),
                base_model: SD1,
                model_type: ModelType::Main,
            })
            .build()
            .invoke(ctx)
            .await
            .unwrap()
    }

    fn detail_lora() -> LoRAModelField {
        LoRAModelField {
            model_name: "detail".into(),
            base_model: SD1,
        }
    }

    #[tokio::test]
    async fn main_loader_emits_submodel_references() {
        let ctx = ctx();
        let out = load_sd15(&ctx).await;

        assert_eq!(out.unet.unet.submodel, Some(SubModelType::Unet));
        assert_eq!(out.unet.scheduler.submodel, Some(SubModelType::Scheduler));
        assert_eq!(out.clip.tokenizer.submodel, Some(SubModelType::Tokenizer));
        assert_eq!(out.clip.text_encoder.submodel, Some(SubModelType::TextEncoder));
        assert_eq!(out.vae.vae.submodel, Some(SubModelType::Vae));
        assert_eq!(out.clip.skipped_layers, 0);
        assert!(out.unet.loras.is_empty() && out.clip.loras.is_empty());
        assert_eq!(out.vae.vae.model_name, "sd15");
    }

    #[tokio::test]
    async fn main_loader_rejects_unknown_model() {
        let err = MainModelLoaderInvocation::builder()
            .model(MainModelField {
                model_name: "missing".into(),
                base_model: SD1,
                model_type: ModelType::Main,
            })
            .build()
            .invoke(&ctx())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "unknown sd-1 main model: missing");
    }

    #[tokio::test]
    async fn lora_loader_appends_to_copies() {
        let ctx = ctx();
        let loaded = load_sd15(&ctx).await;

        let node = LoraLoaderInvocation::builder()
            .lora(detail_lora())
            .unet(loaded.unet.clone())
            .clip(loaded.clip.clone())
            .build();
        let out = node.invoke(&ctx).await.unwrap();

        let unet = out.unet.unwrap();
        assert_eq!(unet.loras.len(), 1);
        assert_eq!(unet.loras[0].weight, 0.75);
        assert_eq!(unet.loras[0].model.model_type, ModelType::Lora);
        assert_eq!(unet.loras[0].model.submodel, None);
        assert!(out.clip.unwrap().has_lora("detail"));
        assert!(node.unet.unwrap().loras.is_empty());
    }

    #[tokio::test]
    async fn lora_loader_without_inputs_outputs_nothing() {
        let out = LoraLoaderInvocation::builder()
            .lora(detail_lora())
            .build()
            .invoke(&ctx())
            .await
            .unwrap();
        assert_eq!(out, LoraLoaderOutput::default());
    }

    #[tokio::test]
    async fn lora_loader_refuses_double_application() {
        let ctx = ctx();
        let loaded = load_sd15(&ctx).await;
        let once = LoraLoaderInvocation::builder()
            .lora(detail_lora())
            .clip(loaded.clip)
            .build()
            .invoke(&ctx)
            .await
            .unwrap();

        let err = LoraLoaderInvocation::builder()
            .lora(detail_lora())
            .clip(once.clip.unwrap())
            .build()
            .invoke(&ctx)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            InvocationError::LoraAlreadyApplied { ref lora, target: "clip" } if lora == "detail"
        ));
    }

    #[tokio::test]
    async fn lora_loader_rejects_unknown_lora() {
        let err = LoraLoaderInvocation::builder()
            .lora(LoRAModelField {
                model_name: "nope".into(),
                base_model: SD1,
            })
            .build()
            .invoke(&ctx())
            .await
            .unwrap_err();

        assert!(matches!(err, InvocationError::UnknownModel { model_type: ModelType::Lora, .. }));
    }

    #[tokio::test]
    async fn sdxl_lora_loader_checks_second_encoder() {
        let ctx = ctx();
        let loaded = load_sd15(&ctx).await;
        let mut clip2 = loaded.clip.clone();
        clip2.loras.push(lora_info(&detail_lora(), 0.5));

        let err = SdxlLoraLoaderInvocation::builder()
            .lora(detail_lora())
            .clip(loaded.clip)
            .clip2(clip2)
            .build()
            .invoke(&ctx)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "LoRA \"detail\" already applied to clip2");
    }

    #[tokio::test]
    async fn vae_loader_requires_registered_vae() {
        let ctx = ctx();
        let out = VaeLoaderInvocation::builder()
            .vae_model(VAEModelField {
                model_name: "ft-mse".into(),
                base_model: SD1,
            })
            .build()
            .invoke(&ctx)
            .await
            .unwrap();
        assert_eq!(out.vae.vae.model_type, ModelType::Vae);
        assert_eq!(out.vae.vae.submodel, None);

        let err = VaeLoaderInvocation::builder()
            .vae_model(VAEModelField {
                model_name: "sd15".into(),
                base_model: SD1,
            })
            .build()
            .invoke(&ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::UnknownModel { .. }));
    }

    #[tokio::test]
    async fn seamless_applies_selected_axes() {
        let ctx = ctx();
        let loaded = load_sd15(&ctx).await;

        let out = SeamlessModeInvocation::builder()
            .unet(loaded.unet)
            .vae(loaded.vae)
            .seamless_x(false)
            .build()
            .invoke(&ctx)
            .await
            .unwrap();

        let settings = out.unet.unwrap().seamless.unwrap();
        assert_eq!(settings.axes, vec!["y".to_string()]);
        assert_eq!(settings.skipped_layers, 0);
        assert!(settings.skip_second_resnet && settings.skip_conv2);
        assert_eq!(out.vae.unwrap().seamless, Some(settings));
    }

    #[tokio::test]
    async fn seamless_passes_missing_inputs_through() {
        let out = SeamlessModeInvocation::builder().build().invoke(&ctx()).await.unwrap();
        assert_eq!(out, SeamlessModeOutput::default());
    }

    #[tokio::test]
    async fn freeu_sets_config_with_defaults() {
        let ctx = ctx();
        let loaded = load_sd15(&ctx).await;

        let out = FreeUInvocation::builder()
            .unet(loaded.unet)
            .build()
            .invoke(&ctx)
            .await
            .unwrap();

        assert_eq!(
            out.unet.freeu_config,
            Some(FreeUConfig {
                s1: 0.9,
                s2: 0.2,
                b1: 1.2,
                b2: 1.4,
            })
        );
    }

    #[tokio::test]
    async fn freeu_rejects_out_of_range_values() {
        let ctx = ctx();
        let loaded = load_sd15(&ctx).await;

        let err = FreeUInvocation::builder()
            .unet(loaded.unet)
            .s2(3.5)
            .build()
            .invoke(&ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, InvocationError::InvalidInput(ref msg) if msg.starts_with("s2")));
    }

    #[test]
    fn serde_defaults_match_builder_defaults() {
        let json = serde_json::json!({
            "lora": { "model_name": "detail", "base_model": "sd-1" }
        });
        let node: LoraLoaderInvocation = serde_json::from_value(json).unwrap();
        assert_eq!(node, LoraLoaderInvocation::builder().lora(detail_lora()).build());

        let seamless: SeamlessModeInvocation = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(seamless, SeamlessModeInvocation::builder().build());
    }
}
