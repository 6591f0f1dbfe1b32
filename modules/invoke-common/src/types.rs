use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Model taxonomy
// ---------------------------------------------------------------------------

/// Model family a checkpoint was trained against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum BaseModelType {
    #[serde(rename = "sd-1")]
    StableDiffusion1,
    #[serde(rename = "sd-2")]
    StableDiffusion2,
    #[serde(rename = "sdxl")]
    StableDiffusionXL,
    #[serde(rename = "sdxl-refiner")]
    StableDiffusionXLRefiner,
}

impl BaseModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaseModelType::StableDiffusion1 => "sd-1",
            BaseModelType::StableDiffusion2 => "sd-2",
            BaseModelType::StableDiffusionXL => "sdxl",
            BaseModelType::StableDiffusionXLRefiner => "sdxl-refiner",
        }
    }
}

impl fmt::Display for BaseModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Main,
    Vae,
    Lora,
    #[serde(rename = "controlnet")]
    ControlNet,
    Embedding,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Main => "main",
            ModelType::Vae => "vae",
            ModelType::Lora => "lora",
            ModelType::ControlNet => "controlnet",
            ModelType::Embedding => "embedding",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Component of a main model that a downstream node loads on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubModelType {
    Unet,
    TextEncoder,
    TextEncoder2,
    Tokenizer,
    Tokenizer2,
    Vae,
    VaeDecoder,
    VaeEncoder,
    Scheduler,
    SafetyChecker,
}

// ---------------------------------------------------------------------------
// Model references passed between nodes
// ---------------------------------------------------------------------------

/// Everything needed to load one (sub)model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelInfo {
    pub model_name: String,
    pub base_model: BaseModelType,
    pub model_type: ModelType,
    #[serde(default)]
    pub submodel: Option<SubModelType>,
}

impl ModelInfo {
    pub fn new(model_name: impl Into<String>, base_model: BaseModelType, model_type: ModelType) -> Self {
        Self {
            model_name: model_name.into(),
            base_model,
            model_type,
            submodel: None,
        }
    }

    pub fn with_submodel(mut self, submodel: SubModelType) -> Self {
        self.submodel = Some(submodel);
        self
    }
}

/// A LoRA to patch into a model at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LoraInfo {
    #[serde(flatten)]
    pub model: ModelInfo,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeamlessSettings {
    /// Axes ("x" and "y") to tile seamlessly.
    pub axes: Vec<String>,
    pub skipped_layers: u32,
    pub skip_second_resnet: bool,
    pub skip_conv2: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FreeUConfig {
    pub s1: f64,
    pub s2: f64,
    pub b1: f64,
    pub b2: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UNetField {
    pub unet: ModelInfo,
    pub scheduler: ModelInfo,
    pub loras: Vec<LoraInfo>,
    #[serde(default)]
    pub freeu_config: Option<FreeUConfig>,
    #[serde(default)]
    pub seamless: Option<SeamlessSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipField {
    pub tokenizer: ModelInfo,
    pub text_encoder: ModelInfo,
    /// Number of final text encoder layers to skip.
    pub skipped_layers: u32,
    pub loras: Vec<LoraInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VaeField {
    pub vae: ModelInfo,
    #[serde(default)]
    pub seamless: Option<SeamlessSettings>,
}

/// Helper shared by the UNet and CLIP fields.
pub trait HasLoras {
    fn loras(&self) -> &[LoraInfo];
    fn loras_mut(&mut self) -> &mut Vec<LoraInfo>;

    fn has_lora(&self, model_name: &str) -> bool {
        self.loras().iter().any(|l| l.model.model_name == model_name)
    }
}

impl HasLoras for UNetField {
    fn loras(&self) -> &[LoraInfo] {
        &self.loras
    }

    fn loras_mut(&mut self) -> &mut Vec<LoraInfo> {
        &mut self.loras
    }
}

impl HasLoras for ClipField {
    fn loras(&self) -> &[LoraInfo] {
        &self.loras
    }

    fn loras_mut(&mut self) -> &mut Vec<LoraInfo> {
        &mut self.loras
    }
}

// ---------------------------------------------------------------------------
// Model selections made by the user
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MainModelField {
    pub model_name: String,
    pub base_model: BaseModelType,
    pub model_type: ModelType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LoRAModelField {
    pub model_name: String,
    pub base_model: BaseModelType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VAEModelField {
    pub model_name: String,
    pub base_model: BaseModelType,
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// One page of a listing. Pages are zero-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResults<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub pages: usize,
    pub per_page: usize,
    pub total: usize,
}

impl<T> PaginatedResults<T> {
    /// Slice `all` into the requested page.
    pub fn paginate(all: Vec<T>, page: usize, per_page: usize) -> Self {
        let total = all.len();
        let per_page = per_page.max(1);
        let pages = total.div_ceil(per_page);
        let items = all
            .into_iter()
            .skip(page.saturating_mul(per_page))
            .take(per_page)
            .collect();
        Self {
            items,
            page,
            pages,
            per_page,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_model_serializes_to_short_names() {
        let json = serde_json::to_string(&BaseModelType::StableDiffusionXL).unwrap();
        assert_eq!(json, "\"sdxl\"");
        let parsed: BaseModelType = serde_json::from_str("\"sd-1\"").unwrap();
        assert_eq!(parsed, BaseModelType::StableDiffusion1);
    }

    #[test]
    fn lora_info_flattens_model_fields() {
        let lora = LoraInfo {
            model: ModelInfo::new("detail", BaseModelType::StableDiffusion1, ModelType::Lora),
            weight: 0.5,
        };
        let value = serde_json::to_value(&lora).unwrap();
        assert_eq!(value["model_name"], "detail");
        assert_eq!(value["model_type"], "lora");
        assert_eq!(value["weight"], 0.5);
    }

    #[test]
    fn paginate_splits_pages() {
        let page = PaginatedResults::paginate((0..7).collect::<Vec<_>>(), 1, 3);
        assert_eq!(page.items, vec![3, 4, 5]);
        assert_eq!(page.pages, 3);
        assert_eq!(page.total, 7);
    }

    #[test]
    fn paginate_past_the_end_is_empty() {
        let page = PaginatedResults::paginate(vec![1, 2], 5, 10);
        assert!(page.items.is_empty());
        assert_eq!(page.pages, 1);
    }
}
