use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

use invoke_common::{BaseModelType, ModelType};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{read_unpoisoned, write_unpoisoned};

/// An installed model as known to the model manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    #[serde(rename = "name")]
    pub model_name: String,
    #[serde(rename = "base")]
    pub base_model: BaseModelType,
    #[serde(rename = "type")]
    pub model_type: ModelType,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ModelConfig {
    pub fn new(model_name: impl Into<String>, base_model: BaseModelType, model_type: ModelType) -> Self {
        Self {
            model_name: model_name.into(),
            base_model,
            model_type,
            path: None,
            description: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    fn key(&self) -> ModelKey {
        ModelKey::new(&self.model_name, self.base_model, self.model_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ModelKey {
    base_model: &'static str,
    model_type: &'static str,
    model_name: String,
}

impl ModelKey {
    fn new(model_name: &str, base_model: BaseModelType, model_type: ModelType) -> Self {
        Self {
            base_model: base_model.as_str(),
            model_type: model_type.as_str(),
            model_name: model_name.to_string(),
        }
    }
}

/// Catalog of installed models. Loading and caching weights is out of scope here.
pub trait ModelManager: Send + Sync {
    fn model_exists(&self, model_name: &str, base_model: BaseModelType, model_type: ModelType) -> bool;

    fn model_info(&self, model_name: &str, base_model: BaseModelType, model_type: ModelType) -> Option<ModelConfig>;

    /// Models matching the optional filters, sorted by base, type and name.
    fn list_models(&self, base_model: Option<BaseModelType>, model_type: Option<ModelType>) -> Vec<ModelConfig>;
}

#[derive(Default)]
pub struct InMemoryModelManager {
    models: RwLock<BTreeMap<ModelKey, ModelConfig>>,
}

impl InMemoryModelManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(models: impl IntoIterator<Item = ModelConfig>) -> Self {
        let manager = Self::new();
        for model in models {
            manager.register(model);
        }
        manager
    }

    /// Add or replace a model.
    pub fn register(&self, model: ModelConfig) {
        info!(
            model = %model.model_name,
            base = %model.base_model,
            model_type = %model.model_type,
            "Registered model"
        );
        write_unpoisoned(&self.models).insert(model.key(), model);
    }

    pub fn remove(&self, model_name: &str, base_model: BaseModelType, model_type: ModelType) -> Option<ModelConfig> {
        write_unpoisoned(&self.models).remove(&ModelKey::new(model_name, base_model, model_type))
    }
}

impl ModelManager for InMemoryModelManager {
    fn model_exists(&self, model_name: &str, base_model: BaseModelType, model_type: ModelType) -> bool {
        read_unpoisoned(&self.models).contains_key(&ModelKey::new(model_name, base_model, model_type))
    }

    fn model_info(&self, model_name: &str, base_model: BaseModelType, model_type: ModelType) -> Option<ModelConfig> {
        read_unpoisoned(&self.models)
            .get(&ModelKey::new(model_name, base_model, model_type))
            .cloned()
    }

    fn list_models(&self, base_model: Option<BaseModelType>, model_type: Option<ModelType>) -> Vec<ModelConfig> {
        read_unpoisoned(&self.models)
            .values()
            .filter(|m| base_model.map_or(true, |b| b == m.base_model))
            .filter(|m| model_type.map_or(true, |t| t == m.model_type))
            .cloned()
            .collect()
    }
}
