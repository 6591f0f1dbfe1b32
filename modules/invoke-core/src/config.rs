use std::path::PathBuf;

use anyhow::{Context, Result};

/// Process-level settings read from the environment.
/// Everything describing the service graph lives in the TOML `FileConfig`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config_path: PathBuf,
    /// Overrides `storage.outputs_dir` from the file.
    pub outputs_dir: Option<PathBuf>,
    pub log_json: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            config_path: std::env::var("INVOKE_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("invoke.toml")),
            outputs_dir: std::env::var("INVOKE_OUTPUTS_DIR").ok().map(PathBuf::from),
            log_json: match std::env::var("INVOKE_LOG_JSON") {
                Ok(v) => v
                    .parse()
                    .with_context(|| format!("INVOKE_LOG_JSON must be true or false, got {v:?}"))?,
                Err(_) => false,
            },
        };

        Ok(config)
    }

    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  INVOKE_CONFIG: {}", self.config_path.display());
        tracing::info!(
            "  INVOKE_OUTPUTS_DIR: {}",
            self.outputs_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<not set>".to_string())
        );
        tracing::info!("  INVOKE_LOG_JSON: {}", self.log_json);
    }
}
