use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ServiceResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestorationRequest {
    /// Face restorer to apply, if any (e.g. "codeformer").
    pub face_restorer: Option<String>,
    pub face_strength: f32,
    /// Upscaler to apply, if any (e.g. "esrgan").
    pub upscaler: Option<String>,
    pub upscale_factor: u32,
}

impl Default for RestorationRequest {
    fn default() -> Self {
        Self {
            face_restorer: None,
            face_strength: 0.75,
            upscaler: None,
            upscale_factor: 2,
        }
    }
}

/// Face restoration and upscaling routines.
#[async_trait]
pub trait RestorationService: Send + Sync {
    fn face_restorers(&self) -> Vec<String>;

    fn upscalers(&self) -> Vec<String>;

    async fn restore(&self, image: Bytes, request: &RestorationRequest) -> ServiceResult<Bytes>;
}

/// Restoration backend with no models installed. Returns images unchanged.
pub struct NoopRestoration;

#[async_trait]
impl RestorationService for NoopRestoration {
    fn face_restorers(&self) -> Vec<String> {
        Vec::new()
    }

    fn upscalers(&self) -> Vec<String> {
        Vec::new()
    }

    async fn restore(&self, image: Bytes, _request: &RestorationRequest) -> ServiceResult<Bytes> {
        Ok(image)
    }
}
