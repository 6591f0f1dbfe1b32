use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use invoke_common::LatentsTensor;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::{ServiceError, ServiceResult};

/// Named storage for intermediate latent tensors.
#[async_trait]
pub trait LatentsStorage: Send + Sync {
    async fn get(&self, name: &str) -> ServiceResult<LatentsTensor>;

    async fn save(&self, name: &str, latents: LatentsTensor) -> ServiceResult<()>;

    async fn delete(&self, name: &str) -> ServiceResult<()>;
}

// ---------------------------------------------------------------------------
// MemoryLatentsStorage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryLatentsStorage {
    tensors: RwLock<HashMap<String, LatentsTensor>>,
}

impl MemoryLatentsStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LatentsStorage for MemoryLatentsStorage {
    async fn get(&self, name: &str) -> ServiceResult<LatentsTensor> {
        self.tensors
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("latents", name))
    }

    async fn save(&self, name: &str, latents: LatentsTensor) -> ServiceResult<()> {
        latents.validate()?;
        self.tensors.write().await.insert(name.to_string(), latents);
        Ok(())
    }

    async fn delete(&self, name: &str) -> ServiceResult<()> {
        self.tensors.write().await.remove(name);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DiskLatentsStorage
// ---------------------------------------------------------------------------

/// One JSON file per tensor under `root`.
pub struct DiskLatentsStorage {
    root: PathBuf,
}

impl DiskLatentsStorage {
    pub async fn new(root: impl Into<PathBuf>) -> ServiceResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> ServiceResult<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(ServiceError::InvalidPath(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl LatentsStorage for DiskLatentsStorage {
    async fn get(&self, name: &str) -> ServiceResult<LatentsTensor> {
        let path = self.path_for(name)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ServiceError::not_found("latents", name))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, name: &str, latents: LatentsTensor) -> ServiceResult<()> {
        latents.validate()?;
        let path = self.path_for(name)?;
        let bytes = serde_json::to_vec(&latents)?;
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> ServiceResult<()> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// ForwardCacheLatentsStorage
// ---------------------------------------------------------------------------

/// Bounded FIFO cache in front of another latents store.
pub struct ForwardCacheLatentsStorage {
    underlying: Arc<dyn LatentsStorage>,
    max_cache_size: usize,
    cache: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, LatentsTensor>,
    order: VecDeque<String>,
}

impl CacheState {
    fn insert(&mut self, name: &str, latents: LatentsTensor, max: usize) {
        if self.entries.insert(name.to_string(), latents).is_none() {
            self.order.push_back(name.to_string());
        }
        while self.order.len() > max {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, name: &str) {
        if self.entries.remove(name).is_some() {
            self.order.retain(|n| n != name);
        }
    }
}

impl ForwardCacheLatentsStorage {
    pub fn new(underlying: Arc<dyn LatentsStorage>, max_cache_size: usize) -> Self {
        Self {
            underlying,
            max_cache_size,
            cache: Mutex::new(CacheState::default()),
        }
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.lock().await.entries.len()
    }
}

#[async_trait]
impl LatentsStorage for ForwardCacheLatentsStorage {
    async fn get(&self, name: &str) -> ServiceResult<LatentsTensor> {
        if let Some(hit) = self.cache.lock().await.entries.get(name).cloned() {
            return Ok(hit);
        }
        debug!(name, "latents cache miss");
        let latents = self.underlying.get(name).await?;
        self.cache
            .lock()
            .await
            .insert(name, latents.clone(), self.max_cache_size);
        Ok(latents)
    }

    async fn save(&self, name: &str, latents: LatentsTensor) -> ServiceResult<()> {
        self.underlying.save(name, latents.clone()).await?;
        self.cache
            .lock()
            .await
            .insert(name, latents, self.max_cache_size);
        Ok(())
    }

    async fn delete(&self, name: &str) -> ServiceResult<()> {
        self.underlying.delete(name).await?;
        self.cache.lock().await.remove(name);
        Ok(())
    }
}
