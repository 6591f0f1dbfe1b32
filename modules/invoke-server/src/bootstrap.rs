//! Builds every collaborator from configuration and assembles the registry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use invoke_core::file_config::StorageConfig;
use invoke_core::{
    BroadcastEventService, CoreMetadataService, DefaultImageService, DiskImageFileStorage, DiskLatentsStorage,
    FileConfig, ForwardCacheLatentsStorage, ImageFileStorage, InMemoryModelManager, InvocationServices,
    LatentsStorage, LocalUrlService, MemoryImageFileStorage, MemoryImageRecordStorage, MemoryInvocationQueue,
    MemoryItemStorage, MemoryLatentsStorage, NoopRestoration, StorageBackend,
};
use invoke_nodes::DefaultInvocationProcessor;
use tracing::info;

/// The assembled registry plus the concrete handles callers need to keep.
pub struct AppServices {
    pub services: Arc<InvocationServices>,
    pub events: Arc<BroadcastEventService>,
    pub queue: Arc<MemoryInvocationQueue>,
    /// Sessions run every node rather than stopping after the first.
    pub invoke_all: bool,
}

/// Wire up all services. `outputs_dir` overrides `storage.outputs_dir`.
pub async fn build_services(config: &FileConfig, outputs_dir: Option<&Path>) -> Result<AppServices> {
    let outputs_dir = outputs_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.storage.outputs_dir.clone());

    let latents = build_latents(&config.storage, &outputs_dir).await?;
    let images = build_image_files(config.storage.backend, &outputs_dir).await?;

    let urls = Arc::new(LocalUrlService::new(config.urls.base_url.clone()));
    let images_new = Arc::new(DefaultImageService::new(
        Arc::new(MemoryImageRecordStorage::new()),
        images.clone(),
        urls.clone(),
    ));

    let events = Arc::new(BroadcastEventService::new(config.events.capacity));
    let queue = Arc::new(MemoryInvocationQueue::new());
    let models = Arc::new(InMemoryModelManager::with_models(config.models.iter().cloned()));
    info!(models = config.models.len(), "Model manager ready");

    let services = InvocationServices::builder()
        .events(events.clone())
        .logger(tracing::info_span!("invoke"))
        .latents(latents)
        .images(images)
        .metadata(Arc::new(CoreMetadataService))
        .queue(queue.clone())
        .model_manager(models)
        .restoration(Arc::new(NoopRestoration))
        .urls(urls)
        .images_new(images_new)
        .graph_library(Arc::new(MemoryItemStorage::new()))
        .graph_execution_manager(Arc::new(MemoryItemStorage::new()))
        .processor(Arc::new(DefaultInvocationProcessor::new()))
        .build()
        .context("Failed to assemble invocation services")?;

    Ok(AppServices {
        services: Arc::new(services),
        events,
        queue,
        invoke_all: config.queue.invoke_all,
    })
}

async fn build_latents(storage: &StorageConfig, outputs_dir: &Path) -> Result<Arc<dyn LatentsStorage>> {
    let base: Arc<dyn LatentsStorage> = match storage.backend {
        StorageBackend::Memory => Arc::new(MemoryLatentsStorage::new()),
        StorageBackend::Disk => {
            let root: PathBuf = outputs_dir.join("latents");
            let disk = DiskLatentsStorage::new(root.clone())
                .await
                .with_context(|| format!("Failed to open latents directory: {}", root.display()))?;
            info!(root = %root.display(), "Latents stored on disk");
            Arc::new(disk)
        }
    };

    if storage.latents_cache_size == 0 {
        return Ok(base);
    }
    Ok(Arc::new(ForwardCacheLatentsStorage::new(base, storage.latents_cache_size)))
}

async fn build_image_files(backend: StorageBackend, outputs_dir: &Path) -> Result<Arc<dyn ImageFileStorage>> {
    match backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryImageFileStorage::new())),
        StorageBackend::Disk => {
            let disk = DiskImageFileStorage::new(outputs_dir)
                .await
                .with_context(|| format!("Failed to open image directory: {}", outputs_dir.display()))?;
            info!(root = %outputs_dir.display(), "Images stored on disk");
            Ok(Arc::new(disk))
        }
    }
}
