// Test fixtures for code that consumes `InvocationServices`.
//
// - TestServices: every collaborator as its in-memory implementation, kept as
//   concrete Arcs so tests can poke at them (subscribe to events, seed models)
// - RecordingProcessor: InvocationProcessor stub that only counts start/stop

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use invoke_common::{GraphExecutionState, LibraryGraph};

use crate::error::{ServiceError, ServiceResult};
use crate::registry::{InvocationServices, InvocationServicesBuilder};
use crate::services::*;

pub struct TestServices {
    pub events: Arc<BroadcastEventService>,
    pub latents: Arc<MemoryLatentsStorage>,
    pub images: Arc<MemoryImageFileStorage>,
    pub metadata: Arc<CoreMetadataService>,
    pub queue: Arc<MemoryInvocationQueue>,
    pub model_manager: Arc<InMemoryModelManager>,
    pub restoration: Arc<NoopRestoration>,
    pub urls: Arc<LocalUrlService>,
    pub images_new: Arc<DefaultImageService>,
    pub graph_library: Arc<MemoryItemStorage<LibraryGraph>>,
    pub graph_execution_manager: Arc<MemoryItemStorage<GraphExecutionState>>,
}

impl TestServices {
    pub fn new() -> Self {
        let images = Arc::new(MemoryImageFileStorage::new());
        let urls = Arc::new(LocalUrlService::default());
        let images_new = Arc::new(DefaultImageService::new(
            Arc::new(MemoryImageRecordStorage::new()),
            images.clone(),
            urls.clone(),
        ));

        Self {
            events: Arc::new(BroadcastEventService::default()),
            latents: Arc::new(MemoryLatentsStorage::new()),
            images,
            metadata: Arc::new(CoreMetadataService),
            queue: Arc::new(MemoryInvocationQueue::new()),
            model_manager: Arc::new(InMemoryModelManager::new()),
            restoration: Arc::new(NoopRestoration),
            urls,
            images_new,
            graph_library: Arc::new(MemoryItemStorage::new()),
            graph_execution_manager: Arc::new(MemoryItemStorage::new()),
        }
    }

    pub fn with_models(self, models: impl IntoIterator<Item = ModelConfig>) -> Self {
        for model in models {
            self.model_manager.register(model);
        }
        self
    }

    /// Builder with everything except the processor filled in.
    pub fn builder(&self) -> InvocationServicesBuilder {
        InvocationServices::builder()
            .events(self.events.clone())
            .latents(self.latents.clone())
            .images(self.images.clone())
            .metadata(self.metadata.clone())
            .queue(self.queue.clone())
            .model_manager(self.model_manager.clone())
            .restoration(self.restoration.clone())
            .urls(self.urls.clone())
            .images_new(self.images_new.clone())
            .graph_library(self.graph_library.clone())
            .graph_execution_manager(self.graph_execution_manager.clone())
    }

    pub fn build_with(&self, processor: Arc<dyn InvocationProcessor>) -> InvocationServices {
        InvocationServices::new(
            self.model_manager.clone(),
            self.events.clone(),
            tracing::info_span!("test_services"),
            self.latents.clone(),
            self.images.clone(),
            self.metadata.clone(),
            self.queue.clone(),
            self.images_new.clone(),
            self.urls.clone(),
            self.graph_library.clone(),
            self.graph_execution_manager.clone(),
            processor,
            self.restoration.clone(),
        )
    }
}

impl Default for TestServices {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// RecordingProcessor
// ---------------------------------------------------------------------------

/// Keeps only a weak handle to the registry it was started with.
#[derive(Default)]
pub struct RecordingProcessor {
    starts: AtomicUsize,
    stops: AtomicUsize,
    running: AtomicBool,
    attached: Mutex<Option<Weak<InvocationServices>>>,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// The registry passed to the last `start`, if it is still alive.
    pub fn attached(&self) -> Option<Arc<InvocationServices>> {
        self.attached
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }
}

#[async_trait]
impl InvocationProcessor for RecordingProcessor {
    fn start(&self, services: Arc<InvocationServices>) -> ServiceResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::AlreadyRunning);
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self
            .attached
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Arc::downgrade(&services));
        Ok(())
    }

    async fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
