use std::sync::Arc;

use invoke_common::{GraphExecutionState, LibraryGraph};
use tracing::Span;

use crate::error::RegistryError;
use crate::services::{
    EventService, ImageFileStorage, ImageService, InvocationProcessor, InvocationQueue, ItemStorage,
    LatentsStorage, MetadataService, ModelManager, RestorationService, UrlService,
};

/// Services that can be used by invocations.
///
/// Built once at startup from fully constructed collaborators and never
/// modified afterwards. Hand it around as `Arc<InvocationServices>`.
#[derive(Clone)]
pub struct InvocationServices {
    events: Arc<dyn EventService>,
    logger: Span,
    latents: Arc<dyn LatentsStorage>,
    images: Arc<dyn ImageFileStorage>,
    metadata: Arc<dyn MetadataService>,
    queue: Arc<dyn InvocationQueue>,
    model_manager: Arc<dyn ModelManager>,
    restoration: Arc<dyn RestorationService>,
    urls: Arc<dyn UrlService>,
    images_new: Arc<dyn ImageService>,
    graph_library: Arc<dyn ItemStorage<LibraryGraph>>,
    graph_execution_manager: Arc<dyn ItemStorage<GraphExecutionState>>,
    processor: Arc<dyn InvocationProcessor>,
}

impl InvocationServices {
    /// Names of the required services, as reported by `RegistryError`.
    pub const SERVICE_NAMES: [&'static str; 12] = [
        "events",
        "latents",
        "images",
        "metadata",
        "queue",
        "model_manager",
        "restoration",
        "urls",
        "images_new",
        "graph_library",
        "graph_execution_manager",
        "processor",
    ];

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model_manager: Arc<dyn ModelManager>,
        events: Arc<dyn EventService>,
        logger: Span,
        latents: Arc<dyn LatentsStorage>,
        images: Arc<dyn ImageFileStorage>,
        metadata: Arc<dyn MetadataService>,
        queue: Arc<dyn InvocationQueue>,
        images_new: Arc<dyn ImageService>,
        urls: Arc<dyn UrlService>,
        graph_library: Arc<dyn ItemStorage<LibraryGraph>>,
        graph_execution_manager: Arc<dyn ItemStorage<GraphExecutionState>>,
        processor: Arc<dyn InvocationProcessor>,
        restoration: Arc<dyn RestorationService>,
    ) -> Self {
        Self {
            events,
            logger,
            latents,
            images,
            metadata,
            queue,
            model_manager,
            restoration,
            urls,
            images_new,
            graph_library,
            graph_execution_manager,
            processor,
        }
    }

    /// Named-field construction that reports which service is missing.
    pub fn builder() -> InvocationServicesBuilder {
        InvocationServicesBuilder::default()
    }

    pub fn events(&self) -> &Arc<dyn EventService> {
        &self.events
    }

    /// Span that service consumers log under.
    pub fn logger(&self) -> &Span {
        &self.logger
    }

    pub fn latents(&self) -> &Arc<dyn LatentsStorage> {
        &self.latents
    }

    /// Raw image file storage.
    pub fn images(&self) -> &Arc<dyn ImageFileStorage> {
        &self.images
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataService> {
        &self.metadata
    }

    pub fn queue(&self) -> &Arc<dyn InvocationQueue> {
        &self.queue
    }

    pub fn model_manager(&self) -> &Arc<dyn ModelManager> {
        &self.model_manager
    }

    pub fn restoration(&self) -> &Arc<dyn RestorationService> {
        &self.restoration
    }

    pub fn urls(&self) -> &Arc<dyn UrlService> {
        &self.urls
    }

    /// Record-level image service (records + files + URLs).
    pub fn images_new(&self) -> &Arc<dyn ImageService> {
        &self.images_new
    }

    pub fn graph_library(&self) -> &Arc<dyn ItemStorage<LibraryGraph>> {
        &self.graph_library
    }

    pub fn graph_execution_manager(&self) -> &Arc<dyn ItemStorage<GraphExecutionState>> {
        &self.graph_execution_manager
    }

    pub fn processor(&self) -> &Arc<dyn InvocationProcessor> {
        &self.processor
    }
}

/// Collects services one by one; `build` fails unless all twelve are set.
///
/// The logger defaults to an `invocation_services` span.
#[derive(Default)]
pub struct InvocationServicesBuilder {
    events: Option<Arc<dyn EventService>>,
    logger: Option<Span>,
    latents: Option<Arc<dyn LatentsStorage>>,
    images: Option<Arc<dyn ImageFileStorage>>,
    metadata: Option<Arc<dyn MetadataService>>,
    queue: Option<Arc<dyn InvocationQueue>>,
    model_manager: Option<Arc<dyn ModelManager>>,
    restoration: Option<Arc<dyn RestorationService>>,
    urls: Option<Arc<dyn UrlService>>,
    images_new: Option<Arc<dyn ImageService>>,
    graph_library: Option<Arc<dyn ItemStorage<LibraryGraph>>>,
    graph_execution_manager: Option<Arc<dyn ItemStorage<GraphExecutionState>>>,
    processor: Option<Arc<dyn InvocationProcessor>>,
}

impl InvocationServicesBuilder {
    pub fn events(mut self, events: Arc<dyn EventService>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn logger(mut self, logger: Span) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn latents(mut self, latents: Arc<dyn LatentsStorage>) -> Self {
        self.latents = Some(latents);
        self
    }

    pub fn images(mut self, images: Arc<dyn ImageFileStorage>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn metadata(mut self, metadata: Arc<dyn MetadataService>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn InvocationQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn model_manager(mut self, model_manager: Arc<dyn ModelManager>) -> Self {
        self.model_manager = Some(model_manager);
        self
    }

    pub fn restoration(mut self, restoration: Arc<dyn RestorationService>) -> Self {
        self.restoration = Some(restoration);
        self
    }

    pub fn urls(mut self, urls: Arc<dyn UrlService>) -> Self {
        self.urls = Some(urls);
        self
    }

    pub fn images_new(mut self, images_new: Arc<dyn ImageService>) -> Self {
        self.images_new = Some(images_new);
        self
    }

    pub fn graph_library(mut self, graph_library: Arc<dyn ItemStorage<LibraryGraph>>) -> Self {
        self.graph_library = Some(graph_library);
        self
    }

    pub fn graph_execution_manager(
        mut self,
        graph_execution_manager: Arc<dyn ItemStorage<GraphExecutionState>>,
    ) -> Self {
        self.graph_execution_manager = Some(graph_execution_manager);
        self
    }

    pub fn processor(mut self, processor: Arc<dyn InvocationProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn build(self) -> Result<InvocationServices, RegistryError> {
        fn require<T>(value: Option<T>, name: &'static str) -> Result<T, RegistryError> {
            value.ok_or(RegistryError::MissingService(name))
        }

        Ok(InvocationServices {
            events: require(self.events, "events")?,
            logger: self
                .logger
                .unwrap_or_else(|| tracing::info_span!("invocation_services")),
            latents: require(self.latents, "latents")?,
            images: require(self.images, "images")?,
            metadata: require(self.metadata, "metadata")?,
            queue: require(self.queue, "queue")?,
            model_manager: require(self.model_manager, "model_manager")?,
            restoration: require(self.restoration, "restoration")?,
            urls: require(self.urls, "urls")?,
            images_new: require(self.images_new, "images_new")?,
            graph_library: require(self.graph_library, "graph_library")?,
            graph_execution_manager: require(self.graph_execution_manager, "graph_execution_manager")?,
            processor: require(self.processor, "processor")?,
        })
    }
}
