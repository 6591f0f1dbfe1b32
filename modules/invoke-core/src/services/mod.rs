//! Collaborator service interfaces and their in-process implementations.

pub mod events;
pub mod image_files;
pub mod image_records;
pub mod images;
pub mod item_storage;
pub mod latents;
pub mod metadata;
pub mod models;
pub mod processor;
pub mod queue;
pub mod restoration;
pub mod urls;

pub use events::{BroadcastEventService, EventService};
pub use image_files::{DiskImageFileStorage, ImageFileStorage, MemoryImageFileStorage};
pub use image_records::{ImageQuery, ImageRecordStorage, MemoryImageRecordStorage, OffsetPage};
pub use images::{DefaultImageService, ImageService};
pub use item_storage::{ItemStorage, MemoryItemStorage, StorableItem};
pub use latents::{DiskLatentsStorage, ForwardCacheLatentsStorage, LatentsStorage, MemoryLatentsStorage};
pub use metadata::{CoreMetadataService, MetadataService};
pub use models::{InMemoryModelManager, ModelConfig, ModelManager};
pub use processor::InvocationProcessor;
pub use queue::{InvocationQueue, InvocationQueueItem, MemoryInvocationQueue};
pub use restoration::{NoopRestoration, RestorationRequest, RestorationService};
pub use urls::{LocalUrlService, UrlService};

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// A panic while holding one of these locks leaves plain data behind, never a
// half-applied invariant, so poisoned guards are recovered.

pub(crate) fn lock_unpoisoned<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read_unpoisoned<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_unpoisoned<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}
