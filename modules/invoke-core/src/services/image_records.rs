use std::collections::HashMap;

use async_trait::async_trait;
use invoke_common::{ImageCategory, ImageOrigin, ImageRecord};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{ServiceError, ServiceResult};

/// Offset-based page of results, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct OffsetPage<T> {
    pub items: Vec<T>,
    pub offset: usize,
    pub limit: usize,
    pub total: usize,
}

/// Filters for listing image records.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageQuery {
    pub offset: usize,
    pub limit: usize,
    pub origin: Option<ImageOrigin>,
    pub category: Option<ImageCategory>,
    pub include_intermediates: bool,
}

impl ImageQuery {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit,
            ..Default::default()
        }
    }

    pub fn with_origin(mut self, origin: ImageOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_category(mut self, category: ImageCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_intermediates(mut self) -> Self {
        self.include_intermediates = true;
        self
    }

    fn matches(&self, record: &ImageRecord) -> bool {
        self.origin.map_or(true, |o| o == record.image_origin)
            && self.category.map_or(true, |c| c == record.image_category)
            && (self.include_intermediates || !record.is_intermediate)
    }
}

/// Persistence for image records (the rows behind image files).
#[async_trait]
pub trait ImageRecordStorage: Send + Sync {
    async fn save(&self, record: ImageRecord) -> ServiceResult<()>;

    async fn get(&self, image_name: &str) -> ServiceResult<ImageRecord>;

    async fn get_many(&self, query: ImageQuery) -> ServiceResult<OffsetPage<ImageRecord>>;

    async fn delete(&self, image_name: &str) -> ServiceResult<()>;
}

#[derive(Default)]
pub struct MemoryImageRecordStorage {
    records: RwLock<HashMap<String, ImageRecord>>,
}

impl MemoryImageRecordStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImageRecordStorage for MemoryImageRecordStorage {
    async fn save(&self, record: ImageRecord) -> ServiceResult<()> {
        self.records
            .write()
            .await
            .insert(record.image_name.clone(), record);
        Ok(())
    }

    async fn get(&self, image_name: &str) -> ServiceResult<ImageRecord> {
        self.records
            .read()
            .await
            .get(image_name)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("image record", image_name))
    }

    async fn get_many(&self, query: ImageQuery) -> ServiceResult<OffsetPage<ImageRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<&ImageRecord> = records.values().filter(|r| query.matches(r)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();

        Ok(OffsetPage {
            items,
            offset: query.offset,
            limit: query.limit,
            total,
        })
    }

    async fn delete(&self, image_name: &str) -> ServiceResult<()> {
        self.records.write().await.remove(image_name);
        Ok(())
    }
}
