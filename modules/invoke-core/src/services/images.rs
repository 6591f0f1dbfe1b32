use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use invoke_common::{CreateImage, ImageDto, ImageMetadata, ImageRecord};
use tracing::{info, warn};
use uuid::Uuid;

use super::image_files::ImageFileStorage;
use super::image_records::{ImageQuery, ImageRecordStorage, OffsetPage};
use super::urls::UrlService;
use crate::error::ServiceResult;

/// High-level image management: records, files and URLs together.
#[async_trait]
pub trait ImageService: Send + Sync {
    async fn create(&self, image: CreateImage, metadata: Option<ImageMetadata>) -> ServiceResult<ImageDto>;

    async fn get_record(&self, image_name: &str) -> ServiceResult<ImageRecord>;

    async fn get_dto(&self, image_name: &str) -> ServiceResult<ImageDto>;

    async fn get_file(&self, image_name: &str) -> ServiceResult<Bytes>;

    fn get_url(&self, image_name: &str, thumbnail: bool) -> String;

    async fn get_many(&self, query: ImageQuery) -> ServiceResult<OffsetPage<ImageDto>>;

    async fn delete(&self, image_name: &str) -> ServiceResult<()>;
}

pub struct DefaultImageService {
    records: Arc<dyn ImageRecordStorage>,
    files: Arc<dyn ImageFileStorage>,
    urls: Arc<dyn UrlService>,
}

impl DefaultImageService {
    pub fn new(
        records: Arc<dyn ImageRecordStorage>,
        files: Arc<dyn ImageFileStorage>,
        urls: Arc<dyn UrlService>,
    ) -> Self {
        Self { records, files, urls }
    }

    fn to_dto(&self, record: ImageRecord) -> ImageDto {
        ImageDto {
            image_url: self.urls.get_image_url(&record.image_name, false),
            thumbnail_url: self.urls.get_image_url(&record.image_name, true),
            record,
        }
    }
}

#[async_trait]
impl ImageService for DefaultImageService {
    async fn create(&self, image: CreateImage, metadata: Option<ImageMetadata>) -> ServiceResult<ImageDto> {
        let image_name = format!("{}.png", Uuid::new_v4());
        let record = ImageRecord {
            image_name: image_name.clone(),
            image_origin: image.image_origin,
            image_category: image.image_category,
            width: image.width,
            height: image.height,
            session_id: image.session_id,
            node_id: image.node_id,
            is_intermediate: image.is_intermediate,
            metadata: metadata.clone(),
            created_at: Utc::now(),
        };

        self.records.save(record.clone()).await?;
        if let Err(e) = self
            .files
            .save(&image_name, Bytes::from(image.data), metadata)
            .await
        {
            // Don't leave a record pointing at a file that was never written.
            if let Err(cleanup) = self.records.delete(&image_name).await {
                warn!(image_name = %image_name, error = %cleanup, "Failed to roll back image record");
            }
            return Err(e);
        }

        info!(image_name = %image_name, "Image created");
        Ok(self.to_dto(record))
    }

    async fn get_record(&self, image_name: &str) -> ServiceResult<ImageRecord> {
        self.records.get(image_name).await
    }

    async fn get_dto(&self, image_name: &str) -> ServiceResult<ImageDto> {
        let record = self.records.get(image_name).await?;
        Ok(self.to_dto(record))
    }

    async fn get_file(&self, image_name: &str) -> ServiceResult<Bytes> {
        self.files.get(image_name).await
    }

    fn get_url(&self, image_name: &str, thumbnail: bool) -> String {
        self.urls.get_image_url(image_name, thumbnail)
    }

    async fn get_many(&self, query: ImageQuery) -> ServiceResult<OffsetPage<ImageDto>> {
        let page = self.records.get_many(query).await?;
        Ok(OffsetPage {
            items: page.items.into_iter().map(|r| self.to_dto(r)).collect(),
            offset: page.offset,
            limit: page.limit,
            total: page.total,
        })
    }

    async fn delete(&self, image_name: &str) -> ServiceResult<()> {
        self.files.delete(image_name).await?;
        self.records.delete(image_name).await
    }
}
