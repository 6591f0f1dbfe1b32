use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use invoke_common::ImageMetadata;
use tokio::sync::RwLock;

use crate::error::{ServiceError, ServiceResult};

const THUMBNAIL_DIR: &str = "thumbnails";
const METADATA_DIR: &str = "metadata";

/// Thumbnails are stored as `<name>.webp` regardless of the source format,
/// so `x.png` and `x.jpg` never share one.
pub fn thumbnail_name(image_name: &str) -> String {
    format!("{image_name}.webp")
}

fn check_name(name: &str) -> ServiceResult<()> {
    let path = Path::new(name);
    let single_component = matches!(
        path.components().collect::<Vec<_>>().as_slice(),
        [Component::Normal(_)]
    );
    if !single_component || name == THUMBNAIL_DIR || name == METADATA_DIR {
        return Err(ServiceError::InvalidPath(name.to_string()));
    }
    Ok(())
}

/// Raw image file storage addressed by image name.
#[async_trait]
pub trait ImageFileStorage: Send + Sync {
    async fn get(&self, name: &str) -> ServiceResult<Bytes>;

    async fn get_metadata(&self, name: &str) -> ServiceResult<Option<ImageMetadata>>;

    async fn save(&self, name: &str, data: Bytes, metadata: Option<ImageMetadata>) -> ServiceResult<()>;

    async fn delete(&self, name: &str) -> ServiceResult<()>;

    /// Where the image (or its thumbnail) lives.
    fn get_path(&self, name: &str, thumbnail: bool) -> PathBuf;

    /// True if `path` points inside this storage.
    fn validate_path(&self, path: &Path) -> bool;
}

// ---------------------------------------------------------------------------
// MemoryImageFileStorage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryImageFileStorage {
    files: RwLock<HashMap<String, (Bytes, Option<ImageMetadata>)>>,
}

impl MemoryImageFileStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImageFileStorage for MemoryImageFileStorage {
    async fn get(&self, name: &str) -> ServiceResult<Bytes> {
        self.files
            .read()
            .await
            .get(name)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| ServiceError::not_found("image", name))
    }

    async fn get_metadata(&self, name: &str) -> ServiceResult<Option<ImageMetadata>> {
        self.files
            .read()
            .await
            .get(name)
            .map(|(_, meta)| meta.clone())
            .ok_or_else(|| ServiceError::not_found("image", name))
    }

    async fn save(&self, name: &str, data: Bytes, metadata: Option<ImageMetadata>) -> ServiceResult<()> {
        check_name(name)?;
        self.files
            .write()
            .await
            .insert(name.to_string(), (data, metadata));
        Ok(())
    }

    async fn delete(&self, name: &str) -> ServiceResult<()> {
        self.files.write().await.remove(name);
        Ok(())
    }

    fn get_path(&self, name: &str, thumbnail: bool) -> PathBuf {
        if thumbnail {
            PathBuf::from("images").join(THUMBNAIL_DIR).join(thumbnail_name(name))
        } else {
            PathBuf::from("images").join(name)
        }
    }

    fn validate_path(&self, path: &Path) -> bool {
        path.starts_with("images")
    }
}

// ---------------------------------------------------------------------------
// DiskImageFileStorage
// ---------------------------------------------------------------------------

/// Images under `<root>/images`, thumbnails in `images/thumbnails/` and
/// metadata as a `<name>.json` sidecar in `images/metadata/`.
pub struct DiskImageFileStorage {
    images_dir: PathBuf,
}

impl DiskImageFileStorage {
    pub async fn new(root: impl AsRef<Path>) -> ServiceResult<Self> {
        let images_dir = root.as_ref().join("images");
        tokio::fs::create_dir_all(images_dir.join(THUMBNAIL_DIR)).await?;
        tokio::fs::create_dir_all(images_dir.join(METADATA_DIR)).await?;
        Ok(Self { images_dir })
    }

    fn sidecar_path(&self, name: &str) -> PathBuf {
        self.images_dir.join(METADATA_DIR).join(format!("{name}.json"))
    }
}

fn not_found_or(e: std::io::Error, name: &str) -> ServiceError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ServiceError::not_found("image", name)
    } else {
        e.into()
    }
}

async fn remove_if_exists(path: &Path) -> ServiceResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ImageFileStorage for DiskImageFileStorage {
    async fn get(&self, name: &str) -> ServiceResult<Bytes> {
        check_name(name)?;
        let data = tokio::fs::read(self.get_path(name, false))
            .await
            .map_err(|e| not_found_or(e, name))?;
        Ok(Bytes::from(data))
    }

    async fn get_metadata(&self, name: &str) -> ServiceResult<Option<ImageMetadata>> {
        check_name(name)?;
        if !tokio::fs::try_exists(self.get_path(name, false)).await? {
            return Err(ServiceError::not_found("image", name));
        }
        match tokio::fs::read(self.sidecar_path(name)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, name: &str, data: Bytes, metadata: Option<ImageMetadata>) -> ServiceResult<()> {
        check_name(name)?;
        tokio::fs::write(self.get_path(name, false), &data).await?;
        match metadata {
            Some(meta) => tokio::fs::write(self.sidecar_path(name), serde_json::to_vec(&meta)?).await?,
            None => remove_if_exists(&self.sidecar_path(name)).await?,
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> ServiceResult<()> {
        check_name(name)?;
        remove_if_exists(&self.get_path(name, false)).await?;
        remove_if_exists(&self.get_path(name, true)).await?;
        remove_if_exists(&self.sidecar_path(name)).await
    }

    fn get_path(&self, name: &str, thumbnail: bool) -> PathBuf {
        if thumbnail {
            self.images_dir.join(THUMBNAIL_DIR).join(thumbnail_name(name))
        } else {
            self.images_dir.join(name)
        }
    }

    fn validate_path(&self, path: &Path) -> bool {
        path.starts_with(&self.images_dir)
            && !path.components().any(|c| matches!(c, Component::ParentDir))
    }
}
