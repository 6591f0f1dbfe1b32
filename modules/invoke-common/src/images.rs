use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOrigin {
    /// Produced by a node during a session.
    Internal,
    /// Uploaded by a user.
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageCategory {
    General,
    Mask,
    Control,
    User,
    Other,
}

/// Metadata embedded with a generated image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// The invocation that produced the image, as submitted.
    pub metadata: Option<serde_json::Value>,
    /// The graph the invocation was part of.
    pub graph: Option<serde_json::Value>,
}

/// Persisted description of an image file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub image_name: String,
    pub image_origin: ImageOrigin,
    pub image_category: ImageCategory,
    pub width: u32,
    pub height: u32,
    pub session_id: Option<String>,
    pub node_id: Option<String>,
    pub is_intermediate: bool,
    pub metadata: Option<ImageMetadata>,
    pub created_at: DateTime<Utc>,
}

/// Image record enriched with URLs, as handed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDto {
    #[serde(flatten)]
    pub record: ImageRecord,
    pub image_url: String,
    pub thumbnail_url: String,
}

/// Request to create an image through the image service.
#[derive(Debug, Clone)]
pub struct CreateImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub image_origin: ImageOrigin,
    pub image_category: ImageCategory,
    pub session_id: Option<String>,
    pub node_id: Option<String>,
    pub is_intermediate: bool,
}

impl CreateImage {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            image_origin: ImageOrigin::Internal,
            image_category: ImageCategory::General,
            session_id: None,
            node_id: None,
            is_intermediate: false,
        }
    }

    pub fn with_origin(mut self, origin: ImageOrigin) -> Self {
        self.image_origin = origin;
        self
    }

    pub fn with_category(mut self, category: ImageCategory) -> Self {
        self.image_category = category;
        self
    }

    /// Tie the image to the session node that produced it.
    pub fn from_node(mut self, session_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self.node_id = Some(node_id.into());
        self
    }

    pub fn intermediate(mut self, is_intermediate: bool) -> Self {
        self.is_intermediate = is_intermediate;
        self
    }
}
