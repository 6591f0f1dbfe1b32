/// Builds client-facing URLs for stored images.
pub trait UrlService: Send + Sync {
    fn get_image_url(&self, image_name: &str, thumbnail: bool) -> String;
}

/// URLs relative to the local API root, e.g. `api/v1/images/x.png/full`.
pub struct LocalUrlService {
    base_url: String,
}

impl LocalUrlService {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for LocalUrlService {
    fn default() -> Self {
        Self::new("api/v1")
    }
}

impl UrlService for LocalUrlService {
    fn get_image_url(&self, image_name: &str, thumbnail: bool) -> String {
        let kind = if thumbnail { "thumbnail" } else { "full" };
        format!("{}/images/{}/{}", self.base_url, image_name, kind)
    }
}
