use crate::metadata::SeoMetadata;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub media: PathBuf,
    pub thumbnail: Option<PathBuf>,
    pub metadata: SeoMetadata,
    pub privacy: String,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Uploads the media and returns the platform-assigned id.
    async fn publish(&self, request: &UploadRequest) -> Result<String>;
}
