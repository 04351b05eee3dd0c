use crate::api::oauth::GoogleCredentials;
use crate::metadata::SeoMetadata;
use crate::publish::{Publisher, UploadRequest};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/youtube/v3";
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(3600);
const MAX_TITLE_CHARS: usize = 100;
const MAX_DESCRIPTION_BYTES: usize = 5000;
const MAX_TAGS_CHARS: usize = 500;

pub struct YouTubeUploader {
    client: reqwest::Client,
    credentials: GoogleCredentials,
    upload_base: String,
    set_thumbnail: bool,
}

impl YouTubeUploader {
    pub fn new(client: reqwest::Client, credentials: GoogleCredentials) -> Self {
        Self {
            client,
            credentials,
            upload_base: UPLOAD_BASE.to_string(),
            set_thumbnail: true,
        }
    }

    pub fn with_upload_base(mut self, base: impl Into<String>) -> Self {
        self.upload_base = base.into();
        self
    }

    pub fn with_thumbnail_upload(mut self, enabled: bool) -> Self {
        self.set_thumbnail = enabled;
        self
    }

    async fn upload_thumbnail(&self, video_id: &str, thumbnail: &Path) -> Result<()> {
        let bytes = fs::read(thumbnail)
            .await
            .with_context(|| format!("read thumbnail {}", thumbnail.display()))?;
        let token = self.credentials.access_token().await?;
        let resp = self
            .client
            .post(format!("{}/thumbnails/set", self.upload_base))
            .query(&[("videoId", video_id)])
            .bearer_auth(token)
            .header("Content-Type", "image/png")
            .body(bytes)
            .send()
            .await
            .context("thumbnail request failed")?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("thumbnails.set HTTP {}: {}", status, body));
        }
        Ok(())
    }
}

fn strip_angle_brackets(input: &str) -> String {
    input.chars().filter(|c| *c != '<' && *c != '>').collect()
}

fn truncate_bytes(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }
    let mut cut = max_bytes;
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    input[..cut].to_string()
}

/// YouTube counts a tag containing whitespace with its surrounding quotes.
fn youtube_tag_cost(tag: &str) -> usize {
    let quotes = if tag.chars().any(char::is_whitespace) { 2 } else { 0 };
    tag.chars().count() + quotes
}

/// Applies the platform's field limits: title 100 chars, description 5000
/// bytes, tags 500 chars in total, no angle brackets anywhere.
pub fn snippet_json(meta: &SeoMetadata) -> serde_json::Value {
    let mut title: String = strip_angle_brackets(&meta.title)
        .trim()
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect();
    if title.trim().is_empty() {
        title = "Official Trailer".to_string();
    }
    let description = truncate_bytes(
        &strip_angle_brackets(&meta.description),
        MAX_DESCRIPTION_BYTES,
    );

    let mut tags = Vec::new();
    let mut used = 0usize;
    for tag in &meta.tags {
        let tag = strip_angle_brackets(tag).trim().to_string();
        if tag.is_empty() {
            continue;
        }
        let cost = youtube_tag_cost(&tag) + usize::from(!tags.is_empty());
        if used + cost > MAX_TAGS_CHARS {
            break;
        }
        used += cost;
        tags.push(tag);
    }

    json!({
        "title": title,
        "description": description,
        "tags": tags,
    })
}

pub fn multipart_related_body(
    boundary: &str,
    metadata: &serde_json::Value,
    media: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(media.len() + 1024);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: video/*\r\n\r\n");
    body.extend_from_slice(media);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[async_trait]
impl Publisher for YouTubeUploader {
    async fn publish(&self, request: &UploadRequest) -> Result<String> {
        let media = fs::read(&request.media)
            .await
            .with_context(|| format!("read media {}", request.media.display()))?;

        let resource = json!({
            "snippet": snippet_json(&request.metadata),
            "status": {"privacyStatus": request.privacy},
        });
        let boundary: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let body = multipart_related_body(&boundary, &resource, &media);

        let token = self.credentials.access_token().await?;
        logi(format!(
            "Uploading {} ({} bytes) to YouTube...",
            request.media.display(),
            media.len()
        ));
        let resp = self
            .client
            .post(format!("{}/videos", self.upload_base))
            .query(&[("uploadType", "multipart"), ("part", "snippet,status")])
            .bearer_auth(token)
            .header("Content-Type", format!("multipart/related; boundary={boundary}"))
            .body(body)
            .timeout(UPLOAD_TIMEOUT)
            .send()
            .await
            .context("YouTube upload request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow::anyhow!("YouTube upload HTTP {}: {}", status.as_u16(), raw));
        }

        let parsed: serde_json::Value =
            serde_json::from_str(&raw).context("Failed to parse YouTube upload response")?;
        let video_id = parsed
            .get("id")
            .and_then(|v| v.as_str())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow::anyhow!("YouTube upload response has no id"))?
            .to_string();
        logok(format!("Uploaded to YouTube! Video ID: {}", video_id));

        if self.set_thumbnail {
            if let Some(thumbnail) = &request.thumbnail {
                match self.upload_thumbnail(&video_id, thumbnail).await {
                    Ok(()) => logok(format!("Thumbnail set for {}", video_id)),
                    Err(err) => logw(format!(
                        "Thumbnail upload failed for {}: {:#}",
                        video_id, err
                    )),
                }
            }
        }

        Ok(video_id)
    }
}
