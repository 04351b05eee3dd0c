use crate::metadata::{MetadataGenerator, SeoMetadata, parse_metadata};
use crate::{logi, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const RAW_SNIPPET: usize = 800;

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
    prompt_hint: Option<String>,
    endpoint: String,
}

impl OpenAiClient {
    pub fn new(client: Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            prompt_hint: None,
            endpoint: RESPONSES_URL.to_string(),
        }
    }

    pub fn with_prompt_hint(mut self, hint: Option<String>) -> Self {
        self.prompt_hint = hint.filter(|h| !h.trim().is_empty());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn prompt(&self, movie_title: &str) -> String {
        let mut prompt = format!(
            "Generate an SEO-optimized YouTube title, description, and tags for the official movie trailer of \"{}\".\n\
             Return STRICT JSON with this shape ONLY:\n  {{\"title\":\"...\",\"description\":\"...\",\"tags\":[\"...\"]}}\n\
             - title: at most 100 characters.\n\
             - description: 2-4 sentences, no angle brackets.\n\
             - tags: 5-15 short keywords.\n",
            movie_title
        );
        if let Some(hint) = &self.prompt_hint {
            prompt.push_str("\nAdditional instructions:\n");
            prompt.push_str(hint);
            prompt.push('\n');
        }
        prompt
    }

    async fn request_text(&self, movie_title: &str) -> Result<Option<String>> {
        let body = json!({
            "model": self.model,
            "input": [
                {"role": "system", "content": "You are a helpful assistant designed to output JSON."},
                {"role": "user", "content": self.prompt(movie_title)},
            ],
            "text": {"format": {"type": "json_object"}},
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            logw(format!("OpenAI HTTP {}", status.as_u16()));
            log_raw_snippet(&raw);
            // Still surfaces the API error message, if any.
            let _ = openai_extract_output_text(&raw);
            return Ok(None);
        }

        let text = openai_extract_output_text(&raw);
        if text.is_none() {
            logw("OpenAI response parse failed.");
            log_raw_snippet(&raw);
        }
        Ok(text)
    }
}

fn log_raw_snippet(raw: &str) {
    if !raw.is_empty() {
        let snippet = raw.chars().take(RAW_SNIPPET).collect::<String>();
        logw(format!("OpenAI raw body: {}", snippet));
    }
}

/// First `output_text` block of a Responses API reply. Logs and returns
/// `None` for an `error` object.
pub fn openai_extract_output_text(resp_json: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(resp_json).ok()?;

    if let Some(err) = root.get("error").filter(|e| !e.is_null()) {
        if let Some(msg) = err.get("message").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error message: {}", msg));
        }
        if let Some(code) = err.get("code").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error code: {}", code));
        }
        return None;
    }

    let output = root.get("output")?.as_array()?;
    for item in output {
        let Some(content) = item.get("content").and_then(|v| v.as_array()) else {
            continue;
        };
        for entry in content {
            let typ = entry.get("type").and_then(|v| v.as_str());
            let text = entry.get("text").and_then(|v| v.as_str());
            if let (Some("output_text"), Some(text)) = (typ, text) {
                return Some(text.to_string());
            }
        }
    }

    None
}

#[async_trait]
impl MetadataGenerator for OpenAiClient {
    async fn generate(&self, movie_title: &str) -> SeoMetadata {
        logi(format!("Requesting SEO metadata from {} for {}...", self.model, movie_title));
        let text = match self.request_text(movie_title).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                logw(format!("Using fallback metadata for {}", movie_title));
                return SeoMetadata::fallback(movie_title);
            }
            Err(err) => {
                logw(format!(
                    "Error generating SEO content for {}: {:#}; using fallback",
                    movie_title, err
                ));
                return SeoMetadata::fallback(movie_title);
            }
        };

        match parse_metadata(&text, movie_title) {
            Some(meta) => meta,
            None => {
                let snippet = text.chars().take(RAW_SNIPPET).collect::<String>();
                logw(format!("Invalid JSON response from OpenAI: {}; using fallback", snippet));
                SeoMetadata::fallback(movie_title)
            }
        }
    }
}
