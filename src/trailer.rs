//! Trailer lookup.
//!
//! Each [`TrailerSource`] turns a movie title into a trailer page URI.
//! [`TrailerResolver`] walks its sources in order and treats any error as
//! "not found here", so a dead site only costs a warning.

use crate::config::TrailerSourceKind;
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{Html, Selector};
use std::time::Duration;

pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15";

const ROTTEN_TOMATOES_BASE: &str = "https://www.rottentomatoes.com";
const IMDB_BASE: &str = "https://www.imdb.com";
const YOUTUBE_BASE: &str = "https://www.youtube.com";

static IMDB_TITLE_RE: OnceCell<Regex> = OnceCell::new();
static IMDB_VIDEO_RE: OnceCell<Regex> = OnceCell::new();
static YOUTUBE_WATCH_RE: OnceCell<Regex> = OnceCell::new();

fn first_capture(cell: &'static OnceCell<Regex>, pattern: &str, text: &str) -> Option<String> {
    let re = cell.get_or_try_init(|| Regex::new(pattern)).ok()?;
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[async_trait]
pub trait TrailerSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means the site answered but had no trailer for `title`.
    async fn find_trailer(&self, title: &str) -> Result<Option<String>>;
}

pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .cookie_store(true)
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(15))
        .build()
        .context("failed to build reqwest client")
}

async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?;
    let status = resp.status();
    if status != reqwest::StatusCode::OK {
        return Err(anyhow::anyhow!("HTTP {} for {}", status.as_u16(), url));
    }
    let text = resp.text().await.with_context(|| format!("read body of {url}"))?;
    if text.is_empty() {
        return Err(anyhow::anyhow!("empty body for {}", url));
    }
    Ok(text)
}

fn absolutize(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else if href.starts_with('/') {
        format!("{}{}", base.trim_end_matches('/'), href)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), href)
    }
}

fn first_attr(html: &str, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let document = Html::parse_document(html);
    document
        .select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Movie page path from a Rotten Tomatoes search page.
pub fn rotten_tomatoes_movie_path(html: &str) -> Option<String> {
    first_attr(html, "search-page-media-row", "data-url")
        .or_else(|| first_attr(html, "search-page-media-row a[href]", "href"))
}

pub fn rotten_tomatoes_trailer_href(html: &str) -> Option<String> {
    first_attr(html, "a.trailer-player", "href")
}

pub fn imdb_first_title_id(html: &str) -> Option<String> {
    first_capture(&IMDB_TITLE_RE, r"/title/(tt\d+)", html)
}

pub fn imdb_first_video_id(html: &str) -> Option<String> {
    first_capture(&IMDB_VIDEO_RE, r"/video/(vi\d+)", html)
}

/// First `watch?v=` id on a results page, cut before any further query
/// parameter.
pub fn youtube_first_video_id(html: &str) -> Option<String> {
    first_capture(&YOUTUBE_WATCH_RE, r"/watch\?v=([A-Za-z0-9_-]+)", html)
}

pub struct RottenTomatoesSource {
    client: reqwest::Client,
    base_url: String,
}

impl RottenTomatoesSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, ROTTEN_TOMATOES_BASE)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TrailerSource for RottenTomatoesSource {
    fn name(&self) -> &'static str {
        "Rotten Tomatoes"
    }

    async fn find_trailer(&self, title: &str) -> Result<Option<String>> {
        let search_url = format!(
            "{}/search?search={}",
            self.base_url,
            urlencoding::encode(title)
        );
        let search_page = fetch_text(&self.client, &search_url).await?;
        let Some(movie_path) = rotten_tomatoes_movie_path(&search_page) else {
            return Ok(None);
        };

        let movie_url = absolutize(&self.base_url, &movie_path);
        let movie_page = fetch_text(&self.client, &movie_url).await?;
        Ok(rotten_tomatoes_trailer_href(&movie_page)
            .map(|href| absolutize(&self.base_url, &href)))
    }
}

pub struct ImdbSource {
    client: reqwest::Client,
    base_url: String,
}

impl ImdbSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, IMDB_BASE)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TrailerSource for ImdbSource {
    fn name(&self) -> &'static str {
        "IMDb"
    }

    async fn find_trailer(&self, title: &str) -> Result<Option<String>> {
        let find_url = format!(
            "{}/find/?q={}&s=tt",
            self.base_url,
            urlencoding::encode(title)
        );
        let find_page = fetch_text(&self.client, &find_url).await?;
        let Some(title_id) = imdb_first_title_id(&find_page) else {
            return Ok(None);
        };

        let title_url = format!("{}/title/{}/", self.base_url, title_id);
        let title_page = fetch_text(&self.client, &title_url).await?;
        Ok(imdb_first_video_id(&title_page)
            .map(|vid| format!("{}/video/{}/", self.base_url, vid)))
    }
}

pub struct YouTubeSearchSource {
    client: reqwest::Client,
    base_url: String,
}

impl YouTubeSearchSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, YOUTUBE_BASE)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TrailerSource for YouTubeSearchSource {
    fn name(&self) -> &'static str {
        "YouTube"
    }

    async fn find_trailer(&self, title: &str) -> Result<Option<String>> {
        let query = format!("{title} official trailer");
        let url = format!(
            "{}/results?search_query={}",
            self.base_url,
            urlencoding::encode(&query)
        );
        let page = fetch_text(&self.client, &url).await?;
        Ok(youtube_first_video_id(&page).map(|id| format!("https://www.youtube.com/watch?v={id}")))
    }
}

/// Ordered fallback chain over trailer sources.
pub struct TrailerResolver {
    sources: Vec<Box<dyn TrailerSource>>,
}

impl TrailerResolver {
    pub fn new(sources: Vec<Box<dyn TrailerSource>>) -> Self {
        Self { sources }
    }

    /// The configured primary site followed by YouTube search.
    pub fn from_kind(kind: TrailerSourceKind, client: reqwest::Client) -> Self {
        let primary: Box<dyn TrailerSource> = match kind {
            TrailerSourceKind::RottenTomatoes => {
                Box::new(RottenTomatoesSource::new(client.clone()))
            }
            TrailerSourceKind::Imdb => Box::new(ImdbSource::new(client.clone())),
        };
        Self::new(vec![primary, Box::new(YouTubeSearchSource::new(client))])
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub async fn resolve(&self, title: &str) -> Option<String> {
        for source in &self.sources {
            logi(format!("Looking up trailer for {} on {}...", title, source.name()));
            match source.find_trailer(title).await {
                Ok(Some(uri)) => {
                    logok(format!("Trailer found on {}: {}", source.name(), uri));
                    return Some(uri);
                }
                Ok(None) => logw(format!("No trailer found on {} for {}", source.name(), title)),
                Err(err) => logw(format!(
                    "Error fetching trailer from {} for {}: {:#}",
                    source.name(),
                    title,
                    err
                )),
            }
        }
        None
    }
}
