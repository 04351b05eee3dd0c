use crate::api::oauth::{GoogleCredentials, YOUTUBE_UPLOAD_SCOPE};
use crate::api::openai::OpenAiClient;
use crate::api::youtube::YouTubeUploader;
use crate::config::Config;
use crate::fetch::{MediaFetcher, YtDlpFetcher};
use crate::init;
use crate::media::{self, Enhancer, FfmpegEditor, MediaEditor};
use crate::metadata::{MetadataGenerator, SeoMetadata, StaticMetadata};
use crate::publish::{Publisher, UploadRequest};
use crate::trailer::{self, TrailerResolver};
use crate::{loge, logi, logok, logw};
use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

static STEM_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Fetch,
    Caption,
    Enhance,
    Metadata,
    Thumbnail,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Resolve => "resolve",
            Stage::Fetch => "fetch",
            Stage::Caption => "caption",
            Stage::Enhance => "enhance",
            Stage::Metadata => "metadata",
            Stage::Thumbnail => "thumbnail",
            Stage::Publish => "publish",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("{stage} failed for {title}: {error:#}")]
pub struct StageError {
    pub title: String,
    pub stage: Stage,
    pub error: anyhow::Error,
}

trait StageContext<T> {
    fn at(self, stage: Stage, title: &str) -> Result<T, StageError>;
}

impl<T> StageContext<T> for Result<T> {
    fn at(self, stage: Stage, title: &str) -> Result<T, StageError> {
        self.map_err(|error| StageError {
            title: title.to_string(),
            stage,
            error,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Published {
        title: String,
        video_id: String,
        media: PathBuf,
        thumbnail: Option<PathBuf>,
    },
    /// Everything but the upload ran (dry run).
    Prepared {
        title: String,
        media: PathBuf,
        thumbnail: Option<PathBuf>,
        metadata: SeoMetadata,
    },
    Skipped {
        title: String,
        reason: String,
    },
    Failed {
        title: String,
        stage: Stage,
        error: String,
    },
}

impl ItemOutcome {
    pub fn title(&self) -> &str {
        match self {
            ItemOutcome::Published { title, .. }
            | ItemOutcome::Prepared { title, .. }
            | ItemOutcome::Skipped { title, .. }
            | ItemOutcome::Failed { title, .. } => title,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ItemOutcome::Failed { .. })
    }
}

impl From<StageError> for ItemOutcome {
    fn from(err: StageError) -> Self {
        ItemOutcome::Failed {
            error: format!("{:#}", err.error),
            title: err.title,
            stage: err.stage,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchReport {
    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }

    pub fn published(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Published { .. }))
    }

    pub fn prepared(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Prepared { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(ItemOutcome::is_failure)
    }

    pub fn summary(&self) -> String {
        let mut line = format!(
            "Published: {}  Skipped: {}  Failed: {}",
            self.published(),
            self.skipped(),
            self.failed()
        );
        if self.prepared() > 0 {
            line.push_str(&format!("  Prepared: {}", self.prepared()));
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDirs {
    pub downloads: PathBuf,
    pub edited_videos: PathBuf,
    pub enhanced_videos: PathBuf,
    pub thumbnails: PathBuf,
}

impl WorkDirs {
    pub fn under<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            downloads: root.join("downloads"),
            edited_videos: root.join("edited_videos"),
            enhanced_videos: root.join("enhanced_videos"),
            thumbnails: root.join("thumbnails"),
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [
            &self.downloads,
            &self.edited_videos,
            &self.enhanced_videos,
            &self.thumbnails,
        ]
    }

    /// `<slug>-<yyyymmdd-HHMMSS>-<n>`; unique per call within a process.
    pub fn stem(&self, title: &str) -> String {
        let n = STEM_COUNTER.fetch_add(1, Ordering::Relaxed);
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        format!("{}-{}-{}", slug(title), stamp, n)
    }
}

pub fn slug(title: &str) -> String {
    let mut out = String::new();
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    let out = out.trim_end_matches('-');
    if out.is_empty() {
        "trailer".to_string()
    } else {
        out.chars().take(60).collect::<String>().trim_end_matches('-').to_string()
    }
}

pub struct Pipeline {
    resolver: TrailerResolver,
    fetcher: Box<dyn MediaFetcher>,
    editor: Box<dyn MediaEditor>,
    enhancer: Box<dyn Enhancer>,
    metadata: Box<dyn MetadataGenerator>,
    publisher: Option<Box<dyn Publisher>>,
    dirs: WorkDirs,
    thumbnail_caption: String,
    privacy: String,
}

impl Pipeline {
    pub fn new(
        resolver: TrailerResolver,
        fetcher: Box<dyn MediaFetcher>,
        editor: Box<dyn MediaEditor>,
        enhancer: Box<dyn Enhancer>,
        metadata: Box<dyn MetadataGenerator>,
        dirs: WorkDirs,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            editor,
            enhancer,
            metadata,
            publisher: None,
            dirs,
            thumbnail_caption: "Watch Now!".to_string(),
            privacy: "public".to_string(),
        }
    }

    /// Without a publisher, items stop after the thumbnail as `Prepared`.
    pub fn with_publisher(mut self, publisher: Box<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_thumbnail_caption(mut self, caption: impl Into<String>) -> Self {
        self.thumbnail_caption = caption.into();
        self
    }

    pub fn with_privacy(mut self, privacy: impl Into<String>) -> Self {
        self.privacy = privacy.into();
        self
    }

    pub fn dirs(&self) -> &WorkDirs {
        &self.dirs
    }

    pub async fn process(&self, title: &str) -> ItemOutcome {
        match self.process_item(title).await {
            Ok(outcome) => outcome,
            Err(err) => {
                loge(format!("{}", err));
                err.into()
            }
        }
    }

    async fn process_item(&self, title: &str) -> Result<ItemOutcome, StageError> {
        let stem = self.dirs.stem(title);

        let Some(uri) = self.resolver.resolve(title).await else {
            let reason = "no trailer found on any source".to_string();
            logw(format!("No trailer found for {}; skipping.", title));
            return Ok(ItemOutcome::Skipped {
                title: title.to_string(),
                reason,
            });
        };

        logi(format!("Downloading {}...", uri));
        let downloaded = self
            .fetcher
            .fetch(&uri, &self.dirs.downloads.join(&stem))
            .await
            .at(Stage::Fetch, title)?;
        logok(format!("Downloaded: {}", downloaded.display()));

        let caption = format!("{} Trailer", title);
        logi(format!("Adding caption \"{}\"...", caption));
        let captioned = self
            .editor
            .caption(&downloaded, &caption, &self.dirs.edited_videos)
            .await
            .at(Stage::Caption, title)?;
        logok(format!("Captioned: {}", captioned.display()));

        logi(format!("Enhancing ({})...", self.enhancer.name()));
        let enhanced = self
            .enhancer
            .enhance(&captioned, &self.dirs.enhanced_videos)
            .await
            .at(Stage::Enhance, title)?;
        logok(format!("Enhanced: {}", enhanced.display()));

        let metadata = self.metadata.generate(title).await;
        logi(format!("Video title: {}", metadata.title));

        let thumbnail = match self
            .editor
            .thumbnail(&enhanced, &self.thumbnail_caption, &self.dirs.thumbnails)
            .await
        {
            Ok(Some(path)) => {
                logok(format!("Thumbnail: {}", path.display()));
                Some(path)
            }
            Ok(None) => {
                logw(format!(
                    "No readable frame for a thumbnail of {}; uploading without one.",
                    title
                ));
                None
            }
            Err(err) => {
                logw(format!(
                    "Thumbnail failed for {}: {:#}; uploading without one.",
                    title, err
                ));
                None
            }
        };

        let Some(publisher) = &self.publisher else {
            logok(format!("Prepared {} (dry run, not uploaded)", title));
            return Ok(ItemOutcome::Prepared {
                title: title.to_string(),
                media: enhanced,
                thumbnail,
                metadata,
            });
        };

        let request = UploadRequest {
            media: enhanced.clone(),
            thumbnail: thumbnail.clone(),
            metadata,
            privacy: self.privacy.clone(),
        };
        let video_id = publisher.publish(&request).await.at(Stage::Publish, title)?;

        Ok(ItemOutcome::Published {
            title: title.to_string(),
            video_id,
            media: enhanced,
            thumbnail,
        })
    }

    /// Processes titles in order; one item's failure never stops the rest.
    pub async fn run<I, S>(&self, titles: I) -> BatchReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = BatchReport::default();
        for raw in titles {
            let title = raw.as_ref().trim();
            if title.is_empty() {
                continue;
            }
            logi(format!("=== Processing: {} ===", title));
            let outcome = self.process(title).await;
            match &outcome {
                ItemOutcome::Published { video_id, .. } => {
                    logok(format!("DONE: {} ({})", title, video_id))
                }
                ItemOutcome::Failed { stage, .. } => {
                    logw(format!("FAILED at {}: {}", stage, title))
                }
                _ => {}
            }
            report.outcomes.push(outcome);
        }
        logi(format!("All done. {}", report.summary()));
        report
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub no_llm: bool,
}

pub fn split_titles(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn metadata_generator(
    cfg: &Config,
    client: &reqwest::Client,
    options: RunOptions,
) -> Box<dyn MetadataGenerator> {
    if options.no_llm {
        logi("LLM disabled; using templated metadata.");
        return Box::new(StaticMetadata);
    }
    match cfg.openai_key() {
        Some(key) => Box::new(
            OpenAiClient::new(client.clone(), key, cfg.openai_model.clone())
                .with_prompt_hint(cfg.prompt_hint.clone()),
        ),
        None => {
            logw("No OpenAI API key configured; using templated metadata.");
            Box::new(StaticMetadata)
        }
    }
}

/// Wires the pipeline from config. Authorization happens here, once, so a
/// failure aborts before any item runs.
pub async fn build_pipeline(cfg: &Config, options: RunOptions) -> Result<Pipeline> {
    let client = trailer::build_http_client(Duration::from_secs(cfg.http_timeout_secs))?;
    let dirs = WorkDirs::under(&cfg.work_root);
    init::ensure_directories(&dirs).await?;

    let pipeline = Pipeline::new(
        TrailerResolver::from_kind(cfg.trailer_source, client.clone()),
        Box::new(YtDlpFetcher::new()),
        Box::new(FfmpegEditor::new(cfg.caption_font.clone())),
        media::enhancer_from_config(&cfg.enhancement),
        metadata_generator(cfg, &client, options),
        dirs,
    )
    .with_thumbnail_caption(cfg.thumbnail_caption.clone())
    .with_privacy(cfg.privacy_status.clone());

    if options.dry_run {
        logi("Dry run: items will not be uploaded.");
        return Ok(pipeline);
    }

    let credentials = GoogleCredentials::acquire(
        client.clone(),
        &cfg.client_secret_path,
        &cfg.token_cache_path,
        &[YOUTUBE_UPLOAD_SCOPE],
    )
    .await
    .context("YouTube authorization failed")?;
    let uploader =
        YouTubeUploader::new(client, credentials).with_thumbnail_upload(cfg.set_thumbnail);
    Ok(pipeline.with_publisher(Box::new(uploader)))
}

pub async fn run_batch(
    cfg: &Config,
    titles: &[String],
    options: RunOptions,
) -> Result<BatchReport> {
    let pipeline = build_pipeline(cfg, options).await?;
    logi(format!(
        "Trailer sources: {}",
        pipeline.resolver.source_names().join(" -> ")
    ));
    Ok(pipeline.run(titles).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_displays_lowercase() {
        assert_eq!(Stage::Resolve.to_string(), "resolve");
        assert_eq!(Stage::Publish.to_string(), "publish");
    }

    #[test]
    fn slug_is_filesystem_safe() {
        assert_eq!(slug("Dune: Part Two"), "dune-part-two");
        assert_eq!(slug("  Ocean's 11 "), "ocean-s-11");
        assert_eq!(slug("!!!"), "trailer");
        assert_eq!(slug("Amélie"), "amélie");
    }

    #[test]
    fn stems_never_repeat() {
        let dirs = WorkDirs::under("/tmp/work");
        let a = dirs.stem("Dune");
        let b = dirs.stem("Dune");
        assert_ne!(a, b);
        assert!(a.starts_with("dune-"));
    }

    #[test]
    fn work_dirs_layout() {
        let dirs = WorkDirs::under("root");
        assert_eq!(dirs.downloads, Path::new("root/downloads"));
        assert_eq!(dirs.thumbnails, Path::new("root/thumbnails"));
        assert_eq!(dirs.all().len(), 4);
    }

    #[test]
    fn split_titles_drops_blank_lines() {
        assert_eq!(split_titles(" Dune \n\n  \nHeat\r\n"), vec!["Dune", "Heat"]);
    }

    #[test]
    fn report_counts_by_kind() {
        let report = BatchReport {
            outcomes: vec![
                ItemOutcome::Skipped {
                    title: "a".into(),
                    reason: "r".into(),
                },
                ItemOutcome::Failed {
                    title: "b".into(),
                    stage: Stage::Fetch,
                    error: "e".into(),
                },
                ItemOutcome::Published {
                    title: "c".into(),
                    video_id: "id".into(),
                    media: PathBuf::from("c.mp4"),
                    thumbnail: None,
                },
            ],
        };
        assert_eq!((report.published(), report.skipped(), report.failed()), (1, 1, 1));
        assert_eq!(report.summary(), "Published: 1  Skipped: 1  Failed: 1");
    }

    #[test]
    fn stage_error_becomes_failed_outcome() {
        let err = StageError {
            title: "Dune".into(),
            stage: Stage::Caption,
            error: anyhow::anyhow!("ffmpeg exited 1"),
        };
        assert_eq!(err.to_string(), "caption failed for Dune: ffmpeg exited 1");
        let outcome: ItemOutcome = err.into();
        assert!(outcome.is_failure());
        assert_eq!(outcome.title(), "Dune");
    }
}
