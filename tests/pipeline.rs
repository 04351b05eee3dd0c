use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use trailer_uploader::fetch::MediaFetcher;
use trailer_uploader::init;
use trailer_uploader::media::{Enhancer, MediaEditor};
use trailer_uploader::metadata::{MetadataGenerator, SeoMetadata, StaticMetadata};
use trailer_uploader::pipeline::{ItemOutcome, Pipeline, Stage, WorkDirs};
use trailer_uploader::publish::{Publisher, UploadRequest};
use trailer_uploader::trailer::{TrailerResolver, TrailerSource};

#[derive(Default)]
struct Calls {
    fetch: AtomicUsize,
    caption: AtomicUsize,
    enhance: AtomicUsize,
    metadata: AtomicUsize,
    thumbnail: AtomicUsize,
    publish: AtomicUsize,
    captions: Mutex<Vec<String>>,
    uploads: Mutex<Vec<UploadRequest>>,
}

struct KnownTitles(Vec<&'static str>);

#[async_trait]
impl TrailerSource for KnownTitles {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn find_trailer(&self, title: &str) -> Result<Option<String>> {
        Ok(self
            .0
            .iter()
            .find(|t| **t == title)
            .map(|t| format!("https://trailers.test/{}", t.to_lowercase().replace(' ', "-"))))
    }
}

struct FakeFetcher(Arc<Calls>);

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, uri: &str, dest_stem: &Path) -> Result<PathBuf> {
        self.0.fetch.fetch_add(1, Ordering::SeqCst);
        if uri.contains("broken") {
            anyhow::bail!("HTTP 404 for {}", uri);
        }
        let out = dest_stem.with_extension("mp4");
        tokio::fs::write(&out, uri.as_bytes()).await?;
        Ok(out)
    }
}

async fn copy_into(input: &Path, out_dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(out_dir).await?;
    let out = out_dir.join(input.file_name().unwrap());
    tokio::fs::copy(input, &out).await?;
    Ok(out)
}

struct FakeEditor {
    calls: Arc<Calls>,
    thumbnails: bool,
}

#[async_trait]
impl MediaEditor for FakeEditor {
    async fn caption(&self, input: &Path, text: &str, out_dir: &Path) -> Result<PathBuf> {
        self.calls.caption.fetch_add(1, Ordering::SeqCst);
        self.calls.captions.lock().unwrap().push(text.to_string());
        copy_into(input, out_dir).await
    }

    async fn thumbnail(
        &self,
        input: &Path,
        _caption: &str,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        self.calls.thumbnail.fetch_add(1, Ordering::SeqCst);
        if !self.thumbnails {
            return Ok(None);
        }
        tokio::fs::create_dir_all(out_dir).await?;
        let out = out_dir.join(input.file_stem().unwrap()).with_extension("png");
        tokio::fs::write(&out, b"png").await?;
        Ok(Some(out))
    }
}

struct FakeEnhancer(Arc<Calls>);

#[async_trait]
impl Enhancer for FakeEnhancer {
    fn name(&self) -> &'static str {
        "copy"
    }

    async fn enhance(&self, input: &Path, out_dir: &Path) -> Result<PathBuf> {
        self.0.enhance.fetch_add(1, Ordering::SeqCst);
        copy_into(input, out_dir).await
    }
}

struct CountingMetadata(Arc<Calls>);

#[async_trait]
impl MetadataGenerator for CountingMetadata {
    async fn generate(&self, movie_title: &str) -> SeoMetadata {
        self.0.metadata.fetch_add(1, Ordering::SeqCst);
        StaticMetadata.generate(movie_title).await
    }
}

struct FakePublisher(Arc<Calls>);

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(&self, request: &UploadRequest) -> Result<String> {
        let n = self.0.publish.fetch_add(1, Ordering::SeqCst);
        assert!(request.media.exists(), "upload of missing file {}", request.media.display());
        self.0.uploads.lock().unwrap().push(request.clone());
        Ok(format!("vid{}", n))
    }
}

async fn pipeline(
    root: &Path,
    known: Vec<&'static str>,
    thumbnails: bool,
    publish: bool,
) -> (Pipeline, Arc<Calls>) {
    let calls = Arc::new(Calls::default());
    let dirs = WorkDirs::under(root);
    init::ensure_directories(&dirs).await.unwrap();
    let mut pipeline = Pipeline::new(
        TrailerResolver::new(vec![Box::new(KnownTitles(known))]),
        Box::new(FakeFetcher(Arc::clone(&calls))),
        Box::new(FakeEditor {
            calls: Arc::clone(&calls),
            thumbnails,
        }),
        Box::new(FakeEnhancer(Arc::clone(&calls))),
        Box::new(CountingMetadata(Arc::clone(&calls))),
        dirs,
    )
    .with_privacy("unlisted");
    if publish {
        pipeline = pipeline.with_publisher(Box::new(FakePublisher(Arc::clone(&calls))));
    }
    (pipeline, calls)
}

#[tokio::test]
async fn known_title_is_published_and_unknown_is_skipped() {
    let root = tempfile::tempdir().unwrap();
    let (pipeline, calls) = pipeline(root.path(), vec!["Dune"], true, true).await;

    let report = pipeline.run(["Dune", "UnknownMovieXYZ123"]).await;

    assert_eq!(report.outcomes.len(), 2);
    match &report.outcomes[0] {
        ItemOutcome::Published {
            title,
            video_id,
            media,
            thumbnail,
        } => {
            assert_eq!(title, "Dune");
            assert_eq!(video_id, "vid0");
            assert!(media.starts_with(root.path().join("enhanced_videos")));
            assert!(thumbnail.as_ref().unwrap().exists());
        }
        other => panic!("expected Dune to publish, got {:?}", other),
    }
    assert!(matches!(
        &report.outcomes[1],
        ItemOutcome::Skipped { title, .. } if title == "UnknownMovieXYZ123"
    ));

    // The skipped title reached no stage past resolution.
    assert_eq!(calls.fetch.load(Ordering::SeqCst), 1);
    assert_eq!(calls.caption.load(Ordering::SeqCst), 1);
    assert_eq!(calls.enhance.load(Ordering::SeqCst), 1);
    assert_eq!(calls.metadata.load(Ordering::SeqCst), 1);
    assert_eq!(calls.thumbnail.load(Ordering::SeqCst), 1);
    assert_eq!(calls.publish.load(Ordering::SeqCst), 1);
    assert_eq!((report.published(), report.skipped(), report.failed()), (1, 1, 0));

    assert_eq!(*calls.captions.lock().unwrap(), vec!["Dune Trailer".to_string()]);
    let uploads = calls.uploads.lock().unwrap();
    assert_eq!(uploads[0].metadata, SeoMetadata::fallback("Dune"));
    assert_eq!(uploads[0].privacy, "unlisted");
}

#[tokio::test]
async fn failing_stage_does_not_stop_later_items() {
    let root = tempfile::tempdir().unwrap();
    let (pipeline, calls) = pipeline(root.path(), vec!["Broken", "Heat"], true, true).await;

    let report = pipeline.run(["Broken", "Heat"]).await;

    match &report.outcomes[0] {
        ItemOutcome::Failed { title, stage, error } => {
            assert_eq!(title, "Broken");
            assert_eq!(*stage, Stage::Fetch);
            assert!(error.contains("404"));
        }
        other => panic!("expected a fetch failure, got {:?}", other),
    }
    assert!(matches!(&report.outcomes[1], ItemOutcome::Published { title, .. } if title == "Heat"));
    assert_eq!(calls.fetch.load(Ordering::SeqCst), 2);
    assert_eq!(calls.caption.load(Ordering::SeqCst), 1);
    assert_eq!(report.failed(), 1);
}

#[tokio::test]
async fn same_title_twice_yields_independent_files() {
    let root = tempfile::tempdir().unwrap();
    let (pipeline, _calls) = pipeline(root.path(), vec!["Dune"], true, true).await;

    let report = pipeline.run(["Dune", "Dune"]).await;

    let published: Vec<(&PathBuf, &Option<PathBuf>)> = report
        .outcomes
        .iter()
        .filter_map(|o| match o {
            ItemOutcome::Published { media, thumbnail, .. } => Some((media, thumbnail)),
            _ => None,
        })
        .collect();
    assert_eq!(published.len(), 2);
    assert_ne!(published[0].0, published[1].0);
    assert_ne!(published[0].1, published[1].1);
    assert!(published[0].0.exists() && published[1].0.exists());

    let downloads = std::fs::read_dir(root.path().join("downloads")).unwrap().count();
    assert_eq!(downloads, 2);
}

#[tokio::test]
async fn blank_lines_are_ignored_and_titles_trimmed() {
    let root = tempfile::tempdir().unwrap();
    let (pipeline, calls) = pipeline(root.path(), vec!["Dune"], true, true).await;

    let report = pipeline.run(["", "   ", "  Dune  "]).await;

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].title(), "Dune");
    assert_eq!(calls.fetch.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_thumbnail_still_uploads() {
    let root = tempfile::tempdir().unwrap();
    let (pipeline, calls) = pipeline(root.path(), vec!["Dune"], false, true).await;

    let report = pipeline.run(["Dune"]).await;

    assert!(matches!(&report.outcomes[0], ItemOutcome::Published { thumbnail: None, .. }));
    assert!(calls.uploads.lock().unwrap()[0].thumbnail.is_none());
}

#[tokio::test]
async fn without_publisher_items_are_prepared_only() {
    let root = tempfile::tempdir().unwrap();
    let (pipeline, calls) = pipeline(root.path(), vec!["Dune"], true, false).await;

    let report = pipeline.run(["Dune"]).await;

    match &report.outcomes[0] {
        ItemOutcome::Prepared { media, metadata, .. } => {
            assert!(media.exists());
            assert_eq!(metadata.title, "Dune Official Trailer");
        }
        other => panic!("expected a prepared item, got {:?}", other),
    }
    assert_eq!(calls.publish.load(Ordering::SeqCst), 0);
    assert_eq!(report.failed(), 0);
}
