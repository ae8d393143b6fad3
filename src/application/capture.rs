//! Capture driver: rasterises rendered card pages into the asset directory.
//!
//! Captures are independent per slug. They run on a bounded pool and every
//! outcome lands in a [`CaptureLedger`]; one failure never stops the others.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::articles::{GeneratedAsset, Projection, Viewport};

#[cfg(unix)]
const ASSET_MODE: u32 = 0o644;

/// Parameters handed to the headless browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub suppress_scrollbars: bool,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("rendered page `{}` is missing", .0.display())]
    MissingRenderedPage(PathBuf),
    #[error("asset directory `{}` is unusable: {reason}", path.display())]
    AssetDirectory { path: PathBuf, reason: String },
    #[error("browser unavailable: {0}")]
    NotFound(io::Error),
    #[error("browser exited with status {exit_code:?}: {stderr}")]
    Browser {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("capture timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("browser produced no image at `{}`", .0.display())]
    EmptyOutput(PathBuf),
    #[error("captured image is not a readable raster: {0}")]
    InvalidImage(String),
    #[error("captured image is {actual_width}x{actual_height}, expected {width}x{height}")]
    Dimensions {
        width: u32,
        height: u32,
        actual_width: u64,
        actual_height: u64,
    },
    #[error("input `{}` cannot be expressed as a file URL", .0.display())]
    InvalidInput(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Black-box "rasterise file to PNG of given dimensions".
#[async_trait]
pub trait PageCapturer: Send + Sync {
    async fn capture(&self, request: &CaptureRequest) -> Result<(), CaptureError>;
}

/// Failed capture for one slug.
#[derive(Debug)]
pub struct CaptureFailure {
    pub slug: String,
    pub error: CaptureError,
}

/// Concurrent collector of per-slug outcomes.
#[derive(Debug, Default)]
pub struct CaptureLedger {
    outcomes: DashMap<String, Result<GeneratedAsset, CaptureError>>,
}

impl CaptureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, slug: impl Into<String>, outcome: Result<GeneratedAsset, CaptureError>) {
        self.outcomes.insert(slug.into(), outcome);
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Split into generated assets and failures, each ordered by slug.
    pub fn into_sorted(self) -> (Vec<GeneratedAsset>, Vec<CaptureFailure>) {
        let mut generated = Vec::new();
        let mut failed = Vec::new();
        for (slug, outcome) in self.outcomes {
            match outcome {
                Ok(asset) => generated.push(asset),
                Err(error) => failed.push(CaptureFailure { slug, error }),
            }
        }
        generated.sort_by(|left, right| left.slug.cmp(&right.slug));
        failed.sort_by(|left, right| left.slug.cmp(&right.slug));
        (generated, failed)
    }
}

/// Drives a [`PageCapturer`] over a batch of projections.
#[derive(Clone)]
pub struct CaptureDriver {
    capturer: Arc<dyn PageCapturer>,
    asset_dir: PathBuf,
    viewport: Viewport,
    suppress_scrollbars: bool,
    timeout: Duration,
    concurrency: usize,
}

impl CaptureDriver {
    pub fn new(capturer: Arc<dyn PageCapturer>, asset_dir: impl Into<PathBuf>) -> Self {
        Self {
            capturer,
            asset_dir: asset_dir.into(),
            viewport: Viewport::SOCIAL_CARD,
            suppress_scrollbars: true,
            timeout: Duration::from_secs(30),
            concurrency: 4,
        }
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn with_scrollbars_suppressed(mut self, suppress: bool) -> Self {
        self.suppress_scrollbars = suppress;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, 32);
        self
    }

    /// Capture every projection's rendered page found under `output_root`.
    pub async fn capture_all(&self, projections: &[Projection], output_root: &Path) -> CaptureLedger {
        let ledger = CaptureLedger::new();

        if let Err(err) = tokio::fs::create_dir_all(&self.asset_dir).await {
            warn!(
                target = "ogcard::capture",
                op = "capture::prepare",
                result = "error",
                asset_dir = %self.asset_dir.display(),
                error = %err,
                "Asset directory could not be created"
            );
            for projection in projections {
                ledger.record(
                    projection.source_article_slug.clone(),
                    Err(CaptureError::AssetDirectory {
                        path: self.asset_dir.clone(),
                        reason: err.to_string(),
                    }),
                );
            }
            return ledger;
        }

        stream::iter(projections)
            .for_each_concurrent(Some(self.concurrency), |projection| {
                let ledger = &ledger;
                async move {
                    let outcome = self.capture_one(projection, output_root).await;
                    ledger.record(projection.source_article_slug.clone(), outcome);
                }
            })
            .await;

        ledger
    }

    async fn capture_one(
        &self,
        projection: &Projection,
        output_root: &Path,
    ) -> Result<GeneratedAsset, CaptureError> {
        let slug = projection.source_article_slug.as_str();
        let started_at = Instant::now();

        let outcome = self.capture_into_place(projection, output_root).await;
        let elapsed_ms = started_at.elapsed().as_millis() as u64;

        match &outcome {
            Ok(asset) => {
                counter!("ogcard_capture_total", "result" => "success").increment(1);
                info!(
                    target = "ogcard::capture",
                    op = "capture::page",
                    result = "success",
                    slug,
                    elapsed_ms,
                    asset = %asset.file_path.display(),
                    "Social card captured"
                );
            }
            Err(err) => {
                counter!("ogcard_capture_total", "result" => "failure").increment(1);
                warn!(
                    target = "ogcard::capture",
                    op = "capture::page",
                    result = "error",
                    slug,
                    elapsed_ms,
                    error = %err,
                    "Social card capture failed"
                );
            }
        }

        outcome
    }

    async fn capture_into_place(
        &self,
        projection: &Projection,
        output_root: &Path,
    ) -> Result<GeneratedAsset, CaptureError> {
        let slug = projection.source_article_slug.as_str();
        let rendered = output_root.join(&projection.output_relative_path);
        if !tokio::fs::try_exists(&rendered).await.unwrap_or(false) {
            return Err(CaptureError::MissingRenderedPage(rendered));
        }

        let asset = GeneratedAsset::for_slug(&self.asset_dir, slug, self.viewport);

        // The browser writes next to the destination; only a verified image is
        // renamed over it, and the staging file is deleted on every other path.
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{slug}-"))
            .suffix(".png")
            .tempfile_in(&self.asset_dir)?
            .into_temp_path();

        let request = CaptureRequest {
            input: rendered,
            output: staging.to_path_buf(),
            width: self.viewport.width,
            height: self.viewport.height,
            suppress_scrollbars: self.suppress_scrollbars,
        };

        tokio::time::timeout(self.timeout, self.capturer.capture(&request))
            .await
            .map_err(|_| CaptureError::Timeout(self.timeout))??;

        self.verify_image(&staging)?;
        #[cfg(unix)]
        make_publishable(&staging)?;

        staging
            .persist(&asset.file_path)
            .map_err(|err| CaptureError::Io(err.error))?;

        Ok(asset)
    }

    fn verify_image(&self, path: &Path) -> Result<(), CaptureError> {
        let len = std::fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);
        if len == 0 {
            return Err(CaptureError::EmptyOutput(path.to_path_buf()));
        }

        let size = imagesize::size(path).map_err(|err| CaptureError::InvalidImage(err.to_string()))?;
        let (actual_width, actual_height) = (size.width as u64, size.height as u64);
        if actual_width != u64::from(self.viewport.width)
            || actual_height != u64::from(self.viewport.height)
        {
            return Err(CaptureError::Dimensions {
                width: self.viewport.width,
                height: self.viewport.height,
                actual_width,
                actual_height,
            });
        }

        Ok(())
    }
}

/// Staging files are created owner-only; published assets are world-readable.
#[cfg(unix)]
fn make_publishable(path: &Path) -> Result<(), CaptureError> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(ASSET_MODE))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashSet,
        fs,
        sync::atomic::{AtomicUsize, Ordering},
    };
    use tempfile::TempDir;

    fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes
    }

    /// Writes a PNG header of the requested size unless the slug is in `fail`.
    struct FakeBrowser {
        fail: HashSet<String>,
        size: (u32, u32),
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeBrowser {
        fn new(fail: &[&str]) -> Self {
            Self {
                fail: fail.iter().map(|s| s.to_string()).collect(),
                size: (1200, 630),
                delay: Duration::ZERO,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PageCapturer for FakeBrowser {
        async fn capture(&self, request: &CaptureRequest) -> Result<(), CaptureError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let slug = request
                .input
                .parent()
                .and_then(Path::file_name)
                .and_then(|name| name.to_str())
                .unwrap_or_default()
                .to_string();
            if self.fail.contains(&slug) {
                return Err(CaptureError::Browser {
                    exit_code: Some(1),
                    stderr: format!("cannot capture {slug}"),
                });
            }
            fs::write(&request.output, png_header(self.size.0, self.size.1))?;
            Ok(())
        }
    }

    fn projection(slug: &str) -> Projection {
        Projection {
            source_article_slug: slug.to_string(),
            layout_template_id: "og-card.html".to_string(),
            output_relative_path: PathBuf::from("og-cards").join(slug).join("index.html"),
            descriptor_path: PathBuf::from(format!("{slug}.md")),
        }
    }

    fn render_pages(output_root: &Path, slugs: &[&str]) {
        for slug in slugs {
            let dir = output_root.join("og-cards").join(slug);
            fs::create_dir_all(&dir).expect("page dir");
            fs::write(dir.join("index.html"), "<html></html>").expect("page");
        }
    }

    fn leftover_staging_files(asset_dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(asset_dir)
            .expect("asset dir")
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'))
            })
            .collect()
    }

    #[tokio::test]
    async fn failure_for_one_slug_does_not_block_others() {
        let site = TempDir::new().expect("temp dir");
        let output_root = site.path().join("out");
        let asset_dir = site.path().join("static").join("og");
        render_pages(&output_root, &["a", "b", "c"]);

        let driver = CaptureDriver::new(Arc::new(FakeBrowser::new(&["b"])), &asset_dir);
        let ledger = driver
            .capture_all(&[projection("a"), projection("b"), projection("c")], &output_root)
            .await;
        assert_eq!(ledger.len(), 3);

        let (generated, failed) = ledger.into_sorted();
        let ok: Vec<&str> = generated.iter().map(|a| a.slug.as_str()).collect();
        assert_eq!(ok, vec!["a", "c"]);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].slug, "b");

        assert!(asset_dir.join("a.png").exists());
        assert!(!asset_dir.join("b.png").exists());
        assert!(asset_dir.join("c.png").exists());
        assert!(leftover_staging_files(&asset_dir).is_empty());
    }

    #[tokio::test]
    async fn missing_rendered_page_is_a_per_asset_failure() {
        let site = TempDir::new().expect("temp dir");
        let output_root = site.path().join("out");
        let asset_dir = site.path().join("assets");
        render_pages(&output_root, &["a"]);

        let driver = CaptureDriver::new(Arc::new(FakeBrowser::new(&[])), &asset_dir);
        let (generated, failed) = driver
            .capture_all(&[projection("a"), projection("ghost")], &output_root)
            .await
            .into_sorted();

        assert_eq!(generated.len(), 1);
        assert!(matches!(
            failed[0].error,
            CaptureError::MissingRenderedPage(_)
        ));
    }

    #[tokio::test]
    async fn failed_capture_keeps_previous_asset() {
        let site = TempDir::new().expect("temp dir");
        let output_root = site.path().join("out");
        let asset_dir = site.path().join("assets");
        render_pages(&output_root, &["a"]);
        fs::create_dir_all(&asset_dir).expect("asset dir");
        fs::write(asset_dir.join("a.png"), b"previous").expect("existing asset");

        let driver = CaptureDriver::new(Arc::new(FakeBrowser::new(&["a"])), &asset_dir);
        let (_, failed) = driver
            .capture_all(&[projection("a")], &output_root)
            .await
            .into_sorted();

        assert_eq!(failed.len(), 1);
        assert_eq!(fs::read(asset_dir.join("a.png")).expect("asset"), b"previous");
        assert!(leftover_staging_files(&asset_dir).is_empty());
    }

    #[tokio::test]
    async fn successful_capture_overwrites_existing_asset() {
        let site = TempDir::new().expect("temp dir");
        let output_root = site.path().join("out");
        let asset_dir = site.path().join("assets");
        render_pages(&output_root, &["a"]);
        fs::create_dir_all(&asset_dir).expect("asset dir");
        fs::write(asset_dir.join("a.png"), b"stale").expect("existing asset");

        let driver = CaptureDriver::new(Arc::new(FakeBrowser::new(&[])), &asset_dir);
        let (generated, _) = driver
            .capture_all(&[projection("a")], &output_root)
            .await
            .into_sorted();

        assert_eq!(generated[0].file_path, asset_dir.join("a.png"));
        assert_eq!(fs::read(asset_dir.join("a.png")).expect("asset"), png_header(1200, 630));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn published_assets_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let site = TempDir::new().expect("temp dir");
        let output_root = site.path().join("out");
        let asset_dir = site.path().join("assets");
        render_pages(&output_root, &["a", "b"]);
        fs::create_dir_all(&asset_dir).expect("asset dir");
        fs::write(asset_dir.join("a.png"), b"stale").expect("existing asset");
        fs::set_permissions(asset_dir.join("a.png"), fs::Permissions::from_mode(0o644))
            .expect("chmod");

        let driver = CaptureDriver::new(Arc::new(FakeBrowser::new(&[])), &asset_dir);
        let (generated, failed) = driver
            .capture_all(&[projection("a"), projection("b")], &output_root)
            .await
            .into_sorted();

        assert!(failed.is_empty());
        assert_eq!(generated.len(), 2);
        for slug in ["a", "b"] {
            let mode = fs::metadata(asset_dir.join(format!("{slug}.png")))
                .expect("asset")
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o644, "{slug}.png has mode {:o}", mode & 0o777);
        }
    }

    #[tokio::test]
    async fn wrong_dimensions_are_rejected() {
        let site = TempDir::new().expect("temp dir");
        let output_root = site.path().join("out");
        let asset_dir = site.path().join("assets");
        render_pages(&output_root, &["a"]);

        let mut browser = FakeBrowser::new(&[]);
        browser.size = (2400, 1260);
        let driver = CaptureDriver::new(Arc::new(browser), &asset_dir);
        let (_, failed) = driver
            .capture_all(&[projection("a")], &output_root)
            .await
            .into_sorted();

        assert!(matches!(failed[0].error, CaptureError::Dimensions { .. }));
        assert!(!asset_dir.join("a.png").exists());
    }

    #[tokio::test]
    async fn slow_capture_times_out() {
        let site = TempDir::new().expect("temp dir");
        let output_root = site.path().join("out");
        let asset_dir = site.path().join("assets");
        render_pages(&output_root, &["a"]);

        let mut browser = FakeBrowser::new(&[]);
        browser.delay = Duration::from_secs(10);
        let driver = CaptureDriver::new(Arc::new(browser), &asset_dir)
            .with_timeout(Duration::from_millis(20));
        let (_, failed) = driver
            .capture_all(&[projection("a")], &output_root)
            .await
            .into_sorted();

        assert!(matches!(failed[0].error, CaptureError::Timeout(_)));
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let site = TempDir::new().expect("temp dir");
        let output_root = site.path().join("out");
        let asset_dir = site.path().join("assets");
        let slugs = ["a", "b", "c", "d", "e", "f"];
        render_pages(&output_root, &slugs);

        let mut browser = FakeBrowser::new(&[]);
        browser.delay = Duration::from_millis(20);
        let browser = Arc::new(browser);
        let driver = CaptureDriver::new(browser.clone(), &asset_dir).with_concurrency(2);
        let projections: Vec<Projection> = slugs.iter().map(|s| projection(s)).collect();
        let ledger = driver.capture_all(&projections, &output_root).await;

        assert_eq!(ledger.len(), slugs.len());
        assert!(browser.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn unusable_asset_directory_fails_every_slug() {
        let site = TempDir::new().expect("temp dir");
        let output_root = site.path().join("out");
        let blocker = site.path().join("assets");
        fs::write(&blocker, "file").expect("blocker");
        render_pages(&output_root, &["a", "b"]);

        let driver = CaptureDriver::new(Arc::new(FakeBrowser::new(&[])), blocker.join("og"));
        let (generated, failed) = driver
            .capture_all(&[projection("a"), projection("b")], &output_root)
            .await
            .into_sorted();

        assert!(generated.is_empty());
        assert_eq!(failed.len(), 2);
    }
}
