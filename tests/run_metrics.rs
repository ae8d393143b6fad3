use std::{collections::HashSet, fs, path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use metrics_util::debugging::DebuggingRecorder;
use ogcard::{
    application::{
        capture::{CaptureError, CaptureRequest, PageCapturer},
        pipeline::{Pipeline, PipelineConfig},
        render::{RenderError, RenderRequest, RenderResult, SiteRenderer},
    },
    domain::articles::Viewport,
    infra::articles::FsArticleStore,
};
use tempfile::TempDir;

struct PageWriter;

#[async_trait]
impl SiteRenderer for PageWriter {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResult, RenderError> {
        for slug in ["a", "b"] {
            let dir = request.output_root.join("og-cards").join(slug);
            fs::create_dir_all(&dir).map_err(RenderError::Io)?;
            fs::write(dir.join("index.html"), "<html></html>").map_err(RenderError::Io)?;
        }
        Ok(RenderResult {
            output_root: request.output_root.clone(),
            success: true,
            diagnostics: String::new(),
        })
    }
}

/// Succeeds for `a` only.
struct PickyBrowser;

#[async_trait]
impl PageCapturer for PickyBrowser {
    async fn capture(&self, request: &CaptureRequest) -> Result<(), CaptureError> {
        let is_a = request
            .input
            .parent()
            .and_then(Path::file_name)
            .is_some_and(|name| name == "a");
        if !is_a {
            return Err(CaptureError::Browser {
                exit_code: Some(1),
                stderr: String::new(),
            });
        }
        let mut png = vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
        png.extend_from_slice(&13u32.to_be_bytes());
        png.extend_from_slice(b"IHDR");
        png.extend_from_slice(&request.width.to_be_bytes());
        png.extend_from_slice(&request.height.to_be_bytes());
        png.extend_from_slice(&[8, 6, 0, 0, 0]);
        fs::write(&request.output, png)?;
        Ok(())
    }
}

#[tokio::test]
async fn run_emits_capture_and_render_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let dir = TempDir::new().expect("temp dir");
    let site = dir.path().to_path_buf();
    fs::create_dir_all(site.join("content/blog")).expect("article store");
    for slug in ["a", "b"] {
        fs::write(
            site.join(format!("content/blog/{slug}.md")),
            format!("+++\ntitle = \"{slug}\"\n[extra]\nog_image = \"og/{slug}.png\"\n+++\n"),
        )
        .expect("article");
    }

    let config = PipelineConfig {
        site_root: site.clone(),
        projection_root: site.join("content/og-cards"),
        section: "og-cards".to_string(),
        card_template: "og-card.html".to_string(),
        asset_dir: site.join("static/og"),
        viewport: Viewport::SOCIAL_CARD,
        suppress_scrollbars: true,
        render_timeout: Duration::from_secs(5),
        capture_timeout: Duration::from_secs(5),
        capture_concurrency: 2,
    };
    let report = Pipeline::new(
        config,
        Arc::new(FsArticleStore::new(site.join("content/blog"))),
        Arc::new(PageWriter),
        Arc::new(PickyBrowser),
    )
    .run()
    .await
    .expect("run completes");
    assert_eq!(report.generated.len(), 1);
    assert_eq!(report.failed.len(), 1);

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();
    let capture_results: HashSet<String> = snapshot
        .iter()
        .filter(|(composite_key, _, _, _)| composite_key.key().name() == "ogcard_capture_total")
        .flat_map(|(composite_key, _, _, _)| {
            composite_key
                .key()
                .labels()
                .filter(|label| label.key() == "result")
                .map(|label| label.value().to_string())
                .collect::<Vec<_>>()
        })
        .collect();

    assert!(names.contains("ogcard_render_ms"), "missing render histogram");
    assert!(names.contains("ogcard_capture_total"), "missing capture counter");
    assert_eq!(
        capture_results,
        HashSet::from(["success".to_string(), "failure".to_string()])
    );
}
