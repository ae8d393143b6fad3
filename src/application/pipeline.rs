//! Pipeline orchestration: store → eligibility → projections → render →
//! capture, with the scratch area bracketing everything after eligibility.

use std::{
    fmt,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
    application::{
        capture::{CaptureDriver, CaptureFailure, PageCapturer},
        eligibility::select_eligible,
        error::{EXIT_PARTIAL, PipelineError},
        projection::ProjectionBuilder,
        render::{RenderRequest, SiteRenderer, render_site},
        scratch::ScratchArea,
        store::ArticleSource,
    },
    config::Settings,
    domain::{
        articles::{Article, GeneratedAsset, Viewport},
        error::DomainError,
    },
};

/// Everything one run needs to know about the filesystem and its limits.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub site_root: PathBuf,
    /// Projection directory inside the renderer's content tree.
    pub projection_root: PathBuf,
    pub section: String,
    pub card_template: String,
    pub asset_dir: PathBuf,
    pub viewport: Viewport,
    pub suppress_scrollbars: bool,
    pub render_timeout: Duration,
    pub capture_timeout: Duration,
    pub capture_concurrency: usize,
}

impl From<&Settings> for PipelineConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            site_root: settings.site.root.clone(),
            projection_root: settings.projection_root(),
            section: settings.projection.section.clone(),
            card_template: settings.projection.template.clone(),
            asset_dir: settings.asset_dir(),
            viewport: Viewport {
                width: settings.browser.width.get(),
                height: settings.browser.height.get(),
            },
            suppress_scrollbars: settings.browser.hide_scrollbars,
            render_timeout: settings.renderer.timeout,
            capture_timeout: settings.browser.timeout,
            capture_concurrency: settings.capture.concurrency.get() as usize,
        }
    }
}

/// Run states, in order. Fatal errors jump straight to `ScratchRemoved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    ScratchCreated,
    Projected,
    Rendered,
    Capturing,
    Done,
    PartiallyFailed,
    ScratchRemoved,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::ScratchCreated => "scratch_created",
            RunPhase::Projected => "projected",
            RunPhase::Rendered => "rendered",
            RunPhase::Capturing => "capturing",
            RunPhase::Done => "done",
            RunPhase::PartiallyFailed => "partially_failed",
            RunPhase::ScratchRemoved => "scratch_removed",
        }
    }
}

/// Final status of a run that was not aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Done,
    PartiallyFailed,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Done => 0,
            RunOutcome::PartiallyFailed => EXIT_PARTIAL,
        }
    }
}

/// Article excluded because its unit could not be read.
#[derive(Debug)]
pub struct SkippedArticle {
    pub slug: String,
    pub error: DomainError,
}

#[derive(Debug, Default)]
pub struct RunReport {
    /// Slugs that asked for a card, ordered.
    pub eligible: Vec<String>,
    pub skipped: Vec<SkippedArticle>,
    pub generated: Vec<GeneratedAsset>,
    pub failed: Vec<CaptureFailure>,
}

impl RunReport {
    pub fn outcome(&self) -> RunOutcome {
        if self.failed.is_empty() {
            RunOutcome::Done
        } else {
            RunOutcome::PartiallyFailed
        }
    }

    /// One-line summary of succeeded and failed slugs.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "generated {} of {} social cards",
            self.generated.len(),
            self.eligible.len()
        )?;
        if !self.generated.is_empty() {
            let ok: Vec<&str> = self.generated.iter().map(|a| a.slug.as_str()).collect();
            write!(f, "; succeeded: {}", ok.join(", "))?;
        }
        if !self.failed.is_empty() {
            let failed: Vec<String> = self
                .failed
                .iter()
                .map(|failure| {
                    format!("{} ({})", failure.slug, single_line(&failure.error.to_string()))
                })
                .collect();
            write!(f, "; failed: {}", failed.join(", "))?;
        }
        if !self.skipped.is_empty() {
            let skipped: Vec<&str> = self.skipped.iter().map(|s| s.slug.as_str()).collect();
            write!(f, "; skipped malformed: {}", skipped.join(", "))?;
        }
        Ok(())
    }
}

/// Longest failure reason kept in the summary, in characters.
const SUMMARY_REASON_MAX_CHARS: usize = 160;

/// Join non-empty lines with ` | ` and cap the length.
fn single_line(text: &str) -> String {
    let joined = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" | ");
    if joined.chars().count() <= SUMMARY_REASON_MAX_CHARS {
        return joined;
    }
    let mut cut: String = joined.chars().take(SUMMARY_REASON_MAX_CHARS).collect();
    cut.push_str("...");
    cut
}

/// One batch run over the article store.
pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn ArticleSource>,
    renderer: Arc<dyn SiteRenderer>,
    capturer: Arc<dyn PageCapturer>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn ArticleSource>,
        renderer: Arc<dyn SiteRenderer>,
        capturer: Arc<dyn PageCapturer>,
    ) -> Self {
        Self {
            config,
            store,
            renderer,
            capturer,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute the run. The scratch area is gone when this returns, whatever
    /// the result; dropping the future mid-run removes it as well.
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let started_at = Instant::now();
        let mut report = RunReport::default();
        let mut phase = RunPhase::Idle;

        let eligible = self.discover(&mut report)?;
        report.eligible = eligible.iter().map(|a| a.slug.clone()).collect();

        if eligible.is_empty() {
            info!(
                target = "ogcard::pipeline",
                op = "pipeline::run",
                result = "nothing_to_do",
                skipped = report.skipped.len(),
                "No article requires a social card"
            );
            return Ok(report);
        }

        let scratch = ScratchArea::create(&self.config.projection_root)?;
        advance(&mut phase, RunPhase::ScratchCreated);

        let staged = self.run_in_scratch(&scratch, &eligible, &mut phase).await;

        let cleanup = scratch.remove();
        advance(&mut phase, RunPhase::ScratchRemoved);

        let (generated, failed) = staged?;
        cleanup?;

        report.generated = generated;
        report.failed = failed;

        info!(
            target = "ogcard::pipeline",
            op = "pipeline::run",
            result = match report.outcome() {
                RunOutcome::Done => "done",
                RunOutcome::PartiallyFailed => "partially_failed",
            },
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            eligible = report.eligible.len(),
            generated = report.generated.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Pipeline run finished"
        );

        Ok(report)
    }

    fn discover(&self, report: &mut RunReport) -> Result<Vec<Article>, PipelineError> {
        let mut articles = Vec::new();
        for item in self.store.list_articles()? {
            match item {
                Ok(article) => articles.push(article),
                Err(error) => {
                    warn!(
                        target = "ogcard::pipeline",
                        op = "pipeline::discover",
                        slug = error.slug(),
                        error = %error,
                        "Skipping article with unreadable metadata"
                    );
                    report.skipped.push(SkippedArticle {
                        slug: error.slug().to_string(),
                        error,
                    });
                }
            }
        }

        let total = articles.len();
        let eligible = select_eligible(articles);
        debug!(
            target = "ogcard::pipeline",
            op = "pipeline::discover",
            total,
            eligible = eligible.len(),
            "Articles discovered"
        );
        Ok(eligible)
    }

    async fn run_in_scratch(
        &self,
        scratch: &ScratchArea,
        eligible: &[Article],
        phase: &mut RunPhase,
    ) -> Result<(Vec<GeneratedAsset>, Vec<CaptureFailure>), PipelineError> {
        let builder = ProjectionBuilder::new(&self.config.section, &self.config.card_template);
        let projections = builder.build(eligible, scratch.projection_root())?;
        advance(phase, RunPhase::Projected);

        let request = RenderRequest {
            site_root: self.config.site_root.clone(),
            scratch_root: scratch.projection_root().to_path_buf(),
            output_root: scratch.output_root().to_path_buf(),
        };
        let rendered =
            render_site(self.renderer.as_ref(), &request, self.config.render_timeout).await?;
        advance(phase, RunPhase::Rendered);

        let driver = CaptureDriver::new(self.capturer.clone(), &self.config.asset_dir)
            .with_viewport(self.config.viewport)
            .with_scrollbars_suppressed(self.config.suppress_scrollbars)
            .with_timeout(self.config.capture_timeout)
            .with_concurrency(self.config.capture_concurrency);
        advance(phase, RunPhase::Capturing);
        let ledger = driver
            .capture_all(&projections, &rendered.output_root)
            .await;
        let (generated, failed) = ledger.into_sorted();

        advance(
            phase,
            if failed.is_empty() {
                RunPhase::Done
            } else {
                RunPhase::PartiallyFailed
            },
        );

        Ok((generated, failed))
    }
}

fn advance(phase: &mut RunPhase, next: RunPhase) {
    debug!(
        target = "ogcard::pipeline",
        op = "pipeline::phase",
        from = phase.as_str(),
        to = next.as_str(),
        "Run phase changed"
    );
    *phase = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn asset(slug: &str) -> GeneratedAsset {
        GeneratedAsset::for_slug(Path::new("static/og"), slug, Viewport::SOCIAL_CARD)
    }

    #[test]
    fn summary_lists_succeeded_and_failed_slugs() {
        let report = RunReport {
            eligible: vec!["a".to_string(), "b".to_string()],
            skipped: Vec::new(),
            generated: vec![asset("a")],
            failed: vec![CaptureFailure {
                slug: "b".to_string(),
                error: crate::application::capture::CaptureError::Timeout(Duration::from_secs(30)),
            }],
        };

        assert_eq!(report.outcome(), RunOutcome::PartiallyFailed);
        assert_eq!(report.outcome().exit_code(), 2);
        assert_eq!(
            report.summary(),
            "generated 1 of 2 social cards; succeeded: a; failed: b (capture timed out after 30s)"
        );
    }

    #[test]
    fn summary_stays_on_one_line_for_multiline_browser_output() {
        let report = RunReport {
            eligible: vec!["b".to_string()],
            skipped: Vec::new(),
            generated: Vec::new(),
            failed: vec![CaptureFailure {
                slug: "b".to_string(),
                error: crate::application::capture::CaptureError::Browser {
                    exit_code: Some(1),
                    stderr: "[0101/ERROR] gpu\nSegmentation fault\r\n".to_string(),
                },
            }],
        };

        let summary = report.summary();
        assert!(!summary.contains('\n'), "summary spans lines: {summary:?}");
        assert!(!summary.contains('\r'));
        assert!(summary.contains("[0101/ERROR] gpu | Segmentation fault"), "{summary}");
    }

    #[test]
    fn long_failure_reason_is_truncated() {
        let line = single_line(&"x".repeat(500));
        assert_eq!(line.chars().count(), SUMMARY_REASON_MAX_CHARS + 3);
        assert!(line.ends_with("..."));
    }

    #[test]
    fn empty_report_is_done() {
        let report = RunReport::default();
        assert_eq!(report.outcome(), RunOutcome::Done);
        assert_eq!(report.outcome().exit_code(), 0);
        assert_eq!(report.summary(), "generated 0 of 0 social cards");
    }
}
