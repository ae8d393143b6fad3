//! Render invoker: one renderer call per run covering the whole site.

use std::{
    io,
    path::PathBuf,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use metrics::histogram;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::error::PipelineError;

/// Inputs to a site render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    /// Root of the site sources; the renderer runs from here.
    pub site_root: PathBuf,
    /// Directory holding the projection descriptors.
    pub scratch_root: PathBuf,
    /// Directory the renderer must write its HTML into.
    pub output_root: PathBuf,
}

/// What the renderer reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    pub output_root: PathBuf,
    pub success: bool,
    /// Tail of the renderer's own output, for failure reports.
    pub diagnostics: String,
}

/// The renderer could not be invoked at all.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer unavailable: {0}")]
    NotFound(io::Error),
    #[error("renderer invocation failed: {0}")]
    Io(io::Error),
}

/// Black-box "render site to static HTML".
#[async_trait]
pub trait SiteRenderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResult, RenderError>;
}

/// Invoke the renderer under `timeout`. Anything but a reported success is a
/// fatal [`PipelineError::RenderFailed`].
pub async fn render_site(
    renderer: &dyn SiteRenderer,
    request: &RenderRequest,
    timeout: Duration,
) -> Result<RenderResult, PipelineError> {
    let started_at = Instant::now();

    let outcome = tokio::time::timeout(timeout, renderer.render(request)).await;
    let elapsed_ms = started_at.elapsed().as_millis() as u64;
    histogram!("ogcard_render_ms").record(elapsed_ms as f64);

    let result = match outcome {
        Err(_) => {
            warn!(
                target = "ogcard::render",
                op = "render::site",
                result = "timeout",
                elapsed_ms,
                timeout_secs = timeout.as_secs(),
                "Renderer timed out"
            );
            return Err(PipelineError::render_failed(format!(
                "renderer timed out after {}s",
                timeout.as_secs()
            )));
        }
        Ok(Err(err)) => {
            warn!(
                target = "ogcard::render",
                op = "render::site",
                result = "error",
                elapsed_ms,
                error = %err,
                "Renderer could not be invoked"
            );
            return Err(PipelineError::render_failed(err.to_string()));
        }
        Ok(Ok(result)) => result,
    };

    if !result.success {
        warn!(
            target = "ogcard::render",
            op = "render::site",
            result = "failed",
            elapsed_ms,
            diagnostics = %result.diagnostics,
            "Renderer reported failure"
        );
        let reason = if result.diagnostics.trim().is_empty() {
            "renderer reported failure".to_string()
        } else {
            format!("renderer reported failure: {}", result.diagnostics.trim())
        };
        return Err(PipelineError::render_failed(reason));
    }

    info!(
        target = "ogcard::render",
        op = "render::site",
        result = "success",
        elapsed_ms,
        output_root = %result.output_root.display(),
        "Site rendered"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        delay: Duration,
        outcome: fn(&RenderRequest) -> Result<RenderResult, RenderError>,
    }

    #[async_trait]
    impl SiteRenderer for Scripted {
        async fn render(&self, request: &RenderRequest) -> Result<RenderResult, RenderError> {
            tokio::time::sleep(self.delay).await;
            (self.outcome)(request)
        }
    }

    fn request() -> RenderRequest {
        RenderRequest {
            site_root: PathBuf::from("site"),
            scratch_root: PathBuf::from("site/content/og-cards"),
            output_root: PathBuf::from("/tmp/out"),
        }
    }

    #[tokio::test]
    async fn successful_render_is_returned() {
        let renderer = Scripted {
            delay: Duration::ZERO,
            outcome: |req| {
                Ok(RenderResult {
                    output_root: req.output_root.clone(),
                    success: true,
                    diagnostics: String::new(),
                })
            },
        };

        let result = render_site(&renderer, &request(), Duration::from_secs(5))
            .await
            .expect("render ok");
        assert_eq!(result.output_root, PathBuf::from("/tmp/out"));
    }

    #[tokio::test]
    async fn reported_failure_is_fatal_with_diagnostics() {
        let renderer = Scripted {
            delay: Duration::ZERO,
            outcome: |req| {
                Ok(RenderResult {
                    output_root: req.output_root.clone(),
                    success: false,
                    diagnostics: "template `og-card.html` not found".to_string(),
                })
            },
        };

        let err = render_site(&renderer, &request(), Duration::from_secs(5))
            .await
            .expect_err("render fails");
        assert!(err.to_string().contains("og-card.html"));
    }

    #[tokio::test]
    async fn invocation_error_is_fatal() {
        let renderer = Scripted {
            delay: Duration::ZERO,
            outcome: |_| {
                Err(RenderError::NotFound(io::Error::new(
                    io::ErrorKind::NotFound,
                    "zola",
                )))
            },
        };

        let err = render_site(&renderer, &request(), Duration::from_secs(5))
            .await
            .expect_err("render fails");
        assert!(matches!(err, PipelineError::RenderFailed { .. }));
    }

    #[tokio::test]
    async fn timeout_is_fatal() {
        let renderer = Scripted {
            delay: Duration::from_secs(10),
            outcome: |req| {
                Ok(RenderResult {
                    output_root: req.output_root.clone(),
                    success: true,
                    diagnostics: String::new(),
                })
            },
        };

        let err = render_site(&renderer, &request(), Duration::from_millis(20))
            .await
            .expect_err("render times out");
        assert!(err.to_string().contains("timed out"));
    }
}
