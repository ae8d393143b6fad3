//! Static site renderer driven through its command-line interface.

use std::{io::ErrorKind, path::Path, time::Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    application::render::{RenderError, RenderRequest, RenderResult, SiteRenderer},
    infra::process::{CommandTemplate, run_process},
};

/// Runs the renderer from the site root with `{output_dir}`, `{site_root}`
/// and `{scratch_root}` substituted into its arguments.
#[derive(Debug, Clone)]
pub struct CommandSiteRenderer {
    template: CommandTemplate,
}

impl CommandSiteRenderer {
    pub fn new(template: CommandTemplate) -> Self {
        Self { template }
    }
}

#[async_trait]
impl SiteRenderer for CommandSiteRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResult, RenderError> {
        let started_at = Instant::now();
        let output_dir = display(&request.output_root);
        let site_root = display(&request.site_root);
        let scratch_root = display(&request.scratch_root);

        let mut command = self.template.command(&[
            ("output_dir", output_dir.as_str()),
            ("site_root", site_root.as_str()),
            ("scratch_root", scratch_root.as_str()),
        ]);
        command.current_dir(&request.site_root);

        let output = run_process(command).await.map_err(|err| {
            warn!(
                target = "ogcard::infra::renderer",
                op = "renderer::render",
                result = "error",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                program = %self.template.program().display(),
                error = %err,
                "Failed to spawn renderer"
            );
            if err.kind() == ErrorKind::NotFound {
                RenderError::NotFound(err)
            } else {
                RenderError::Io(err)
            }
        })?;

        debug!(
            target = "ogcard::infra::renderer",
            op = "renderer::render",
            success = output.success,
            exit_code = output.exit_code.map(i64::from).unwrap_or(-1),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Renderer exited"
        );

        Ok(RenderResult {
            output_root: request.output_root.clone(),
            success: output.success,
            diagnostics: output.diagnostics(),
        })
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
