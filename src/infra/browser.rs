//! Headless browser screenshots through the browser's command line.

use std::{io::ErrorKind, path, time::Instant};

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::{
    application::capture::{CaptureError, CaptureRequest, PageCapturer},
    infra::process::{CommandTemplate, run_process},
};

const HIDE_SCROLLBARS_FLAG: &str = "--hide-scrollbars";

#[derive(Debug, Clone)]
pub struct CommandPageCapturer {
    template: CommandTemplate,
}

impl CommandPageCapturer {
    pub fn new(template: CommandTemplate) -> Self {
        Self { template }
    }

    fn template_for(&self, request: &CaptureRequest) -> CommandTemplate {
        if request.suppress_scrollbars && !self.template.has_flag(HIDE_SCROLLBARS_FLAG) {
            self.template.clone().with_arg_before_last(HIDE_SCROLLBARS_FLAG)
        } else {
            self.template.clone()
        }
    }
}

#[async_trait]
impl PageCapturer for CommandPageCapturer {
    async fn capture(&self, request: &CaptureRequest) -> Result<(), CaptureError> {
        let started_at = Instant::now();

        let absolute_input = path::absolute(&request.input)?;
        let input_url = Url::from_file_path(&absolute_input)
            .map_err(|_| CaptureError::InvalidInput(request.input.clone()))?;
        let input = absolute_input.to_string_lossy().into_owned();
        let output = request.output.to_string_lossy().into_owned();
        let width = request.width.to_string();
        let height = request.height.to_string();

        let command = self.template_for(request).command(&[
            ("input", input.as_str()),
            ("input_url", input_url.as_str()),
            ("output", output.as_str()),
            ("width", width.as_str()),
            ("height", height.as_str()),
        ]);

        let finished = run_process(command).await.map_err(|err| {
            warn!(
                target = "ogcard::infra::browser",
                op = "browser::capture",
                result = "error",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                program = %self.template.program().display(),
                error = %err,
                "Failed to spawn browser"
            );
            if err.kind() == ErrorKind::NotFound {
                CaptureError::NotFound(err)
            } else {
                CaptureError::Io(err)
            }
        })?;

        if !finished.success {
            return Err(CaptureError::Browser {
                exit_code: finished.exit_code,
                stderr: finished.diagnostics(),
            });
        }

        debug!(
            target = "ogcard::infra::browser",
            op = "browser::capture",
            result = "success",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            input = %input,
            "Browser exited"
        );
        Ok(())
    }
}
