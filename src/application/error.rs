use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{application::store::StoreError, infra::error::InfraError};

/// Exit status for a run that stopped on a fatal error.
pub const EXIT_FATAL: i32 = 1;
/// Exit status for a run where the render succeeded but one or more captures failed.
pub const EXIT_PARTIAL: i32 = 2;
/// Exit status after SIGINT/SIGTERM.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Fatal pipeline failures. Any of these ends the run after the scratch area
/// has been removed; no asset is written once one is raised.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to write scratch area `{}`: {source}", path.display())]
    ScratchWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("site render failed: {reason}")]
    RenderFailed { reason: String },
    #[error("failed to remove scratch area `{}`: {source}", path.display())]
    ScratchCleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PipelineError {
    pub fn scratch_write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::ScratchWrite {
            path: path.into(),
            source,
        }
    }

    pub fn render_failed(reason: impl Into<String>) -> Self {
        Self::RenderFailed {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("interrupted by {signal}; scratch area removed")]
    Interrupted { signal: &'static str },
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit status reported for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Interrupted { .. } => EXIT_INTERRUPTED,
            AppError::Pipeline(_) | AppError::Infra(_) | AppError::Unexpected(_) => EXIT_FATAL,
        }
    }
}
