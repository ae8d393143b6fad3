//! Scratch area lifecycle.
//!
//! A [`ScratchArea`] owns every transient path of a run: the projection
//! directory inside the renderer's content tree and the directory the
//! renderer writes its HTML into. Both are removed by [`ScratchArea::remove`]
//! at the end of a run and, failing that, by `Drop` when the owning future is
//! cancelled or unwinds.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::application::error::PipelineError;

const RENDER_OUTPUT_PREFIX: &str = "ogcard-render-";
/// Dropped into every projection directory; only marked directories are
/// ever replaced.
pub const SCRATCH_MARKER: &str = ".ogcard-scratch";

#[derive(Debug)]
pub struct ScratchArea {
    projection_root: PathBuf,
    output_root: PathBuf,
    released: bool,
}

impl ScratchArea {
    /// Create the scratch area. A projection directory left behind by an
    /// earlier, killed run is removed first; an unmarked one is refused.
    pub fn create(projection_root: &Path) -> Result<Self, PipelineError> {
        match fs::symlink_metadata(projection_root) {
            Ok(_) if !projection_root.join(SCRATCH_MARKER).is_file() => {
                return Err(PipelineError::scratch_write(
                    projection_root,
                    io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        "path exists and was not created by ogcard",
                    ),
                ));
            }
            Ok(_) => {
                warn!(
                    target = "ogcard::scratch",
                    op = "scratch::create",
                    path = %projection_root.display(),
                    "Removing stale scratch area from an earlier run"
                );
                remove_tree(projection_root)
                    .map_err(|err| PipelineError::scratch_write(projection_root, err))?;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(PipelineError::scratch_write(projection_root, err)),
        }

        // Only the section itself is created; the content tree must exist.
        fs::create_dir(projection_root)
            .map_err(|err| PipelineError::scratch_write(projection_root, err))?;
        if let Err(err) = fs::write(projection_root.join(SCRATCH_MARKER), b"") {
            let _ = remove_tree(projection_root);
            return Err(PipelineError::scratch_write(projection_root, err));
        }

        let output_root = match tempfile::Builder::new()
            .prefix(RENDER_OUTPUT_PREFIX)
            .tempdir()
        {
            Ok(dir) => dir.keep(),
            Err(err) => {
                let _ = remove_tree(projection_root);
                return Err(PipelineError::scratch_write(projection_root, err));
            }
        };

        debug!(
            target = "ogcard::scratch",
            op = "scratch::create",
            projection_root = %projection_root.display(),
            output_root = %output_root.display(),
            "Scratch area created"
        );

        Ok(Self {
            projection_root: projection_root.to_path_buf(),
            output_root,
            released: false,
        })
    }

    /// Directory holding projection descriptors, visible to the renderer.
    pub fn projection_root(&self) -> &Path {
        &self.projection_root
    }

    /// Directory the renderer writes its HTML output into.
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Remove every path owned by the scratch area.
    pub fn remove(mut self) -> Result<(), PipelineError> {
        self.released = true;
        let projection = remove_tree(&self.projection_root)
            .map_err(|err| PipelineError::ScratchCleanup {
                path: self.projection_root.clone(),
                source: err,
            });
        let output = remove_tree(&self.output_root).map_err(|err| PipelineError::ScratchCleanup {
            path: self.output_root.clone(),
            source: err,
        });
        debug!(
            target = "ogcard::scratch",
            op = "scratch::remove",
            projection_root = %self.projection_root.display(),
            output_root = %self.output_root.display(),
            "Scratch area removed"
        );
        projection.and(output)
    }
}

impl Drop for ScratchArea {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        for path in [&self.projection_root, &self.output_root] {
            if let Err(err) = remove_tree(path) {
                warn!(
                    target = "ogcard::scratch",
                    op = "scratch::drop",
                    path = %path.display(),
                    error = %err,
                    "Failed to remove scratch area on drop"
                );
            }
        }
    }
}

fn remove_tree(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(err) => Err(err),
    };
    match result {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
