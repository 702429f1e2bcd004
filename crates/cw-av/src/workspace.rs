//! Staging workspace for engine output.
//!
//! A [`Workspace`] is a hidden temporary directory created next to the final
//! output path. The engine writes into [`Workspace::staging`]; only
//! [`Workspace::finalize`] moves the file onto the real output path, and only
//! after it has been verified to exist and be non-empty. Dropping a workspace
//! without finalizing deletes whatever partial output the engine left.

use std::path::{Path, PathBuf};

use cw_core::ErrorCategory;
use tempfile::TempDir;

/// Workspace for one job's engine output.
///
/// # Example
///
/// ```no_run
/// use cw_av::Workspace;
///
/// let workspace = Workspace::for_output(std::path::Path::new("/results/merged.mp4")).unwrap();
/// // ... run the engine, writing to workspace.staging() ...
/// let bytes = workspace.finalize().unwrap();
/// ```
#[derive(Debug)]
pub struct Workspace {
    temp_dir: TempDir,
    output_path: PathBuf,
}

impl Workspace {
    /// Create a staging directory beside `output`.
    ///
    /// Staging on the same filesystem as the destination keeps the final
    /// rename atomic. The output's parent directory is created if missing.
    pub fn for_output(output: &Path) -> cw_core::Result<Self> {
        let parent = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        if output.file_name().is_none() {
            return Err(cw_core::Error::Validation(format!(
                "output path has no file name: {}",
                output.display()
            )));
        }

        std::fs::create_dir_all(&parent)?;

        let temp_dir = tempfile::Builder::new()
            .prefix(".clipweave-")
            .tempdir_in(&parent)
            .map_err(|e| {
                cw_core::Error::tool("workspace", format!("failed to create staging dir: {e}"))
            })?;

        Ok(Self {
            temp_dir,
            output_path: output.to_path_buf(),
        })
    }

    /// The final output path.
    pub fn output(&self) -> &Path {
        &self.output_path
    }

    /// Where the engine should write (same file name as the output, so the
    /// engine infers the same container from the extension).
    pub fn staging(&self) -> PathBuf {
        let file_name = self
            .output_path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("output.mp4"));
        self.temp_dir.path().join(file_name)
    }

    /// Path to the staging directory.
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Size of the staged file, or `None` if the engine wrote nothing.
    pub fn staged_size(&self) -> Option<u64> {
        std::fs::metadata(self.staging()).ok().map(|m| m.len())
    }

    /// Promote the staged file onto the output path.
    ///
    /// Returns the size in bytes of the promoted file.
    ///
    /// # Errors
    ///
    /// Returns [`cw_core::Error::Engine`] if the staged file is missing or
    /// empty (the output path is left untouched), or an I/O error if the
    /// move fails.
    pub fn finalize(self) -> cw_core::Result<u64> {
        let staged = self.staging();

        let size = match self.staged_size() {
            None => {
                return Err(cw_core::Error::engine(
                    ErrorCategory::Unknown,
                    format!("engine reported success but wrote no file at {}", staged.display()),
                ));
            }
            Some(0) => {
                return Err(cw_core::Error::engine(
                    ErrorCategory::Unknown,
                    format!("engine reported success but {} is empty", staged.display()),
                ));
            }
            Some(n) => n,
        };

        // Same directory tree, so rename is expected to succeed; fall back
        // to copy+remove for exotic mounts.
        if let Err(rename_err) = std::fs::rename(&staged, &self.output_path) {
            tracing::debug!("rename failed ({rename_err}); copying instead");
            copy_over(&staged, &self.output_path)?;
            let _ = std::fs::remove_file(&staged);
        }

        Ok(size)
    }
}

/// Copy `source` onto `dest` through a sibling temp file, so an interrupted
/// copy never truncates an existing `dest`.
fn copy_over(source: &Path, dest: &Path) -> cw_core::Result<()> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut reader = std::fs::File::open(source)?;
    let mut partial = tempfile::Builder::new()
        .prefix(".clipweave-copy-")
        .tempfile_in(parent)?;
    std::io::copy(&mut reader, partial.as_file_mut())?;
    partial.as_file().sync_all()?;
    partial.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
