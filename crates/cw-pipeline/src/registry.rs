//! Per-output-path mutual exclusion.
//!
//! [`JobRegistry`] is the only shared mutable state between jobs: a map from
//! output path to the job currently writing it. [`JobRegistry::acquire`]
//! hands out an [`OutputLease`] that frees the path when dropped, so a job
//! that panics or is aborted still releases its output.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cw_core::{Error, JobId, Result};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct ActiveEntry {
    job_id: JobId,
    cancel: CancellationToken,
}

/// Tracks which output paths are being written.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    active: Arc<Mutex<HashMap<PathBuf, ActiveEntry>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `output` for `job_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JobAlreadyRunning`] if another job holds the path.
    pub fn acquire(
        &self,
        output: &Path,
        job_id: JobId,
        cancel: CancellationToken,
    ) -> Result<OutputLease> {
        let key = output_key(output);
        let mut active = self.active.lock();

        if let Some(existing) = active.get(&key) {
            tracing::debug!(
                output = %key.display(),
                holder = %existing.job_id,
                rejected = %job_id,
                "output path busy"
            );
            return Err(Error::JobAlreadyRunning {
                output: output.to_path_buf(),
            });
        }

        active.insert(key.clone(), ActiveEntry { job_id, cancel });
        Ok(OutputLease {
            registry: Arc::clone(&self.active),
            key,
            job_id,
        })
    }

    /// Whether some job currently holds `output`.
    pub fn is_running(&self, output: &Path) -> bool {
        self.active.lock().contains_key(&output_key(output))
    }

    /// Fire the cancellation token of `job_id`, if it holds a path.
    pub fn cancel(&self, job_id: JobId) -> bool {
        let active = self.active.lock();
        match active.values().find(|e| e.job_id == job_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }
}

/// Exclusive claim on an output path; released on drop.
#[derive(Debug)]
pub struct OutputLease {
    registry: Arc<Mutex<HashMap<PathBuf, ActiveEntry>>>,
    key: PathBuf,
    job_id: JobId,
}

impl OutputLease {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }
}

impl Drop for OutputLease {
    fn drop(&mut self) {
        let mut active = self.registry.lock();
        if active.get(&self.key).is_some_and(|e| e.job_id == self.job_id) {
            active.remove(&self.key);
        }
    }
}

/// Normalize `output` so different spellings of one file share a key.
///
/// The file itself may not exist yet, so only the parent is canonicalized.
fn output_key(output: &Path) -> PathBuf {
    let absolute = std::path::absolute(output).unwrap_or_else(|_| output.to_path_buf());
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or(absolute),
        _ => absolute,
    }
}
