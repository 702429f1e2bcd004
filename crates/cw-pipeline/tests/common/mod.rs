//! Shared test harness for executor integration tests.
//!
//! Provides [`TestHarness`], which owns a temporary directory, a scripted
//! stand-in for the engine, and a [`StubProber`] that answers from a table
//! instead of running ffprobe.

#![allow(dead_code)]

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cw_av::{ClipProbe, Prober};
use cw_core::config::MergeConfig;
use cw_core::JobId;
use cw_pipeline::{JobExecutor, JobState};
use parking_lot::Mutex;
use tempfile::TempDir;

/// Engine script that writes a few bytes to its last argument.
pub const WRITES_OUTPUT: &str = r#"for last; do :; done
printf 'media' > "$last""#;

/// Prober answering from a path -> probe table.
///
/// Unlisted paths are reported as 1280x720 clips with audio. Listed paths
/// mapped to `None` fail to probe.
#[derive(Default)]
pub struct StubProber {
    answers: Mutex<HashMap<PathBuf, Option<ClipProbe>>>,
}

impl StubProber {
    pub fn set(&self, path: &Path, probe: Option<ClipProbe>) {
        self.answers.lock().insert(path.to_path_buf(), probe);
    }
}

#[async_trait]
impl Prober for StubProber {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn probe(&self, path: &Path) -> cw_core::Result<ClipProbe> {
        match self.answers.lock().get(path) {
            Some(Some(probe)) => Ok(probe.clone()),
            Some(None) => Err(cw_core::Error::Probe("moov atom not found".into())),
            None => Ok(ClipProbe::video(1280, 720, Duration::from_secs(2))),
        }
    }
}

pub struct TestHarness {
    pub dir: TempDir,
    pub prober: Arc<StubProber>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create temp dir"),
            prober: Arc::new(StubProber::default()),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Create placeholder clip files and return their paths in order.
    pub fn clips(&self, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = self.path(name);
                std::fs::write(&path, b"clip").expect("failed to write clip");
                path
            })
            .collect()
    }

    /// Write an executable `/bin/sh` script standing in for ffmpeg.
    ///
    /// The script starts by recording its arguments (one per line) to
    /// `<name>.args` and touching `<name>.ran`.
    pub fn engine(&self, name: &str, body: &str) -> PathBuf {
        let path = self.path(name);
        let args = self.path(&format!("{name}.args"));
        let ran = self.path(&format!("{name}.ran"));
        let script = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{}'\ntouch '{}'\n{body}\n",
            args.display(),
            ran.display()
        );
        std::fs::write(&path, script).expect("failed to write engine script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("failed to chmod engine script");
        path
    }

    /// Arguments recorded by the last run of engine `name`.
    pub fn recorded_args(&self, name: &str) -> Vec<String> {
        std::fs::read_to_string(self.path(&format!("{name}.args")))
            .expect("engine did not record arguments")
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn engine_ran(&self, name: &str) -> bool {
        self.path(&format!("{name}.ran")).exists()
    }

    pub fn executor(&self, engine: PathBuf) -> JobExecutor {
        self.executor_with(engine, MergeConfig::default())
    }

    pub fn executor_with(&self, engine: PathBuf, config: MergeConfig) -> JobExecutor {
        let prober: Arc<dyn Prober> = self.prober.clone();
        JobExecutor::new(engine, prober, config)
    }

    /// Leftover staging directories next to outputs.
    pub fn staging_dirs(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.dir.path())
            .expect("failed to list temp dir")
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with(".clipweave-"))
            })
            .collect()
    }
}

/// Poll until the job is `Running`, panicking after a few seconds.
pub async fn wait_until_running(executor: &JobExecutor, id: JobId) {
    for _ in 0..250 {
        if executor
            .status(id)
            .is_some_and(|job| job.state == JobState::Running)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {id} never reached Running");
}
