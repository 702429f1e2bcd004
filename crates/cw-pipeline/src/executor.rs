//! Job executor: probes, plans, and runs one engine invocation per job.
//!
//! A job moves `Pending -> Running -> Succeeded | Failed`. Everything that
//! can be checked without the engine (missing files, unreadable clips,
//! missing audio) fails the job before any process is spawned. The engine
//! writes into a staging [`Workspace`]; only a non-empty file is promoted to
//! the output path.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cw_av::{FfprobeProber, Prober, RunOutcome, ToolRegistry, Workspace};
use cw_core::config::MergeConfig;
use cw_core::events::{EventBus, EventPayload};
use cw_core::{ClipRef, Error, JobId, Result};
use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::classify::{classify_diagnostic, diagnostic_excerpt};
use crate::graph::{GraphBuilder, ProcessingGraph};
use crate::invocation::EngineInvocation;
use crate::job::Job;
use crate::normalize::{normalize, NormalizationPlan, ProbedClip};
use crate::registry::{JobRegistry, OutputLease};

/// Finished jobs kept for [`JobExecutor::status`] before the oldest are
/// evicted.
pub const MAX_RETAINED_JOBS: usize = 256;

/// Everything a job would do, computed without running the engine.
#[derive(Debug, Clone, Serialize)]
pub struct MergePlan {
    pub clips: Vec<ClipRef>,
    pub plans: Vec<NormalizationPlan>,
    pub graph: ProcessingGraph,
    /// Rendered `-filter_complex` argument.
    pub filter_graph: String,
    /// Full engine argument list, targeting the real output path.
    pub args: Vec<String>,
}

/// Runs merge jobs against one engine binary.
pub struct JobExecutor {
    engine: PathBuf,
    prober: Arc<dyn Prober>,
    config: MergeConfig,
    registry: JobRegistry,
    events: Arc<EventBus>,
    jobs: RwLock<JobTable>,
}

/// Known jobs plus the order in which they finished.
#[derive(Debug)]
struct JobTable {
    jobs: HashMap<JobId, Job>,
    finished: VecDeque<JobId>,
    limit: usize,
}

impl JobTable {
    fn new(limit: usize) -> Self {
        Self {
            jobs: HashMap::new(),
            finished: VecDeque::new(),
            limit,
        }
    }

    fn insert(&mut self, job: &Job) {
        self.jobs.insert(job.id, job.clone());
        if !job.is_terminal() || self.finished.contains(&job.id) {
            return;
        }
        self.finished.push_back(job.id);
        while self.finished.len() > self.limit {
            if let Some(old) = self.finished.pop_front() {
                self.jobs.remove(&old);
            }
        }
    }
}

impl JobExecutor {
    pub fn new(engine: PathBuf, prober: Arc<dyn Prober>, config: MergeConfig) -> Self {
        Self {
            engine,
            prober,
            config,
            registry: JobRegistry::new(),
            events: Arc::new(EventBus::default()),
            jobs: RwLock::new(JobTable::new(MAX_RETAINED_JOBS)),
        }
    }

    /// Build an executor from discovered tools (ffmpeg and ffprobe).
    pub fn from_tools(tools: &ToolRegistry, config: MergeConfig) -> Result<Self> {
        let engine = tools.require("ffmpeg")?.to_path_buf();
        let prober = FfprobeProber::new(tools.require("ffprobe")?.to_path_buf());
        Ok(Self::new(engine, Arc::new(prober), config))
    }

    /// Share an existing event bus instead of a private one.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Keep at most `n` finished jobs for [`status`](Self::status).
    /// Running jobs are never evicted.
    pub fn with_job_retention(mut self, n: usize) -> Self {
        self.jobs = RwLock::new(JobTable::new(n));
        self
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// Run a job to completion.
    ///
    /// `Err` means the request itself was rejected (no inputs, or another
    /// job is writing `output`). Every other failure is reported in the
    /// returned job's state.
    pub async fn run(&self, inputs: Vec<PathBuf>, output: &Path) -> Result<Job> {
        let cancel = CancellationToken::new();
        let (job, lease) = self.submit(inputs, output, cancel.clone())?;
        Ok(self.execute(job, lease, cancel).await)
    }

    /// Start a job in the background and return a handle to it.
    ///
    /// Rejections are reported immediately, before the task is spawned.
    pub fn spawn(self: &Arc<Self>, inputs: Vec<PathBuf>, output: &Path) -> Result<JobHandle> {
        let cancel = CancellationToken::new();
        let (job, lease) = self.submit(inputs, output, cancel.clone())?;
        let id = job.id;

        let this = Arc::clone(self);
        let token = cancel.clone();
        let task = tokio::spawn(async move { this.execute(job, lease, token).await });

        Ok(JobHandle { id, cancel, task })
    }

    /// Probe, normalize, and render a job without running the engine.
    pub async fn plan(&self, inputs: Vec<PathBuf>, output: &Path) -> Result<MergePlan> {
        if inputs.is_empty() {
            return Err(Error::Validation("a merge needs at least one clip".into()));
        }
        let clips = ClipRef::sequence(inputs);
        let probed = self.probe_all(&clips, &CancellationToken::new()).await?;
        let (plans, graph) = self.build_graph(&probed)?;
        let invocation = EngineInvocation::new(&graph, output);

        Ok(MergePlan {
            clips,
            plans,
            filter_graph: graph.render(),
            args: invocation.args().to_vec(),
            graph,
        })
    }

    /// Latest known state of a job. Finished jobs are forgotten once
    /// more than the retention limit have finished after them.
    pub fn status(&self, id: JobId) -> Option<Job> {
        self.jobs.read().jobs.get(&id).cloned()
    }

    /// Request cancellation of a running job. Returns `false` if the job
    /// is unknown or already finished.
    pub fn cancel(&self, id: JobId) -> bool {
        self.registry.cancel(id)
    }

    /// Whether a job is currently writing `output`.
    pub fn is_running(&self, output: &Path) -> bool {
        self.registry.is_running(output)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn submit(
        &self,
        inputs: Vec<PathBuf>,
        output: &Path,
        cancel: CancellationToken,
    ) -> Result<(Job, OutputLease)> {
        if inputs.is_empty() {
            return Err(Error::Validation("a merge needs at least one clip".into()));
        }

        let job = Job::new(ClipRef::sequence(inputs), output.to_path_buf());
        let lease = self.registry.acquire(output, job.id, cancel)?;

        tracing::info!(
            job_id = %job.id,
            clips = job.inputs.len(),
            output = %output.display(),
            "job queued"
        );
        self.store(&job);
        self.events.broadcast(EventPayload::JobQueued {
            job_id: job.id,
            output: job.output_path.clone(),
            clips: job.inputs.len(),
        });

        Ok((job, lease))
    }

    /// Drive a submitted job to a terminal state. The lease is released only
    /// after the terminal state is recorded, even if driving the job panics.
    async fn execute(&self, mut job: Job, lease: OutputLease, cancel: CancellationToken) -> Job {
        let outcome = AssertUnwindSafe(self.drive(&mut job, &cancel))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(Error::Internal(format!(
                    "job panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

        match outcome {
            Ok(bytes) => {
                tracing::info!(job_id = %job.id, bytes, output = %job.output_path.display(), "job succeeded");
                job.succeed(bytes);
                self.events.broadcast(EventPayload::JobSucceeded {
                    job_id: job.id,
                    output: job.output_path.clone(),
                    bytes,
                });
            }
            Err(e) => {
                let category = e.category();
                tracing::warn!(job_id = %job.id, %category, "job failed: {e}");
                job.fail(category, e.to_string());
                self.events.broadcast(EventPayload::JobFailed {
                    job_id: job.id,
                    category,
                    error: e.to_string(),
                });
            }
        }

        self.store(&job);
        drop(lease);
        job
    }

    async fn drive(&self, job: &mut Job, cancel: &CancellationToken) -> Result<u64> {
        let probed = self.probe_all(&job.inputs, cancel).await?;
        let (_, graph) = self.build_graph(&probed)?;

        for warning in &graph.warnings {
            job.warnings.push(warning.clone());
            self.events.broadcast(EventPayload::JobWarning {
                job_id: job.id,
                message: warning.clone(),
            });
        }

        let workspace = Workspace::for_output(&job.output_path)?;
        let invocation = EngineInvocation::new(&graph, &workspace.staging());

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tracing::debug!(job_id = %job.id, "{}", invocation.display(&self.engine));
        job.start();
        self.store(job);
        self.events.broadcast(EventPayload::JobStarted { job_id: job.id });

        let run = invocation
            .command(&self.engine, self.config.timeout())
            .run(cancel)
            .await?;

        tracing::debug!(job_id = %job.id, elapsed = ?run.elapsed, outcome = ?run.outcome, "engine finished");

        match run.outcome {
            RunOutcome::TimedOut(budget) => Err(Error::Timeout(budget)),
            RunOutcome::Cancelled => Err(Error::Cancelled),
            RunOutcome::Exited(status) if !status.success() => {
                let code = status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string());
                Err(Error::engine(
                    classify_diagnostic(&run.stderr),
                    format!("exit {code}: {}", diagnostic_excerpt(&run.stderr)),
                ))
            }
            RunOutcome::Exited(_) => match workspace.staged_size() {
                Some(n) if n > 0 => workspace.finalize(),
                // A clean exit with nothing written; the diagnostics may
                // still say why (a full disk, typically).
                _ => Err(Error::engine(
                    classify_diagnostic(&run.stderr),
                    format!(
                        "engine exited cleanly but produced no output: {}",
                        diagnostic_excerpt(&run.stderr)
                    ),
                )),
            },
        }
    }

    /// Probe every clip in index order. Any failure is attributed to the
    /// offending clip as `ClipUnreadable`.
    async fn probe_all(
        &self,
        clips: &[ClipRef],
        cancel: &CancellationToken,
    ) -> Result<Vec<ProbedClip>> {
        let mut probed = Vec::with_capacity(clips.len());

        for clip in clips {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if !clip.path().is_file() {
                return Err(Error::clip_unreadable(
                    clip.index(),
                    clip.path(),
                    "file not found",
                ));
            }

            let probe = self.prober.probe(clip.path()).await.map_err(|e| {
                Error::clip_unreadable(clip.index(), clip.path(), e.to_string())
            })?;
            tracing::debug!(
                index = clip.index(),
                prober = self.prober.name(),
                width = probe.width,
                height = probe.height,
                has_audio = probe.has_audio,
                "clip probed"
            );
            probed.push(ProbedClip::new(clip.clone(), probe));
        }

        Ok(probed)
    }

    fn build_graph(
        &self,
        probed: &[ProbedClip],
    ) -> Result<(Vec<NormalizationPlan>, ProcessingGraph)> {
        let target = self.config.geometry();
        let plans = probed
            .iter()
            .map(|clip| normalize(target, clip))
            .collect::<Result<Vec<_>>>()?;
        let graph = GraphBuilder::new(&self.config).build(&plans, probed)?;
        Ok((plans, graph))
    }

    fn store(&self, job: &Job) {
        self.jobs.write().insert(job);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// Handle to a job started with [`JobExecutor::spawn`].
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    cancel: CancellationToken,
    task: JoinHandle<Job>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Kill the engine (if running) and fail the job as cancelled.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the job to reach a terminal state.
    pub async fn wait(self) -> Result<Job> {
        self.task
            .await
            .map_err(|e| Error::Internal(format!("job task failed: {e}")))
    }
}
