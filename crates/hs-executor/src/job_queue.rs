//! Batch-queue backend: write a launch script per trial, submit it, then wait
//! for the slave to drop its result file.

use hs_types::{Configuration, ExecutorError, HsResult};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::JobQueueConfig;
use crate::executor::{parse_objective, Executor, TrialHandle, FAILED_OBJECTIVE};

/// Files belonging to one submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub id: u64,
    pub script_path: PathBuf,
    pub log_path: PathBuf,
    pub out_path: PathBuf,
}

impl QueuedJob {
    fn new(job_dir: &Path, id: u64) -> Self {
        Self {
            id,
            script_path: job_dir.join(format!("job-{id}.sh")),
            log_path: job_dir.join(format!("job-{id}.log")),
            out_path: job_dir.join(format!("job-{id}.out")),
        }
    }
}

/// Submission mechanics for a batch queue.
///
/// `run_job` is called on tokio's blocking pool and may block for as long as
/// the queue needs.
pub trait JobRunner: Send + Sync + 'static {
    fn run_job(&self, job: &QueuedJob) -> io::Result<()>;
}

impl<F> JobRunner for F
where
    F: Fn(&QueuedJob) -> io::Result<()> + Send + Sync + 'static,
{
    fn run_job(&self, job: &QueuedJob) -> io::Result<()> {
        self(job)
    }
}

/// Grid Engine submission via `qsub -sync y`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QSub {
    pub program: String,
    pub memory_gb: u32,
}

impl QSub {
    pub fn new(memory_gb: u32) -> Self {
        Self {
            program: "qsub".to_string(),
            memory_gb,
        }
    }

    pub fn command(&self, job: &QueuedJob) -> Command {
        let mut command = Command::new(&self.program);
        command.args(["-sync", "y", "-V", "-cwd"]);
        if self.memory_gb > 0 {
            command.args(["-l", &format!("mem_free={}G", self.memory_gb)]);
        }
        command
            .arg("-o")
            .arg(&job.log_path)
            .arg("-e")
            .arg(stderr_path(&job.log_path))
            .arg(&job.script_path);
        command
    }
}

impl JobRunner for QSub {
    fn run_job(&self, job: &QueuedJob) -> io::Result<()> {
        let status = self.command(job).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("{} exited with {status}", self.program)))
        }
    }
}

/// Executor that runs every trial as a batch-queue job.
pub struct JobQueueExecutor<R: JobRunner> {
    config: Arc<JobQueueConfig>,
    runner: Arc<R>,
    next_id: AtomicU64,
}

pub type QSubExecutor = JobQueueExecutor<QSub>;

impl QSubExecutor {
    pub fn qsub(config: JobQueueConfig) -> HsResult<Self> {
        let runner = QSub::new(config.memory_gb);
        Self::new(config, runner)
    }
}

impl<R: JobRunner> JobQueueExecutor<R> {
    pub fn new(config: JobQueueConfig, runner: R) -> HsResult<Self> {
        std::fs::create_dir_all(&config.job_dir)?;
        info!(
            job_dir = %config.job_dir.display(),
            memory_gb = config.memory_gb,
            "job queue executor ready"
        );
        Ok(Self {
            config: Arc::new(config),
            runner: Arc::new(runner),
            next_id: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &JobQueueConfig {
        &self.config
    }
}

impl<R: JobRunner> Executor for JobQueueExecutor<R> {
    fn execute(&self, configuration: Configuration) -> TrialHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let config = Arc::clone(&self.config);
        let runner = Arc::clone(&self.runner);
        TrialHandle::spawn(run_queued_trial(id, configuration, config, runner))
    }

    fn name(&self) -> &str {
        "job-queue"
    }
}

async fn run_queued_trial<R: JobRunner>(
    id: u64,
    configuration: Configuration,
    config: Arc<JobQueueConfig>,
    runner: Arc<R>,
) -> Result<f64, ExecutorError> {
    let job = match prepare_job(id, &configuration, &config) {
        Ok(job) => job,
        Err(err) => {
            warn!(job = id, error = %err, "could not prepare job script");
            return Ok(FAILED_OBJECTIVE);
        }
    };

    let submitted = {
        let job = job.clone();
        tokio::task::spawn_blocking(move || runner.run_job(&job)).await
    };
    // Queues occasionally report failure for jobs that did run; the output
    // file is the only source of truth.
    match submitted {
        Ok(Ok(())) => debug!(job = id, "job submission finished"),
        Ok(Err(err)) => warn!(job = id, error = %err, "job submission failed"),
        Err(err) => warn!(job = id, error = %err, "job submission task aborted"),
    }

    match wait_for_output(
        &job.out_path,
        config.output_poll_attempts,
        config.output_poll_interval(),
    )
    .await
    {
        Some(content) => {
            let first = content.lines().next().unwrap_or_default();
            let objective = parse_objective(id, first)?;
            debug!(job = id, objective, "job finished");
            Ok(objective)
        }
        None => {
            let err = ExecutorError::OutputMissing {
                job_id: id,
                path: job.out_path.display().to_string(),
            };
            warn!(
                job = id,
                log = %job.log_path.display(),
                error = %err,
                "job failed"
            );
            Ok(FAILED_OBJECTIVE)
        }
    }
}

fn prepare_job(
    id: u64,
    configuration: &Configuration,
    config: &JobQueueConfig,
) -> Result<QueuedJob, ExecutorError> {
    let job = QueuedJob::new(&config.job_dir, id);
    let command = config
        .slave
        .render(configuration, Some(&job.out_path))
        .map_err(|err| ExecutorError::TaskFailed {
            message: err.to_string(),
        })?;

    // A leftover result from an earlier run with the same id would be read as ours.
    match std::fs::remove_file(&job.out_path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    std::fs::write(&job.script_path, job_script(&command, config.memory_gb))?;
    Ok(job)
}

fn job_script(command: &str, memory_gb: u32) -> String {
    let mut script = String::from("#!/bin/sh\n");
    if memory_gb > 0 {
        let kib = u64::from(memory_gb) * 1024 * 1024;
        script.push_str(&format!("ulimit -v {kib}\n"));
    }
    script.push_str("exec ");
    script.push_str(command);
    script.push('\n');
    script
}

/// Poll `path` until it exists and is non-empty, or the attempts run out.
async fn wait_for_output(path: &Path, attempts: u32, interval: Duration) -> Option<String> {
    for attempt in 0..attempts {
        if let Ok(content) = tokio::fs::read_to_string(path).await {
            if !content.trim().is_empty() {
                return Some(content);
            }
        }
        debug!(path = %path.display(), attempt, "output not ready");
        tokio::time::sleep(interval).await;
    }
    None
}

pub(crate) fn stderr_path(log_path: &Path) -> PathBuf {
    let mut path = log_path.as_os_str().to_owned();
    path.push(".stderr");
    PathBuf::from(path)
}
