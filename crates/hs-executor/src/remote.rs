//! Remote worker pool: one agent per machine, each launching slaves over ssh.
//!
//! Agents are tokio tasks fed through an mpsc mailbox and handle one job at a
//! time. The executor picks an agent through a [`DispatchPolicy`], sends it the
//! job together with a reply channel, and waits for the reply up to the
//! request timeout.

use async_trait::async_trait;
use hs_types::{Configuration, ExecutorError, HsResult};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::{shell_quote, DispatchKind, RemoteClusterConfig};
use crate::executor::{parse_objective, Executor, TrialHandle, FAILED_OBJECTIVE};
use crate::job_queue::stderr_path;

/// One fully rendered remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteJob {
    pub trial_id: u64,
    pub machine: String,
    /// Shell command line, redirections included.
    pub command: String,
    pub log_path: PathBuf,
    pub stderr_path: PathBuf,
}

impl RemoteJob {
    pub fn new(
        cluster: &RemoteClusterConfig,
        machine: &str,
        trial_id: u64,
        configuration: &Configuration,
    ) -> Result<Self, ExecutorError> {
        let log_path = cluster.log_dir.join(format!("job-{trial_id}.log"));
        let stderr_path = stderr_path(&log_path);
        let slave = cluster
            .slave
            .render(configuration, None)
            .map_err(|err| ExecutorError::TaskFailed {
                message: err.to_string(),
            })?;
        let remote = format!("cd {}; {}", shell_quote(&cluster.working_dir), slave);
        let command = format!(
            "{} {}@{} {} > {} 2> {}",
            cluster.ssh_program,
            cluster.user,
            machine,
            shell_quote(&remote),
            shell_quote(&log_path.display().to_string()),
            shell_quote(&stderr_path.display().to_string()),
        );
        Ok(Self {
            trial_id,
            machine: machine.to_string(),
            command,
            log_path,
            stderr_path,
        })
    }
}

/// Runs a remote command to completion.
#[async_trait]
pub trait CommandLauncher: Send + Sync + 'static {
    async fn launch(&self, job: &RemoteJob) -> io::Result<()>;
}

/// Runs the command line through `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellLauncher;

#[async_trait]
impl CommandLauncher for ShellLauncher {
    async fn launch(&self, job: &RemoteJob) -> io::Result<()> {
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&job.command)
            .status()
            .await?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "remote command on {} exited with {status}",
                job.machine
            )))
        }
    }
}

/// Chooses which worker receives the next trial.
pub trait DispatchPolicy: Send + Sync {
    /// Index into the pool; `pool_size` is never zero.
    fn select(&self, pool_size: usize) -> usize;

    fn name(&self) -> &str;
}

/// Sends everything to the first worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstWorker;

impl DispatchPolicy for FirstWorker {
    fn select(&self, _pool_size: usize) -> usize {
        0
    }

    fn name(&self) -> &str {
        "first-worker"
    }
}

#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl DispatchPolicy for RoundRobin {
    fn select(&self, pool_size: usize) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % pool_size
    }

    fn name(&self) -> &str {
        "round-robin"
    }
}

#[derive(Debug)]
pub struct RandomWorker {
    rng: Mutex<StdRng>,
}

impl RandomWorker {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchPolicy for RandomWorker {
    fn select(&self, pool_size: usize) -> usize {
        self.rng.lock().random_range(0..pool_size)
    }

    fn name(&self) -> &str {
        "random"
    }
}

impl DispatchKind {
    pub fn policy(self) -> Box<dyn DispatchPolicy> {
        match self {
            Self::FirstWorker => Box::new(FirstWorker),
            Self::RoundRobin => Box::new(RoundRobin::default()),
            Self::Random => Box::new(RandomWorker::new()),
        }
    }
}

struct ExecuteJob {
    trial_id: u64,
    configuration: Configuration,
    reply: oneshot::Sender<Result<f64, ExecutorError>>,
}

#[derive(Clone)]
struct WorkerAddr {
    machine: String,
    mailbox: mpsc::UnboundedSender<ExecuteJob>,
}

struct WorkerAgent<L> {
    machine: String,
    cluster: Arc<RemoteClusterConfig>,
    launcher: Arc<L>,
}

impl<L: CommandLauncher> WorkerAgent<L> {
    async fn run(self, mut mailbox: mpsc::UnboundedReceiver<ExecuteJob>) {
        debug!(machine = %self.machine, "worker agent started");
        while let Some(job) = mailbox.recv().await {
            let result = self.handle(job.trial_id, &job.configuration).await;
            if job.reply.send(result).is_err() {
                debug!(trial = job.trial_id, "requester gave up; result dropped");
            }
        }
        debug!(machine = %self.machine, "worker agent stopped");
    }

    async fn handle(&self, trial_id: u64, configuration: &Configuration) -> Result<f64, ExecutorError> {
        let job = RemoteJob::new(&self.cluster, &self.machine, trial_id, configuration)?;
        info!(trial = trial_id, machine = %self.machine, "launching remote job");
        if let Err(err) = self.launcher.launch(&job).await {
            warn!(trial = trial_id, machine = %self.machine, error = %err, "remote command failed");
        }
        read_result(&job).await
    }
}

/// Objective from the last non-empty line of the job log.
async fn read_result(job: &RemoteJob) -> Result<f64, ExecutorError> {
    let content = match tokio::fs::read_to_string(&job.log_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err.into()),
    };
    match content.lines().rev().find(|line| !line.trim().is_empty()) {
        Some(last) => parse_objective(job.trial_id, last),
        None => {
            warn!(
                trial = job.trial_id,
                log = %job.log_path.display(),
                "job failed: no output"
            );
            Ok(FAILED_OBJECTIVE)
        }
    }
}

/// Executor backed by a pool of per-machine worker agents.
pub struct RemoteExecutor {
    workers: Vec<WorkerAddr>,
    policy: Box<dyn DispatchPolicy>,
    request_timeout: Duration,
    next_id: AtomicU64,
}

impl RemoteExecutor {
    /// Start one agent per machine using real `ssh`. Must be called inside a
    /// tokio runtime.
    pub fn spawn(cluster: RemoteClusterConfig) -> HsResult<Self> {
        Self::spawn_with(cluster, ShellLauncher)
    }

    pub fn spawn_with<L: CommandLauncher>(cluster: RemoteClusterConfig, launcher: L) -> HsResult<Self> {
        if cluster.machines.is_empty() {
            return Err(ExecutorError::EmptyPool.into());
        }
        std::fs::create_dir_all(&cluster.log_dir)?;

        let policy = cluster.dispatch.policy();
        let request_timeout = cluster.request_timeout();
        let cluster = Arc::new(cluster);
        let launcher = Arc::new(launcher);

        let workers = cluster
            .machines
            .iter()
            .map(|machine| {
                let (mailbox, inbox) = mpsc::unbounded_channel();
                let agent = WorkerAgent {
                    machine: machine.clone(),
                    cluster: Arc::clone(&cluster),
                    launcher: Arc::clone(&launcher),
                };
                tokio::spawn(agent.run(inbox));
                WorkerAddr {
                    machine: machine.clone(),
                    mailbox,
                }
            })
            .collect::<Vec<_>>();

        info!(
            machines = workers.len(),
            dispatch = policy.name(),
            timeout_ms = request_timeout.as_millis() as u64,
            "remote worker pool started"
        );

        Ok(Self {
            workers,
            policy,
            request_timeout,
            next_id: AtomicU64::new(0),
        })
    }

    pub fn with_policy(mut self, policy: impl DispatchPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn machines(&self) -> impl Iterator<Item = &str> {
        self.workers.iter().map(|w| w.machine.as_str())
    }
}

impl Executor for RemoteExecutor {
    fn execute(&self, configuration: Configuration) -> TrialHandle {
        let trial_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let index = self.policy.select(self.workers.len()) % self.workers.len();
        let worker = self.workers[index].clone();
        let timeout = self.request_timeout;

        TrialHandle::spawn(async move {
            let (reply, response) = oneshot::channel();
            let job = ExecuteJob {
                trial_id,
                configuration,
                reply,
            };
            if worker.mailbox.send(job).is_err() {
                return Err(ExecutorError::WorkerUnavailable {
                    worker: worker.machine,
                });
            }
            match tokio::time::timeout(timeout, response).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(ExecutorError::WorkerUnavailable {
                    worker: worker.machine,
                }),
                Err(_) => {
                    warn!(
                        trial = trial_id,
                        machine = %worker.machine,
                        timeout_ms = timeout.as_millis() as u64,
                        "remote job timed out"
                    );
                    Ok(FAILED_OBJECTIVE)
                }
            }
        })
    }

    fn name(&self) -> &str {
        "remote"
    }
}
