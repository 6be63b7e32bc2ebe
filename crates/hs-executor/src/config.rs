//! Backend configuration and slave launch commands.

use hs_types::{Configuration, EscapeError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How to start a slave process for one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaveCommand {
    /// Slave program (e.g. `hs-slave`, or a path to it on the worker).
    pub program: String,

    /// Arguments placed before the protocol flags.
    #[serde(default)]
    pub pre_args: Vec<String>,

    /// Entry point identifier passed as `--className`.
    pub entry_point: String,
}

impl SlaveCommand {
    pub fn new(program: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            pre_args: Vec::new(),
            entry_point: entry_point.into(),
        }
    }

    pub fn with_pre_args(mut self, args: Vec<String>) -> Self {
        self.pre_args = args;
        self
    }

    /// Command-line tokens for one trial. `out_file` selects the
    /// batch-queue flavour of the result protocol.
    pub fn tokens(
        &self,
        configuration: &Configuration,
        out_file: Option<&Path>,
    ) -> Result<Vec<String>, EscapeError> {
        let mut tokens = Vec::with_capacity(self.pre_args.len() + 4);
        tokens.push(self.program.clone());
        tokens.extend(self.pre_args.iter().cloned());
        tokens.push(format!("--className={}", self.entry_point));
        tokens.push(format!("--classArgs={}", configuration.escape()?));
        if let Some(path) = out_file {
            tokens.push(format!("--outFile={}", path.display()));
        }
        Ok(tokens)
    }

    /// Shell-ready command line for one trial.
    pub fn render(
        &self,
        configuration: &Configuration,
        out_file: Option<&Path>,
    ) -> Result<String, EscapeError> {
        Ok(shell_join(&self.tokens(configuration, out_file)?))
    }
}

impl Default for SlaveCommand {
    fn default() -> Self {
        Self::new("hs-slave", "quadratic")
    }
}

/// Configuration for the batch-queue backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobQueueConfig {
    /// Directory receiving job scripts, queue logs and output files.
    pub job_dir: PathBuf,

    /// Memory limit per job in GiB (0 = no limit).
    pub memory_gb: u32,

    /// How often to look for a job's output file before giving up.
    pub output_poll_attempts: u32,

    /// Spacing between output checks, in milliseconds.
    pub output_poll_interval_ms: u64,

    pub slave: SlaveCommand,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            job_dir: PathBuf::from("hypersweep-jobs"),
            memory_gb: 4,
            output_poll_attempts: 10,
            output_poll_interval_ms: 1_000,
            slave: SlaveCommand::default(),
        }
    }
}

impl JobQueueConfig {
    pub fn new(job_dir: impl Into<PathBuf>, slave: SlaveCommand) -> Self {
        Self {
            job_dir: job_dir.into(),
            slave,
            ..Self::default()
        }
    }

    pub fn with_memory_gb(mut self, gb: u32) -> Self {
        self.memory_gb = gb;
        self
    }

    pub fn with_output_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.output_poll_attempts = attempts;
        self.output_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn output_poll_interval(&self) -> Duration {
        Duration::from_millis(self.output_poll_interval_ms)
    }
}

/// Which worker of the remote pool receives the next trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchKind {
    /// Every trial goes to the first machine.
    FirstWorker,
    /// Cycle through the machines in order.
    #[default]
    RoundRobin,
    /// Pick a machine uniformly at random.
    Random,
}

/// Configuration for the SSH worker-pool backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteClusterConfig {
    /// Login user on every machine.
    pub user: String,

    /// One worker agent is started per machine.
    pub machines: Vec<String>,

    /// Directory the remote command `cd`s into before launching the slave.
    pub working_dir: String,

    /// Directory receiving per-job stdout/stderr logs. Must be visible to the
    /// master (shared filesystem) since results are read from it.
    pub log_dir: PathBuf,

    /// Milliseconds the master waits for a worker's reply before scoring the
    /// trial as failed.
    pub request_timeout_ms: u64,

    pub dispatch: DispatchKind,

    /// Remote shell program.
    pub ssh_program: String,

    pub slave: SlaveCommand,
}

impl Default for RemoteClusterConfig {
    fn default() -> Self {
        Self {
            user: std::env::var("USER").unwrap_or_else(|_| "hypersweep".to_string()),
            machines: Vec::new(),
            working_dir: ".".to_string(),
            log_dir: PathBuf::from("hypersweep-logs"),
            request_timeout_ms: 3_600_000,
            dispatch: DispatchKind::default(),
            ssh_program: "ssh".to_string(),
            slave: SlaveCommand::default(),
        }
    }
}

impl RemoteClusterConfig {
    pub fn new(user: impl Into<String>, machines: Vec<String>, slave: SlaveCommand) -> Self {
        Self {
            user: user.into(),
            machines,
            slave,
            ..Self::default()
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchKind) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Quote `token` for a POSIX shell if it contains anything beyond a safe set.
pub fn shell_quote(token: &str) -> String {
    let safe = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r"'\''"))
    }
}

pub fn shell_join<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|token| shell_quote(token.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
