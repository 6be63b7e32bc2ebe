//! # hs-executor
//!
//! Trial execution backends for HyperSweep.
//!
//! Every backend implements [`Executor`]: hand it a [`hs_types::Configuration`],
//! get back a [`TrialHandle`] that resolves to one objective. Three backends
//! are provided: a batch queue ([`JobQueueExecutor`], [`QSubExecutor`]), a
//! pool of ssh worker agents ([`RemoteExecutor`]), and an in-process
//! evaluator ([`InProcessExecutor`]).

mod config;
mod executor;
mod in_process;
mod job_queue;
mod remote;

pub use config::{
    shell_join, shell_quote, DispatchKind, JobQueueConfig, RemoteClusterConfig, SlaveCommand,
};
pub use executor::{Executor, TrialHandle, TrialOutcome, FAILED_OBJECTIVE};
pub use in_process::InProcessExecutor;
pub use job_queue::{JobQueueExecutor, JobRunner, QSub, QSubExecutor, QueuedJob};
pub use remote::{
    CommandLauncher, DispatchPolicy, FirstWorker, RandomWorker, RemoteExecutor, RemoteJob,
    RoundRobin, ShellLauncher,
};
