//! The "run one trial, return one score" contract shared by every backend.

use hs_types::{Configuration, ExecutorError};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Objective reported for a trial that failed, timed out or never produced output.
pub const FAILED_OBJECTIVE: f64 = f64::NEG_INFINITY;

/// How a trial resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    /// The backend returned a value. `FAILED_OBJECTIVE` is still a value here.
    Score(f64),
    /// The trial task errored (malformed output, dead worker, panic).
    Failed(String),
}

impl TrialOutcome {
    /// Objective used for ranking; exceptional failures rank as `FAILED_OBJECTIVE`.
    pub fn objective(&self) -> f64 {
        match self {
            Self::Score(value) => *value,
            Self::Failed(_) => FAILED_OBJECTIVE,
        }
    }

    /// The value, if the trial resolved without an error.
    pub fn score(&self) -> Option<f64> {
        match self {
            Self::Score(value) => Some(*value),
            Self::Failed(_) => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.objective() == FAILED_OBJECTIVE
    }
}

enum HandleState {
    Pending(JoinHandle<Result<f64, ExecutorError>>),
    Resolved(TrialOutcome),
}

/// Asynchronous handle to one trial's objective.
///
/// Dropping a pending handle detaches the trial; it keeps running.
pub struct TrialHandle {
    state: HandleState,
}

impl TrialHandle {
    /// Run `trial` on its own tokio task. Must be called inside a runtime.
    pub fn spawn<F>(trial: F) -> Self
    where
        F: Future<Output = Result<f64, ExecutorError>> + Send + 'static,
    {
        Self {
            state: HandleState::Pending(tokio::spawn(trial)),
        }
    }

    pub fn ready(outcome: TrialOutcome) -> Self {
        Self {
            state: HandleState::Resolved(outcome),
        }
    }

    /// Whether the trial has finished. Never blocks.
    pub fn is_resolved(&self) -> bool {
        match &self.state {
            HandleState::Pending(handle) => handle.is_finished(),
            HandleState::Resolved(_) => true,
        }
    }

    /// Collect the outcome if the trial has finished; `None` while it runs.
    pub async fn refresh(&mut self) -> Option<&TrialOutcome> {
        if let HandleState::Pending(handle) = &mut self.state {
            if !handle.is_finished() {
                return None;
            }
            let outcome = match handle.await {
                Ok(Ok(value)) => TrialOutcome::Score(value),
                Ok(Err(err)) => TrialOutcome::Failed(err.to_string()),
                Err(join) => TrialOutcome::Failed(format!("trial task aborted: {join}")),
            };
            self.state = HandleState::Resolved(outcome);
        }
        self.outcome()
    }

    /// Outcome collected by a previous [`TrialHandle::refresh`].
    pub fn outcome(&self) -> Option<&TrialOutcome> {
        match &self.state {
            HandleState::Resolved(outcome) => Some(outcome),
            HandleState::Pending(_) => None,
        }
    }

    /// Wait for the trial to finish.
    pub async fn wait(self) -> TrialOutcome {
        match self.state {
            HandleState::Resolved(outcome) => outcome,
            HandleState::Pending(handle) => match handle.await {
                Ok(Ok(value)) => TrialOutcome::Score(value),
                Ok(Err(err)) => TrialOutcome::Failed(err.to_string()),
                Err(join) => TrialOutcome::Failed(format!("trial task aborted: {join}")),
            },
        }
    }
}

impl std::fmt::Debug for TrialHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.state {
            HandleState::Pending(_) => f.write_str("TrialHandle(pending)"),
            HandleState::Resolved(outcome) => write!(f, "TrialHandle({outcome:?})"),
        }
    }
}

/// Dispatches one configuration for evaluation.
///
/// Implementations never fail for an ordinary trial failure: the handle
/// resolves to [`FAILED_OBJECTIVE`] instead.
pub trait Executor: Send + Sync {
    fn execute(&self, configuration: Configuration) -> TrialHandle;

    /// Human-readable backend name.
    fn name(&self) -> &str;
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, configuration: Configuration) -> TrialHandle {
        (**self).execute(configuration)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    fn execute(&self, configuration: Configuration) -> TrialHandle {
        (**self).execute(configuration)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Parse one line of slave output as an objective.
pub(crate) fn parse_objective(job_id: u64, line: &str) -> Result<f64, ExecutorError> {
    line.trim()
        .parse::<f64>()
        .map_err(|_| ExecutorError::MalformedOutput {
            job_id,
            content: line.to_string(),
        })
}
