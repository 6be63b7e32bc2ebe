//! Trial tracking for a running search.

use chrono::{DateTime, Utc};
use hs_executor::{TrialHandle, TrialOutcome};
use hs_types::Configuration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a search currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchPhase {
    Sampling,
    Dispatching,
    Polling,
    Aggregating,
    Selecting,
    Committed,
}

/// One dispatched configuration and its pending or collected result.
#[derive(Debug)]
pub struct Trial {
    pub number: usize,
    pub configuration: Configuration,
    pub handle: TrialHandle,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Trial {
    pub fn new(number: usize, configuration: Configuration, handle: TrialHandle) -> Self {
        Self {
            number,
            configuration,
            handle,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Collect the result if the trial has finished. Returns whether it has.
    pub async fn refresh(&mut self) -> bool {
        if self.handle.refresh().await.is_some() {
            if self.finished_at.is_none() {
                self.finished_at = Some(Utc::now());
            }
            true
        } else {
            false
        }
    }

    pub fn outcome(&self) -> Option<&TrialOutcome> {
        self.handle.outcome()
    }

    pub fn is_complete(&self) -> bool {
        self.outcome().is_some()
    }

    /// Wall-clock time from dispatch to collection, in milliseconds.
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.created_at).num_milliseconds())
    }
}

/// Snapshot of trial progress, as logged on every poll.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollSummary {
    pub dispatched: usize,
    pub completed: usize,
    /// Completed trials that scored `FAILED_OBJECTIVE` or errored.
    pub failed: usize,
    /// Highest finite score; `None` until one arrives.
    pub best: Option<f64>,
    /// Mean over finite scores; `None` if there are none yet.
    pub finite_mean: Option<f64>,
}

impl PollSummary {
    pub fn collect(trials: &[Trial]) -> Self {
        let mut completed = 0;
        let mut failed = 0;
        let mut best: Option<f64> = None;
        let mut finite_sum = 0.0;
        let mut finite_count = 0usize;

        for outcome in trials.iter().filter_map(Trial::outcome) {
            completed += 1;
            let objective = outcome.objective();
            if outcome.is_failure() {
                failed += 1;
            }
            if objective.is_finite() {
                best = Some(best.map_or(objective, |top| top.max(objective)));
                finite_sum += objective;
                finite_count += 1;
            }
        }

        Self {
            dispatched: trials.len(),
            completed,
            failed,
            best,
            finite_mean: (finite_count > 0).then(|| finite_sum / finite_count as f64),
        }
    }
}

impl fmt::Display for PollSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} complete, {} failed",
            self.completed, self.dispatched, self.failed
        )?;
        match self.best {
            Some(best) => write!(f, ", max {best}")?,
            None => write!(f, ", max n/a")?,
        }
        match self.finite_mean {
            Some(mean) => write!(f, ", mean {mean}"),
            None => write!(f, ", mean n/a"),
        }
    }
}
