//! The search driver: sample, dispatch, wait for enough results, keep the best.

use chrono::{DateTime, Utc};
use hs_executor::Executor;
use hs_types::{Configuration, HsResult, SearchError, Settings};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::hyperparameter::{ParameterReport, Tunable};
use crate::trial::{PollSummary, SearchPhase, Trial};

/// Unique search run identifier.
pub type SearchId = Uuid;

/// Knobs for one search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Configurations sampled and dispatched.
    pub num_trials: usize,

    /// Results required before the search stops waiting. Trials still
    /// running at that point are abandoned, not cancelled.
    pub num_to_finish: usize,

    pub poll_interval_ms: u64,

    /// Stop polling after this long even if fewer than `num_to_finish`
    /// trials completed. `None` waits indefinitely.
    pub deadline_ms: Option<u64>,

    /// Fixed RNG seed for reproducible sampling.
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            num_trials: 10,
            num_to_finish: 10,
            poll_interval_ms: 1000,
            deadline_ms: None,
            seed: None,
        }
    }
}

impl SearchConfig {
    pub fn new(num_trials: usize, num_to_finish: usize) -> Self {
        Self {
            num_trials,
            num_to_finish,
            ..Self::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(deadline.as_millis() as u64);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        if self.num_trials == 0 {
            return Err(SearchError::NoTrials);
        }
        if self.num_to_finish == 0 || self.num_to_finish > self.num_trials {
            return Err(SearchError::InvalidThreshold {
                num_to_finish: self.num_to_finish,
                num_trials: self.num_trials,
            });
        }
        Ok(())
    }
}

/// Result of a finished search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub id: SearchId,
    /// The winning values of the tuned parameters only.
    pub best: Configuration,
    pub best_objective: f64,
    pub best_trial: usize,
    pub summary: PollSummary,
    pub reports: Vec<ParameterReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Random search over a set of [`Tunable`] parameters.
pub struct HyperParameterSearcher<E: Executor> {
    executor: E,
    config: SearchConfig,
    parameters: Vec<Box<dyn Tunable>>,
    phase: SearchPhase,
}

impl<E: Executor> HyperParameterSearcher<E> {
    pub fn new(executor: E, config: SearchConfig) -> Self {
        Self {
            executor,
            config,
            parameters: Vec::new(),
            phase: SearchPhase::Sampling,
        }
    }

    pub fn with_parameter(mut self, parameter: impl Tunable + 'static) -> Self {
        self.parameters.push(Box::new(parameter));
        self
    }

    pub fn add_parameter(&mut self, parameter: Box<dyn Tunable>) {
        self.parameters.push(parameter);
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    pub fn parameters(&self) -> &[Box<dyn Tunable>] {
        &self.parameters
    }

    fn validate(&self) -> Result<(), SearchError> {
        self.config.validate()?;
        if self.parameters.is_empty() {
            return Err(SearchError::NoParameters);
        }
        let mut seen = HashSet::new();
        for parameter in &self.parameters {
            if !seen.insert(parameter.name()) {
                return Err(SearchError::DuplicateParameter {
                    name: parameter.name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Run the search against `settings`.
    ///
    /// On return `settings` holds the best configuration found. Must be
    /// called inside a tokio runtime.
    pub async fn search(&mut self, settings: &mut Settings) -> HsResult<SearchOutcome> {
        self.validate()?;

        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        info!(
            search = %id,
            executor = self.executor.name(),
            num_trials = self.config.num_trials,
            num_to_finish = self.config.num_to_finish,
            "starting hyperparameter search"
        );

        let mut trials = Vec::with_capacity(self.config.num_trials);
        for number in 0..self.config.num_trials {
            self.phase = SearchPhase::Sampling;
            for parameter in &self.parameters {
                parameter.set(settings, &mut rng)?;
            }
            let configuration = settings.unparse();

            self.phase = SearchPhase::Dispatching;
            debug!(trial = number, %configuration, "dispatching trial");
            let handle = self.executor.execute(configuration.clone());
            trials.push(Trial::new(number, configuration, handle));
        }

        self.phase = SearchPhase::Polling;
        let summary = self.poll(&mut trials).await?;

        self.phase = SearchPhase::Aggregating;
        for trial in &trials {
            // Exceptionally resolved trials carry no trustworthy value.
            let Some(objective) = trial.outcome().and_then(|outcome| outcome.score()) else {
                continue;
            };
            settings.apply(&trial.configuration)?;
            for parameter in &mut self.parameters {
                parameter.accumulate(settings, objective)?;
            }
        }
        let reports: Vec<ParameterReport> =
            self.parameters.iter().map(|p| p.report()).collect();
        for report in &reports {
            for bucket in &report.buckets {
                info!(
                    parameter = %report.name,
                    value = %bucket.value,
                    mean = bucket.mean,
                    std_dev = bucket.std_dev,
                    count = bucket.count,
                    "bucket statistics"
                );
            }
        }

        self.phase = SearchPhase::Selecting;
        let mut best: Option<(&Trial, f64)> = None;
        for trial in &trials {
            let Some(outcome) = trial.outcome() else {
                continue;
            };
            let objective = outcome.objective();
            if best.map_or(true, |(_, top)| objective > top) {
                best = Some((trial, objective));
            }
        }
        let Some((best_trial, best_objective)) = best else {
            return Err(SearchError::NoCompletedTrials {
                deadline_ms: self.config.deadline_ms.unwrap_or_default(),
            }
            .into());
        };
        settings.apply(&best_trial.configuration)?;

        let names: Vec<&str> = self.parameters.iter().map(|p| p.name()).collect();
        let best_configuration = settings.unparse_only(&names)?;
        self.phase = SearchPhase::Committed;

        info!(
            search = %id,
            trial = best_trial.number,
            objective = best_objective,
            best = %best_configuration,
            "search finished"
        );
        Ok(SearchOutcome {
            id,
            best: best_configuration,
            best_objective,
            best_trial: best_trial.number,
            summary,
            reports,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Wait until `num_to_finish` trials have resolved or the deadline passes.
    async fn poll(&self, trials: &mut [Trial]) -> Result<PollSummary, SearchError> {
        let deadline = self
            .config
            .deadline()
            .map(|limit| tokio::time::Instant::now() + limit);

        loop {
            tokio::time::sleep(self.config.poll_interval()).await;
            for trial in trials.iter_mut() {
                trial.refresh().await;
            }

            let summary = PollSummary::collect(trials);
            info!(
                completed = summary.completed,
                dispatched = summary.dispatched,
                failed = summary.failed,
                best = ?summary.best,
                mean = ?summary.finite_mean,
                "{summary}"
            );
            if summary.completed >= self.config.num_to_finish {
                return Ok(summary);
            }

            if deadline.is_some_and(|at| tokio::time::Instant::now() >= at) {
                let deadline_ms = self.config.deadline_ms.unwrap_or_default();
                if summary.completed == 0 {
                    return Err(SearchError::NoCompletedTrials { deadline_ms });
                }
                warn!(
                    deadline_ms,
                    completed = summary.completed,
                    wanted = self.config.num_to_finish,
                    "search deadline passed, continuing with completed trials"
                );
                return Ok(summary);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyperparameter::HyperParameter;
    use crate::sampler::{ContinuousUniform, DiscreteUniform};
    use hs_executor::{TrialHandle, TrialOutcome, FAILED_OBJECTIVE};
    use hs_types::HsError;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Scores `-(x - 0.3)^2`, leaving the listed trial numbers running forever.
    #[derive(Default)]
    struct FakeExecutor {
        stragglers: Vec<usize>,
        failures: Vec<usize>,
        dispatched: Mutex<Vec<(Configuration, f64)>>,
    }

    impl FakeExecutor {
        fn score(configuration: &Configuration) -> f64 {
            let x: f64 = configuration
                .get("x")
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(f64::NAN);
            -(x - 0.3) * (x - 0.3)
        }
    }

    impl Executor for FakeExecutor {
        fn execute(&self, configuration: Configuration) -> TrialHandle {
            let mut dispatched = self.dispatched.lock();
            let number = dispatched.len();
            let score = if self.failures.contains(&number) {
                FAILED_OBJECTIVE
            } else {
                Self::score(&configuration)
            };
            dispatched.push((configuration, score));
            if self.stragglers.contains(&number) {
                TrialHandle::spawn(std::future::pending())
            } else {
                TrialHandle::ready(TrialOutcome::Score(score))
            }
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn registry() -> Settings {
        let mut settings = Settings::new();
        settings.register("x", 0.0_f64).unwrap();
        settings.register("depth", 2_i64).unwrap();
        settings.register("name", "run".to_string()).unwrap();
        settings
    }

    fn fast(num_trials: usize, num_to_finish: usize) -> SearchConfig {
        SearchConfig::new(num_trials, num_to_finish)
            .with_poll_interval(Duration::from_millis(5))
            .with_seed(11)
    }

    fn x_parameter(settings: &Settings) -> HyperParameter<f64> {
        HyperParameter::new(settings, "x", ContinuousUniform::new(0.0, 1.0, 10).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn stops_at_threshold_and_picks_best_completed() {
        let mut settings = registry();
        let executor = Arc::new(FakeExecutor {
            stragglers: vec![1, 3],
            ..Default::default()
        });
        let mut searcher = HyperParameterSearcher::new(Arc::clone(&executor), fast(5, 3))
            .with_parameter(x_parameter(&settings));

        let outcome = searcher.search(&mut settings).await.unwrap();

        let dispatched = executor.dispatched.lock().clone();
        assert_eq!(dispatched.len(), 5);
        let expected = [0, 2, 4]
            .iter()
            .map(|&i| dispatched[i].1)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(outcome.best_objective, expected);
        assert!(![1, 3].contains(&outcome.best_trial));
        assert_eq!(outcome.summary.completed, 3);
        assert_eq!(outcome.summary.dispatched, 5);
        assert_eq!(searcher.phase(), SearchPhase::Committed);

        // Only tuned parameters are returned, and the registry holds the winner.
        assert_eq!(outcome.best.len(), 1);
        let winner = &dispatched[outcome.best_trial].0;
        assert_eq!(outcome.best.get("x"), winner.get("x"));
        assert_eq!(settings.unparse(), *winner);
    }

    #[tokio::test]
    async fn failures_are_counted_but_not_averaged() {
        let mut settings = registry();
        let executor = Arc::new(FakeExecutor {
            failures: vec![0, 2],
            ..Default::default()
        });
        let mut searcher = HyperParameterSearcher::new(Arc::clone(&executor), fast(4, 4))
            .with_parameter(x_parameter(&settings));

        let outcome = searcher.search(&mut settings).await.unwrap();
        assert_eq!(outcome.summary.failed, 2);
        assert!(outcome.best_objective.is_finite());

        let dispatched = executor.dispatched.lock().clone();
        let mean = (dispatched[1].1 + dispatched[3].1) / 2.0;
        let reported = outcome.summary.finite_mean.unwrap();
        assert!((reported - mean).abs() < 1e-12);

        // Failed trials still land in the bucket statistics.
        let counted: u64 = outcome.reports[0].buckets.iter().map(|b| b.count).sum();
        assert_eq!(counted, 4);
    }

    #[tokio::test]
    async fn exceptional_trials_are_not_accumulated() {
        struct Malformed;
        impl Executor for Malformed {
            fn execute(&self, configuration: Configuration) -> TrialHandle {
                if configuration.get("depth") == Some("1") {
                    TrialHandle::ready(TrialOutcome::Failed("garbage".into()))
                } else {
                    TrialHandle::ready(TrialOutcome::Score(1.0))
                }
            }
            fn name(&self) -> &str {
                "malformed"
            }
        }

        let mut settings = registry();
        let depth = HyperParameter::new(&settings, "depth", DiscreteUniform::new(vec![1, 2]).unwrap())
            .unwrap();
        let mut searcher = HyperParameterSearcher::new(Malformed, fast(20, 20)).with_parameter(depth);

        let outcome = searcher.search(&mut settings).await.unwrap();
        assert_eq!(outcome.best_objective, 1.0);
        assert_eq!(outcome.best.get("depth"), Some("2"));
        let report = &outcome.reports[0];
        assert!(report.buckets.iter().all(|b| b.value == "2"));
    }

    #[tokio::test]
    async fn setup_errors_fail_before_dispatch() {
        let settings = registry();
        let executor = Arc::new(FakeExecutor::default());

        let cases = [
            (fast(3, 4), SearchError::InvalidThreshold { num_to_finish: 4, num_trials: 3 }),
            (fast(3, 0), SearchError::InvalidThreshold { num_to_finish: 0, num_trials: 3 }),
            (fast(0, 0), SearchError::NoTrials),
        ];
        for (config, expected) in cases {
            let mut searcher = HyperParameterSearcher::new(Arc::clone(&executor), config)
                .with_parameter(x_parameter(&settings));
            let mut settings = settings.clone();
            match searcher.search(&mut settings).await {
                Err(HsError::Search(err)) => assert_eq!(err, expected),
                other => panic!("unexpected result: {other:?}"),
            }
        }

        let mut searcher = HyperParameterSearcher::new(Arc::clone(&executor), fast(3, 1));
        let mut registry = settings.clone();
        assert!(matches!(
            searcher.search(&mut registry).await,
            Err(HsError::Search(SearchError::NoParameters))
        ));

        let mut searcher = HyperParameterSearcher::new(Arc::clone(&executor), fast(3, 1))
            .with_parameter(x_parameter(&settings))
            .with_parameter(x_parameter(&settings));
        assert!(matches!(
            searcher.search(&mut registry).await,
            Err(HsError::Search(SearchError::DuplicateParameter { .. }))
        ));

        assert!(executor.dispatched.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_proceeds_with_completed_trials() {
        let mut settings = registry();
        let executor = Arc::new(FakeExecutor {
            stragglers: vec![0, 1, 2],
            ..Default::default()
        });
        let config = SearchConfig::new(4, 4)
            .with_poll_interval(Duration::from_millis(100))
            .with_deadline(Duration::from_secs(2));
        let mut searcher =
            HyperParameterSearcher::new(Arc::clone(&executor), config).with_parameter(x_parameter(&settings));

        let outcome = searcher.search(&mut settings).await.unwrap();
        assert_eq!(outcome.best_trial, 3);
        assert_eq!(outcome.summary.completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_with_nothing_completed_is_an_error() {
        let mut settings = registry();
        let executor = Arc::new(FakeExecutor {
            stragglers: vec![0, 1],
            ..Default::default()
        });
        let config = SearchConfig::new(2, 1)
            .with_poll_interval(Duration::from_millis(100))
            .with_deadline(Duration::from_secs(1));
        let mut searcher =
            HyperParameterSearcher::new(executor, config).with_parameter(x_parameter(&settings));

        assert!(matches!(
            searcher.search(&mut settings).await,
            Err(HsError::Search(SearchError::NoCompletedTrials { deadline_ms: 1_000 }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_deadline_is_not_truncated() {
        let mut settings = registry();
        let executor = Arc::new(FakeExecutor {
            stragglers: vec![0],
            ..Default::default()
        });
        let config = SearchConfig::new(1, 1)
            .with_poll_interval(Duration::from_millis(50))
            .with_deadline(Duration::from_millis(400));
        assert_eq!(config.deadline(), Some(Duration::from_millis(400)));
        let mut searcher =
            HyperParameterSearcher::new(executor, config).with_parameter(x_parameter(&settings));

        let started = tokio::time::Instant::now();
        assert!(matches!(
            searcher.search(&mut settings).await,
            Err(HsError::Search(SearchError::NoCompletedTrials { deadline_ms: 400 }))
        ));
        assert!(started.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn seeded_searches_sample_the_same_configurations() {
        let run = || async {
            let mut settings = registry();
            let executor = Arc::new(FakeExecutor::default());
            let mut searcher = HyperParameterSearcher::new(Arc::clone(&executor), fast(4, 4))
                .with_parameter(x_parameter(&settings));
            searcher.search(&mut settings).await.unwrap();
            let dispatched = executor.dispatched.lock().clone();
            dispatched.into_iter().map(|(c, _)| c).collect::<Vec<_>>()
        };
        assert_eq!(run().await, run().await);
    }

    #[test]
    fn config_serde_defaults() {
        let config: SearchConfig =
            serde_json::from_str(r#"{"num_trials": 8, "num_to_finish": 6}"#).unwrap();
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.deadline_ms, None);
        assert!(config.validate().is_ok());
    }
}
