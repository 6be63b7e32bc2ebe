//! Search jobs loaded from JSON: settings to declare, what to tune, where to run.

use hs_executor::{Executor, InProcessExecutor, JobQueueConfig, QSubExecutor, RemoteClusterConfig, RemoteExecutor};
use hs_types::{config_error, EntryPointRegistry, HsResult, SettingValue, Settings};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::search::{HyperParameterSearcher, SearchConfig, SearchOutcome};
use crate::space::{ParameterKind, SearchSpace};

/// One setting to register before the search starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingDecl {
    pub name: String,
    pub default: SettingValue,
}

/// Where trials are evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Backend {
    /// Evaluate a registered entry point on the local blocking pool.
    InProcess { entry_point: String },
    /// Submit each trial to a batch queue through `qsub`.
    JobQueue(JobQueueConfig),
    /// Dispatch trials to a pool of ssh workers.
    Remote(RemoteClusterConfig),
}

impl Default for Backend {
    fn default() -> Self {
        Self::InProcess {
            entry_point: "quadratic".to_string(),
        }
    }
}

impl Backend {
    pub fn executor(&self, registry: &EntryPointRegistry) -> HsResult<Box<dyn Executor>> {
        let executor: Box<dyn Executor> = match self {
            Self::InProcess { entry_point } => {
                Box::new(InProcessExecutor::from_registry(registry, entry_point)?)
            }
            Self::JobQueue(config) => Box::new(QSubExecutor::qsub(config.clone())?),
            Self::Remote(cluster) => Box::new(RemoteExecutor::spawn(cluster.clone())?),
        };
        Ok(executor)
    }
}

/// A complete, serializable search description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchJob {
    #[serde(default)]
    pub search: SearchConfig,
    pub settings: Vec<SettingDecl>,
    pub space: SearchSpace,
    #[serde(default)]
    pub backend: Backend,
}

impl SearchJob {
    pub fn from_json_file(path: impl AsRef<Path>) -> HsResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|err| config_error!("cannot read job file {}: {err}", path.display()))?;
        let job = serde_json::from_str(&raw)?;
        Ok(job)
    }

    /// Registry with every declared setting at its default.
    ///
    /// JSON has no separate float syntax for whole numbers, so an integer
    /// default is widened when the space samples that setting continuously.
    pub fn settings(&self) -> HsResult<Settings> {
        let mut settings = Settings::new();
        for decl in &self.settings {
            let continuous = self
                .space
                .parameter(&decl.name)
                .is_some_and(|def| needs_float(&def.kind));
            let name = decl.name.as_str();
            match (&decl.default, continuous) {
                (SettingValue::Int(v), true) => settings.register(name, *v as f64).map(drop),
                (SettingValue::Int(v), false) => settings.register(name, *v).map(drop),
                (SettingValue::Bool(v), _) => settings.register(name, *v).map(drop),
                (SettingValue::Float(v), _) => settings.register(name, *v).map(drop),
                (SettingValue::Text(v), _) => settings.register(name, v.clone()).map(drop),
            }?;
        }
        Ok(settings)
    }

    /// Run the search; `settings` ends up holding the best configuration.
    pub async fn run(
        &self,
        settings: &mut Settings,
        registry: &EntryPointRegistry,
    ) -> HsResult<SearchOutcome> {
        let executor = self.backend.executor(registry)?;
        let mut searcher = HyperParameterSearcher::new(executor, self.search.clone());
        for parameter in self.space.build(settings)? {
            searcher.add_parameter(parameter);
        }
        info!(
            parameters = self.space.len(),
            settings = settings.len(),
            "search job loaded"
        );
        searcher.search(settings).await
    }
}

fn needs_float(kind: &ParameterKind) -> bool {
    match kind {
        ParameterKind::Choice { values } | ParameterKind::WeightedChoice { values, .. } => values
            .iter()
            .any(|value| matches!(value, SettingValue::Float(_))),
        other => other.is_continuous(),
    }
}
