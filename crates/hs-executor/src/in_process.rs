//! Evaluates trials inside the current process on tokio's blocking pool.

use hs_types::{Configuration, EntryPoint, EntryPointRegistry, HsResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::executor::{Executor, TrialHandle, FAILED_OBJECTIVE};

pub struct InProcessExecutor {
    entry_name: String,
    entry: Arc<dyn EntryPoint>,
    next_id: AtomicU64,
}

impl InProcessExecutor {
    pub fn new(entry_name: impl Into<String>, entry: Arc<dyn EntryPoint>) -> Self {
        Self {
            entry_name: entry_name.into(),
            entry,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn from_registry(registry: &EntryPointRegistry, entry_name: &str) -> HsResult<Self> {
        let entry = registry.resolve(entry_name)?;
        Ok(Self::new(entry_name, entry))
    }

    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }
}

impl Executor for InProcessExecutor {
    fn execute(&self, configuration: Configuration) -> TrialHandle {
        let trial_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let entry = Arc::clone(&self.entry);
        TrialHandle::spawn(async move {
            let evaluated =
                tokio::task::spawn_blocking(move || entry.evaluate(configuration.args())).await;
            let objective = match evaluated {
                Ok(Ok(objective)) => objective,
                Ok(Err(err)) => {
                    warn!(trial = trial_id, error = %err, "evaluation failed");
                    FAILED_OBJECTIVE
                }
                Err(err) => {
                    warn!(trial = trial_id, error = %err, "evaluation panicked");
                    FAILED_OBJECTIVE
                }
            };
            debug!(trial = trial_id, objective, "in-process trial finished");
            Ok(objective)
        })
    }

    fn name(&self) -> &str {
        "in-process"
    }
}
