//! Evaluation entry points: the things being tuned, resolvable by name.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::SlaveError;

/// A function from an argument list to a single objective score (higher is
/// better).
pub trait EntryPoint: Send + Sync {
    fn evaluate(&self, args: &[String]) -> anyhow::Result<f64>;
}

impl<F> EntryPoint for F
where
    F: Fn(&[String]) -> anyhow::Result<f64> + Send + Sync,
{
    fn evaluate(&self, args: &[String]) -> anyhow::Result<f64> {
        self(args)
    }
}

/// Maps string identifiers to entry points, so a slave process can resolve
/// `--className=<id>` without any runtime type inspection.
#[derive(Clone, Default)]
pub struct EntryPointRegistry {
    entries: BTreeMap<String, Arc<dyn EntryPoint>>,
}

impl EntryPointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        entry: impl EntryPoint + 'static,
    ) -> Result<(), SlaveError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(SlaveError::DuplicateEntryPoint { name });
        }
        self.entries.insert(name, Arc::new(entry));
        Ok(())
    }

    pub fn with(
        mut self,
        name: impl Into<String>,
        entry: impl EntryPoint + 'static,
    ) -> Result<Self, SlaveError> {
        self.register(name, entry)?;
        Ok(self)
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn EntryPoint>, SlaveError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| SlaveError::UnknownEntryPoint {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl fmt::Debug for EntryPointRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPointRegistry")
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
