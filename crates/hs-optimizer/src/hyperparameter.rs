//! Tunable parameters: a named setting paired with the sampler that drives it.

use hs_types::{HsResult, SettingKey, SettingType, Settings};
use rand::RngCore;
use serde::Serialize;
use std::fmt;

use crate::sampler::{Bucket, ParameterSampler};

/// Statistics for one non-empty bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSummary {
    pub index: usize,
    /// Last value that landed in the bucket, rendered for display.
    pub value: String,
    pub count: u64,
    pub mean: f64,
    pub std_dev: f64,
}

/// Per-bucket outcome report for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterReport {
    pub name: String,
    pub sampler: String,
    pub buckets: Vec<BucketSummary>,
}

impl fmt::Display for ParameterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.name, self.sampler)?;
        for bucket in &self.buckets {
            writeln!(
                f,
                "  {}: mean={} stdDev={} count={}",
                bucket.value, bucket.mean, bucket.std_dev, bucket.count
            )?;
        }
        Ok(())
    }
}

/// Object-safe view of a [`HyperParameter`], so one search can mix types.
pub trait Tunable: Send + Sync {
    fn name(&self) -> &str;

    /// Draw a new value and write it into `settings`.
    fn set(&self, settings: &mut Settings, rng: &mut dyn RngCore) -> HsResult<()>;

    /// Record `objective` against the value currently held in `settings`.
    fn accumulate(&mut self, settings: &Settings, objective: f64) -> HsResult<()>;

    fn report(&self) -> ParameterReport;
}

pub struct HyperParameter<T: SettingType> {
    key: SettingKey<T>,
    sampler: Box<dyn ParameterSampler<T>>,
}

impl<T: SettingType> HyperParameter<T> {
    /// Bind `sampler` to the setting `name`, which must already be registered
    /// with type `T`.
    pub fn new(
        settings: &Settings,
        name: &str,
        sampler: impl ParameterSampler<T> + 'static,
    ) -> HsResult<Self> {
        let key = settings.key::<T>(name)?;
        Ok(Self::from_key(key, sampler))
    }

    pub fn from_key(key: SettingKey<T>, sampler: impl ParameterSampler<T> + 'static) -> Self {
        Self {
            key,
            sampler: Box::new(sampler),
        }
    }

    pub fn key(&self) -> &SettingKey<T> {
        &self.key
    }

    pub fn buckets(&self) -> &[Bucket<T>] {
        self.sampler.buckets()
    }
}

impl<T: SettingType> Tunable for HyperParameter<T> {
    fn name(&self) -> &str {
        self.key.name()
    }

    fn set(&self, settings: &mut Settings, rng: &mut dyn RngCore) -> HsResult<()> {
        let value = self.sampler.sample(rng);
        settings.set(&self.key, value)?;
        Ok(())
    }

    fn accumulate(&mut self, settings: &Settings, objective: f64) -> HsResult<()> {
        let value = settings.get(&self.key)?;
        self.sampler.accumulate(value, objective);
        Ok(())
    }

    fn report(&self) -> ParameterReport {
        let buckets = self
            .sampler
            .buckets()
            .iter()
            .enumerate()
            .filter_map(|(index, bucket)| {
                let mean = bucket.mean()?;
                let std_dev = bucket.std_dev()?;
                let value = bucket
                    .value
                    .clone()
                    .map(|v| v.into_value().to_string())
                    .unwrap_or_default();
                Some(BucketSummary {
                    index,
                    value,
                    count: bucket.count,
                    mean,
                    std_dev,
                })
            })
            .collect();
        ParameterReport {
            name: self.key.name().to_string(),
            sampler: self.sampler.name().to_string(),
            buckets,
        }
    }
}

impl<T: SettingType> fmt::Debug for HyperParameter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperParameter")
            .field("name", &self.key.name())
            .field("sampler", &self.sampler.name())
            .finish()
    }
}
