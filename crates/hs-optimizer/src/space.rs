//! Declarative search spaces, so a search can be described in a job file.

use hs_types::{validation_error, HsResult, SettingType, SettingValue, Settings};
use serde::{Deserialize, Serialize};

use crate::hyperparameter::{HyperParameter, Tunable};
use crate::sampler::{ContinuousUniform, DiscreteUniform, DiscreteWeighted, LogUniform};

fn default_buckets() -> usize {
    10
}

/// How a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Uniform over explicit values.
    Choice { values: Vec<SettingValue> },
    /// Explicit values with categorical weights.
    WeightedChoice {
        values: Vec<SettingValue>,
        weights: Vec<f64>,
    },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Continuous uniform range [low, high).
    Uniform {
        low: f64,
        high: f64,
        #[serde(default = "default_buckets")]
        buckets: usize,
    },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform {
        low: f64,
        high: f64,
        #[serde(default = "default_buckets")]
        buckets: usize,
    },
}

impl ParameterKind {
    /// Whether the parameter needs a float setting.
    pub fn is_continuous(&self) -> bool {
        matches!(self, Self::Uniform { .. } | Self::LogUniform { .. })
    }
}

/// A single tuned setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Name of the setting in the registry.
    pub name: String,
    pub kind: ParameterKind,
}

/// Ordered list of tuned settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(mut self, name: impl Into<String>, kind: ParameterKind) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn add_choice(self, name: impl Into<String>, values: Vec<SettingValue>) -> Self {
        self.add(name, ParameterKind::Choice { values })
    }

    pub fn add_weighted_choice(
        self,
        name: impl Into<String>,
        values: Vec<SettingValue>,
        weights: Vec<f64>,
    ) -> Self {
        self.add(name, ParameterKind::WeightedChoice { values, weights })
    }

    pub fn add_int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(name, ParameterKind::IntRange { low, high })
    }

    pub fn add_uniform(self, name: impl Into<String>, low: f64, high: f64, buckets: usize) -> Self {
        self.add(name, ParameterKind::Uniform { low, high, buckets })
    }

    pub fn add_log_uniform(
        self,
        name: impl Into<String>,
        low: f64,
        high: f64,
        buckets: usize,
    ) -> Self {
        self.add(name, ParameterKind::LogUniform { low, high, buckets })
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Find the definition for `name`.
    pub fn parameter(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Bind every definition to its setting in `settings`.
    pub fn build(&self, settings: &Settings) -> HsResult<Vec<Box<dyn Tunable>>> {
        self.parameters
            .iter()
            .map(|def| build_parameter(def, settings))
            .collect()
    }
}

fn build_parameter(def: &ParameterDef, settings: &Settings) -> HsResult<Box<dyn Tunable>> {
    let name = def.name.as_str();
    let parameter: Box<dyn Tunable> = match &def.kind {
        ParameterKind::Uniform { low, high, buckets } => Box::new(HyperParameter::<f64>::new(
            settings,
            name,
            ContinuousUniform::new(*low, *high, *buckets)?,
        )?),
        ParameterKind::LogUniform { low, high, buckets } => Box::new(HyperParameter::<f64>::new(
            settings,
            name,
            LogUniform::new(*low, *high, *buckets)?,
        )?),
        ParameterKind::IntRange { low, high } => Box::new(HyperParameter::<i64>::new(
            settings,
            name,
            DiscreteUniform::int_range(*low, *high)?,
        )?),
        ParameterKind::Choice { values } => match settings.value(name)? {
            SettingValue::Bool(_) => choice::<bool>(settings, name, values)?,
            SettingValue::Int(_) => choice::<i64>(settings, name, values)?,
            SettingValue::Float(_) => choice::<f64>(settings, name, values)?,
            SettingValue::Text(_) => choice::<String>(settings, name, values)?,
        },
        ParameterKind::WeightedChoice { values, weights } => match settings.value(name)? {
            SettingValue::Bool(_) => weighted::<bool>(settings, name, values, weights)?,
            SettingValue::Int(_) => weighted::<i64>(settings, name, values, weights)?,
            SettingValue::Float(_) => weighted::<f64>(settings, name, values, weights)?,
            SettingValue::Text(_) => weighted::<String>(settings, name, values, weights)?,
        },
    };
    Ok(parameter)
}

fn choice<T: SettingType + PartialEq>(
    settings: &Settings,
    name: &str,
    values: &[SettingValue],
) -> HsResult<Box<dyn Tunable>> {
    let values = typed_values::<T>(name, values)?;
    Ok(Box::new(HyperParameter::<T>::new(
        settings,
        name,
        DiscreteUniform::new(values)?,
    )?))
}

fn weighted<T: SettingType + PartialEq>(
    settings: &Settings,
    name: &str,
    values: &[SettingValue],
    weights: &[f64],
) -> HsResult<Box<dyn Tunable>> {
    let values = typed_values::<T>(name, values)?;
    Ok(Box::new(HyperParameter::<T>::new(
        settings,
        name,
        DiscreteWeighted::new(values, weights.to_vec())?,
    )?))
}

/// Convert JSON-ish values to the setting's type. Integers widen to floats.
fn typed_values<T: SettingType>(name: &str, values: &[SettingValue]) -> HsResult<Vec<T>> {
    values
        .iter()
        .map(|value| {
            let widened = match value {
                SettingValue::Int(i) if T::TYPE_NAME == f64::TYPE_NAME => SettingValue::Float(*i as f64),
                other => other.clone(),
            };
            T::from_value(&widened).ok_or_else(|| {
                validation_error!(
                    "choice {value} for {name} is a {}, expected {}",
                    value.type_name(),
                    T::TYPE_NAME
                )
            })
        })
        .collect()
}
