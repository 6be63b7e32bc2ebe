//! Typed, named, mutable settings that serialize to and from flag lists.
//!
//! The registry is the single piece of mutable state a search touches: the
//! coordinator samples into it, snapshots it with [`Settings::unparse`], and
//! re-applies snapshots with [`Settings::parse`]. Trials only ever see the
//! snapshots.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use crate::configuration::{Configuration, FLAG_PREFIX};
use crate::errors::SettingsError;

/// A dynamically typed setting value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SettingValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
        }
    }

    /// Parse `raw` as a value of the same type as `self`.
    fn parse_like(&self, name: &str, raw: &str) -> Result<SettingValue, SettingsError> {
        let invalid = || SettingsError::InvalidValue {
            name: name.to_string(),
            value: raw.to_string(),
            expected: self.type_name(),
        };
        match self {
            Self::Bool(_) => raw.parse().map(Self::Bool).map_err(|_| invalid()),
            Self::Int(_) => raw.parse().map(Self::Int).map_err(|_| invalid()),
            Self::Float(_) => raw.parse().map(Self::Float).map_err(|_| invalid()),
            Self::Text(_) => Ok(Self::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            // `{}` on f64 is the shortest string that parses back to the same bits.
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

/// Rust types that can live in the settings registry.
pub trait SettingType: Clone + fmt::Debug + Send + Sync + 'static {
    const TYPE_NAME: &'static str;

    fn into_value(self) -> SettingValue;

    fn from_value(value: &SettingValue) -> Option<Self>;
}

impl SettingType for bool {
    const TYPE_NAME: &'static str = "bool";

    fn into_value(self) -> SettingValue {
        SettingValue::Bool(self)
    }

    fn from_value(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl SettingType for i64 {
    const TYPE_NAME: &'static str = "int";

    fn into_value(self) -> SettingValue {
        SettingValue::Int(self)
    }

    fn from_value(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl SettingType for f64 {
    const TYPE_NAME: &'static str = "float";

    fn into_value(self) -> SettingValue {
        SettingValue::Float(self)
    }

    fn from_value(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl SettingType for String {
    const TYPE_NAME: &'static str = "string";

    fn into_value(self) -> SettingValue {
        SettingValue::Text(self)
    }

    fn from_value(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Text(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// Typed handle to one registered setting.
pub struct SettingKey<T> {
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SettingKey<T> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for SettingKey<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for SettingKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingKey").field("name", &self.name).finish()
    }
}

/// Ordered registry of named settings.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    entries: Vec<(String, SettingValue)>,
    index: HashMap<String, usize>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a setting with its default value.
    pub fn register<T: SettingType>(
        &mut self,
        name: impl Into<String>,
        default: T,
    ) -> Result<SettingKey<T>, SettingsError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(SettingsError::DuplicateSetting { name });
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name.clone(), default.into_value()));
        Ok(SettingKey {
            name,
            _marker: PhantomData,
        })
    }

    /// Typed handle to an already registered setting.
    pub fn key<T: SettingType>(&self, name: &str) -> Result<SettingKey<T>, SettingsError> {
        let value = self.value(name)?;
        if T::from_value(value).is_none() {
            return Err(SettingsError::TypeMismatch {
                name: name.to_string(),
                expected: T::TYPE_NAME,
                actual: value.type_name(),
            });
        }
        Ok(SettingKey {
            name: name.to_string(),
            _marker: PhantomData,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn value(&self, name: &str) -> Result<&SettingValue, SettingsError> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i].1)
            .ok_or_else(|| SettingsError::UnknownSetting {
                name: name.to_string(),
            })
    }

    pub fn get<T: SettingType>(&self, key: &SettingKey<T>) -> Result<T, SettingsError> {
        let value = self.value(&key.name)?;
        T::from_value(value).ok_or_else(|| SettingsError::TypeMismatch {
            name: key.name.clone(),
            expected: T::TYPE_NAME,
            actual: value.type_name(),
        })
    }

    pub fn set<T: SettingType>(&mut self, key: &SettingKey<T>, value: T) -> Result<(), SettingsError> {
        let slot = self.slot_mut(&key.name)?;
        *slot = value.into_value();
        Ok(())
    }

    /// Current `(name, value)` pairs in declaration order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Apply a list of `--name=value` flags.
    ///
    /// The list is validated in full before anything is written, so a bad
    /// flag leaves the registry untouched.
    pub fn parse<S: AsRef<str>>(&mut self, args: &[S]) -> Result<(), SettingsError> {
        let mut updates = Vec::with_capacity(args.len());
        for arg in args {
            let arg = arg.as_ref();
            let body = arg
                .strip_prefix(FLAG_PREFIX)
                .ok_or_else(|| SettingsError::MissingPrefix {
                    arg: arg.to_string(),
                })?;
            let (name, raw) = match body.split_once('=') {
                Some((name, raw)) => (name, raw),
                // A bare `--flag` switches a bool on.
                None => (body, "true"),
            };
            let &slot = self
                .index
                .get(name)
                .ok_or_else(|| SettingsError::UnknownSetting {
                    name: name.to_string(),
                })?;
            let value = self.entries[slot].1.parse_like(name, raw)?;
            updates.push((slot, value));
        }
        for (slot, value) in updates {
            self.entries[slot].1 = value;
        }
        Ok(())
    }

    pub fn apply(&mut self, configuration: &Configuration) -> Result<(), SettingsError> {
        self.parse(configuration.args())
    }

    /// Serialize every setting as `--name=value`.
    pub fn unparse(&self) -> Configuration {
        Configuration::new(
            self.entries
                .iter()
                .map(|(name, value)| render_flag(name, value))
                .collect(),
        )
    }

    /// Serialize only the named settings, in the order given.
    pub fn unparse_only<S: AsRef<str>>(&self, names: &[S]) -> Result<Configuration, SettingsError> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.value(name).map(|value| render_flag(name, value))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Configuration::new)
    }

    fn slot_mut(&mut self, name: &str) -> Result<&mut SettingValue, SettingsError> {
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.entries[i].1),
            None => Err(SettingsError::UnknownSetting {
                name: name.to_string(),
            }),
        }
    }
}

fn render_flag(name: &str, value: &SettingValue) -> String {
    format!("{FLAG_PREFIX}{name}={value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_settings() -> Settings {
        let mut settings = Settings::new();
        settings.register("learning_rate", 0.1_f64).unwrap();
        settings.register("layers", 2_i64).unwrap();
        settings.register("use_bias", false).unwrap();
        settings.register("optimizer", "sgd".to_string()).unwrap();
        settings
    }

    #[test]
    fn unparse_in_declaration_order() {
        let settings = sample_settings();
        assert_eq!(
            settings.unparse().args(),
            &[
                "--learning_rate=0.1",
                "--layers=2",
                "--use_bias=false",
                "--optimizer=sgd"
            ]
        );
    }

    #[test]
    fn parse_applies_typed_values() {
        let mut settings = sample_settings();
        settings
            .parse(&["--learning_rate=0.003", "--layers=5", "--use_bias", "--optimizer=adam"])
            .unwrap();

        let lr = settings.key::<f64>("learning_rate").unwrap();
        let layers = settings.key::<i64>("layers").unwrap();
        let bias = settings.key::<bool>("use_bias").unwrap();
        let opt = settings.key::<String>("optimizer").unwrap();
        assert_eq!(settings.get(&lr).unwrap(), 0.003);
        assert_eq!(settings.get(&layers).unwrap(), 5);
        assert!(settings.get(&bias).unwrap());
        assert_eq!(settings.get(&opt).unwrap(), "adam");
    }

    #[test]
    fn parse_unparse_is_idempotent() {
        let mut settings = sample_settings();
        let lr = settings.key::<f64>("learning_rate").unwrap();
        settings.set(&lr, 0.1 + 0.2).unwrap();

        let snapshot = settings.unparse();
        let mut restored = sample_settings();
        restored.apply(&snapshot).unwrap();
        assert_eq!(restored.unparse(), snapshot);
        assert_eq!(restored.get(&lr).unwrap(), 0.1 + 0.2);
    }

    #[test]
    fn bad_flag_leaves_registry_untouched() {
        let mut settings = sample_settings();
        let before = settings.unparse();

        let err = settings.parse(&["--layers=7", "--layers=seven"]).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { expected: "int", .. }));
        assert_eq!(settings.unparse(), before);

        let err = settings.parse(&["--dropout=0.5"]).unwrap_err();
        assert!(matches!(err, SettingsError::UnknownSetting { .. }));

        let err = settings.parse(&["layers=3"]).unwrap_err();
        assert!(matches!(err, SettingsError::MissingPrefix { .. }));
    }

    #[test]
    fn duplicate_and_mistyped_keys_are_rejected() {
        let mut settings = sample_settings();
        assert!(matches!(
            settings.register("layers", 1_i64),
            Err(SettingsError::DuplicateSetting { .. })
        ));
        assert!(matches!(
            settings.key::<f64>("layers"),
            Err(SettingsError::TypeMismatch {
                expected: "float",
                actual: "int",
                ..
            })
        ));
    }

    #[test]
    fn unparse_only_selects_named_settings() {
        let settings = sample_settings();
        let subset = settings.unparse_only(&["optimizer", "layers"]).unwrap();
        assert_eq!(subset.args(), &["--optimizer=sgd", "--layers=2"]);
        assert!(settings.unparse_only(&["nope"]).is_err());
    }
}
