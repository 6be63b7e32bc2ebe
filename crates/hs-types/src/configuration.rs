//! Immutable flag-list snapshots and the `::` argument escaping used on the
//! master/slave command line.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::EscapeError;

/// Prefix every flag carries on the command line.
pub const FLAG_PREFIX: &str = "--";

/// Delimiter joining prefix-stripped flags inside a single `--classArgs` value.
pub const ARG_DELIMITER: &str = "::";

/// An ordered list of `--name=value` flags describing one trial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration(Vec<String>);

impl Configuration {
    pub fn new(flags: Vec<String>) -> Self {
        Self(flags)
    }

    pub fn args(&self) -> &[String] {
        &self.0
    }

    pub fn into_args(self) -> Vec<String> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value of `--name=value`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find_map(|flag| {
            let (flag_name, value) = flag.strip_prefix(FLAG_PREFIX)?.split_once('=')?;
            (flag_name == name).then_some(value)
        })
    }

    /// Escaped form suitable for a single `--classArgs=` value.
    pub fn escape(&self) -> Result<String, EscapeError> {
        escape_args(&self.0)
    }

    pub fn from_escaped(escaped: &str) -> Self {
        Self(unescape_args(escaped))
    }
}

impl From<Vec<String>> for Configuration {
    fn from(flags: Vec<String>) -> Self {
        Self(flags)
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

/// Strip the `--` prefix from every flag and join them with `::`.
///
/// A body that touches a neighbouring delimiter with a `:` (`a:` followed by
/// another flag) would merge into a `:::` run, and a lone empty flag would
/// vanish; both are rejected so that unescaping always gives the input back.
pub fn escape_args<S: AsRef<str>>(flags: &[S]) -> Result<String, EscapeError> {
    let mut stripped = Vec::with_capacity(flags.len());
    let last = flags.len().saturating_sub(1);
    for (i, flag) in flags.iter().enumerate() {
        let flag = flag.as_ref();
        if flag.contains(ARG_DELIMITER) {
            return Err(EscapeError::ContainsDelimiter {
                arg: flag.to_string(),
            });
        }
        let body = flag
            .strip_prefix(FLAG_PREFIX)
            .ok_or_else(|| EscapeError::MissingPrefix {
                arg: flag.to_string(),
            })?;
        let ambiguous = (i > 0 && body.starts_with(':'))
            || (i < last && body.ends_with(':'))
            || (flags.len() == 1 && body.is_empty());
        if ambiguous {
            return Err(EscapeError::Ambiguous {
                arg: flag.to_string(),
            });
        }
        stripped.push(body);
    }
    Ok(stripped.join(ARG_DELIMITER))
}

/// Inverse of [`escape_args`]. The empty string decodes to no flags.
pub fn unescape_args(escaped: &str) -> Vec<String> {
    if escaped.is_empty() {
        return Vec::new();
    }
    escaped
        .split(ARG_DELIMITER)
        .map(|body| format!("{FLAG_PREFIX}{body}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn escape_round_trip() {
        let original = flags(&["--lr=0.001", "--layers=3", "--name=run a", "--verbose"]);
        let escaped = escape_args(&original).unwrap();
        assert_eq!(escaped, "lr=0.001::layers=3::name=run a::verbose");
        assert_eq!(unescape_args(&escaped), original);
    }

    #[test]
    fn empty_list_round_trips() {
        let empty: Vec<String> = Vec::new();
        let escaped = escape_args(&empty).unwrap();
        assert_eq!(escaped, "");
        assert!(unescape_args(&escaped).is_empty());
    }

    #[test]
    fn delimiter_in_value_is_rejected() {
        let err = escape_args(&flags(&["--path=a::b"])).unwrap_err();
        assert_eq!(
            err,
            EscapeError::ContainsDelimiter {
                arg: "--path=a::b".into()
            }
        );
    }

    #[test]
    fn colons_next_to_the_delimiter_are_rejected() {
        let err = escape_args(&flags(&["--url=host:", "--b=1"])).unwrap_err();
        assert_eq!(
            err,
            EscapeError::Ambiguous {
                arg: "--url=host:".into()
            }
        );
        assert!(matches!(
            escape_args(&flags(&["--a=1", "--:b=2"])),
            Err(EscapeError::Ambiguous { .. })
        ));
        assert!(matches!(
            escape_args(&flags(&["--"])),
            Err(EscapeError::Ambiguous { .. })
        ));
    }

    #[test]
    fn colons_away_from_the_delimiter_round_trip() {
        let cases = [
            flags(&["--url=http://host:80/x", "--b=1"]),
            flags(&["--:lead=1"]),
            flags(&["--a=1", "--trail=x:"]),
            flags(&["--a=1", "--", "--b=:2"]),
            flags(&["--", "--"]),
        ];
        for original in cases {
            let escaped = escape_args(&original).unwrap();
            assert_eq!(unescape_args(&escaped), original, "via {escaped:?}");
        }
    }

    #[test]
    fn missing_prefix_is_rejected() {
        let err = escape_args(&flags(&["lr=0.1"])).unwrap_err();
        assert!(matches!(err, EscapeError::MissingPrefix { .. }));
    }

    #[test]
    fn configuration_lookup_and_display() {
        let config = Configuration::new(flags(&["--lr=0.5", "--depth=4"]));
        assert_eq!(config.get("lr"), Some("0.5"));
        assert_eq!(config.get("depth"), Some("4"));
        assert_eq!(config.get("missing"), None);
        assert_eq!(config.to_string(), "--lr=0.5 --depth=4");

        let escaped = config.escape().unwrap();
        assert_eq!(Configuration::from_escaped(&escaped), config);
    }

    #[test]
    fn configuration_serializes_as_plain_list() {
        let config = Configuration::new(flags(&["--a=1"]));
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"["--a=1"]"#);
        let back: Configuration = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
