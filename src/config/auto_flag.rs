//! Tri-state configuration switches.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A boolean setting that may be left for oldloom to infer
///
/// In `oldloom.toml` the value may be `"auto"`, a TOML boolean, or the strings `"true"` /
/// `"false"`. Inference happens once when [`crate::config::Settings`] is resolved; the
/// resolved value is stored as a plain `bool` and never written back here.
///
/// ```rust
/// use oldloom_cli::config::AutoFlag;
///
/// assert!(AutoFlag::Inferred.resolve(|| true));
/// assert!(!AutoFlag::Explicit(false).resolve(|| true));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoFlag {
    /// Set by the user
    Explicit(bool),
    /// Derived from the game version or the declared inputs
    #[default]
    Inferred,
}

impl AutoFlag {
    /// Resolve the flag, calling `infer` only when no explicit value was given.
    pub fn resolve(self, infer: impl FnOnce() -> bool) -> bool {
        match self {
            Self::Explicit(value) => value,
            Self::Inferred => infer(),
        }
    }
}

impl fmt::Display for AutoFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit(value) => write!(f, "{value}"),
            Self::Inferred => f.write_str("auto"),
        }
    }
}

impl Serialize for AutoFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Explicit(value) => serializer.serialize_bool(*value),
            Self::Inferred => serializer.serialize_str("auto"),
        }
    }
}

impl<'de> Deserialize<'de> for AutoFlag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bool(value) => Ok(Self::Explicit(value)),
            Raw::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "auto" => Ok(Self::Inferred),
                "true" => Ok(Self::Explicit(true)),
                "false" => Ok(Self::Explicit(false)),
                other => Err(de::Error::custom(format!(
                    "expected \"auto\", true or false, found \"{other}\""
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize, Serialize)]
    struct Wrapper {
        flag: AutoFlag,
    }

    #[test]
    fn test_all_spellings_deserialize() {
        let parse = |s: &str| toml::from_str::<Wrapper>(s).map(|w| w.flag);
        assert_eq!(parse("flag = \"auto\"").unwrap(), AutoFlag::Inferred);
        assert_eq!(parse("flag = true").unwrap(), AutoFlag::Explicit(true));
        assert_eq!(parse("flag = \"false\"").unwrap(), AutoFlag::Explicit(false));
        assert!(parse("flag = \"sometimes\"").is_err());
    }

    #[test]
    fn test_inference_runs_only_for_auto() {
        let mut called = false;
        assert!(AutoFlag::Explicit(true).resolve(|| {
            called = true;
            false
        }));
        assert!(!called);
        assert_eq!(AutoFlag::Inferred.to_string(), "auto");
    }
}
