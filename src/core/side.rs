//! The two distributions of the game.
//!
//! The client and server jars are downloaded, binpatched and tagged independently before
//! being merged into one jar; [`Side`] names which one a value belongs to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A game distribution
///
/// Serialized in lowercase (`"client"`, `"server"`), which is also the directory name used
/// by binpatch archives (`binpatch/client/...`).
///
/// ```rust
/// use oldloom_cli::core::Side;
///
/// let side: Side = "server".parse().unwrap();
/// assert_eq!(side, Side::Server);
/// assert_eq!(side.other(), Side::Client);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The game client, which is the superset distribution in every supported version
    Client,
    /// The dedicated server
    Server,
}

impl Side {
    /// Both sides, client first.
    pub const ALL: [Self; 2] = [Self::Client, Self::Server];

    /// Lowercase name used in paths and mapping files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
        }
    }

    /// Uppercase constant name used by marker annotations (`CLIENT` / `SERVER`).
    #[must_use]
    pub const fn constant_name(self) -> &'static str {
        match self {
            Self::Client => "CLIENT",
            Self::Server => "SERVER",
        }
    }

    /// The opposite side.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Client => Self::Server,
            Self::Server => Self::Client,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = crate::core::LoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "client" => Ok(Self::Client),
            "server" | "dedicated_server" => Ok(Self::Server),
            _ => Err(crate::core::LoomError::Configuration {
                message: format!("unknown side '{s}', expected 'client' or 'server'"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_round_trip_through_serde() {
        let json = serde_json::to_string(&Side::Client).unwrap();
        assert_eq!(json, "\"client\"");
        let parsed: Side = serde_json::from_str("\"server\"").unwrap();
        assert_eq!(parsed, Side::Server);
    }

    #[test]
    fn test_side_from_str_rejects_unknown() {
        assert!("both".parse::<Side>().is_err());
        assert_eq!("CLIENT".parse::<Side>().unwrap(), Side::Client);
    }
}
