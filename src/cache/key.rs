//! Content-derived cache keys.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Every input that affects a stage's output bytes
///
/// Properties are kept sorted by name, so the digest is independent of insertion order. Each
/// name and value is length-prefixed before hashing; `("ab", "c")` and `("a", "bc")` never
/// collide.
///
/// ```rust
/// use oldloom_cli::cache::CacheKey;
///
/// let a = CacheKey::new().with("version", "1.4.7").with("side", "merged");
/// let b = CacheKey::new().with("side", "merged").with("version", "1.4.7");
/// assert_eq!(a.hash(), b.hash());
/// assert_eq!(a.hash().len(), 64);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheKey {
    props: BTreeMap<String, String>,
}

impl CacheKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`CacheKey::insert`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a property, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.props.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.props.get(name).map(String::as_str)
    }

    pub fn props(&self) -> &BTreeMap<String, String> {
        &self.props
    }

    /// Lowercase hex SHA-256 over the sorted, length-delimited properties.
    #[must_use]
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, value) in &self.props {
            for part in [name, value] {
                hasher.update((part.len() as u64).to_be_bytes());
                hasher.update(part.as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.props.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{{{}}}", rendered.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_does_not_matter() {
        let mut a = CacheKey::new();
        a.insert("mappings", "mcp-726");
        a.insert("version", "1.4.7");
        a.insert("at", "abc");
        let b = CacheKey::new()
            .with("at", "abc")
            .with("version", "1.4.7")
            .with("mappings", "mcp-726");
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_boundaries_are_delimited() {
        let a = CacheKey::new().with("ab", "c");
        let b = CacheKey::new().with("a", "bc");
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_values_change_the_digest() {
        let a = CacheKey::new().with("version", "1.4.7");
        let b = a.clone().with("version", "1.5.2");
        assert_ne!(a.hash(), b.hash());
        assert_eq!(b.get("version"), Some("1.5.2"));
        assert_eq!(a.to_string(), "{version=1.4.7}");
    }
}
