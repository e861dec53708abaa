//! Joining untrusted relative names onto cache directories.

use crate::core::LoomError;
use anyhow::Result;
use std::path::{Component, Path, PathBuf};

/// Join `name`, read from `source`, onto `base`, refusing anything that would land outside it.
///
/// Absolute names, drive prefixes and `..` components are rejected as a
/// [`LoomError::DataIntegrity`] against `source`; `.` components are dropped.
///
/// # Examples
///
/// ```rust
/// use oldloom_cli::utils::fs::join_enclosed;
/// use std::path::Path;
///
/// let base = Path::new("/cache/assets/virtual/legacy");
/// let index = Path::new("/cache/assets/indexes/legacy.json");
/// assert!(join_enclosed(base, "sound/step.ogg", index).is_ok());
/// assert!(join_enclosed(base, "../../escaped.txt", index).is_err());
/// ```
pub fn join_enclosed(base: &Path, name: &str, source: &Path) -> Result<PathBuf> {
    let unsafe_name = |reason: &str| LoomError::DataIntegrity {
        path: source.to_path_buf(),
        reason: format!("entry '{name}' {reason}"),
    };

    let mut relative = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(unsafe_name("escapes its directory").into()),
            Component::RootDir | Component::Prefix(_) => {
                return Err(unsafe_name("is an absolute path").into());
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(unsafe_name("names no file").into());
    }
    Ok(base.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::find_loom_error;

    #[test]
    fn test_join_enclosed_keeps_nested_names() {
        let base = Path::new("/cache/libraries");
        let joined = join_enclosed(base, "org/lwjgl/./lwjgl-2.9.0.jar", Path::new("1.4.7.json")).unwrap();
        assert_eq!(joined, base.join("org/lwjgl/lwjgl-2.9.0.jar"));
    }

    #[test]
    fn test_join_enclosed_rejects_escapes() {
        let base = Path::new("/cache/libraries");
        for name in ["../../escaped.txt", "org/../../x.jar", "/etc/passwd", "", "."] {
            let err = join_enclosed(base, name, Path::new("1.4.7.json")).unwrap_err();
            assert!(
                matches!(find_loom_error(&err), Some(LoomError::DataIntegrity { path, .. }) if path == Path::new("1.4.7.json")),
                "{name} was accepted"
            );
        }
    }
}
