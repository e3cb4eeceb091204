//! Central safe-path helper.
//!
//! Every path built from a caller-supplied fragment goes through this module.
//! The rules are deliberately blunt: no absolute fragments, no `..`, no NUL,
//! and the joined result must stay under the given root.

use std::path::{Component, Path, PathBuf};

use crate::error::{AxError, AxResult};

/// Check whether a string is safe to use as a single path segment.
///
/// Accepts only `[A-Za-z0-9_-]+`.
#[must_use]
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id != ".."
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Join a caller-supplied relative fragment onto a trusted root.
///
/// Rejects absolute fragments, any `..` component, and NUL bytes. The result
/// is guaranteed to be lexically inside `root` without touching the
/// filesystem (the target may not exist yet).
///
/// # Errors
///
/// Returns [`AxError::PathTraversal`] if the fragment is unsafe.
pub fn safe_join(root: &Path, fragment: &str) -> AxResult<PathBuf> {
    if fragment.contains('\0') {
        return Err(AxError::PathTraversal {
            path: fragment.replace('\0', "\\0"),
        });
    }

    let rel = Path::new(fragment);
    if rel.is_absolute() {
        return Err(AxError::PathTraversal {
            path: fragment.to_string(),
        });
    }

    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(AxError::PathTraversal {
                    path: fragment.to_string(),
                });
            },
        }
    }

    let joined = root.join(rel);
    debug_assert!(joined.starts_with(root));
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_id() {
        assert!(is_safe_id("notes"));
        assert!(is_safe_id("a-b_c9"));
        assert!(!is_safe_id(""));
        assert!(!is_safe_id(".."));
        assert!(!is_safe_id("a/b"));
        assert!(!is_safe_id("a b"));
    }

    #[test]
    fn test_safe_join_accepts_nested_relative() {
        let root = Path::new("/data/workspaces/abc");
        let joined = safe_join(root, "notes/today.md").unwrap();
        assert_eq!(joined, root.join("notes/today.md"));
    }

    #[test]
    fn test_safe_join_rejects_traversal() {
        let root = Path::new("/data/workspaces/abc");
        assert!(safe_join(root, "../sibling").is_err());
        assert!(safe_join(root, "ok/../../escape").is_err());
        assert!(safe_join(root, "/etc/passwd").is_err());
        assert!(safe_join(root, "nul\0byte").is_err());
    }
}
