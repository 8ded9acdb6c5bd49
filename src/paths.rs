//! Directory identifier helpers.
//!
//! Identifiers are `/`-delimited strings relative to the content root. The tree root is `/`;
//! top-level directories are plain names (`join("/", "photos") == "photos"`).

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

/// Identifier of the real tree root.
pub const ROOT_ID: &str = "/";

/// Join `segment` onto `path`.
///
/// The trailing `/` of the left operand and the leading `/` of the right operand are trimmed and
/// the two are joined with a single `/`, unless the trimmed left operand is empty. Empty segments
/// are ignored.
pub fn join(path: &str, segment: &str) -> String {
    if segment.is_empty() {
        return path.to_string();
    }
    let left = path.trim_end_matches('/');
    if left.is_empty() {
        segment.to_string()
    } else {
        format!("{}/{}", left, segment.trim_start_matches('/'))
    }
}

/// Canonical form of an identifier: no leading, trailing or repeated `/`, with `/` for the root.
///
/// `normalize("/a/b/") == "a/b"`; `normalize("")` and `normalize("//")` are the root.
pub fn normalize(id: &str) -> String {
    let segments: Vec<&str> = id.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        ROOT_ID.to_string()
    } else {
        segments.join("/")
    }
}

/// Last component of an identifier, ignoring trailing slashes.
pub fn basename(id: &str) -> &str {
    let trimmed = id.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Parent identifier. Top-level identifiers (and the root itself) have `/` as parent.
pub fn dirname(id: &str) -> &str {
    let trimmed = id.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => ROOT_ID,
        Some(idx) => &trimmed[..idx],
    }
}

/// Remainder of `path` below directory `dir`, split on a separator boundary.
///
/// `strip_dir_prefix("a/x.jpg", "a") == Some("x.jpg")` while `"ab/x.jpg"` does not match `"a"`.
/// Everything is below the root.
pub fn strip_dir_prefix<'a>(path: &'a str, dir: &str) -> Option<&'a str> {
    if dir == ROOT_ID || dir.is_empty() {
        return Some(path.trim_start_matches('/'));
    }
    let dir = dir.trim_end_matches('/');
    path.strip_prefix(dir)?.strip_prefix('/')
}

/// Whether `id` equals `ancestor` or lies below it.
pub fn is_within(id: &str, ancestor: &str) -> bool {
    id.trim_end_matches('/') == ancestor.trim_end_matches('/')
        || strip_dir_prefix(id, ancestor).is_some_and(|rest| !rest.is_empty())
}

/// Resolve an identifier to an absolute path under `root`.
///
/// Rejects `..` components so an identifier can never address anything outside the content root.
pub fn resolve(root: &Path, id: &str) -> Result<PathBuf> {
    let mut path = root.to_path_buf();
    for component in id.split('/') {
        match component {
            "" | "." => continue,
            ".." => return Err(AppError::InvalidPath(id.to_string())),
            name => path.push(name),
        }
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_trims_both_sides() {
        assert_eq!(join("a/", "/b"), "a/b");
        assert_eq!(join("a", "b"), "a/b");
        assert_eq!(join("/a", "b/c"), "/a/b/c");
    }

    #[test]
    fn join_onto_root_yields_relative_id() {
        assert_eq!(join(ROOT_ID, "child"), "child");
        assert_eq!(join("", "child"), "child");
    }

    #[test]
    fn join_ignores_empty_segment() {
        assert_eq!(join("a", ""), "a");
    }

    #[test]
    fn normalize_strips_slashes() {
        assert_eq!(normalize("/a"), "a");
        assert_eq!(normalize("a/b/"), "a/b");
        assert_eq!(normalize("//a//b"), "a/b");
        assert_eq!(normalize(""), ROOT_ID);
        assert_eq!(normalize(ROOT_ID), ROOT_ID);
    }

    #[test]
    fn basename_and_dirname() {
        assert_eq!(basename("a/b/c"), "c");
        assert_eq!(basename("a/b/"), "b");
        assert_eq!(basename("child"), "child");
        assert_eq!(dirname("a/b/c"), "a/b");
        assert_eq!(dirname("child"), ROOT_ID);
        assert_eq!(dirname("/a"), ROOT_ID);
    }

    #[test]
    fn strip_prefix_respects_separator_boundary() {
        assert_eq!(strip_dir_prefix("a/file.jpg", "a"), Some("file.jpg"));
        assert_eq!(strip_dir_prefix("/a/x/file.jpg", "/a"), Some("x/file.jpg"));
        assert_eq!(strip_dir_prefix("ab/file.jpg", "a"), None);
        assert_eq!(strip_dir_prefix("file.jpg", ROOT_ID), Some("file.jpg"));
    }

    #[test]
    fn within_checks_ancestry() {
        assert!(is_within("a/b", "a"));
        assert!(is_within("a", "a"));
        assert!(!is_within("ab", "a"));
        assert!(is_within("anything", ROOT_ID));
    }

    #[test]
    fn resolve_rejects_parent_components() {
        let root = Path::new("/srv/uploads");
        assert_eq!(
            resolve(root, "a/b").unwrap(),
            PathBuf::from("/srv/uploads/a/b")
        );
        assert_eq!(resolve(root, ROOT_ID).unwrap(), PathBuf::from("/srv/uploads"));
        assert!(matches!(
            resolve(root, "a/../../etc"),
            Err(AppError::InvalidPath(_))
        ));
    }
}
