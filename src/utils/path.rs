//! Path helpers
//!
//! Work items are compared as absolute, lexically normalized paths so that
//! git output, glob expansion and user input agree byte for byte.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

/// Remove `.` components and fold `..` into its parent without touching the
/// filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Resolve `path` against `base` when relative, then normalize it.
pub fn absolutize_from(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    }
}

/// Resolve `path` against the current working directory.
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(absolutize_from(&cwd, path))
}

/// Sort paths by their raw bytes and drop duplicates.
pub fn sort_paths(paths: &mut Vec<PathBuf>) {
    paths.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
    paths.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/repo/./docs/../docs/a.ipynb")),
            PathBuf::from("/repo/docs/a.ipynb")
        );
        assert_eq!(normalize_path(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(normalize_path(Path::new("../a")), PathBuf::from("../a"));
        assert_eq!(normalize_path(Path::new("../../a")), PathBuf::from("../../a"));
    }

    #[test]
    fn test_absolutize_from() {
        let base = Path::new("/repo");
        assert_eq!(
            absolutize_from(base, Path::new("docs/a.ipynb")),
            PathBuf::from("/repo/docs/a.ipynb")
        );
        assert_eq!(
            absolutize_from(base, Path::new("/elsewhere/b.ipynb")),
            PathBuf::from("/elsewhere/b.ipynb")
        );
    }

    #[test]
    fn test_sort_paths_is_bytewise() {
        let mut paths = vec![
            PathBuf::from("/r/a/b.ipynb"),
            PathBuf::from("/r/a-b.ipynb"),
            PathBuf::from("/r/a/b.ipynb"),
        ];
        sort_paths(&mut paths);
        assert_eq!(
            paths,
            vec![PathBuf::from("/r/a-b.ipynb"), PathBuf::from("/r/a/b.ipynb")]
        );
    }
}
