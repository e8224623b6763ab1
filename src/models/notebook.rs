//! Work item model
//!
//! A notebook selected for isolated execution, plus the names derived from it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Separator joining directory components into a clone directory name
const ENV_NAME_SEPARATOR: &str = "__";

/// One notebook file selected for execution
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Notebook {
    /// Absolute, normalized path
    path: PathBuf,
    /// Path relative to the repository root
    rel_path: PathBuf,
}

impl Notebook {
    /// Create a work item from an absolute path inside `repo_root`.
    ///
    /// Notebooks outside the repository keep only their file name as the
    /// relative path, so their outputs land directly under the output root.
    pub fn new(path: impl Into<PathBuf>, repo_root: &Path) -> Self {
        let path = path.into();
        let rel_path = match path.strip_prefix(repo_root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => path.file_name().map(PathBuf::from).unwrap_or_default(),
        };
        Self { path, rel_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rel_path(&self) -> &Path {
        &self.rel_path
    }

    /// File name including the extension, e.g. `foo.ipynb`
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name without the extension, e.g. `foo`
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Directory of the notebook relative to the repository root
    pub fn rel_dir(&self) -> PathBuf {
        self.rel_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Name of the private environment clone for this notebook.
    ///
    /// The relative directory is folded into the name so that notebooks
    /// sharing a stem in different directories never share a clone. Each
    /// component is escaped so it cannot contain the separator, which keeps
    /// the mapping injective.
    pub fn env_name(&self) -> String {
        let mut parts: Vec<String> = self
            .rel_dir()
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(escape_component(&part.to_string_lossy())),
                _ => None,
            })
            .collect();
        parts.push(escape_component(&self.stem()));
        parts.join(ENV_NAME_SEPARATOR)
    }

    /// Output notebook path: `<output_root>/<rel_dir>/<stem><suffix>`
    pub fn output_path(&self, output_root: &Path, suffix: &str) -> PathBuf {
        output_root
            .join(self.rel_dir())
            .join(format!("{}{}", self.stem(), suffix))
    }
}

/// Percent-escape `%` and `_` so no escaped component contains `__`
fn escape_component(part: &str) -> String {
    let mut escaped = String::with_capacity(part.len());
    for ch in part.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            '_' => escaped.push_str("%5F"),
            other => escaped.push(other),
        }
    }
    escaped
}

impl fmt::Display for Notebook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rel_path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_names() {
        let nb = Notebook::new("/repo/docs/simulation/foo.ipynb", Path::new("/repo"));
        assert_eq!(nb.file_name(), "foo.ipynb");
        assert_eq!(nb.stem(), "foo");
        assert_eq!(nb.rel_dir(), PathBuf::from("docs/simulation"));
        assert_eq!(nb.env_name(), "docs__simulation__foo");
        assert_eq!(
            nb.output_path(Path::new("out"), ".out.ipynb"),
            PathBuf::from("out/docs/simulation/foo.out.ipynb")
        );
    }

    #[test]
    fn test_stem_keeps_trailing_letters() {
        // "notebook.ipynb" must not lose the trailing letters of its stem
        let nb = Notebook::new("/repo/notebook.ipynb", Path::new("/repo"));
        assert_eq!(nb.stem(), "notebook");
        assert_eq!(nb.env_name(), "notebook");
        assert_eq!(
            nb.output_path(Path::new("out"), ".out.ipynb"),
            PathBuf::from("out/notebook.out.ipynb")
        );
    }

    #[test]
    fn test_same_stem_different_dirs_do_not_collide() {
        let root = Path::new("/repo");
        let a = Notebook::new("/repo/docs/intro.ipynb", root);
        let b = Notebook::new("/repo/examples/intro.ipynb", root);
        assert_ne!(a.env_name(), b.env_name());
        assert_ne!(
            a.output_path(Path::new("out"), ".out.ipynb"),
            b.output_path(Path::new("out"), ".out.ipynb")
        );
    }

    #[test]
    fn test_env_name_is_injective() {
        let root = Path::new("/repo");
        let a = Notebook::new("/repo/docs/a__b.ipynb", root);
        let b = Notebook::new("/repo/docs__a/b.ipynb", root);
        assert_ne!(a.env_name(), b.env_name());
        assert_eq!(a.env_name(), "docs__a%5F%5Fb");
        assert_eq!(b.env_name(), "docs%5F%5Fa__b");

        let pct = Notebook::new("/repo/a%5Fb.ipynb", root);
        let under = Notebook::new("/repo/a_b.ipynb", root);
        assert_ne!(pct.env_name(), under.env_name());
    }

    #[test]
    fn test_outside_repo() {
        let nb = Notebook::new("/tmp/scratch/x.ipynb", Path::new("/repo"));
        assert_eq!(nb.rel_path(), Path::new("x.ipynb"));
        assert_eq!(nb.rel_dir(), PathBuf::new());
    }
}
