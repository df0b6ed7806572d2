//! Reading directory trees into atoms.

use std::path::Path;

use conductor_archive::Atom;

use crate::error::{BuildError, BuildResult};

/// Which directories to leave out while walking a tree.
#[derive(Debug, Clone, Default)]
pub struct TreeFilter {
    skip_hidden: bool,
    skip_names: Vec<String>,
}

impl TreeFilter {
    /// Keep everything.
    #[must_use]
    pub fn everything() -> Self {
        Self::default()
    }

    /// Filter used for unit sources: no hidden directories, no installed
    /// packages, plus any extra directory names.
    #[must_use]
    pub fn sources(excludes: &[String]) -> Self {
        let mut skip_names = vec!["node_modules".to_owned()];
        skip_names.extend(excludes.iter().cloned());
        Self {
            skip_hidden: true,
            skip_names,
        }
    }

    fn skips(&self, name: &str) -> bool {
        (self.skip_hidden && name.starts_with('.')) || self.skip_names.iter().any(|n| n == name)
    }
}

/// Collect every regular file under `root` as an atom, optionally relocated
/// under `prefix`. Output is sorted by path.
///
/// Walks with an explicit stack. Symlinked files are read through; symlinked
/// directories are not followed.
pub fn collect_tree(root: &Path, prefix: &str, filter: &TreeFilter) -> BuildResult<Vec<Atom>> {
    let mut atoms = Vec::new();
    let mut pending = vec![root.to_owned()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                let skip = entry.file_name().to_str().map_or(true, |n| filter.skips(n));
                if !skip {
                    pending.push(path);
                }
                continue;
            }
            if file_type.is_symlink() && !std::fs::metadata(&path).is_ok_and(|m| m.is_file()) {
                continue;
            }

            let relative = path
                .strip_prefix(root)
                .map_err(|e| BuildError::Internal(e.to_string()))?
                .components()
                .map(|c| {
                    c.as_os_str().to_str().ok_or_else(|| {
                        BuildError::Compile(format!("non UTF-8 path: {}", path.display()))
                    })
                })
                .collect::<BuildResult<Vec<_>>>()?
                .join("/");

            let content = std::fs::read(&path)?;
            atoms.push(Atom::new(relative, content)?.under(prefix)?);
        }
    }

    atoms.sort_by(|a, b| a.path().cmp(b.path()));
    Ok(atoms)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn paths(atoms: &[Atom]) -> Vec<&str> {
        atoms.iter().map(Atom::path).collect()
    }

    #[test]
    fn source_filter_skips_installed_and_hidden_directories() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("lib/util")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/left-pad")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::create_dir_all(root.join("coverage")).unwrap();
        std::fs::write(root.join("index.js"), "x").unwrap();
        std::fs::write(root.join(".env"), "SECRET=1").unwrap();
        std::fs::write(root.join("lib/util/strings.js"), "y").unwrap();
        std::fs::write(root.join("node_modules/left-pad/index.js"), "z").unwrap();
        std::fs::write(root.join(".git/HEAD"), "ref").unwrap();
        std::fs::write(root.join("coverage/lcov.info"), "").unwrap();

        let atoms = collect_tree(root, "", &TreeFilter::sources(&["coverage".to_owned()])).unwrap();
        assert_eq!(paths(&atoms), vec![".env", "index.js", "lib/util/strings.js"]);
    }

    #[test]
    fn prefix_relocates_atoms() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("lib/a.js"), "a").unwrap();

        let atoms = collect_tree(dir.path(), "node_modules/pkg", &TreeFilter::everything()).unwrap();
        assert_eq!(paths(&atoms), vec!["node_modules/pkg/lib/a.js"]);
        assert_eq!(atoms[0].content(), b"a");
    }
}
