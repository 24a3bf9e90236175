use crate::guard::GuardError;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Collects the Rust source files under a set of input paths.
///
/// Directories are walked honoring `.gitignore`; files named directly are
/// taken as given, whatever their extension. Ignore patterns apply to both.
pub struct FileWalker {
    roots: Vec<PathBuf>,
    ignore_patterns: Vec<glob::Pattern>,
}

impl FileWalker {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            ignore_patterns: vec![],
        }
    }

    pub fn with_ignore_patterns(mut self, patterns: &[String]) -> Result<Self, GuardError> {
        self.ignore_patterns = patterns
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern).map_err(|source| GuardError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    /// Files in walk order: roots in the order given, entries of each
    /// directory sorted by name.
    pub fn walk(&self) -> Result<Vec<PathBuf>, GuardError> {
        let mut files = Vec::new();
        for root in &self.roots {
            if root.is_file() {
                if !self.is_ignored(root) {
                    files.push(root.clone());
                }
                continue;
            }
            if !root.exists() {
                return Err(GuardError::Io {
                    path: root.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such path"),
                });
            }
            let walker = WalkBuilder::new(root)
                .hidden(false)
                .git_ignore(true)
                .sort_by_file_name(|a, b| a.cmp(b))
                .build();

            for entry in walker {
                let entry = entry.map_err(|source| GuardError::Walk {
                    path: root.clone(),
                    source,
                })?;
                let path = entry.path();
                if path.is_file() && self.should_process(path) {
                    files.push(path.to_path_buf());
                }
            }
        }
        Ok(files)
    }

    fn should_process(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "rs") && !self.is_ignored(path)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches(&path_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, "fn main() {}").unwrap();
        path
    }

    #[test]
    fn test_walk_finds_rust_files_sorted() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/b.rs");
        touch(dir.path(), "src/a.rs");
        touch(dir.path(), "README.md");
        let files = FileWalker::new(vec![dir.path().to_path_buf()]).walk().unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.rs", "b.rs"]);
    }

    #[test]
    fn test_ignore_patterns() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/lib.rs");
        touch(dir.path(), "target/debug/build.rs");
        let files = FileWalker::new(vec![dir.path().to_path_buf()])
            .with_ignore_patterns(&["**/target/**".to_string()])
            .unwrap()
            .walk()
            .unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("src/lib.rs"));
    }

    #[test]
    fn test_explicit_file_and_missing_path() {
        let dir = TempDir::new().unwrap();
        let file = touch(dir.path(), "notes.txt");
        let files = FileWalker::new(vec![file.clone()]).walk().unwrap();
        assert_eq!(files, vec![file]);

        let missing = FileWalker::new(vec![dir.path().join("missing")]).walk();
        assert!(matches!(missing, Err(GuardError::Io { .. })));
    }

    #[test]
    fn test_bad_pattern() {
        let result = FileWalker::new(vec![]).with_ignore_patterns(&["[".to_string()]);
        assert!(matches!(result, Err(GuardError::Pattern { .. })));
    }
}
