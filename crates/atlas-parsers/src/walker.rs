use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use tracing::warn;

use crate::registry::{detect_language, Lang};

/// One source file discovered under the indexing root.
pub struct WalkEntry {
    pub path: PathBuf,
    /// Path relative to the walk root, with forward slashes.
    pub rel_path: String,
    pub language: Lang,
}

pub struct FileWalker {
    root: PathBuf,
    excludes: GlobSet,
}

impl FileWalker {
    /// Creates a walker rooted at `root` applying the given exclusion globs
    /// (built-ins merged by the caller). Invalid globs are skipped with a
    /// warning.
    pub fn new(root: &Path, exclude_patterns: &[String]) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in exclude_patterns {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => warn!("skipping invalid exclude glob {pattern}: {e}"),
            }
        }
        let excludes = builder.build().unwrap_or_else(|_| GlobSet::empty());
        Self {
            root: root.to_path_buf(),
            excludes,
        }
    }

    /// Walks the root and returns all recognized source files, respecting
    /// gitignore plus the exclusion globs.
    pub fn walk(&self) -> Vec<WalkEntry> {
        let mut entries = Vec::new();

        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .build();

        for result in walker {
            let entry = match result {
                Ok(e) => e,
                Err(_) => continue,
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let path = entry.into_path();
            let rel = path
                .strip_prefix(&self.root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            if self.excludes.is_match(&rel) {
                continue;
            }
            if let Some(language) = detect_language(&path) {
                entries.push(WalkEntry {
                    path,
                    rel_path: rel,
                    language,
                });
            }
        }

        entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_walker_finds_source_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("src/lib.py"), "def f(): pass").unwrap();
        fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let walker = FileWalker::new(dir.path(), &[]);
        let entries = walker.walk();

        assert_eq!(entries.len(), 2);
        let langs: Vec<_> = entries.iter().map(|e| e.language).collect();
        assert!(langs.contains(&Lang::Rust));
        assert!(langs.contains(&Lang::Python));
    }

    #[test]
    fn test_walker_applies_exclude_globs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::write(dir.path().join("src/app.ts"), "export {}").unwrap();
        fs::write(dir.path().join("node_modules/pkg/index.js"), "x").unwrap();
        fs::write(dir.path().join("bundle.min.js"), "x").unwrap();

        let excludes = vec!["node_modules/**".to_string(), "*.min.js".to_string()];
        let walker = FileWalker::new(dir.path(), &excludes);
        let entries = walker.walk();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rel_path, "src/app.ts");
    }

    #[test]
    fn test_walker_output_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.go"), "package b").unwrap();
        fs::write(dir.path().join("a.go"), "package a").unwrap();

        let walker = FileWalker::new(dir.path(), &[]);
        let entries = walker.walk();
        assert_eq!(entries[0].rel_path, "a.go");
        assert_eq!(entries[1].rel_path, "b.go");
    }

    #[test]
    fn test_invalid_glob_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        let walker = FileWalker::new(dir.path(), &["[".to_string()]);
        assert_eq!(walker.walk().len(), 1);
    }
}
