//! Include-file resolution.
//!
//! File access goes through the [`FileLoader`] trait so the preprocessor
//! can be driven from tests without touching the filesystem. Resolution
//! order follows the two header forms: `"name"` searches the directory
//! of the including file first, then the user include paths; `<name>`
//! searches only the user include paths.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Source of include-file bytes.
pub trait FileLoader {
    /// Load a file's content.
    fn load(&self, path: &Path) -> io::Result<String>;

    /// Does the file exist?
    fn exists(&self, path: &Path) -> bool;
}

/// Loader over the real filesystem.
#[derive(Default)]
pub struct FsLoader;

impl FileLoader for FsLoader {
    fn load(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// In-memory loader for tests.
#[derive(Default)]
pub struct MemoryLoader {
    files: HashMap<PathBuf, String>,
}

impl MemoryLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file.
    pub fn add(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }
}

impl FileLoader for MemoryLoader {
    fn load(&self, path: &Path) -> io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }
}

/// Resolve an include operand against the including file and the user
/// include paths.
pub(crate) fn resolve_include(
    loader: &dyn FileLoader,
    including_file: &str,
    include_paths: &[PathBuf],
    name: &str,
    angled: bool,
) -> Option<PathBuf> {
    if !angled {
        let dir = Path::new(including_file)
            .parent()
            .unwrap_or_else(|| Path::new("."));
        let candidate = dir.join(name);
        if loader.exists(&candidate) {
            return Some(candidate);
        }
    }
    for dir in include_paths {
        let candidate = dir.join(name);
        if loader.exists(&candidate) {
            return Some(candidate);
        }
    }
    None
}
