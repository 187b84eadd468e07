//! Temporary directory trees holding upload sources.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;

/// Temporary directory populated with files to upload. Removed on drop.
pub struct SampleTree {
    dir: TempDir,
}

impl SampleTree {
    /// Create an empty tree.
    ///
    /// # Errors
    ///
    /// Returns an error when the temporary directory cannot be created.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("pulley-fixture").tempdir()?;
        Ok(Self { dir })
    }

    /// Root of the tree.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `name` (relative to the root), creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be written.
    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Create a sub-directory, useful for directory-path rejections.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be created.
    pub fn dir(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Path under the root that does not exist.
    #[must_use]
    pub fn missing(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
