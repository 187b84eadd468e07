//! Persisted background handler registration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Handler registration as written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedHandler {
    /// Opaque callback identifier supplied by the caller.
    pub callback_id: i64,
    /// When the registration was last written.
    pub updated_at: DateTime<Utc>,
}

/// Single-value store for the background callback identifier.
pub struct HandlerStore {
    path: PathBuf,
}

impl HandlerStore {
    /// Store backed by the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the callback identifier, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be written.
    pub fn save(&self, callback_id: i64) -> StoreResult<PersistedHandler> {
        let record = PersistedHandler {
            callback_id,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|err| StoreError::json("handler.encode", &self.path, err))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|err| StoreError::io("handler.create_dir", parent, err))?;
        }
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, json).map_err(|err| StoreError::io("handler.write", &staging, err))?;
        fs::rename(&staging, &self.path)
            .map_err(|err| StoreError::io("handler.rename", &self.path, err))?;
        Ok(record)
    }

    /// Read the persisted registration, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or decoded.
    pub fn load(&self) -> StoreResult<Option<PersistedHandler>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::io("handler.read", &self.path, err)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|err| StoreError::json("handler.decode", &self.path, err))
    }
}
