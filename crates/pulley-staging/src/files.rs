//! Upload file validation and MIME detection.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use pulley_core::FileItem;

use crate::error::{StagingError, StagingResult};

/// MIME type used when the extension is unknown.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// A file that passed validation and is ready to be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFileInfo {
    /// Form field the file is attached to.
    pub field_name: String,
    /// Local path of the file.
    pub path: PathBuf,
    /// Content type derived from the extension.
    pub mime_type: &'static str,
}

impl UploadFileInfo {
    /// Validate a file reference: it must exist and must not be a directory.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError::MissingFile`], [`StagingError::Directory`], or an IO
    /// error when the metadata cannot be read.
    pub fn resolve(item: &FileItem) -> StagingResult<Self> {
        let path = &item.path;
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StagingError::MissingFile { path: path.clone() });
            }
            Err(err) => return Err(StagingError::io("staging.metadata", path.clone(), err)),
        };
        if metadata.is_dir() {
            return Err(StagingError::Directory { path: path.clone() });
        }
        Ok(Self {
            field_name: item.field_name.clone(),
            path: path.clone(),
            mime_type: mime_for_path(path),
        })
    }

    /// Base name written into the part's `filename` parameter.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(String::new, |name| name.to_string_lossy().into_owned())
    }
}

/// Content type for a path, chosen by its extension.
#[must_use]
pub fn mime_for_path(path: &Path) -> &'static str {
    let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
        return DEFAULT_MIME_TYPE;
    };
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "svg" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "xml" => "application/xml",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "htm" | "html" => "text/html",
        _ => DEFAULT_MIME_TYPE,
    }
}
