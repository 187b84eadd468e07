//! Multipart request body staging.
//!
//! # Design
//! - Bodies are streamed into a unique file under `<staging>/requests/`, never held in memory.
//! - Every file is validated before anything is written, so a bad path leaves no artifact.
//! - Builds are serialised by a lock; the lock covers only the builder's own file writes.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use pulley_core::{FileItem, FormField};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StagingError, StagingResult};
use crate::files::UploadFileInfo;

/// Leading dashes of every generated boundary.
pub const BOUNDARY_PREFIX: &str = "---------------------------------";

const REQUESTS_DIR: &str = "requests";
const REQUEST_SUFFIX: &str = "req";

/// Fully encoded multipart body on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRequest {
    /// Location of the staged body.
    pub path: PathBuf,
    /// Boundary separating the parts.
    pub boundary: String,
    /// Size of the staged body in bytes.
    pub content_length: u64,
}

impl StagedRequest {
    /// `Content-Type` header value announcing the boundary.
    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

/// Writes multipart bodies into the staging directory.
pub struct RequestBodyBuilder {
    requests_dir: PathBuf,
    guard: Mutex<()>,
}

impl RequestBodyBuilder {
    /// Construct a builder staging into `<staging_dir>/requests`.
    #[must_use]
    pub fn new(staging_dir: &Path) -> Self {
        Self {
            requests_dir: staging_dir.join(REQUESTS_DIR),
            guard: Mutex::new(()),
        }
    }

    /// Directory receiving staged bodies.
    #[must_use]
    pub fn requests_dir(&self) -> &Path {
        &self.requests_dir
    }

    /// Validate the files, then encode fields and files into a new staged body.
    ///
    /// Fields are written first, then files, each in the order given.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError::NoFiles`] for an empty file list, a path error for the
    /// first missing or directory entry, or an IO error when writing fails. No staged
    /// file survives a failed build.
    pub fn build_multipart(
        &self,
        fields: &[FormField],
        files: &[FileItem],
    ) -> StagingResult<StagedRequest> {
        if files.is_empty() {
            return Err(StagingError::NoFiles);
        }
        let infos = files
            .iter()
            .map(UploadFileInfo::resolve)
            .collect::<StagingResult<Vec<_>>>()?;

        let _build = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        fs::create_dir_all(&self.requests_dir)
            .map_err(|err| StagingError::io("staging.create_dir", &self.requests_dir, err))?;

        let boundary = new_boundary();
        let path = self
            .requests_dir
            .join(format!("{}.{REQUEST_SUFFIX}", Uuid::new_v4()));

        if let Err(err) = write_body(&path, &boundary, fields, &infos) {
            discard_partial(&path);
            return Err(err);
        }

        let content_length = fs::metadata(&path)
            .map_err(|err| StagingError::io("staging.metadata", &path, err))?
            .len();
        debug!(
            path = %path.display(),
            parts = fields.len() + infos.len(),
            content_length,
            "staged multipart body"
        );
        Ok(StagedRequest {
            path,
            boundary,
            content_length,
        })
    }
}

/// Delete a staged body. A file that is already gone is not an error.
///
/// # Errors
///
/// Returns an IO error when the file exists but cannot be removed.
pub fn remove_staged(path: &Path) -> StagingResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StagingError::io("staging.remove", path, err)),
    }
}

fn new_boundary() -> String {
    format!("{BOUNDARY_PREFIX}{}", Uuid::new_v4().simple())
}

fn write_body(
    path: &Path,
    boundary: &str,
    fields: &[FormField],
    files: &[UploadFileInfo],
) -> StagingResult<()> {
    let file = File::create(path).map_err(|err| StagingError::io("staging.create", path, err))?;
    let mut writer = BufWriter::new(file);
    let wrap = |err: io::Error| StagingError::io("staging.write", path, err);

    for field in fields {
        write!(
            writer,
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            field.key, field.value
        )
        .map_err(wrap)?;
    }

    for info in files {
        write!(
            writer,
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            info.field_name,
            info.file_name(),
            info.mime_type
        )
        .map_err(wrap)?;
        let mut source = File::open(&info.path)
            .map_err(|err| StagingError::io("staging.open_source", &info.path, err))?;
        io::copy(&mut source, &mut writer)
            .map_err(|err| StagingError::io("staging.copy", &info.path, err))?;
        writer.write_all(b"\r\n").map_err(wrap)?;
    }

    write!(writer, "--{boundary}--\r\n").map_err(wrap)?;
    writer.flush().map_err(wrap)?;
    Ok(())
}

fn discard_partial(path: &Path) {
    if let Err(err) = remove_staged(path) {
        warn!(error = %err, path = %path.display(), "failed to discard partial staged body");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    fn field(key: &str, value: &str) -> FormField {
        FormField {
            key: key.into(),
            value: value.into(),
        }
    }

    fn file_item(field_name: &str, path: &Path) -> FileItem {
        FileItem {
            field_name: field_name.into(),
            path: path.to_path_buf(),
        }
    }

    #[test]
    fn multipart_body_has_fields_then_files_then_closing_marker() -> anyhow::Result<()> {
        let dir = tempfile::Builder::new().prefix("pulley-staging").tempdir()?;
        let source = dir.path().join("report.txt");
        fs::write(&source, b"hello world")?;

        let builder = RequestBodyBuilder::new(dir.path());
        let staged =
            builder.build_multipart(&[field("user", "42")], &[file_item("upload", &source)])?;

        assert!(staged.path.starts_with(builder.requests_dir()));
        assert_eq!(staged.path.extension().and_then(|e| e.to_str()), Some("req"));
        assert!(staged.boundary.starts_with(BOUNDARY_PREFIX));
        assert_eq!(
            staged.content_type(),
            format!("multipart/form-data; boundary={}", staged.boundary)
        );

        let body = fs::read_to_string(&staged.path)?;
        let b = &staged.boundary;
        let expected = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"user\"\r\n\r\n42\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"upload\"; filename=\"report.txt\"\r\nContent-Type: text/plain\r\n\r\nhello world\r\n\
             --{b}--\r\n"
        );
        assert_eq!(body, expected);
        assert_eq!(staged.content_length, expected.len() as u64);

        remove_staged(&staged.path)?;
        assert!(!staged.path.exists());
        remove_staged(&staged.path)?;
        Ok(())
    }

    #[test]
    fn missing_file_aborts_without_artifacts() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let present = dir.path().join("a.bin");
        fs::write(&present, b"a")?;
        let missing = dir.path().join("b.bin");

        let builder = RequestBodyBuilder::new(dir.path());
        let err = builder.build_multipart(
            &[],
            &[file_item("a", &present), file_item("b", &missing)],
        );
        match err {
            Err(StagingError::MissingFile { path }) => assert_eq!(path, missing),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!builder.requests_dir().exists());

        assert!(matches!(
            builder.build_multipart(&[field("k", "v")], &[]),
            Err(StagingError::NoFiles)
        ));
        Ok(())
    }

    #[test]
    fn concurrent_builds_produce_distinct_intact_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("payload.bin");
        fs::write(&source, vec![7_u8; 64 * 1024])?;
        let builder = Arc::new(RequestBodyBuilder::new(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|index| {
                let builder = Arc::clone(&builder);
                let source = source.clone();
                thread::spawn(move || {
                    builder.build_multipart(
                        &[field("index", &index.to_string())],
                        &[file_item("file", &source)],
                    )
                })
            })
            .collect();

        let mut paths = HashSet::new();
        for handle in handles {
            let staged = handle
                .join()
                .map_err(|_| anyhow::anyhow!("builder thread panicked"))??;
            let bytes = fs::read(&staged.path)?;
            assert_eq!(bytes.len() as u64, staged.content_length);
            let closing = format!("--{}--\r\n", staged.boundary);
            assert!(bytes.ends_with(closing.as_bytes()));
            paths.insert(staged.path);
        }
        assert_eq!(paths.len(), 8);
        Ok(())
    }
}
