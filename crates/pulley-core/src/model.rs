//! Upload request types and their validation.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{UploadError, UploadResult};

/// `Accept` header sent with every upload request.
pub const DEFAULT_ACCEPT: &str = "*/*";

/// HTTP methods accepted for uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
}

impl HttpMethod {
    /// Parse a method name, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::InvalidMethod`] for anything other than POST, PUT or PATCH.
    pub fn parse(value: &str) -> UploadResult<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            _ => Err(UploadError::InvalidMethod {
                method: value.to_string(),
            }),
        }
    }

    /// Canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = UploadError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Display for HttpMethod {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// File reference inside a multipart request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileItem {
    /// Form field the file is attached to.
    pub field_name: String,
    /// Local path of the file.
    pub path: PathBuf,
}

/// Plain form field inside a multipart request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    /// Field name.
    pub key: String,
    /// Field value.
    pub value: String,
}

/// Multipart upload request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueRequest {
    /// Destination URL.
    pub url: String,
    /// HTTP method name.
    #[serde(default = "default_method")]
    pub method: String,
    /// Caller headers, applied after the defaults.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Files to attach, in order.
    #[serde(default)]
    pub files: Vec<FileItem>,
    /// Form fields, in order.
    #[serde(default)]
    pub data: Vec<FormField>,
    /// Correlation tag echoed on every event.
    #[serde(default)]
    pub tag: Option<String>,
    /// Whether metered connections may carry the upload.
    #[serde(default = "default_allow_cellular")]
    pub allow_cellular: bool,
}

/// Raw-binary upload request; the file is the whole body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueBinaryRequest {
    /// Destination URL.
    pub url: String,
    /// HTTP method name.
    #[serde(default = "default_method")]
    pub method: String,
    /// Caller headers, applied after the defaults.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// File sent as the request body.
    pub path: PathBuf,
    /// Correlation tag echoed on every event.
    #[serde(default)]
    pub tag: Option<String>,
    /// Whether metered connections may carry the upload.
    #[serde(default = "default_allow_cellular")]
    pub allow_cellular: bool,
}

/// Sequential block upload request; the file is sent as consecutive ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueBlockRequest {
    /// Destination URL.
    pub url: String,
    /// HTTP method name.
    #[serde(default = "default_method")]
    pub method: String,
    /// Caller headers, applied after the defaults.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// File to split into blocks.
    pub path: PathBuf,
    /// Block size in bytes; the configured default applies when absent.
    #[serde(default)]
    pub block_size: Option<u64>,
    /// Correlation tag echoed on every event.
    #[serde(default)]
    pub tag: Option<String>,
    /// Whether metered connections may carry the upload.
    #[serde(default = "default_allow_cellular")]
    pub allow_cellular: bool,
}

/// Validated destination for an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    /// Parsed destination.
    pub url: Url,
    /// Accepted method.
    pub method: HttpMethod,
    /// Caller headers.
    pub headers: BTreeMap<String, String>,
}

impl EnqueueRequest {
    /// Validate method, file list, URL and field names, in that order.
    ///
    /// File existence is checked later, while the body is staged.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn validate(&self) -> UploadResult<UploadTarget> {
        let method = HttpMethod::parse(&self.method)?;
        if self.files.is_empty() {
            return Err(UploadError::InvalidFiles);
        }
        let url = parse_url(&self.url)?;
        if self.files.iter().any(|file| file.field_name.trim().is_empty()) {
            return Err(UploadError::InvalidParameters {
                field: "field_name",
            });
        }
        if self.data.iter().any(|field| field.key.trim().is_empty()) {
            return Err(UploadError::InvalidParameters { field: "data" });
        }
        Ok(UploadTarget {
            url,
            method,
            headers: self.headers.clone(),
        })
    }
}

impl EnqueueBinaryRequest {
    /// Validate method, URL and the body file.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn validate(&self) -> UploadResult<UploadTarget> {
        let method = HttpMethod::parse(&self.method)?;
        let url = parse_url(&self.url)?;
        check_body_file(&self.path)?;
        Ok(UploadTarget {
            url,
            method,
            headers: self.headers.clone(),
        })
    }
}

impl EnqueueBlockRequest {
    /// Validate method, URL, the body file and the block size.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn validate(&self) -> UploadResult<UploadTarget> {
        let method = HttpMethod::parse(&self.method)?;
        let url = parse_url(&self.url)?;
        check_body_file(&self.path)?;
        if self.block_size == Some(0) {
            return Err(UploadError::InvalidParameters {
                field: "block_size",
            });
        }
        Ok(UploadTarget {
            url,
            method,
            headers: self.headers.clone(),
        })
    }
}

/// Parse a boolean flag supplied as text.
///
/// # Errors
///
/// Returns [`UploadError::InvalidFlag`] for anything but `true`/`false`/`1`/`0`.
pub fn parse_flag(name: &'static str, value: &str) -> UploadResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(UploadError::InvalidFlag {
            name,
            value: value.to_string(),
        }),
    }
}

fn parse_url(raw: &str) -> UploadResult<Url> {
    let invalid = || UploadError::InvalidUrl {
        url: raw.to_string(),
    };
    let url = Url::parse(raw.trim()).map_err(|_| invalid())?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        _ => Err(invalid()),
    }
}

fn check_body_file(path: &Path) -> UploadResult<()> {
    if path.as_os_str().is_empty() {
        return Err(UploadError::InvalidFilePath);
    }
    if !path.exists() {
        return Err(UploadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn default_method() -> String {
    HttpMethod::Post.as_str().to_string()
}

const fn default_allow_cellular() -> bool {
    true
}
