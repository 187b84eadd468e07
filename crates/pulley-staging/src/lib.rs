#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Request body staging for multipart uploads.
//!
//! Layout: `files.rs` (file validation and MIME detection), `builder.rs` (multipart
//! encoding into temp files), `error.rs`.

pub mod builder;
pub mod error;
pub mod files;

pub use builder::{BOUNDARY_PREFIX, RequestBodyBuilder, StagedRequest, remove_staged};
pub use error::{StagingError, StagingResult};
pub use files::{DEFAULT_MIME_TYPE, UploadFileInfo, mime_for_path};
