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

//! Engine-agnostic upload domain types, the task registry, and service interfaces.
//!
//! Layout: `model.rs` (requests and validation), `registry.rs` (task state machine),
//! `service.rs` (workflow traits), `error.rs` (caller-facing errors).

pub mod error;
pub mod model;
pub mod registry;
pub mod service;

pub use error::{ErrorPayload, UploadError, UploadResult};
pub use model::{
    DEFAULT_ACCEPT, EnqueueBinaryRequest, EnqueueBlockRequest, EnqueueRequest, FileItem,
    FormField, HttpMethod, UploadTarget, parse_flag,
};
pub use pulley_events::{TaskId, UploadStatus};
pub use registry::{FinishedTask, TaskRegistry, UploadTask, progress_percent, should_emit};
pub use service::{UploadInspector, UploadWorkflow};
