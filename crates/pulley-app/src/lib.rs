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

//! Pulley application wiring: the upload manager, bootstrap and CLI.
//!
//! Layout: `manager.rs` (task orchestration), `bootstrap.rs` (dependency wiring),
//! `cli.rs` (command line), `error.rs`.

/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Command line definitions and execution.
pub mod cli;
pub mod error;
/// Upload orchestration.
pub mod manager;

pub use bootstrap::run_app;
pub use cli::{Cli, Command, execute};
pub use error::{AppError, AppResult};
pub use manager::{
    BackgroundCompletion, ManagerHandle, TRANSPORT_FAILURE_STATUS, UPLOAD_ERROR_CODE,
    UploadManager,
};
