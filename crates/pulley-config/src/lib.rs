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

//! Uploader configuration: defaults, file and environment loading, validation.
//!
//! Layout: `model.rs` (typed settings), `defaults.rs` (built-in values),
//! `loader.rs` (YAML + environment layering), `validate.rs`, `error.rs`.

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ENV_CONFIG_FILE, ENV_PREFIX};
pub use model::UploaderConfig;
