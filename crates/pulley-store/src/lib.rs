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

//! Durable storage for upload outcomes and relaunch state.
//!
//! Layout: `results.rs` (append-only result log), `handler.rs` (background handler id),
//! `error.rs`.

pub mod error;
pub mod handler;
pub mod results;

pub use error::{StoreError, StoreResult};
pub use handler::{HandlerStore, PersistedHandler};
pub use results::ResultStore;
