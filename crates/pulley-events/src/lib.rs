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

//! Upload lifecycle events and their delivery primitives.
//!
//! Layout: `payloads.rs` (event types), `notifier.rs` (ordered observer fan-out),
//! `caching.rs` (listener-less buffering), `hub.rs` (live delivery observer), `error.rs`.

pub mod caching;
pub mod error;
pub mod hub;
pub mod notifier;
pub mod payloads;

pub use caching::{CachedEvents, CachingStream};
pub use error::{EventsError, EventsResult};
pub use hub::EventHub;
pub use notifier::{EventNotifier, UploadObserver};
pub use payloads::{CANCELED_PROGRESS, ProgressEvent, ResultEvent, TaskId, UploadEvent, UploadStatus};
