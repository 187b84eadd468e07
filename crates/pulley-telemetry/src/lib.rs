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

//! Telemetry primitives shared across the Pulley workspace.
//!
//! This crate centralises logging and metrics so the upload manager and the CLI emit a
//! consistent observability story.
//!
//! Layout: `init.rs` (subscriber install), `context.rs` (process span),
//! `metrics.rs` (Prometheus counters), `error.rs`.

pub mod context;
pub mod error;
pub mod init;
pub mod metrics;

pub use context::GlobalContextGuard;
pub use error::{TelemetryError, TelemetryResult};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use metrics::{Metrics, MetricsSnapshot};
