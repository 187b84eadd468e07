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

//! HTTP transport that multiplexes upload units across two execution contexts.
//!
//! Layout: `session.rs` (contexts, caps, unit lifecycle), `request.rs` (unit descriptors
//! and headers), `blocks.rs` (sequential range uploads), `callbacks.rs` (sharded callback
//! workers), `connectivity.rs` (metered-network seam), `events.rs`, `error.rs`.

mod blocks;
pub mod callbacks;
pub mod connectivity;
pub mod error;
pub mod events;
pub mod request;
pub mod session;

pub use callbacks::CallbackWorkers;
pub use connectivity::{ConnectivityMonitor, StaticConnectivity};
pub use error::{TransportError, TransportResult};
pub use events::{BodySource, TransportDelegate, TransportEvent, TransportOutcome};
pub use request::{TransferMode, TransportRequest, compose_headers};
pub use session::{ContextKind, InFlightUnit, PreparedUnit, SessionOptions, TransportSession};
