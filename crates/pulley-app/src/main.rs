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

//! Binary entrypoint: parses the command line and runs one upload command.

use clap::Parser;
use pulley_app::{AppResult, Cli, run_app};

/// Runs the requested command and exits once it finishes.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app(Cli::parse()).await
}
