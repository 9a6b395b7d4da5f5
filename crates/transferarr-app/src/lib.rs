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

//! Transferarr binary wiring.
//!
//! Layout: `cli.rs` (argument parsing), `bootstrap.rs` (service assembly and
//! the run loop), `error.rs` (top-level errors and exit codes).

/// Application bootstrap and the reconciliation run loop.
pub mod bootstrap;
/// Command-line surface.
pub mod cli;
/// Top-level application errors and their process exit codes.
pub mod error;

pub use bootstrap::run;
pub use cli::Cli;
pub use error::AppError;
