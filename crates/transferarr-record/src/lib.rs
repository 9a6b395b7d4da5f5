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
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! The torrent record model and its crash-safe JSON state store.

pub mod error;
pub mod model;
pub mod store;

pub use error::{StateStoreError, StateStoreResult};
pub use model::{
    ErrorInfo, ErrorKind, InfoHash, InvalidInfoHash, JobOutcome, ProgressView, TorrentRecord,
    TorrentState,
};
pub use store::TorrentStore;
