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

//! Loads and validates the JSON configuration file read once at process
//! startup: media-manager instances, download-client endpoints, the
//! connections between them, and the reconciliation driver's tunables.

mod defaults;
mod error;
mod loader;
mod model;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::load;
pub use model::{
    ConnectionConfig, DownloadClientConfig, KIND_MOVIES, KIND_SERIES, MediaManagerConfig,
    RawConfig, TransferConfig, TunablesConfig,
};
pub use validate::validate;
