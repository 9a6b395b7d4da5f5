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
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Shared test fixtures: in-memory endpoint and media-manager fakes, a
//! record builder, and an environment probe used to skip tests that need a
//! container runtime.

pub mod fixtures;

pub use fixtures::{
    docker_available, hash_from_seed, open_temp_store, sample_record, FakeEndpoint,
    FakeMediaManager,
};
