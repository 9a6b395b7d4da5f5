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

//! Binary entrypoint that parses arguments, bootstraps the application, and
//! maps failures onto process exit codes.

use clap::Parser;
use transferarr_app::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(error) = transferarr_app::run(&cli).await {
        tracing::error!(error = %error, "transferarr exited with an error");
        std::process::exit(error.exit_code());
    }
}
