//! Command-line surface.

use std::path::PathBuf;

use clap::Parser;
use transferarr_telemetry::LogFormat;

/// Moves completed torrents between two download clients under the
/// direction of external media managers.
#[derive(Debug, Parser)]
#[command(name = "transferarr", version, about)]
pub struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, env = "TRANSFERARR_CONFIG")]
    pub config: PathBuf,

    /// Directory the persisted state file and history log live in.
    #[arg(long, env = "TRANSFERARR_STATE_DIR")]
    pub state_dir: PathBuf,

    /// Log output format.
    #[arg(long, env = "TRANSFERARR_LOG_FORMAT", value_parser = parse_log_format)]
    pub log_format: Option<LogFormat>,

    /// Overrides the reconciliation tick period, in milliseconds. Intended
    /// for tests; the configuration file's `tunables.tick_ms` is used
    /// otherwise.
    #[arg(long)]
    pub tick_ms: Option<u64>,
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    LogFormat::parse(value).ok_or_else(|| format!("unknown log format '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_arguments() {
        let cli = Cli::parse_from([
            "transferarr",
            "--config",
            "/etc/transferarr.json",
            "--state-dir",
            "/var/lib/transferarr",
        ]);
        assert_eq!(cli.config, PathBuf::from("/etc/transferarr.json"));
        assert_eq!(cli.state_dir, PathBuf::from("/var/lib/transferarr"));
        assert!(cli.log_format.is_none());
        assert!(cli.tick_ms.is_none());
    }

    #[test]
    fn parses_log_format_and_tick_override() {
        let cli = Cli::parse_from([
            "transferarr",
            "--config",
            "c.json",
            "--state-dir",
            "state",
            "--log-format",
            "json",
            "--tick-ms",
            "500",
        ]);
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert_eq!(cli.tick_ms, Some(500));
    }

    #[test]
    fn rejects_unknown_log_format() {
        let result = Cli::try_parse_from([
            "transferarr",
            "--config",
            "c.json",
            "--state-dir",
            "state",
            "--log-format",
            "xml",
        ]);
        assert!(result.is_err());
    }
}
