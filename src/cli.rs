//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use chrono::NaiveDate;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::DateRange;

/// Meterdash - dashboard reports for water-utility billing backends
///
/// Pulls every dashboard source for a site in parallel and renders
/// whatever arrived, flagging the sources that failed.
///
/// Examples:
///   meterdash --site north
///   meterdash --site north --start 2024-03-01 --end 2024-03-31 --format json
///   meterdash --site north --resident r-17
///   meterdash --site north --watch 60
///   meterdash --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Site to report on
    #[arg(short, long, value_name = "ID", required_unless_present = "init_config")]
    pub site: Option<String>,

    /// Report on a single resident of the site instead of the dashboard
    #[arg(short, long, value_name = "ID")]
    pub resident: Option<String>,

    /// First day of the reporting range (YYYY-MM-DD)
    ///
    /// Defaults to the first day of the current month.
    #[arg(long, value_name = "DATE", requires = "end")]
    pub start: Option<NaiveDate>,

    /// Last day of the reporting range (YYYY-MM-DD), inclusive
    #[arg(long, value_name = "DATE", requires = "start")]
    pub end: Option<NaiveDate>,

    /// Treat this date as today when computing the default range
    #[arg(long, value_name = "DATE")]
    pub today: Option<NaiveDate>,

    /// Billing backend base URL
    #[arg(long, value_name = "URL", env = "METERDASH_API_URL")]
    pub api_url: Option<String>,

    /// Bearer token for the backend
    #[arg(long, value_name = "TOKEN", env = "METERDASH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// File holding the bearer token; removed when the backend rejects it
    #[arg(long, value_name = "FILE")]
    pub token_file: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .meterdash.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Exit with code 2 when any source failed
    #[arg(long)]
    pub fail_on_partial: bool,

    /// Refresh the report every SECS seconds until interrupted
    #[arg(long, value_name = "SECS")]
    pub watch: Option<u64>,

    /// Generate a default .meterdash.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The site id, empty when not given.
    pub fn site_id(&self) -> &str {
        self.site.as_deref().unwrap_or("")
    }

    /// The explicit date range, when both ends were given.
    pub fn range(&self) -> Option<DateRange> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(DateRange::new(start, end)),
            _ => None,
        }
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(range) = self.range() {
            if !range.is_ordered() {
                return Err("--start must not be after --end".to_string());
            }
            if self.resident.is_some() {
                return Err("A date range only applies to the site dashboard".to_string());
            }
        }

        if let Some(ref url) = self.api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("API URL must start with 'http://' or 'https://'".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(watch) = self.watch {
            if watch == 0 {
                return Err("Watch interval must be at least 1 second".to_string());
            }
            if self.fail_on_partial {
                return Err("Cannot use --fail-on-partial with --watch".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            site: Some("north".to_string()),
            resident: None,
            start: None,
            end: None,
            today: None,
            api_url: None,
            token: None,
            token_file: None,
            timeout: None,
            format: None,
            output: None,
            config: None,
            verbose: false,
            quiet: false,
            fail_on_partial: false,
            watch: None,
            init_config: false,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_dates_from_command_line() {
        let args = Args::try_parse_from([
            "meterdash",
            "--site",
            "north",
            "--start",
            "2024-03-01",
            "--end",
            "2024-03-31",
        ])
        .unwrap();
        assert_eq!(
            args.range(),
            Some(DateRange::new(date(2024, 3, 1), date(2024, 3, 31)))
        );
    }

    #[test]
    fn test_start_requires_end() {
        let result = Args::try_parse_from(["meterdash", "--site", "north", "--start", "2024-03-01"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_reversed_range() {
        let mut args = make_args();
        args.start = Some(date(2024, 3, 31));
        args.end = Some(date(2024, 3, 1));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_range_with_resident() {
        let mut args = make_args();
        args.start = Some(date(2024, 3, 1));
        args.end = Some(date(2024, 3, 31));
        args.resident = Some("r-1".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.api_url = Some("localhost:8080".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.watch = Some(30);
        args.fail_on_partial = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
