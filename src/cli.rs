//! Command-line interface parsing for Gram Data
//!
//! This module handles parsing of CLI arguments using clap, with environment
//! fallbacks for the api key and storage locations, and derives the runtime
//! [`Config`].

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::cache::{CacheManager, CacheStore, MemoryCache};
use crate::data::upstream::DEFAULT_BASE_URL;
use crate::data::DistrictRequest;
use crate::store::JsonFileStore;

/// Error types for CLI configuration
#[derive(Debug, Error)]
pub enum CliError {
    /// No platform directory could be found and none was given
    #[error("could not determine a {0} directory; pass --{0}-dir")]
    NoDirectory(&'static str),

    /// Refresh interval of zero
    #[error("refresh interval must be at least one second")]
    ZeroInterval,
}

/// Gram Data - monthly employment guarantee scheme summaries per district
#[derive(Parser, Debug)]
#[command(name = "gramdata")]
#[command(about = "Monthly employment guarantee scheme summaries per district")]
#[command(version)]
pub struct Cli {
    /// API key for the open-data portal
    #[arg(long, env = "GOV_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Resource endpoint of the upstream dataset
    #[arg(long, env = "GRAMDATA_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub base_url: String,

    /// Directory for cached summaries
    #[arg(long, env = "GRAMDATA_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Directory for the durable summary store
    #[arg(long, env = "GRAMDATA_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Keep the cache in memory for this run instead of on disk
    #[arg(long, global = true)]
    pub memory_cache: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Summarize one district month by month
    ///
    /// Examples:
    ///   gramdata summary --state Maharashtra --district Pune --fin-year 2024-2025
    ///   gramdata summary --state Kerala --district Idukki --fiscal-order
    Summary {
        /// State name, e.g. "Maharashtra"
        #[arg(long)]
        state: Option<String>,

        /// District name, e.g. "Pune"
        #[arg(long)]
        district: Option<String>,

        /// Financial year, e.g. "2024-2025"
        #[arg(long)]
        fin_year: Option<String>,

        /// Order months April to March instead of upstream order
        #[arg(long)]
        fiscal_order: bool,
    },

    /// Overwrite stored state data with fresh raw upstream rows
    Refresh {
        /// Keep running and refresh on an interval
        #[arg(long)]
        watch: bool,

        /// Seconds between refresh passes with --watch
        #[arg(long, default_value_t = 86_400)]
        interval_secs: u64,
    },
}

/// Where the summary cache lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    /// Disk cache; `None` means the platform cache directory
    Disk(Option<PathBuf>),
}

/// Runtime configuration derived from CLI arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: String,
    pub cache: CacheBackend,
    /// `None` means the platform data directory
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Creates a Config from parsed CLI arguments
    pub fn from_cli(cli: &Cli) -> Self {
        let cache = if cli.memory_cache {
            CacheBackend::Memory
        } else {
            CacheBackend::Disk(cli.cache_dir.clone())
        };

        Config {
            api_key: cli.api_key.clone().filter(|key| !key.trim().is_empty()),
            base_url: cli.base_url.clone(),
            cache,
            data_dir: cli.data_dir.clone(),
        }
    }

    /// Opens the configured cache backend
    pub fn cache_store(&self) -> Result<Box<dyn CacheStore>, CliError> {
        match &self.cache {
            CacheBackend::Memory => Ok(Box::new(MemoryCache::new())),
            CacheBackend::Disk(Some(dir)) => Ok(Box::new(CacheManager::with_dir(dir.clone()))),
            CacheBackend::Disk(None) => CacheManager::new()
                .map(|cache| Box::new(cache) as Box<dyn CacheStore>)
                .ok_or(CliError::NoDirectory("cache")),
        }
    }

    /// Opens the durable summary store
    pub fn summary_store(&self) -> Result<JsonFileStore, CliError> {
        match &self.data_dir {
            Some(dir) => Ok(JsonFileStore::in_dir(dir)),
            None => JsonFileStore::new().ok_or(CliError::NoDirectory("data")),
        }
    }
}

impl Command {
    /// Builds the inbound request for the `summary` subcommand
    pub fn district_request(&self) -> Option<DistrictRequest> {
        match self {
            Command::Summary {
                state,
                district,
                fin_year,
                ..
            } => Some(DistrictRequest {
                district: district.clone(),
                state_name: state.clone(),
                fin_year: fin_year.clone(),
            }),
            Command::Refresh { .. } => None,
        }
    }
}

/// Parses a refresh interval in seconds
pub fn refresh_interval(secs: u64) -> Result<Duration, CliError> {
    if secs == 0 {
        return Err(CliError::ZeroInterval);
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_summary() {
        let cli = Cli::parse_from([
            "gramdata",
            "summary",
            "--state",
            "Maharashtra",
            "--district",
            "Pune",
            "--fin-year",
            "2024-2025",
        ]);

        let request = cli.command.district_request().unwrap();
        assert_eq!(request.state_name.as_deref(), Some("Maharashtra"));
        assert_eq!(request.district.as_deref(), Some("Pune"));
        assert_eq!(request.fin_year.as_deref(), Some("2024-2025"));
    }

    #[test]
    fn test_cli_summary_fields_are_optional() {
        let cli = Cli::parse_from(["gramdata", "summary", "--state", "Goa"]);

        let request = cli.command.district_request().unwrap();
        assert!(request.district.is_none());
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_cli_parse_refresh_defaults() {
        let cli = Cli::parse_from(["gramdata", "refresh"]);

        match cli.command {
            Command::Refresh {
                watch,
                interval_secs,
            } => {
                assert!(!watch);
                assert_eq!(interval_secs, 86_400);
            }
            other => panic!("expected refresh, got {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "gramdata",
            "refresh",
            "--memory-cache",
            "--data-dir",
            "/tmp/gramdata",
            "--api-key",
            "abc",
        ]);

        let config = Config::from_cli(&cli);
        assert_eq!(config.cache, CacheBackend::Memory);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/gramdata")));
        assert_eq!(config.api_key.as_deref(), Some("abc"));
    }

    #[test]
    fn test_config_uses_disk_cache_by_default() {
        let cli = Cli::parse_from(["gramdata", "--cache-dir", "/tmp/c", "summary"]);

        let config = Config::from_cli(&cli);
        assert_eq!(config.cache, CacheBackend::Disk(Some(PathBuf::from("/tmp/c"))));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_blank_api_key_is_absent() {
        let cli = Cli::parse_from(["gramdata", "--api-key", "  ", "summary"]);
        assert!(Config::from_cli(&cli).api_key.is_none());
    }

    #[test]
    fn test_refresh_interval() {
        assert_eq!(refresh_interval(60).unwrap(), Duration::from_secs(60));
        assert!(matches!(refresh_interval(0), Err(CliError::ZeroInterval)));
    }
}
