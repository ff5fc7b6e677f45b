//! Runtime configuration: CLI flags, environment variables, and an optional
//! TOML file, layered in that order of precedence via `clap`'s `env` support
//! (SPEC_FULL.md §4.9).
//!
//! Grounded on the `clap::Parser` + `#[arg(long, env = "...")]` style used by
//! `cooprefr-bettersys`'s `latency-sweep/probe/src/main.rs`, generalized to
//! also accept a TOML file for the settings that don't make sense as a
//! single flag (the symbol list, retry budget).

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::types::Symbol;

/// `matchcore-server` configuration.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Matching engine and market-data fan-out core")]
pub struct Cli {
    /// Path to a TOML config file. CLI flags and environment variables
    /// override values it sets.
    #[arg(long, env = "MATCHCORE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address the HTTP/WebSocket adapter binds to.
    #[arg(long, env = "MATCHCORE_BIND_ADDR")]
    pub bind_addr: Option<SocketAddr>,

    /// Comma-separated list of symbols to start workers for.
    #[arg(long, env = "MATCHCORE_SYMBOLS", value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Directory for the journal-backed durable store. Omit to run with the
    /// process-lifetime in-memory store.
    #[arg(long, env = "MATCHCORE_JOURNAL_DIR")]
    pub journal_dir: Option<PathBuf>,

    /// Maximum bytes per journal segment file before rotation.
    #[arg(long, env = "MATCHCORE_JOURNAL_SEGMENT_BYTES")]
    pub journal_segment_bytes: Option<u64>,

    /// NATS server URL for cross-process event fan-out. Requires the `nats`
    /// feature.
    #[arg(long, env = "MATCHCORE_NATS_URL")]
    pub nats_url: Option<String>,

    /// Maximum retry attempts for a transiently failing store write before
    /// the command is rejected with `EngineUnavailable`.
    #[arg(long, env = "MATCHCORE_RETRY_MAX_ATTEMPTS")]
    pub retry_max_attempts: Option<u32>,

    /// `tracing_subscriber::EnvFilter` directive string.
    #[arg(long, env = "MATCHCORE_LOG", default_value = "info")]
    pub log_filter: String,
}

/// The subset of configuration that may also come from a TOML file. CLI
/// flags and environment variables (handled by [`Cli`]) take precedence over
/// whatever a file sets.
#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    bind_addr: Option<SocketAddr>,
    symbols: Option<Vec<String>>,
    journal_dir: Option<PathBuf>,
    journal_segment_bytes: Option<u64>,
    nats_url: Option<String>,
    retry_max_attempts: Option<u32>,
    log_filter: Option<String>,
}

/// Fully resolved configuration, after merging file, environment, and CLI
/// layers.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP/WebSocket adapter binds to.
    pub bind_addr: SocketAddr,
    /// Symbols to start workers for.
    pub symbols: Vec<Symbol>,
    /// Directory for the journal-backed durable store, if any.
    pub journal_dir: Option<PathBuf>,
    /// Maximum bytes per journal segment file.
    pub journal_segment_bytes: u64,
    /// NATS server URL for cross-process event fan-out, if any.
    pub nats_url: Option<String>,
    /// Maximum retry attempts for a transiently failing store write.
    pub retry_max_attempts: u32,
    /// `tracing_subscriber::EnvFilter` directive string.
    pub log_filter: String,
}

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_JOURNAL_SEGMENT_BYTES: u64 = 64 * 1024 * 1024;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;

/// Error loading or resolving configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    Io { path: PathBuf, message: String },
    /// The config file was not valid TOML.
    Parse { path: PathBuf, message: String },
    /// No symbols were configured anywhere.
    NoSymbols,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, message } => {
                write!(f, "failed to read config file {}: {message}", path.display())
            }
            ConfigError::Parse { path, message } => {
                write!(f, "failed to parse config file {}: {message}", path.display())
            }
            ConfigError::NoSymbols => write!(
                f,
                "no symbols configured: pass --symbols, MATCHCORE_SYMBOLS, or a config file"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|err| ConfigError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    toml::from_str(&contents).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

impl Config {
    /// Resolve a [`Config`] from parsed CLI flags, layering in a TOML file
    /// (if `cli.config` points to one) for whatever flags were left unset.
    pub fn resolve(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => load_file(path)?,
            None => FileConfig::default(),
        };

        let bind_addr = cli
            .bind_addr
            .or(file.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.parse().expect("valid default bind addr"));

        let symbols: Vec<Symbol> = if !cli.symbols.is_empty() {
            cli.symbols.into_iter().map(Symbol::from).collect()
        } else if let Some(symbols) = file.symbols {
            symbols.into_iter().map(Symbol::from).collect()
        } else {
            Vec::new()
        };
        if symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }

        Ok(Config {
            bind_addr,
            symbols,
            journal_dir: cli.journal_dir.or(file.journal_dir),
            journal_segment_bytes: cli
                .journal_segment_bytes
                .or(file.journal_segment_bytes)
                .unwrap_or(DEFAULT_JOURNAL_SEGMENT_BYTES),
            nats_url: cli.nats_url.or(file.nats_url),
            retry_max_attempts: cli
                .retry_max_attempts
                .or(file.retry_max_attempts)
                .unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS),
            log_filter: if cli.log_filter != "info" {
                cli.log_filter
            } else {
                file.log_filter.unwrap_or(cli.log_filter)
            },
        })
    }
}
