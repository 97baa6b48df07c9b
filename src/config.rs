//! Harness configuration management
//!
//! This module handles loading and validating configuration from environment variables.
//! All configuration is loaded at startup and validated before the server runs.
//! Tests build a [`Config`] explicitly from [`Config::default`] instead of reading
//! the environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use crate::constants::{
    DEFAULT_COMPILER, DEFAULT_COMPILE_TIMEOUT_SECS, DEFAULT_EDITION,
    DEFAULT_ENTRY_POINT_TIMEOUT_SECS, DEFAULT_LOG_FILTER, DEFAULT_MAX_ARTIFACT_BYTES,
    DEFAULT_OPT_LEVEL, DEFAULT_SCORE_SCALE, DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT,
    DEFAULT_SWEEP_INTERVAL_SECS, DEFAULT_WORKSPACE_ROOT,
};

/// Global configuration (lazily initialized)
pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Config::from_env().expect("Failed to load configuration from environment")
});

/// Main configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub toolchain: ToolchainConfig,
    pub execution: ExecutionConfig,
    pub cleanup: CleanupConfig,
    pub scoring: ScoringConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
}

/// Workspace storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory containing one subdirectory per in-flight submission
    pub workspace_root: PathBuf,
}

/// Compiler toolchain configuration
#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    /// Compiler executable
    pub compiler: PathBuf,
    /// Edition passed to every compiler run
    pub edition: String,
    /// Value of `-C opt-level`
    pub opt_level: String,
    /// Extra library search paths (the auxiliary test-framework libraries)
    pub library_paths: Vec<PathBuf>,
    /// Prebuilt crates made available to test units via `--extern`
    pub extern_crates: Vec<ExternCrate>,
    /// Upper bound for a single compiler run
    pub compile_timeout_secs: u64,
}

/// A prebuilt crate handed to the compiler as `--extern name=path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternCrate {
    pub name: String,
    pub path: PathBuf,
}

/// Execution limits configuration
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Hard deadline for one test entry point, measured from dispatch
    pub entry_point_timeout_secs: u64,
    /// Largest artifact the loader reads into memory
    pub max_artifact_bytes: u64,
}

/// Cleanup sweeper configuration
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    pub sweep_interval_secs: u64,
}

/// Scoring configuration
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Score of a submission that exactly matches its baseline
    pub scale: f64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig::from_env()?,
            storage: StorageConfig::from_env(),
            toolchain: ToolchainConfig::from_env()?,
            execution: ExecutionConfig::from_env()?,
            cleanup: CleanupConfig::from_env()?,
            scoring: ScoringConfig::from_env()?,
        })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
            port: parse_var("SERVER_PORT", DEFAULT_SERVER_PORT)?,
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
            rust_log: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl StorageConfig {
    fn from_env() -> Self {
        Self {
            workspace_root: PathBuf::from(
                env::var("WORKSPACE_ROOT").unwrap_or_else(|_| DEFAULT_WORKSPACE_ROOT.to_string()),
            ),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from(DEFAULT_WORKSPACE_ROOT),
        }
    }
}

impl ToolchainConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let library_paths = env::var_os("HARNESS_LIBRARY_PATHS")
            .map(|paths| env::split_paths(&paths).collect())
            .unwrap_or_default();

        let extern_crates = match env::var("HARNESS_EXTERN_CRATES") {
            Ok(raw) => parse_extern_crates(&raw)?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            compiler: PathBuf::from(
                env::var("RUSTC_PATH").unwrap_or_else(|_| DEFAULT_COMPILER.to_string()),
            ),
            edition: env::var("RUST_EDITION").unwrap_or_else(|_| DEFAULT_EDITION.to_string()),
            opt_level: env::var("RUSTC_OPT_LEVEL").unwrap_or_else(|_| DEFAULT_OPT_LEVEL.to_string()),
            library_paths,
            extern_crates,
            compile_timeout_secs: require_positive(
                "COMPILE_TIMEOUT_SECS",
                parse_var("COMPILE_TIMEOUT_SECS", DEFAULT_COMPILE_TIMEOUT_SECS)?,
            )?,
        })
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: PathBuf::from(DEFAULT_COMPILER),
            edition: DEFAULT_EDITION.to_string(),
            opt_level: DEFAULT_OPT_LEVEL.to_string(),
            library_paths: Vec::new(),
            extern_crates: Vec::new(),
            compile_timeout_secs: DEFAULT_COMPILE_TIMEOUT_SECS,
        }
    }
}

impl ExecutionConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            entry_point_timeout_secs: require_positive(
                "ENTRY_POINT_TIMEOUT_SECS",
                parse_var("ENTRY_POINT_TIMEOUT_SECS", DEFAULT_ENTRY_POINT_TIMEOUT_SECS)?,
            )?,
            max_artifact_bytes: require_positive(
                "MAX_ARTIFACT_BYTES",
                parse_var("MAX_ARTIFACT_BYTES", DEFAULT_MAX_ARTIFACT_BYTES)?,
            )?,
        })
    }

    pub fn entry_point_timeout(&self) -> Duration {
        Duration::from_secs(self.entry_point_timeout_secs)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            entry_point_timeout_secs: DEFAULT_ENTRY_POINT_TIMEOUT_SECS,
            max_artifact_bytes: DEFAULT_MAX_ARTIFACT_BYTES,
        }
    }
}

impl CleanupConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let sweep_interval_secs = require_positive(
            "CLEANUP_SWEEP_INTERVAL_SECS",
            parse_var("CLEANUP_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS)?,
        )?;
        Ok(Self { sweep_interval_secs })
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl ScoringConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let scale: f64 = parse_var("SCORE_SCALE", DEFAULT_SCORE_SCALE)?;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ConfigError::InvalidValue("SCORE_SCALE".to_string()));
        }
        Ok(Self { scale })
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCORE_SCALE,
        }
    }
}

/// Read `name` from the environment, falling back to `default` when unset
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(default),
    }
}

/// Reject a zero limit, interval or size
fn require_positive(name: &str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue(name.to_string()));
    }
    Ok(value)
}

/// Parse `name=path` pairs separated by commas
fn parse_extern_crates(raw: &str) -> Result<Vec<ExternCrate>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, path) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidValue("HARNESS_EXTERN_CRATES".to_string()))?;
            let name = name.trim();
            if name.is_empty() || path.trim().is_empty() {
                return Err(ConfigError::InvalidValue("HARNESS_EXTERN_CRATES".to_string()));
            }
            Ok(ExternCrate {
                name: name.to_string(),
                path: PathBuf::from(path.trim()),
            })
        })
        .collect()
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}
