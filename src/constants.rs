//! Application-wide constants
//!
//! This module contains all constant values used throughout the harness.
//! Constants are grouped by their purpose for better organization.

// =============================================================================
// SERVER DEFAULTS
// =============================================================================

/// Default server host address
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default server port
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default log filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "gradebench=info,tower_http=info";

// =============================================================================
// STORAGE DEFAULTS
// =============================================================================

/// Default root directory holding one subdirectory per submission
pub const DEFAULT_WORKSPACE_ROOT: &str = "/tmp/gradebench/workspaces";

// =============================================================================
// TOOLCHAIN DEFAULTS
// =============================================================================

/// Default compiler executable (resolved through `PATH`)
pub const DEFAULT_COMPILER: &str = "rustc";

/// Default edition used to compile submissions and tests
pub const DEFAULT_EDITION: &str = "2021";

/// Default optimization level passed as `-C opt-level`
pub const DEFAULT_OPT_LEVEL: &str = "2";

/// Default upper bound for a single compiler run, in seconds
pub const DEFAULT_COMPILE_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// EXECUTION DEFAULTS
// =============================================================================

/// Hard deadline for a single test entry point, in seconds
pub const DEFAULT_ENTRY_POINT_TIMEOUT_SECS: u64 = 10;

/// Largest artifact the loader will read into memory (256 MiB)
pub const DEFAULT_MAX_ARTIFACT_BYTES: u64 = 256 * 1024 * 1024;

/// Stderr kept from a failing entry point (64 KiB); the rest is drained
pub const MAX_CAPTURED_STDERR_BYTES: usize = 64 * 1024;

// =============================================================================
// CLEANUP DEFAULTS
// =============================================================================

/// Interval between two cleanup sweeps, in seconds
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5;

// =============================================================================
// SCORING
// =============================================================================

/// Score awarded to a submission that exactly matches its baseline
pub const DEFAULT_SCORE_SCALE: f64 = 100.0;

// =============================================================================
// VALIDATION
// =============================================================================

/// Maximum unit name length
pub const MAX_UNIT_NAME_LENGTH: u64 = 64;

/// Maximum request body size accepted by the HTTP adapter (batch requests included)
pub const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;
