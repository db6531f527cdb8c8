// crates/deal-kernel-http/src/config.rs
// ============================================================================
// Module: Deal Kernel Configuration
// Description: Environment-based configuration with fail-closed validation.
// Purpose: Resolve store, artifact, bind, and audit settings before startup.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! The kernel configures itself from environment variables: `DATABASE_URL`
//! (the `SQLite` file, optionally with a `sqlite:` scheme), `ARTIFACT_ROOT`
//! (content-addressed file storage), and optional bind/audit/limit
//! overrides. Missing or invalid configuration fails closed at startup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable naming the relational store.
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
/// Environment variable naming the artifact root directory.
pub const ARTIFACT_ROOT_VAR: &str = "ARTIFACT_ROOT";
/// Environment variable overriding the bind address.
pub const BIND_VAR: &str = "DEAL_KERNEL_BIND";
/// Environment variable routing audit logs to a file.
pub const AUDIT_LOG_VAR: &str = "DEAL_KERNEL_AUDIT_LOG";
/// Environment variable overriding the request body cap.
pub const MAX_BODY_BYTES_VAR: &str = "DEAL_KERNEL_MAX_BODY_BYTES";
/// Default bind address.
const DEFAULT_BIND: &str = "127.0.0.1:8080";
/// Default request body cap (covers artifact uploads).
const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;
/// Maximum request body cap accepted from the environment.
const MAX_MAX_BODY_BYTES: usize = 256 * 1024 * 1024;
/// Default maximum inflight requests.
const DEFAULT_MAX_INFLIGHT: usize = 256;
/// Maximum total path length accepted from the environment.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors raised at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    /// A value failed validation.
    #[error("invalid {name}: {detail}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Validation detail.
        detail: String,
    },
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Resolved kernel configuration.
///
/// # Invariants
/// - Paths are validated for length; the bind address parses as a socket
///   address.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// `SQLite` database file path.
    pub database_path: PathBuf,
    /// Artifact root directory.
    pub artifact_root: PathBuf,
    /// HTTP bind address.
    pub bind: SocketAddr,
    /// Optional audit log file (stderr when absent).
    pub audit_log: Option<PathBuf>,
    /// Request body cap in bytes.
    pub max_body_bytes: usize,
    /// Maximum concurrently processed requests.
    pub max_inflight: usize,
}

impl KernelConfig {
    /// Resolves configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a
    /// value fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_path = database_path_from(&require(DATABASE_URL_VAR)?)?;
        let artifact_root = checked_path(ARTIFACT_ROOT_VAR, require(ARTIFACT_ROOT_VAR)?)?;
        let bind_raw = env::var(BIND_VAR).unwrap_or_else(|_| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            name: BIND_VAR,
            detail: format!("not a socket address: {bind_raw}"),
        })?;
        let audit_log = match env::var(AUDIT_LOG_VAR) {
            Ok(raw) => Some(checked_path(AUDIT_LOG_VAR, raw)?),
            Err(_) => None,
        };
        let max_body_bytes = match env::var(MAX_BODY_BYTES_VAR) {
            Ok(raw) => {
                let value: usize = raw.parse().map_err(|_| ConfigError::Invalid {
                    name: MAX_BODY_BYTES_VAR,
                    detail: format!("not a byte count: {raw}"),
                })?;
                if value == 0 || value > MAX_MAX_BODY_BYTES {
                    return Err(ConfigError::Invalid {
                        name: MAX_BODY_BYTES_VAR,
                        detail: format!("out of range: {value} (max {MAX_MAX_BODY_BYTES})"),
                    });
                }
                value
            }
            Err(_) => DEFAULT_MAX_BODY_BYTES,
        };
        Ok(Self {
            database_path,
            artifact_root,
            bind,
            audit_log,
            max_body_bytes,
            max_inflight: DEFAULT_MAX_INFLIGHT,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads a required environment variable.
fn require(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

/// Validates a path value from the environment.
fn checked_path(name: &'static str, raw: String) -> Result<PathBuf, ConfigError> {
    if raw.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid {
            name,
            detail: "path exceeds length limit".to_string(),
        });
    }
    Ok(PathBuf::from(raw))
}

/// Resolves the `SQLite` file path from a `DATABASE_URL` value.
///
/// Accepts a bare path, `sqlite:path`, or `sqlite:///path`.
fn database_path_from(raw: &str) -> Result<PathBuf, ConfigError> {
    let stripped = raw
        .strip_prefix("sqlite://")
        .or_else(|| raw.strip_prefix("sqlite:"))
        .unwrap_or(raw);
    if stripped.trim().is_empty() {
        return Err(ConfigError::Invalid {
            name: DATABASE_URL_VAR,
            detail: "empty database path".to_string(),
        });
    }
    checked_path(DATABASE_URL_VAR, stripped.to_string())
}
