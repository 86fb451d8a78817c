// ── Core error types ──
//
// User-facing errors from keydeck-core. Consumers never see raw socket
// or TOML errors directly; the `From` impls translate lower-layer
// failures into the domain taxonomy.

use thiserror::Error;

use keydeck_api::ApiError;
use keydeck_config::ConfigError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A destructive operation is already in flight on the target server.
    #[error("'{name}' is busy performing another operation")]
    Busy { name: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    // ── Import ───────────────────────────────────────────────────────
    #[error("cannot parse connection list: {reason}")]
    Parse { reason: String },

    #[error("invalid connection list: {reason}")]
    Validation { reason: String },

    // ── Persistence / export ─────────────────────────────────────────
    #[error("IO error: {message}")]
    Io { message: String },

    // ── Remote store ─────────────────────────────────────────────────
    #[error("remote store error: {message}")]
    Remote { message: String },

    // ── Filtering ────────────────────────────────────────────────────
    #[error("invalid filter pattern: {reason}")]
    InvalidFilter { reason: String },

    // ── Key opening ──────────────────────────────────────────────────
    /// The key's type cannot be materialized in a viewer tab.
    #[error("key '{key}' cannot be opened")]
    Disabled { key: String },
}

// ── Conversion from lower-layer errors ──────────────────────────────

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Parse(e) => Self::Parse {
                reason: e.to_string(),
            },
            ConfigError::DuplicateName { name } => Self::Validation {
                reason: format!("duplicate connection name: {name}"),
            },
            ConfigError::MissingField { index, field } => Self::Validation {
                reason: format!("entry {index} is missing required field '{field}'"),
            },
            ConfigError::Unwritable { path } => Self::Io {
                message: format!("settings location is not writable: {}", path.display()),
            },
            ConfigError::Serialize(e) => Self::Io {
                message: e.to_string(),
            },
            ConfigError::Io(e) => Self::Io {
                message: e.to_string(),
            },
        }
    }
}

impl From<ApiError> for CoreError {
    fn from(err: ApiError) -> Self {
        Self::Remote {
            message: err.to_string(),
        }
    }
}
