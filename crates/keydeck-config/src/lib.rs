//! Persisted connection list for keydeck.
//!
//! A `ConnectionStore` wraps one TOML file holding an ordered list of
//! `[[connection]]` records. The registry reads it wholesale at startup
//! and writes it wholesale on every mutating operation; partial writes
//! are treated as operation failures, never as acceptable state.

use std::fs;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings location cannot be written. Fatal at startup: the
    /// process must not run against a store it cannot persist to.
    #[error("settings location is not writable: {path}")]
    Unwritable { path: PathBuf },

    #[error("cannot parse connection list: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot serialize connection list: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("duplicate connection name: {name}")]
    DuplicateName { name: String },

    #[error("connection entry {index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Connection record ───────────────────────────────────────────────

/// One persisted connection. `name` is the identity at the persistence
/// boundary; uniqueness is enforced here on import and by the dialog
/// layer on add/edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl ConnectionConfig {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: default_port(),
            auth: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_port() -> u16 {
    6379
}
fn default_timeout() -> u64 {
    30
}

/// On-disk shape: an ordered sequence of `[[connection]]` tables.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConnectionFile {
    #[serde(default, rename = "connection")]
    connections: Vec<ConnectionConfig>,
}

// ── Store ───────────────────────────────────────────────────────────

/// Handle to the connections file.
#[derive(Debug)]
pub struct ConnectionStore {
    path: PathBuf,
}

impl ConnectionStore {
    /// Open the store at `path`, creating parent directories and probing
    /// writability. An unwritable location fails construction -- the
    /// caller reports this once and aborts startup.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| ConfigError::Unwritable {
                path: path.clone(),
            })?;
        }

        OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|_| ConfigError::Unwritable { path: path.clone() })?;

        debug!(path = %path.display(), "connection store opened");
        Ok(Self { path })
    }

    /// Resolve the canonical store path via platform conventions.
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("io", "keydeck", "keydeck").map_or_else(
            || PathBuf::from(".keydeck").join("connections.toml"),
            |dirs| dirs.config_dir().join("connections.toml"),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full ordered connection list. A missing or empty file is
    /// an empty list, not an error.
    pub fn load(&self) -> Result<Vec<ConnectionConfig>, ConfigError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let file: ConnectionFile = toml::from_str(&text)?;
        debug!(count = file.connections.len(), "connection list loaded");
        Ok(file.connections)
    }

    /// Write the full ordered connection list, replacing the file.
    pub fn save(&self, connections: &[ConnectionConfig]) -> Result<(), ConfigError> {
        let file = ConnectionFile {
            connections: connections.to_vec(),
        };
        let text = toml::to_string_pretty(&file)?;
        fs::write(&self.path, text)?;
        debug!(count = connections.len(), "connection list saved");
        Ok(())
    }
}

// ── Import / export helpers ─────────────────────────────────────────

/// Parse an external connection list (same TOML shape as the store).
pub fn parse_connections(text: &str) -> Result<Vec<ConnectionConfig>, ConfigError> {
    let file: ConnectionFile = toml::from_str(text)?;
    Ok(file.connections)
}

/// Read and parse a connection list file, without validating entries.
pub fn read_connections_file(path: &Path) -> Result<Vec<ConnectionConfig>, ConfigError> {
    let text = fs::read_to_string(path)?;
    parse_connections(&text)
}

/// Serialize a connection list to `path`.
pub fn write_connections_file(
    path: &Path,
    connections: &[ConnectionConfig],
) -> Result<(), ConfigError> {
    let file = ConnectionFile {
        connections: connections.to_vec(),
    };
    let text = toml::to_string_pretty(&file)?;
    fs::write(path, text)?;
    Ok(())
}

/// Validate imported entries against each other and against the names
/// already present in the registry. All-or-nothing: the first problem
/// rejects the whole batch.
pub fn validate_connections(
    entries: &[ConnectionConfig],
    existing_names: &[String],
) -> Result<(), ConfigError> {
    let mut seen: Vec<&str> = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        if entry.name.trim().is_empty() {
            return Err(ConfigError::MissingField {
                index,
                field: "name",
            });
        }
        if entry.host.trim().is_empty() {
            return Err(ConfigError::MissingField {
                index,
                field: "host",
            });
        }
        if seen.contains(&entry.name.as_str())
            || existing_names.iter().any(|n| n == &entry.name)
        {
            return Err(ConfigError::DuplicateName {
                name: entry.name.clone(),
            });
        }
        seen.push(&entry.name);
    }

    Ok(())
}
