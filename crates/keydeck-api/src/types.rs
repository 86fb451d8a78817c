// ── Wire-level data types ──
//
// Plain value types crossing the StoreClient seam. Persistence formats
// live in keydeck-config; these carry no serde derives on purpose.

use std::time::Duration;

use strum::{Display, EnumString};

/// Parameters needed to reach one store instance.
///
/// Derived from a persisted `ConnectionConfig` by the core layer; the
/// connection *name* stays out of this type -- identity belongs to the
/// tree, not the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub auth: Option<String>,
    pub timeout: Duration,
}

impl ConnectionParams {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            auth: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// One logical database reported by `list_databases`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseSummary {
    /// Database index as enumerated by the store (not necessarily dense).
    pub index: u16,
    /// Key count hint, when the store reports one.
    pub key_count: Option<u64>,
}

/// One stored key as reported by `enumerate_keys`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescriptor {
    pub name: String,
    pub key_type: KeyType,
    /// Short value preview, when the client chose to fetch one.
    pub preview: Option<String>,
}

impl KeyDescriptor {
    pub fn new(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            name: name.into(),
            key_type,
            preview: None,
        }
    }
}

/// Type tag of a stored key.
#[derive(Debug, Clone, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum KeyType {
    String,
    List,
    Set,
    #[strum(serialize = "zset")]
    SortedSet,
    Hash,
    Stream,
    /// Binary or otherwise unsupported payloads the viewer cannot open.
    #[strum(default)]
    Unknown(String),
}

impl KeyType {
    /// `true` if a viewer tab can materialize this key.
    pub fn openable(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn key_type_round_trips_through_strings() {
        assert_eq!(KeyType::from_str("zset").unwrap(), KeyType::SortedSet);
        assert_eq!(KeyType::SortedSet.to_string(), "zset");
        assert_eq!(KeyType::from_str("hash").unwrap(), KeyType::Hash);
    }

    #[test]
    fn unrecognized_type_is_not_openable() {
        let t = KeyType::from_str("quadtree").unwrap();
        assert!(matches!(t, KeyType::Unknown(_)));
        assert!(!t.openable());
        assert!(KeyType::List.openable());
    }
}
