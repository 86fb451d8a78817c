// ── Tree addressing and notifications ──
//
// NodePath is the closed tagged variant the view and the registry use to
// address nodes; no downcasting, just pattern matching. TreeEvent is what
// the view layer receives over the coordinator's broadcast channel.

use std::fmt;
use std::time::Duration;

use keydeck_api::KeyType;

/// Stable address of one tree node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodePath {
    Server {
        name: String,
    },
    Database {
        server: String,
        index: u16,
    },
    Key {
        server: String,
        index: u16,
        name: String,
    },
}

impl NodePath {
    pub fn server(name: impl Into<String>) -> Self {
        Self::Server { name: name.into() }
    }

    pub fn database(server: impl Into<String>, index: u16) -> Self {
        Self::Database {
            server: server.into(),
            index,
        }
    }

    pub fn key(server: impl Into<String>, index: u16, name: impl Into<String>) -> Self {
        Self::Key {
            server: server.into(),
            index,
            name: name.into(),
        }
    }

    /// The ancestor server's connection name.
    pub fn server_name(&self) -> &str {
        match self {
            Self::Server { name } => name,
            Self::Database { server, .. } | Self::Key { server, .. } => server,
        }
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server { name } => write!(f, "{name}"),
            Self::Database { server, index } => write!(f, "{server}/db{index}"),
            Self::Key {
                server,
                index,
                name,
            } => write!(f, "{server}/db{index}/{name}"),
        }
    }
}

/// Notification delivered to the view layer.
#[derive(Debug, Clone)]
pub enum TreeEvent {
    /// One node's state or children changed.
    NodeChanged { path: NodePath },

    /// A bulk region closed: redo the tree layout once. `elapsed` is the
    /// stopwatch reading for the whole region, for the status line.
    BulkUpdateComplete { elapsed: Option<Duration> },

    /// A destructive server operation started; refuse context actions.
    LockAcquired { server: String },

    /// The destructive operation finished (either way).
    LockReleased { server: String },

    /// A load failed; the node is in `Error` state, stale children kept.
    /// `transient` is the retry hint: `true` when the same load could
    /// succeed later (connect failures, timeouts, disconnects).
    LoadError {
        path: NodePath,
        message: String,
        transient: bool,
    },

    /// Materialize a viewer tab for one key.
    OpenKey {
        path: NodePath,
        key_type: KeyType,
        new_tab: bool,
    },
}
