use keydeck_api::{ApiError, DatabaseSummary};
use keydeck_config::ConnectionConfig;
use tracing::debug;

use super::database::DatabaseNode;
use super::NodeState;

/// One configured connection and its lazily-loaded database children.
///
/// The lock overlay marks a destructive operation (reload, remove) in
/// flight; the registry refuses mutating actions on a locked server.
/// The generation counter is bumped on every unload so completions
/// issued before it are recognizably stale.
#[derive(Debug)]
pub struct ServerNode {
    config: ConnectionConfig,
    state: NodeState,
    locked: bool,
    generation: u64,
    databases: Vec<DatabaseNode>,
    info: Vec<String>,
}

impl ServerNode {
    pub(crate) fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: NodeState::Unloaded,
            locked: false,
            generation: 0,
            databases: Vec::new(),
            info: Vec::new(),
        }
    }

    /// Connection name -- the node's identity within the registry.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Cached diagnostic snapshot from the last `fetch_info`. Empty
    /// means "no info available", never an error.
    pub fn info(&self) -> &[String] {
        &self.info
    }

    pub fn databases(&self) -> &[DatabaseNode] {
        &self.databases
    }

    pub fn database(&self, index: u16) -> Option<&DatabaseNode> {
        self.databases.iter().find(|db| db.index() == index)
    }

    pub(crate) fn database_mut(&mut self, index: u16) -> Option<&mut DatabaseNode> {
        self.databases.iter_mut().find(|db| db.index() == index)
    }

    pub(crate) fn databases_mut(&mut self) -> &mut [DatabaseNode] {
        &mut self.databases
    }

    // ── Load state machine ───────────────────────────────────────────

    /// Transition to Loading and return the generation the eventual
    /// completion must present.
    pub(crate) fn begin_database_load(&mut self) -> u64 {
        self.state = NodeState::Loading;
        self.generation
    }

    /// Apply a database-list completion. Returns `false` when the
    /// completion is stale (issued before an unload, or the node is no
    /// longer Loading) and was discarded.
    pub(crate) fn complete_database_load(
        &mut self,
        generation: u64,
        result: Result<Vec<DatabaseSummary>, ApiError>,
    ) -> bool {
        if generation != self.generation || !self.state.is_loading() {
            return false;
        }

        match result {
            Ok(summaries) => {
                self.databases = summaries.into_iter().map(DatabaseNode::new).collect();
                self.state = NodeState::Loaded;
                debug!(server = %self.config.name, databases = self.databases.len(), "database list loaded");
            }
            Err(e) => {
                self.state = NodeState::Error(e.to_string());
            }
        }
        true
    }

    /// Drop all children and return to Unloaded. Bumps the generation
    /// so in-flight completions land dead. Does not touch the lock:
    /// reload unloads while holding it.
    pub(crate) fn unload(&mut self) {
        self.databases.clear();
        self.state = NodeState::Unloaded;
        self.generation += 1;
    }

    pub(crate) fn lock(&mut self) {
        self.locked = true;
    }

    pub(crate) fn unlock(&mut self) {
        self.locked = false;
    }

    pub(crate) fn set_info(&mut self, lines: Vec<String>) {
        self.info = lines;
    }

    pub(crate) fn set_config(&mut self, config: ConnectionConfig) {
        self.config = config;
    }
}
