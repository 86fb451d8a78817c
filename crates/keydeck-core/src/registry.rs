// ── Connection registry ──
//
// Owns the ordered server list, the persisted config store, and the
// store client. All tree mutation happens here, on the control thread:
// loads are issued as spawned tasks and their completions are applied
// through `apply`, in arrival order. Persisting mutations are
// all-or-nothing -- a failed save rolls the in-memory change back.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use keydeck_api::{ApiError, ConnectionParams, DatabaseSummary, KeyDescriptor, StoreClient};
use keydeck_config::{self as config, ConnectionConfig, ConnectionStore};

use crate::completion::Completion;
use crate::convert;
use crate::coordinator::UpdateCoordinator;
use crate::error::CoreError;
use crate::event::{NodePath, TreeEvent};
use crate::filter::KeyFilter;
use crate::node::{KeysLoadPlan, NodeState, ServerNode};

const COMPLETION_CHANNEL_SIZE: usize = 64;

/// Outcome of an expand/load request. `Started` is the signal to show a
/// loading indicator; everything else resolved without a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A remote load was initiated; a completion will follow.
    Started,
    /// Already loaded with the current filter; nothing to do.
    AlreadyLoaded,
    /// A load is already in flight; this request coalesced into it.
    InFlight,
    /// Cached keys were re-filtered locally; no remote call.
    Refiltered,
}

/// The connection tree root and the context for every tree operation:
/// the active filter and the coordinator's UI-lock flag live here as
/// explicit fields, created at construction and dropped at shutdown.
pub struct ConnectionRegistry {
    servers: Vec<ServerNode>,
    store: ConnectionStore,
    client: Arc<dyn StoreClient>,
    coordinator: UpdateCoordinator,
    active_filter: Option<KeyFilter>,
    completion_tx: mpsc::Sender<Completion>,
}

impl ConnectionRegistry {
    /// Restore the registry from the persisted connection list.
    ///
    /// The returned receiver delivers load completions; the control loop
    /// feeds each back through [`apply`](Self::apply). A store that
    /// cannot be read is fatal here -- the process must not run against
    /// state it cannot persist.
    pub fn new(
        store: ConnectionStore,
        client: Arc<dyn StoreClient>,
    ) -> Result<(Self, mpsc::Receiver<Completion>), CoreError> {
        let configs = store.load()?;
        let servers: Vec<ServerNode> = configs.into_iter().map(ServerNode::new).collect();
        let (completion_tx, completion_rx) = mpsc::channel(COMPLETION_CHANNEL_SIZE);

        info!(connections = servers.len(), "connection registry restored");

        Ok((
            Self {
                servers,
                store,
                client,
                coordinator: UpdateCoordinator::new(),
                active_filter: None,
                completion_tx,
            },
            completion_rx,
        ))
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn coordinator(&self) -> &UpdateCoordinator {
        &self.coordinator
    }

    /// Subscribe to tree notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.coordinator.subscribe()
    }

    /// Servers in display order (= insertion order = persistence order).
    pub fn servers(&self) -> &[ServerNode] {
        &self.servers
    }

    pub fn server(&self, name: &str) -> Option<&ServerNode> {
        self.servers.iter().find(|s| s.name() == name)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn active_filter(&self) -> Option<&KeyFilter> {
        self.active_filter.as_ref()
    }

    fn server_entry<'a>(
        servers: &'a mut [ServerNode],
        name: &str,
    ) -> Option<&'a mut ServerNode> {
        servers.iter_mut().find(|s| s.name() == name)
    }

    fn names(&self) -> Vec<String> {
        self.servers.iter().map(|s| s.name().to_owned()).collect()
    }

    fn persist(&self) -> Result<(), CoreError> {
        let configs: Vec<ConnectionConfig> =
            self.servers.iter().map(|s| s.config().clone()).collect();
        self.store.save(&configs)?;
        Ok(())
    }

    // ── Registry mutation ────────────────────────────────────────────

    /// Append a connection and persist. Rolls back on save failure.
    pub fn add(&mut self, connection: ConnectionConfig) -> Result<(), CoreError> {
        let name = connection.name.clone();
        self.servers.push(ServerNode::new(connection));

        if let Err(e) = self.persist() {
            self.servers.pop();
            return Err(e);
        }

        info!(server = %name, "connection added");
        self.coordinator.node_changed(NodePath::server(name));
        Ok(())
    }

    /// Replace a connection's configuration and persist.
    ///
    /// The node is unloaded first: stale children under an edited config
    /// would be misleading. Fails with `Busy` on a locked server,
    /// leaving the registry unchanged.
    pub fn edit(&mut self, name: &str, connection: ConnectionConfig) -> Result<(), CoreError> {
        let node = Self::server_entry(&mut self.servers, name).ok_or_else(|| {
            CoreError::NotFound {
                what: format!("connection '{name}'"),
            }
        })?;

        if node.is_locked() {
            return Err(CoreError::Busy {
                name: name.to_owned(),
            });
        }

        let previous = node.config().clone();
        node.unload();
        node.set_config(connection);

        if let Err(e) = self.persist() {
            if let Some(node) = Self::server_entry(&mut self.servers, name) {
                node.set_config(previous);
            }
            return Err(e);
        }

        info!(server = %name, "connection edited");
        self.coordinator.node_changed(NodePath::server(name));
        Ok(())
    }

    /// Remove a connection and persist. `Busy` on a locked server.
    pub fn remove(&mut self, name: &str) -> Result<(), CoreError> {
        let index = self
            .servers
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| CoreError::NotFound {
                what: format!("connection '{name}'"),
            })?;

        if self.servers[index].is_locked() {
            return Err(CoreError::Busy {
                name: name.to_owned(),
            });
        }

        let node = self.servers.remove(index);

        if let Err(e) = self.persist() {
            self.servers.insert(index, node);
            return Err(e);
        }

        info!(server = %name, "connection removed");
        self.coordinator.node_changed(NodePath::server(name));
        Ok(())
    }

    // ── Import / export ──────────────────────────────────────────────

    /// Merge an external connection list into the registry.
    ///
    /// All-or-nothing: the whole batch is validated (duplicates, missing
    /// fields) before anything is merged, and a failed save rolls the
    /// merge back. Returns the number of connections imported.
    pub fn import_connections(&mut self, path: &Path) -> Result<usize, CoreError> {
        let entries = config::read_connections_file(path)?;
        config::validate_connections(&entries, &self.names())?;

        let _region = self.coordinator.bulk_region();
        let first_new = self.servers.len();
        let count = entries.len();
        self.servers
            .extend(entries.into_iter().map(ServerNode::new));

        if let Err(e) = self.persist() {
            self.servers.truncate(first_new);
            return Err(e);
        }

        info!(count, path = %path.display(), "connections imported");
        for server in &self.servers[first_new..] {
            self.coordinator.node_changed(NodePath::server(server.name()));
        }
        Ok(count)
    }

    /// Serialize the full current sequence to `path`.
    pub fn export_connections(&self, path: &Path) -> Result<(), CoreError> {
        let configs: Vec<ConnectionConfig> =
            self.servers.iter().map(|s| s.config().clone()).collect();
        config::write_connections_file(path, &configs)?;
        info!(count = configs.len(), path = %path.display(), "connections exported");
        Ok(())
    }

    // ── Filtering ────────────────────────────────────────────────────

    /// Validate and activate a key filter process-wide.
    ///
    /// Already-Loaded databases re-derive their visible subset locally;
    /// databases not yet loaded pick the filter up at their next key
    /// load. No remote calls.
    pub fn apply_filter(&mut self, pattern: &str) -> Result<(), CoreError> {
        let filter = KeyFilter::new(pattern)?;
        self.active_filter = Some(filter.clone());

        let _region = self.coordinator.bulk_region();
        for server in &mut self.servers {
            let name = server.name().to_owned();
            for db in server.databases_mut() {
                if db.state().is_loaded() {
                    db.set_filter(Some(filter.clone()));
                    self.coordinator
                        .node_changed(NodePath::database(&name, db.index()));
                }
            }
        }

        debug!(pattern = %filter, "filter applied");
        Ok(())
    }

    /// Clear the active filter and restore full visibility everywhere.
    pub fn reset_filter(&mut self) {
        self.active_filter = None;

        let _region = self.coordinator.bulk_region();
        for server in &mut self.servers {
            let name = server.name().to_owned();
            for db in server.databases_mut() {
                if db.applied_filter().is_some() {
                    db.set_filter(None);
                    self.coordinator
                        .node_changed(NodePath::database(&name, db.index()));
                }
            }
        }

        debug!("filter reset");
    }

    // ── Expansion / loads ────────────────────────────────────────────

    /// UI entry point: expand a node. Refused while the global UI lock
    /// is held (a destructive operation is redrawing the tree).
    pub fn expand(&mut self, path: &NodePath) -> Result<LoadOutcome, CoreError> {
        if self.coordinator.is_ui_locked() {
            return Err(CoreError::Busy {
                name: path.server_name().to_owned(),
            });
        }

        match path {
            NodePath::Server { name } => self.load_database_list(name),
            NodePath::Database { server, index } => self.load_keys(server, *index),
            // Keys have no children; clicking one goes through open_key.
            NodePath::Key { .. } => Ok(LoadOutcome::AlreadyLoaded),
        }
    }

    /// Start the database-list load for one server.
    pub fn load_database_list(&mut self, name: &str) -> Result<LoadOutcome, CoreError> {
        let node = Self::server_entry(&mut self.servers, name).ok_or_else(|| {
            CoreError::NotFound {
                what: format!("connection '{name}'"),
            }
        })?;

        match node.state() {
            NodeState::Loading => return Ok(LoadOutcome::InFlight),
            NodeState::Loaded => return Ok(LoadOutcome::AlreadyLoaded),
            _ => {}
        }

        let generation = node.begin_database_load();
        let params = convert::connection_params(node.config());

        self.coordinator.node_changed(NodePath::server(name));
        self.spawn_database_list(name.to_owned(), params, generation, false);
        Ok(LoadOutcome::Started)
    }

    /// Start (or short-circuit) a key load for one database, using the
    /// process-wide active filter.
    pub fn load_keys(&mut self, server: &str, db_index: u16) -> Result<LoadOutcome, CoreError> {
        let filter = self.active_filter.clone();

        let node = Self::server_entry(&mut self.servers, server).ok_or_else(|| {
            CoreError::NotFound {
                what: format!("connection '{server}'"),
            }
        })?;
        let generation = node.generation();
        let params = convert::connection_params(node.config());

        let db = node
            .database_mut(db_index)
            .ok_or_else(|| CoreError::NotFound {
                what: format!("database {db_index} on '{server}'"),
            })?;

        match db.plan_keys_load(filter.as_ref()) {
            KeysLoadPlan::AlreadyLoaded => Ok(LoadOutcome::AlreadyLoaded),
            KeysLoadPlan::InFlight => Ok(LoadOutcome::InFlight),
            KeysLoadPlan::Refilter => {
                self.coordinator
                    .node_changed(NodePath::database(server, db_index));
                Ok(LoadOutcome::Refiltered)
            }
            KeysLoadPlan::Remote => {
                // Suppress per-key churn until the completion lands; the
                // flush carries the stopwatch reading for the status line.
                self.coordinator.begin_bulk();
                self.coordinator
                    .node_changed(NodePath::database(server, db_index));
                let pattern = filter.map(|f| f.pattern().to_owned());
                self.spawn_keys(server.to_owned(), db_index, params, generation, pattern);
                Ok(LoadOutcome::Started)
            }
        }
    }

    /// Disconnect: drop a server's children and return it to Unloaded.
    /// Refused with `Busy` while a destructive operation holds the lock.
    pub fn unload(&mut self, name: &str) -> Result<(), CoreError> {
        let node = Self::server_entry(&mut self.servers, name).ok_or_else(|| {
            CoreError::NotFound {
                what: format!("connection '{name}'"),
            }
        })?;

        if node.is_locked() {
            return Err(CoreError::Busy {
                name: name.to_owned(),
            });
        }

        node.unload();
        debug!(server = %name, "unloaded");
        self.coordinator.node_changed(NodePath::server(name));
        Ok(())
    }

    /// Reload: unload then re-fetch the database list, holding the
    /// server lock and the global UI lock for the duration.
    ///
    /// The lock is released when the completion is applied -- success or
    /// failure -- and every pre-spawn error path returns before the lock
    /// is taken, so a locked-forever server cannot happen.
    pub fn reload(&mut self, name: &str) -> Result<LoadOutcome, CoreError> {
        let node = Self::server_entry(&mut self.servers, name).ok_or_else(|| {
            CoreError::NotFound {
                what: format!("connection '{name}'"),
            }
        })?;

        if node.is_locked() {
            return Err(CoreError::Busy {
                name: name.to_owned(),
            });
        }

        node.lock();
        node.unload();
        let generation = node.begin_database_load();
        let params = convert::connection_params(node.config());

        self.coordinator.lock_ui();
        self.coordinator.emit(TreeEvent::LockAcquired {
            server: name.to_owned(),
        });
        info!(server = %name, "reload started");

        self.coordinator.node_changed(NodePath::server(name));
        self.spawn_database_list(name.to_owned(), params, generation, true);
        Ok(LoadOutcome::Started)
    }

    // ── Server info ──────────────────────────────────────────────────

    /// Issue the side-channel info fetch. Independent of load state.
    pub fn fetch_info(&self, name: &str) -> Result<(), CoreError> {
        let node = self.server(name).ok_or_else(|| CoreError::NotFound {
            what: format!("connection '{name}'"),
        })?;

        let params = convert::connection_params(node.config());
        let client = Arc::clone(&self.client);
        let tx = self.completion_tx.clone();
        let server = name.to_owned();

        tokio::spawn(async move {
            let result = client.fetch_info(&params).await;
            let _ = tx.send(Completion::Info { server, result }).await;
        });
        Ok(())
    }

    /// Cached info snapshot. Empty means "no info available".
    pub fn server_info(&self, name: &str) -> Option<&[String]> {
        self.server(name).map(ServerNode::info)
    }

    // ── Key opening ──────────────────────────────────────────────────

    /// Ask the tab layer to open one key. `Disabled` for keys whose type
    /// no viewer supports.
    pub fn open_key(
        &self,
        server: &str,
        db_index: u16,
        key: &str,
        new_tab: bool,
    ) -> Result<(), CoreError> {
        let key_node = self
            .server(server)
            .and_then(|s| s.database(db_index))
            .and_then(|db| db.key(key))
            .ok_or_else(|| CoreError::NotFound {
                what: format!("key '{key}' in db{db_index} on '{server}'"),
            })?;

        let request = key_node.open(new_tab)?;
        self.coordinator.emit(TreeEvent::OpenKey {
            path: NodePath::key(server, db_index, key),
            key_type: request.key_type,
            new_tab: request.new_tab,
        });
        Ok(())
    }

    // ── Completion application (control thread re-entry) ─────────────

    /// Apply one load completion. Stale completions -- issued before an
    /// unload, reload, or remove -- are discarded; locks and bulk
    /// regions are closed regardless, so no failure path leaks either.
    pub fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::DatabaseList {
                server,
                generation,
                unlock,
                result,
            } => self.apply_database_list(&server, generation, unlock, result),
            Completion::Keys {
                server,
                db_index,
                generation,
                result,
            } => {
                self.apply_keys(&server, db_index, generation, result);
                // Flush the bulk region opened at issue on every path:
                // success, failure, and discarded-stale alike.
                self.coordinator.end_bulk();
            }
            Completion::Info { server, result } => self.apply_info(&server, result),
        }
    }

    fn apply_database_list(
        &mut self,
        server: &str,
        generation: u64,
        unlock: bool,
        result: Result<Vec<DatabaseSummary>, ApiError>,
    ) {
        // Guaranteed release first: the lock never outlives its
        // operation, even when the completion itself is discarded.
        if unlock {
            if let Some(node) = Self::server_entry(&mut self.servers, server) {
                node.unlock();
            }
            self.coordinator.unlock_ui();
            self.coordinator.emit(TreeEvent::LockReleased {
                server: server.to_owned(),
            });
        }

        let Some(node) = Self::server_entry(&mut self.servers, server) else {
            debug!(server, "completion for a removed server discarded");
            return;
        };

        let failure = result.as_ref().err().cloned();
        if !node.complete_database_load(generation, result) {
            debug!(server, "stale database-list completion discarded");
            return;
        }

        if let Some(err) = failure {
            warn!(server, error = %err, "database list load failed");
            let transient = err.is_transient();
            self.coordinator.emit(TreeEvent::LoadError {
                path: NodePath::server(server),
                message: CoreError::from(err).to_string(),
                transient,
            });
        }
        self.coordinator.node_changed(NodePath::server(server));
    }

    fn apply_keys(
        &mut self,
        server: &str,
        db_index: u16,
        generation: u64,
        result: Result<Vec<KeyDescriptor>, ApiError>,
    ) {
        // The filter applied to the loaded set is the one in force *now*,
        // not the one sampled at issue: a reset mid-flight wins.
        let filter = self.active_filter.clone();

        let Some(node) = Self::server_entry(&mut self.servers, server) else {
            debug!(server, "key completion for a removed server discarded");
            return;
        };

        if generation != node.generation() {
            debug!(server, db_index, "stale key completion discarded");
            return;
        }

        let Some(db) = node.database_mut(db_index) else {
            debug!(server, db_index, "key completion for a missing database discarded");
            return;
        };

        if !db.state().is_loading() {
            debug!(server, db_index, "key completion without a pending load discarded");
            return;
        }

        let failure = result.as_ref().err().cloned();
        db.complete_keys_load(result, filter);

        if let Some(err) = failure {
            warn!(server, db_index, error = %err, "key load failed");
            let transient = err.is_transient();
            self.coordinator.emit(TreeEvent::LoadError {
                path: NodePath::database(server, db_index),
                message: CoreError::from(err).to_string(),
                transient,
            });
        }
        self.coordinator
            .node_changed(NodePath::database(server, db_index));
    }

    fn apply_info(&mut self, server: &str, result: Result<Vec<String>, ApiError>) {
        let Some(node) = Self::server_entry(&mut self.servers, server) else {
            return;
        };

        // Fails silently to empty: a disconnected server has no info,
        // which is not an error condition for the caller.
        let lines = result.unwrap_or_else(|e| {
            debug!(server, error = %e, "info fetch failed; caching empty snapshot");
            Vec::new()
        });

        node.set_info(lines);
        self.coordinator.node_changed(NodePath::server(server));
    }

    // ── Task spawning ────────────────────────────────────────────────

    fn spawn_database_list(
        &self,
        server: String,
        params: ConnectionParams,
        generation: u64,
        unlock: bool,
    ) {
        let client = Arc::clone(&self.client);
        let tx = self.completion_tx.clone();

        tokio::spawn(async move {
            let result = client.list_databases(&params).await;
            let _ = tx
                .send(Completion::DatabaseList {
                    server,
                    generation,
                    unlock,
                    result,
                })
                .await;
        });
    }

    fn spawn_keys(
        &self,
        server: String,
        db_index: u16,
        params: ConnectionParams,
        generation: u64,
        pattern: Option<String>,
    ) {
        let client = Arc::clone(&self.client);
        let tx = self.completion_tx.clone();

        tokio::spawn(async move {
            let result = client
                .enumerate_keys(&params, db_index, pattern.as_deref())
                .await;
            let _ = tx
                .send(Completion::Keys {
                    server,
                    db_index,
                    generation,
                    result,
                })
                .await;
        });
    }
}
