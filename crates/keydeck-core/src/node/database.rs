use keydeck_api::{ApiError, DatabaseSummary, KeyDescriptor};
use tracing::debug;

use super::key::KeyNode;
use super::NodeState;
use crate::filter::KeyFilter;

/// One logical database inside a server.
///
/// Keys are the full loaded set; the active filter narrows what
/// `visible_keys` returns without discarding anything, so clearing the
/// filter restores full visibility with no remote call.
#[derive(Debug)]
pub struct DatabaseNode {
    index: u16,
    key_count: Option<u64>,
    state: NodeState,
    keys: Vec<KeyNode>,
    applied_filter: Option<KeyFilter>,
}

/// What a key-load request decided to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeysLoadPlan {
    /// Transitioned to Loading; enumerate remotely.
    Remote,
    /// Loaded with a different filter: re-filter the cached set locally.
    Refilter,
    /// Loaded and the filter is unchanged; nothing to do.
    AlreadyLoaded,
    /// A load is already in flight; coalesce into it.
    InFlight,
}

impl DatabaseNode {
    pub(crate) fn new(summary: DatabaseSummary) -> Self {
        Self {
            index: summary.index,
            key_count: summary.key_count,
            state: NodeState::Unloaded,
            keys: Vec::new(),
            applied_filter: None,
        }
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    /// Key count hint from the database summary, for the tree label.
    pub fn key_count(&self) -> Option<u64> {
        self.key_count
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn applied_filter(&self) -> Option<&KeyFilter> {
        self.applied_filter.as_ref()
    }

    /// Display label, e.g. `db0 (keys: 42)`.
    pub fn label(&self) -> String {
        match self.key_count {
            Some(count) => format!("db{} (keys: {count})", self.index),
            None => format!("db{}", self.index),
        }
    }

    // ── Load state machine ───────────────────────────────────────────

    /// Decide how to satisfy a key-load request against `filter` and
    /// apply the matching state transition.
    ///
    /// A changed filter on an already-Loaded database re-filters the
    /// cached set locally; only databases not yet Loaded go back to the
    /// store. A load in flight is never doubled.
    pub(crate) fn plan_keys_load(&mut self, filter: Option<&KeyFilter>) -> KeysLoadPlan {
        match self.state {
            NodeState::Loading => KeysLoadPlan::InFlight,
            NodeState::Loaded if self.applied_filter.as_ref() == filter => {
                KeysLoadPlan::AlreadyLoaded
            }
            NodeState::Loaded => {
                self.applied_filter = filter.cloned();
                KeysLoadPlan::Refilter
            }
            _ => {
                self.state = NodeState::Loading;
                KeysLoadPlan::Remote
            }
        }
    }

    /// Apply the enumeration result.
    ///
    /// Success replaces the full key list atomically; failure keeps the
    /// previous keys so the view can still show stale-but-valid data.
    pub(crate) fn complete_keys_load(
        &mut self,
        result: Result<Vec<KeyDescriptor>, ApiError>,
        filter: Option<KeyFilter>,
    ) {
        match result {
            Ok(descriptors) => {
                self.keys = descriptors.into_iter().map(KeyNode::from_descriptor).collect();
                self.applied_filter = filter;
                self.state = NodeState::Loaded;
                debug!(db = self.index, keys = self.keys.len(), "keys loaded");
            }
            Err(e) => {
                self.state = NodeState::Error(e.to_string());
            }
        }
    }

    pub(crate) fn set_filter(&mut self, filter: Option<KeyFilter>) {
        self.applied_filter = filter;
    }

    // ── Children ─────────────────────────────────────────────────────

    /// The full loaded key set, ignoring the filter.
    pub fn keys(&self) -> &[KeyNode] {
        &self.keys
    }

    /// Keys passing the applied filter, in load order.
    pub fn visible_keys(&self) -> Vec<&KeyNode> {
        match &self.applied_filter {
            None => self.keys.iter().collect(),
            Some(filter) => self
                .keys
                .iter()
                .filter(|key| filter.matches(key.name()))
                .collect(),
        }
    }

    pub fn key(&self, name: &str) -> Option<&KeyNode> {
        self.keys.iter().find(|key| key.name() == name)
    }
}
