// ── Tree nodes ──
//
// Three concrete node kinds share one lifecycle state machine. Children
// are owned exclusively by their parent's collection; upward navigation
// goes through NodePath lookups on the registry, never through owning
// back-pointers.

mod database;
mod key;
mod server;

pub use database::{DatabaseNode, KeysLoadPlan};
pub use key::{KeyNode, OpenKeyRequest};
pub use server::ServerNode;

/// Per-node lifecycle, shared by every node kind.
///
/// Unloaded → Loading → {Loaded, Error} → Unloaded (explicit unload or
/// reload). The server-only lock overlay lives on [`ServerNode`], not
/// here: it is orthogonal to the load state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NodeState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Error(String),
}

impl NodeState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}
