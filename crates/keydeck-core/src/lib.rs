// keydeck-core: the async connection tree between keydeck-api and the view layer.
//
// A ConnectionRegistry owns an ordered list of ServerNode, each of which
// lazily loads DatabaseNode and KeyNode children from a remote store.
// Loads are issued as spawned tasks; completions come back as messages
// that the single control thread applies, so no node is ever mutated
// from two execution contexts.

pub mod completion;
pub mod convert;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod filter;
pub mod node;
pub mod registry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use completion::Completion;
pub use coordinator::{BulkRegion, UpdateCoordinator};
pub use error::CoreError;
pub use event::{NodePath, TreeEvent};
pub use filter::KeyFilter;
pub use node::{DatabaseNode, KeyNode, KeysLoadPlan, NodeState, OpenKeyRequest, ServerNode};
pub use registry::{ConnectionRegistry, LoadOutcome};
