// ── Load completions ──
//
// Each spawned remote call sends exactly one of these back through the
// registry's channel; the control loop applies them in arrival order.
// The sampled `generation` is the staleness discriminator: an unload or
// reload issued after the call bumps the server's generation, and the
// late completion is discarded instead of resurrecting dead children.

use keydeck_api::{ApiError, DatabaseSummary, KeyDescriptor};

#[derive(Debug)]
pub enum Completion {
    /// Result of `list_databases` for one server.
    DatabaseList {
        server: String,
        generation: u64,
        /// Set when a locking reload issued this load; applying the
        /// completion releases the lock regardless of outcome.
        unlock: bool,
        result: Result<Vec<DatabaseSummary>, ApiError>,
    },

    /// Result of `enumerate_keys` for one database.
    ///
    /// Carries no filter: the database's applied filter is taken from
    /// the registry's *current* active filter at apply time, so a
    /// filter changed or cleared mid-flight wins over the pattern the
    /// enumeration was issued with.
    Keys {
        server: String,
        db_index: u16,
        generation: u64,
        result: Result<Vec<KeyDescriptor>, ApiError>,
    },

    /// Result of the side-channel `fetch_info` call.
    Info {
        server: String,
        result: Result<Vec<String>, ApiError>,
    },
}
