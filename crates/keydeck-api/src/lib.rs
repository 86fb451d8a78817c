// keydeck-api: async client contract for remote key-value store instances.
//
// The tree layer in keydeck-core never talks to a wire protocol directly --
// it sees this trait and the plain data types below. A real client (RESP,
// SSH-tunnelled, whatever) lives behind the seam; tests use `mock`.

pub mod error;
pub mod mock;
pub mod types;

pub use error::ApiError;
pub use types::{ConnectionParams, DatabaseSummary, KeyDescriptor, KeyType};

use async_trait::async_trait;

/// Async request/response surface of one remote store instance.
///
/// All calls are issued from the control thread and complete on the I/O
/// path; the store client is responsible for eventually failing a call
/// (timeout included) -- callers never wait forever. One outstanding call
/// per logical handle is assumed.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Enumerate the logical databases of the instance at `params`.
    async fn list_databases(
        &self,
        params: &ConnectionParams,
    ) -> Result<Vec<DatabaseSummary>, ApiError>;

    /// Enumerate keys in one database, optionally restricted to a pattern.
    /// `None` means match-all.
    async fn enumerate_keys(
        &self,
        params: &ConnectionParams,
        db_index: u16,
        pattern: Option<&str>,
    ) -> Result<Vec<KeyDescriptor>, ApiError>;

    /// Fetch diagnostic info lines (server version, memory, keyspace...).
    async fn fetch_info(&self, params: &ConnectionParams) -> Result<Vec<String>, ApiError>;
}
