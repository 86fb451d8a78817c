//! In-process [`StoreClient`] double for tests.
//!
//! Responses are fixed up-front with the builder methods; call counters
//! and the last enumeration pattern are recorded so tests can assert on
//! what actually crossed the seam.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::ApiError;
use crate::types::{ConnectionParams, DatabaseSummary, KeyDescriptor};
use crate::StoreClient;

pub struct MockStoreClient {
    databases: Mutex<Result<Vec<DatabaseSummary>, ApiError>>,
    keys: Mutex<HashMap<u16, Vec<KeyDescriptor>>>,
    keys_error: Mutex<Option<ApiError>>,
    info: Mutex<Result<Vec<String>, ApiError>>,
    last_pattern: Mutex<Option<String>>,
    list_calls: AtomicUsize,
    enumerate_calls: AtomicUsize,
    info_calls: AtomicUsize,
}

impl Default for MockStoreClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStoreClient {
    pub fn new() -> Self {
        Self {
            databases: Mutex::new(Ok(Vec::new())),
            keys: Mutex::new(HashMap::new()),
            keys_error: Mutex::new(None),
            info: Mutex::new(Ok(Vec::new())),
            last_pattern: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
            enumerate_calls: AtomicUsize::new(0),
            info_calls: AtomicUsize::new(0),
        }
    }

    // ── Response configuration ───────────────────────────────────────

    pub fn with_databases(self, databases: Vec<DatabaseSummary>) -> Self {
        *self.databases.lock().expect("mock state") = Ok(databases);
        self
    }

    pub fn with_keys(self, db_index: u16, keys: Vec<KeyDescriptor>) -> Self {
        self.keys.lock().expect("mock state").insert(db_index, keys);
        self
    }

    pub fn with_info(self, lines: Vec<String>) -> Self {
        *self.info.lock().expect("mock state") = Ok(lines);
        self
    }

    pub fn fail_databases(self, err: ApiError) -> Self {
        *self.databases.lock().expect("mock state") = Err(err);
        self
    }

    pub fn fail_keys(self, err: ApiError) -> Self {
        *self.keys_error.lock().expect("mock state") = Some(err);
        self
    }

    pub fn fail_info(self, err: ApiError) -> Self {
        *self.info.lock().expect("mock state") = Err(err);
        self
    }

    // ── Recorded observations ────────────────────────────────────────

    /// Pattern passed to the most recent `enumerate_keys` call.
    pub fn last_pattern(&self) -> Option<String> {
        self.last_pattern.lock().expect("mock state").clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn enumerate_calls(&self) -> usize {
        self.enumerate_calls.load(Ordering::SeqCst)
    }

    pub fn info_calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreClient for MockStoreClient {
    async fn list_databases(
        &self,
        _params: &ConnectionParams,
    ) -> Result<Vec<DatabaseSummary>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.databases.lock().expect("mock state").clone()
    }

    async fn enumerate_keys(
        &self,
        _params: &ConnectionParams,
        db_index: u16,
        pattern: Option<&str>,
    ) -> Result<Vec<KeyDescriptor>, ApiError> {
        self.enumerate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_pattern.lock().expect("mock state") = pattern.map(str::to_owned);

        if let Some(err) = self.keys_error.lock().expect("mock state").clone() {
            return Err(err);
        }

        Ok(self
            .keys
            .lock()
            .expect("mock state")
            .get(&db_index)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_info(&self, _params: &ConnectionParams) -> Result<Vec<String>, ApiError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        self.info.lock().expect("mock state").clone()
    }
}
