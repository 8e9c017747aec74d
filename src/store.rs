use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

/// A record read back from an indexed collection, carrying the id the store
/// assigned on insert.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: String,
    pub data: Value,
}

/// The document-store capability consumed by the sync core. Keyed documents
/// hold the main aggregate; named collections hold per-record data with
/// store-assigned ids. Implementations must preserve collection insertion
/// order in `search` results.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Value>;
    async fn save(&self, document: Value, key: &str) -> AppResult<()>;
    async fn insert(&self, record: Value, collection: &str) -> AppResult<StoredRecord>;
    async fn bulk_insert(&self, records: Vec<Value>, collection: &str) -> AppResult<()>;
    async fn delete(&self, id: &str, collection: &str) -> AppResult<()>;
    async fn search(&self, query: Value, collection: &str) -> AppResult<Vec<StoredRecord>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Save,
    Insert,
    BulkInsert,
    Delete,
    Search,
}

#[derive(Default)]
struct FaultFlags {
    save: AtomicBool,
    insert: AtomicBool,
    bulk_insert: AtomicBool,
    delete: AtomicBool,
    search: AtomicBool,
}

impl FaultFlags {
    fn flag(&self, op: StoreOp) -> &AtomicBool {
        match op {
            StoreOp::Save => &self.save,
            StoreOp::Insert => &self.insert,
            StoreOp::BulkInsert => &self.bulk_insert,
            StoreOp::Delete => &self.delete,
            StoreOp::Search => &self.search,
        }
    }

    fn take(&self, op: StoreOp) -> bool {
        self.flag(op).swap(false, Ordering::SeqCst)
    }
}

/// In-process store backend, used as the test double for the sync core and as
/// a throwaway backend for callers that do not need durability.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Value>>,
    collections: Mutex<HashMap<String, Vec<StoredRecord>>>,
    save_calls: AtomicUsize,
    faults: FaultFlags,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Seed the keyed document side, bypassing `save` bookkeeping.
    pub fn put_document(&self, key: &str, document: Value) {
        self.documents.lock().insert(key.to_string(), document);
    }

    /// Arm a one-shot failure for the next call of the given operation.
    pub fn fail_next(&self, op: StoreOp) {
        self.faults.flag(op).store(true, Ordering::SeqCst);
    }

    /// Number of `save` calls that reached the backend. The debounce window
    /// coalesces mutations, so this is the observable being asserted on.
    pub fn save_call_count(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn collection_len(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .get(collection)
            .map(|records| records.len())
            .unwrap_or(0)
    }

    pub fn document(&self, key: &str) -> Option<Value> {
        self.documents.lock().get(key).cloned()
    }

    fn check_fault(&self, op: StoreOp, label: &str) -> AppResult<()> {
        if self.faults.take(op) {
            return Err(AppError::Store(format!("injected {label} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, key: &str) -> AppResult<Value> {
        Ok(self
            .documents
            .lock()
            .get(key)
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new())))
    }

    async fn save(&self, document: Value, key: &str) -> AppResult<()> {
        self.check_fault(StoreOp::Save, "save")?;
        self.documents.lock().insert(key.to_string(), document);
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn insert(&self, record: Value, collection: &str) -> AppResult<StoredRecord> {
        self.check_fault(StoreOp::Insert, "insert")?;
        let stored = StoredRecord {
            id: Uuid::new_v4().to_string(),
            data: record,
        };
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn bulk_insert(&self, records: Vec<Value>, collection: &str) -> AppResult<()> {
        self.check_fault(StoreOp::BulkInsert, "bulk insert")?;
        let mut collections = self.collections.lock();
        let entries = collections.entry(collection.to_string()).or_default();
        for record in records {
            entries.push(StoredRecord {
                id: Uuid::new_v4().to_string(),
                data: record,
            });
        }
        Ok(())
    }

    async fn delete(&self, id: &str, collection: &str) -> AppResult<()> {
        self.check_fault(StoreOp::Delete, "delete")?;
        let mut collections = self.collections.lock();
        let entries = collections
            .get_mut(collection)
            .ok_or_else(|| AppError::Store(format!("unknown collection: {collection}")))?;
        let before = entries.len();
        entries.retain(|record| record.id != id);
        if entries.len() == before {
            return Err(AppError::Store(format!(
                "record {id} not found in {collection}"
            )));
        }
        Ok(())
    }

    async fn search(&self, _query: Value, collection: &str) -> AppResult<Vec<StoredRecord>> {
        self.check_fault(StoreOp::Search, "search")?;
        Ok(self
            .collections
            .lock()
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }
}
