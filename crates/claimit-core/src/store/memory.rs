//! In-process document store
//!
//! Keeps documents in a sorted map. Counts calls and can be told to fail
//! or slow down reads, which is what the workflow tests rely on.

use super::{
    apply_updates, CollectionPath, DocPath, Document, DocumentStore, FieldUpdate, Query,
    StoreError, StoreResult, WriteBatch, WriteOp,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Number of calls seen by a [`MemoryStore`], per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub reads: u64,
    pub writes: u64,
    pub batches: u64,
}

impl StoreCalls {
    pub fn total(&self) -> u64 {
        self.reads + self.writes + self.batches
    }
}

#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<DocPath, Map<String, Value>>>,
    committed: Mutex<Vec<WriteBatch>>,
    read_delay: Mutex<Duration>,
    reads: AtomicU64,
    writes: AtomicU64,
    batches: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without counting a call
    pub async fn insert(&self, path: DocPath, data: Value) -> StoreResult<()> {
        let Value::Object(map) = data else {
            return Err(StoreError::InvalidDocument(path.to_string()));
        };
        self.docs.lock().await.insert(path, map);
        Ok(())
    }

    /// Read a document body without counting a call
    pub async fn peek(&self, path: &DocPath) -> Option<Value> {
        self.docs
            .lock()
            .await
            .get(path)
            .map(|data| Value::Object(data.clone()))
    }

    pub async fn len(&self) -> usize {
        self.docs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.lock().await.is_empty()
    }

    pub fn calls(&self) -> StoreCalls {
        StoreCalls {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
        }
    }

    /// Batches committed successfully, oldest first
    pub async fn committed_batches(&self) -> Vec<WriteBatch> {
        self.committed.lock().await.clone()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Delay every read result by `delay`. The data is captured before the
    /// delay, so a slow read returns what the store held when it started.
    pub async fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().await = delay;
    }

    fn begin_read(&self) -> StoreResult<()> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("memory store read failure".to_string()));
        }
        Ok(())
    }

    /// Hold a read result back for the configured delay
    async fn deliver<T>(&self, result: T) -> T {
        let delay = *self.read_delay.lock().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    fn begin_write(&self, counter: &AtomicU64) -> StoreResult<()> {
        counter.fetch_add(1, Ordering::Relaxed);
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("memory store write failure".to_string()));
        }
        Ok(())
    }
}

fn apply_op(docs: &mut BTreeMap<DocPath, Map<String, Value>>, op: &WriteOp) -> StoreResult<()> {
    match op {
        WriteOp::Set { path, data } => {
            docs.insert(path.clone(), data.clone());
        }
        WriteOp::Update { path, updates } => {
            let data = docs
                .get_mut(path)
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            apply_updates(data, updates)?;
        }
        WriteOp::Delete { path } => {
            docs.remove(path);
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        self.begin_read()?;
        let doc = self
            .docs
            .lock()
            .await
            .get(path)
            .map(|data| Document::new(path.clone(), data.clone()));
        Ok(self.deliver(doc).await)
    }

    async fn list(&self, query: &Query) -> StoreResult<Vec<Document>> {
        self.begin_read()?;
        let mut docs: Vec<Document> = self
            .docs
            .lock()
            .await
            .iter()
            .map(|(path, data)| Document::new(path.clone(), data.clone()))
            .filter(|doc| query.matches(doc))
            .collect();
        query.sort(&mut docs);
        Ok(self.deliver(docs).await)
    }

    async fn add(&self, collection: &CollectionPath, data: Map<String, Value>) -> StoreResult<DocPath> {
        self.begin_write(&self.writes)?;
        let path = collection.new_doc();
        self.docs.lock().await.insert(path.clone(), data);
        Ok(path)
    }

    async fn update(&self, path: &DocPath, updates: &[FieldUpdate]) -> StoreResult<()> {
        self.begin_write(&self.writes)?;
        let mut docs = self.docs.lock().await;
        let data = docs
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        // Apply to a copy so a failing update leaves the document untouched
        let mut updated = data.clone();
        apply_updates(&mut updated, updates)?;
        *data = updated;
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> StoreResult<()> {
        self.begin_write(&self.writes)?;
        self.docs.lock().await.remove(path);
        Ok(())
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        self.begin_write(&self.batches)?;
        let mut docs = self.docs.lock().await;

        for precondition in &batch.expect {
            precondition.check(docs.get(&precondition.path))?;
        }
        let mut staged = docs.clone();
        for op in &batch.ops {
            apply_op(&mut staged, op)?;
        }
        *docs = staged;
        drop(docs);

        self.committed.lock().await.push(batch);
        Ok(())
    }
}
