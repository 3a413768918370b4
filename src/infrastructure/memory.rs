//! In-memory object source over a fixed record list.
//!
//! Serves offline snapshots and acts as the mock transport in tests: faults
//! can be injected per request and artificial latency per parent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use crate::domain::{ObjectId, ObjectKind, ObjectRecord, ROOT_ID};
use crate::infrastructure::error::{TransportError, TransportResult};
use crate::infrastructure::traits::ObjectSource;

type RequestKey = (ObjectKind, ObjectId);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct StaticSource {
    records: RwLock<Vec<ObjectRecord>>,
    faults: Mutex<HashMap<RequestKey, TransportError>>,
    resolve_fault: Mutex<Option<TransportError>>,
    latency: HashMap<ObjectId, Duration>,
    requests: AtomicUsize,
    request_log: Mutex<HashMap<RequestKey, usize>>,
}

impl StaticSource {
    pub fn new(records: Vec<ObjectRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            ..Self::default()
        }
    }

    /// Parse a JSON array of records.
    pub fn from_json(json: &str) -> TransportResult<Self> {
        let records: Vec<ObjectRecord> =
            serde_json::from_str(json).map_err(|e| TransportError::decode(e.to_string()))?;
        Ok(Self::new(records))
    }

    /// Delay every fetch below `parent` by `delay`.
    pub fn with_latency(mut self, parent: ObjectId, delay: Duration) -> Self {
        self.latency.insert(parent, delay);
        self
    }

    /// Make fetching `kind` below `parent` fail with `error`.
    pub fn fail_on(&self, kind: ObjectKind, parent: ObjectId, error: TransportError) {
        lock(&self.faults).insert((kind, parent), error);
    }

    pub fn fail_resolve(&self, error: TransportError) {
        *lock(&self.resolve_fault) = Some(error);
    }

    pub fn clear_faults(&self) {
        lock(&self.faults).clear();
        *lock(&self.resolve_fault) = None;
    }

    /// Replace the whole data set.
    pub fn set_records(&self, records: Vec<ObjectRecord>) {
        *self.records.write().unwrap_or_else(PoisonError::into_inner) = records;
    }

    /// Apply `change` to the record with `id`; returns false if absent.
    pub fn update_record(&self, id: ObjectId, change: impl FnOnce(&mut ObjectRecord)) -> bool {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        match records
            .iter_mut()
            .find(|r| r.id == id && r.kind != ObjectKind::Channel)
        {
            Some(record) => {
                change(record);
                true
            }
            None => false,
        }
    }

    pub fn remove_record(&self, id: ObjectId) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|r| r.id != id || r.kind == ObjectKind::Channel);
    }

    /// Total number of `fetch` calls served.
    pub fn fetch_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Number of `fetch` calls for one (kind, parent) pair.
    pub fn fetches_for(&self, kind: ObjectKind, parent: ObjectId) -> usize {
        lock(&self.request_log)
            .get(&(kind, parent))
            .copied()
            .unwrap_or(0)
    }

    fn snapshot(&self) -> Vec<ObjectRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ObjectSource for StaticSource {
    async fn fetch(&self, kind: ObjectKind, parent: ObjectId) -> TransportResult<Vec<ObjectRecord>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        *lock(&self.request_log).entry((kind, parent)).or_insert(0) += 1;
        trace!(%kind, %parent, "static fetch");

        if let Some(&delay) = self.latency.get(&parent) {
            tokio::time::sleep(delay).await;
        }

        let fault = lock(&self.faults).get(&(kind, parent)).cloned();
        if let Some(error) = fault {
            return Err(error);
        }

        Ok(self
            .snapshot()
            .into_iter()
            .filter(|r| r.kind == kind && r.parent_id == Some(parent))
            .collect())
    }

    async fn resolve(&self, id: ObjectId) -> TransportResult<Option<ObjectRecord>> {
        let fault = lock(&self.resolve_fault).clone();
        if let Some(error) = fault {
            return Err(error);
        }

        let found = self
            .snapshot()
            .into_iter()
            .find(|r| r.id == id && r.kind != ObjectKind::Channel);

        // The root group exists on every remote system, listed or not
        Ok(found.or_else(|| {
            (id == ROOT_ID).then(|| ObjectRecord::new(ROOT_ID, ObjectKind::Group, None, "Root"))
        }))
    }
}
