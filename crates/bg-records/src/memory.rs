//! In-memory record store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{RecordError, RecordResult};
use crate::selector::FieldSelector;
use crate::store::{Record, RecordStore};

/// Record store held in process memory, ordered by name.
pub struct InMemoryRecordStore<R> {
    records: RwLock<BTreeMap<String, R>>,
}

impl<R: Record> InMemoryRecordStore<R> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Creates a store holding `records`, keyed by their names.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = R>) -> Self {
        let records = records
            .into_iter()
            .map(|r| (r.metadata().name.clone(), r))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl<R: Record> Default for InMemoryRecordStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for InMemoryRecordStore<R> {
    async fn list(&self, selector: &FieldSelector) -> RecordResult<Vec<R>> {
        selector.validate::<R>()?;
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| selector.matches(*r))
            .cloned()
            .collect())
    }

    async fn get(&self, name: &str) -> RecordResult<R> {
        self.records
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RecordError::not_found(R::KIND, name))
    }

    async fn create(&self, mut record: R) -> RecordResult<R> {
        let meta = record.metadata_mut();
        if meta.name.is_empty() {
            meta.name = format!("{}-{}", R::KIND.to_lowercase(), Uuid::now_v7());
        }
        meta.creation_timestamp = Some(Utc::now());
        let name = meta.name.clone();

        let mut records = self.records.write();
        if records.contains_key(&name) {
            return Err(RecordError::Duplicate {
                kind: R::KIND,
                name,
            });
        }
        records.insert(name.clone(), record.clone());
        tracing::debug!(kind = R::KIND, name = %name, "record created");
        Ok(record)
    }

    async fn update_status(&self, name: &str, status: R::Status) -> RecordResult<R> {
        let mut records = self.records.write();
        let record = records
            .get_mut(name)
            .ok_or_else(|| RecordError::not_found(R::KIND, name))?;
        record.set_status(status);
        tracing::debug!(kind = R::KIND, name, "record status updated");
        Ok(record.clone())
    }
}
