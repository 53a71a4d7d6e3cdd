//! In-memory store backed by named collections.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

use super::traits::{SharedStore, Store};
use super::types::{record_id, Mutation, Record, RecordQuery};

const DEFAULT_ID_FIELD: &str = "id";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Collection {
    id_field: String,
    #[serde(default)]
    rows: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct StoreSeed {
    #[serde(default)]
    collections: BTreeMap<String, Collection>,
}

/// In-memory store. Every mutation takes the write lock for its whole
/// read-modify-write, so single-record updates are atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, Collection>>,
    mutations: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style collection seeding.
    pub fn with_collection(
        self,
        name: impl Into<String>,
        id_field: impl Into<String>,
        rows: Vec<Record>,
    ) -> Self {
        self.insert_collection(name, id_field, rows);
        self
    }

    /// Create or replace a collection.
    pub fn insert_collection(
        &self,
        name: impl Into<String>,
        id_field: impl Into<String>,
        rows: Vec<Record>,
    ) {
        self.collections.write().insert(
            name.into(),
            Collection {
                id_field: id_field.into(),
                rows,
            },
        );
    }

    /// Seed from `{"collections": {"<name>": {"id_field": "...", "rows": [...]}}}`.
    pub fn from_json(value: Value) -> CoreResult<Self> {
        let seed: StoreSeed = serde_json::from_value(value)?;
        Ok(Self {
            collections: RwLock::new(seed.collections),
            mutations: AtomicU64::new(0),
        })
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)?;
        Self::from_json(value)
    }

    /// Copy of a collection's rows; empty if the collection does not exist.
    pub fn snapshot(&self, collection: &str) -> Vec<Record> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.rows.clone())
            .unwrap_or_default()
    }

    /// Number of successful mutations and appends since construction.
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }
}

impl Store for MemoryStore {
    fn list_records(&self, collection: &str) -> CoreResult<Vec<Record>> {
        Ok(self.snapshot(collection))
    }

    fn get_record(&self, collection: &str, query: &RecordQuery) -> CoreResult<Option<Record>> {
        let collections = self.collections.read();
        let Some(c) = collections.get(collection) else {
            return Ok(None);
        };
        Ok(c.rows
            .iter()
            .find(|row| query.matches(&c.id_field, row))
            .cloned())
    }

    fn apply_mutation(&self, collection: &str, id: &str, mutation: &Mutation) -> CoreResult<Record> {
        let mut collections = self.collections.write();
        let c = collections
            .get_mut(collection)
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown collection: '{collection}'")))?;
        let id_field = c.id_field.clone();
        let row = c
            .rows
            .iter_mut()
            .find(|row| record_id(row, &id_field).as_deref() == Some(id))
            .ok_or_else(|| CoreError::InvalidInput(format!("record not found: '{id}'")))?;

        let mut updated = row.clone();
        mutation.apply(&mut updated)?;
        *row = updated.clone();
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }

    fn append_record(&self, collection: &str, payload: Record) -> CoreResult<Record> {
        let mut collections = self.collections.write();
        let c = collections
            .entry(collection.to_string())
            .or_insert_with(|| Collection {
                id_field: DEFAULT_ID_FIELD.to_string(),
                rows: Vec::new(),
            });

        if let Some(id) = record_id(&payload, &c.id_field) {
            let duplicate = c
                .rows
                .iter()
                .any(|row| record_id(row, &c.id_field).as_deref() == Some(id.as_str()));
            if duplicate {
                return Err(CoreError::InvalidInput(format!(
                    "duplicate id '{id}' in collection '{collection}'"
                )));
            }
        }

        c.rows.push(payload.clone());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(payload)
    }

    fn fork(&self) -> CoreResult<SharedStore> {
        let copy = MemoryStore {
            collections: RwLock::new(self.collections.read().clone()),
            mutations: AtomicU64::new(0),
        };
        Ok(Arc::new(copy))
    }
}
