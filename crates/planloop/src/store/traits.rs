//! Store facade trait.

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};

use super::types::{Mutation, Record, RecordQuery};

/// Minimal read/write interface over domain records.
///
/// Implementations must make `apply_mutation` and `append_record` atomic per
/// record and must return the updated record so that later validations can
/// observe it. Connectivity failures are reported as
/// [`CoreError::StoreUnavailable`].
pub trait Store: Send + Sync {
    /// All records of a collection, in insertion order.
    fn list_records(&self, collection: &str) -> CoreResult<Vec<Record>>;

    /// First record matching the query, if any.
    fn get_record(&self, collection: &str, query: &RecordQuery) -> CoreResult<Option<Record>>;

    /// Apply a mutation to the record with the given id and return it.
    fn apply_mutation(&self, collection: &str, id: &str, mutation: &Mutation) -> CoreResult<Record>;

    /// Append a new record and return it as stored.
    fn append_record(&self, collection: &str, payload: Record) -> CoreResult<Record>;

    /// Independent scratch copy used for dry runs.
    fn fork(&self) -> CoreResult<SharedStore> {
        Err(CoreError::Unsupported("store does not support fork".to_string()))
    }
}

pub type SharedStore = Arc<dyn Store>;
