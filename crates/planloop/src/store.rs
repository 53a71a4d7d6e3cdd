//! Store abstraction the core executes against.

pub mod memory;
pub mod traits;
pub mod types;

pub use memory::MemoryStore;
pub use traits::{SharedStore, Store};
pub use types::{record_id, Mutation, MutationOp, Record, RecordQuery};
