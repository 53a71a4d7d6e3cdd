//! Execution context and symbolic reference resolution.

pub mod path;
pub mod resolver;

pub use path::{ArgValue, RefPath, Segment, REF_PREFIX};
pub use resolver::{ExecutionContext, ResolveError, STORE_KEY};
