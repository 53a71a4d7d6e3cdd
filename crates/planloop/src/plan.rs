//! Plan model, parsing with structural repair, and fingerprints.

pub mod fingerprint;
pub mod parse;
pub mod types;

pub use fingerprint::Fingerprint;
pub use parse::{parse_plan, parse_revision, Revision, FALLBACK_CRITIQUE, IMPLICIT_CRITIQUE};
pub use types::{Plan, Step, ToolCall, Validation};
