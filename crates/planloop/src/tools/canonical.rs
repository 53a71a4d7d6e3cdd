//! Argument canonicalization against a tool's alias table.

use serde_json::{Map, Value};

use super::schema::ToolSpec;

/// Rename argument variants to the names `spec` expects.
///
/// Runs on resolved arguments. For each alias, in table order: when the
/// canonical name is absent and the alias is present with a non-null value,
/// the alias is moved to the canonical name. Unknown keys pass through.
/// Applying this twice is the same as applying it once.
pub fn canonicalize(spec: &ToolSpec, args: &Map<String, Value>) -> Map<String, Value> {
    let mut out = args.clone();
    for alias in &spec.aliases {
        if out.contains_key(&alias.to) {
            continue;
        }
        let usable = out.get(&alias.from).map(|value| !value.is_null()).unwrap_or(false);
        if usable {
            if let Some(value) = out.remove(&alias.from) {
                out.insert(alias.to.clone(), value);
            }
        }
    }
    out
}
