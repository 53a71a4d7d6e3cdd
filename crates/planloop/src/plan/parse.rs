//! Best-effort parsing of collaborator output into plans.

use serde::Serialize;
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

use super::types::Plan;

/// Critique used when the collaborator returned a plan with no wrapper.
pub const IMPLICIT_CRITIQUE: &str = "No explicit critique provided.";
/// Critique used when the reflection output could not be used at all.
pub const FALLBACK_CRITIQUE: &str = "Malformed reflection output; falling back to draft.";

/// Outcome of a critique-and-revise call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Revision {
    pub critique: String,
    pub revised_plan: Plan,
    /// True when the draft was kept because the output was unusable.
    pub fell_back: bool,
}

/// Parse a plan, trying progressively looser readings of `text`:
/// the raw text, the text with invalid escapes removed, the first fenced
/// code block, then the outermost `{...}` span. A `{"plan": ...}` or
/// `{"revised_plan": ...}` wrapper is unwrapped.
pub fn parse_plan(text: &str) -> CoreResult<Plan> {
    let mut last_error = String::from("no JSON object found");
    for value in json_candidates(text) {
        let Some(body) = plan_body(&value) else {
            last_error = "JSON object has no 'steps'".to_string();
            continue;
        };
        match plan_from_value(body.clone()) {
            Ok(plan) => return Ok(plan),
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(CoreError::MalformedPlan(last_error))
}

/// Read a `{critique, revised_plan}` response. A bare plan is accepted with
/// [`IMPLICIT_CRITIQUE`]; anything unusable keeps `draft`.
pub fn parse_revision(text: &str, draft: &Plan) -> Revision {
    for value in json_candidates(text) {
        if let Some(revised) = value.get("revised_plan").filter(|v| v.is_object()) {
            if let Ok(plan) = plan_from_value(revised.clone()) {
                let critique = value
                    .get("critique")
                    .and_then(Value::as_str)
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or(IMPLICIT_CRITIQUE);
                return Revision {
                    critique: critique.to_string(),
                    revised_plan: plan,
                    fell_back: false,
                };
            }
        } else if value.get("steps").is_some() {
            if let Ok(plan) = plan_from_value(value) {
                return Revision {
                    critique: IMPLICIT_CRITIQUE.to_string(),
                    revised_plan: plan,
                    fell_back: false,
                };
            }
        }
    }

    tracing::warn!("reflection output unusable, keeping draft plan");
    Revision {
        critique: FALLBACK_CRITIQUE.to_string(),
        revised_plan: draft.clone(),
        fell_back: true,
    }
}

fn plan_from_value(value: Value) -> CoreResult<Plan> {
    let mut plan: Plan =
        serde_json::from_value(value).map_err(|e| CoreError::MalformedPlan(e.to_string()))?;
    plan.number_steps();
    plan.validate()?;
    Ok(plan)
}

fn plan_body(value: &Value) -> Option<&Value> {
    if value.get("steps").is_some() {
        return Some(value);
    }
    ["plan", "revised_plan"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find(|inner| inner.get("steps").is_some())
}

/// Every distinct JSON object readable from `text`, most literal first.
fn json_candidates(text: &str) -> Vec<Value> {
    let mut slices: Vec<&str> = vec![text.trim()];
    if let Some(block) = fenced_block(text) {
        slices.push(block);
    }
    if let Some(span) = outer_braces(text) {
        slices.push(span);
    }

    let mut values = Vec::new();
    for slice in slices {
        let parsed = serde_json::from_str::<Value>(slice)
            .or_else(|_| serde_json::from_str::<Value>(&repair_escapes(slice)));
        if let Ok(value) = parsed {
            if value.is_object() && !values.contains(&value) {
                values.push(value);
            }
        }
    }
    values
}

/// Drop backslashes that do not start a valid JSON escape; `\'` becomes `'`.
fn repair_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(&next @ ('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u')) => {
                out.push('\\');
                out.push(next);
                chars.next();
            }
            _ => {}
        }
    }
    out
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")? + 3;
    let rest = &text[start..];
    let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &rest[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

fn outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
