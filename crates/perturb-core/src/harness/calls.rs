// Scanner for `candidate(...)` calls in benchmark test code.
// Quotes toggle a single in-string flag and escapes are not understood, which
// is enough for the literal arguments found in benchmark asserts.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{PerturbError, Result};

/// Placeholder callee used by benchmark checking routines
pub const CANDIDATE: &str = "candidate";

const CANDIDATE_CALL: &str = "candidate(";

/// A call's half-open byte span in the scanned text and the text it covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl CallSite {
    /// The argument list, parentheses included
    pub fn arguments(&self) -> &str {
        &self.text[CANDIDATE.len()..]
    }
}

/// Byte length of the balanced call starting at the beginning of `text`
fn call_length(text: &str) -> Option<usize> {
    let mut started = false;
    let mut in_string = false;
    let mut depth = 0i64;
    for (i, c) in text.char_indices() {
        if c == '"' || c == '\'' {
            in_string = !in_string;
        }
        if in_string {
            continue;
        }
        match c {
            '(' => {
                started = true;
                depth += 1;
            }
            ')' => depth -= 1,
            _ => {}
        }
        if started && depth == 0 {
            return Some(i + c.len_utf8());
        }
    }
    None
}

/// Every `candidate(...)` call in `text`, left to right
pub fn extract_calls(text: &str) -> Result<Vec<CallSite>> {
    let mut calls = Vec::new();
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find(CANDIDATE_CALL) {
        let start = search_from + offset;
        let length = call_length(&text[start..]).ok_or_else(|| {
            PerturbError::Integrity(format!(
                "unbalanced or unterminated call at byte {start}"
            ))
        })?;
        let end = start + length;
        trace!(start, end, "found candidate call");
        calls.push(CallSite {
            start,
            end,
            text: text[start..end].to_string(),
        });
        search_from = start + 1;
    }
    if calls.is_empty() {
        return Err(PerturbError::Integrity(
            "no candidate calls in test code".to_string(),
        ));
    }
    Ok(calls)
}

/// Splice each value into its call site.
///
/// Values are one-element list literals as printed by the harness; the
/// brackets are dropped before splicing. Sites must be in ascending order.
pub fn substitute_calls(text: &str, calls: &[CallSite], values: &[String]) -> Result<String> {
    if calls.len() != values.len() {
        return Err(PerturbError::Integrity(format!(
            "{} call sites but {} values",
            calls.len(),
            values.len()
        )));
    }
    let mut program = text.to_string();
    let mut delta: isize = 0;
    for (call, value) in calls.iter().zip(values) {
        let inner = value
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| {
                PerturbError::Integrity(format!("value {value:?} is not a one-element list"))
            })?;
        let start = call.start.checked_add_signed(delta);
        let end = call.end.checked_add_signed(delta);
        let range = match (start, end) {
            (Some(start), Some(end)) if start <= end && program.get(start..end).is_some() => {
                start..end
            }
            _ => {
                return Err(PerturbError::Integrity(format!(
                    "call site {}..{} does not fit the text",
                    call.start, call.end
                )))
            }
        };
        program.replace_range(range, inner);
        delta += inner.len() as isize - (call.end - call.start) as isize;
    }
    Ok(program)
}
