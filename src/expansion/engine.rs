use std::collections::HashMap;
use std::sync::Mutex;

use crate::payload::Payload;
use crate::utils::{BrokerError, Result};

pub const ID: &str = "${id}";
pub const CORRELATION_ID: &str = "${c_id}";
pub const TIMESTAMP: &str = "${timestamp}";
pub const COUNT: &str = "${count}";

const TOKENS: [&str; 4] = [ID, CORRELATION_ID, TIMESTAMP, COUNT];

/// Expands macro tokens in template strings.
///
/// Safe to share between protocol clients; the counter table is guarded by
/// a mutex and each template string owns an independent counter starting at 0.
#[derive(Debug, Default)]
pub struct MacroExpander {
    counters: Mutex<HashMap<String, u64>>,
}

impl MacroExpander {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every macro token in `template` with values from `payload`.
    ///
    /// An empty template or a missing payload yields the template unchanged.
    /// Substituted text is never re-scanned. All `${count}` occurrences in one
    /// call share a single counter value.
    pub fn expand(&self, template: &str, payload: Option<&Payload>) -> String {
        let Some(payload) = payload else {
            return template.to_string();
        };
        if template.is_empty() {
            return String::new();
        }

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        let mut count: Option<u64> = None;

        while let Some((pos, token)) = next_token(rest) {
            out.push_str(&rest[..pos]);
            match token {
                ID => out.push_str(payload.id()),
                CORRELATION_ID => out.push_str(payload.correlation_id()),
                TIMESTAMP => out.push_str(&payload.timestamp().to_string()),
                _ => {
                    let value = *count.get_or_insert_with(|| self.next_count(template));
                    out.push_str(&value.to_string());
                }
            }
            rest = &rest[pos + token.len()..];
        }
        out.push_str(rest);
        out
    }

    /// Current counter value for `template` without advancing it.
    pub fn peek_count(&self, template: &str) -> u64 {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters.get(template).copied().unwrap_or(0)
    }

    fn next_count(&self, template: &str) -> u64 {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let slot = counters.entry(template.to_string()).or_insert(0);
        let value = *slot;
        *slot += 1;
        value
    }
}

/// Rejects `${...}` references that are not one of the known tokens.
pub fn validate_template(template: &str) -> Result<()> {
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        let known = matches!(name, "id" | "c_id" | "timestamp" | "count");
        let is_identifier = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if is_identifier && !known {
            return Err(BrokerError::invalid(format!(
                "unknown macro '${{{name}}}' in '{template}'"
            )));
        }
        rest = &after[end + 1..];
    }
    Ok(())
}

/// Leftmost macro token in `s`, with its byte offset.
fn next_token(s: &str) -> Option<(usize, &'static str)> {
    TOKENS
        .iter()
        .filter_map(|t| s.find(t).map(|pos| (pos, *t)))
        .min_by_key(|(pos, _)| *pos)
}
