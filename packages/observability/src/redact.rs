//! Credential redaction applied before log entries are written.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Replacement text for redacted values.
pub const REDACTED: &str = "[REDACTED]";

const DENYLIST_KEYS: [&str; 8] = [
    "token",
    "access",
    "refresh",
    "authorization",
    "cookie",
    "password",
    "secret",
    "recaptcha",
];

/// Redact every field whose key or value looks like a credential.
pub fn redact_fields(fields: &mut HashMap<String, Value>) {
    for (key, value) in fields.iter_mut() {
        *value = redact_value(key, value);
    }
}

/// Redact a free-form message. Only bearer credentials are rewritten, the
/// rest of the text is kept.
pub fn redact_message(message: &str) -> String {
    let lower = message.to_ascii_lowercase();
    match lower.find("bearer ") {
        None => message.to_string(),
        Some(start) => {
            let token_start = start + "bearer ".len();
            let token_end = message[token_start..]
                .find(|c: char| c.is_whitespace() || c == '"' || c == ',')
                .map(|offset| token_start + offset)
                .unwrap_or(message.len());
            format!(
                "{}{}{}",
                &message[..token_start],
                REDACTED,
                redact_message(&message[token_end..])
            )
        }
    }
}

fn redact_value(key: &str, value: &Value) -> Value {
    if is_sensitive_key(key) {
        return Value::String(REDACTED.to_string());
    }

    match value {
        Value::String(s) if looks_like_credential(s) => Value::String(REDACTED.to_string()),
        Value::String(s) => Value::String(redact_message(s)),
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), redact_value(k, v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| redact_value(key, v)).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    DENYLIST_KEYS.iter().any(|entry| lower.contains(entry))
}

fn looks_like_credential(raw: &str) -> bool {
    // JWT shape: three dot-separated segments.
    raw.matches('.').count() == 2 && raw.len() > 40 && !raw.contains(' ')
}
