use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use std::sync::LazyLock;

/// Payload values land in URL paths; everything but the unreserved set is escaped.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

static TEMPLATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+(?:\.\w+)*)\}\}").unwrap());

/// Replace {{field}} placeholders in a route template with values from the payload.
pub fn render(template: &str, payload: &serde_json::Value) -> String {
    TEMPLATE_RE
        .replace_all(template, |caps: &regex::Captures| {
            let path = &caps[1];
            resolve(path, payload)
                .map(|value| encode_segment(&value))
                .unwrap_or_default()
        })
        .to_string()
}

fn resolve(path: &str, payload: &serde_json::Value) -> Option<String> {
    let value = path
        .split('.')
        .try_fold(payload, |value, field| value.get(field))?;
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn encode_segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}
