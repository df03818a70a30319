/*!
 * Repair and validation of batch translation responses.
 *
 * Generative providers wrap their JSON in prose or code fences, forget to
 * escape quotes and drop or merge items. The functions here form a pure
 * chain: `extract_array_span` -> parse -> `escape_stray_quotes` -> parse ->
 * shape validation, each stage usable on its own.
 */

use std::collections::HashMap;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::batch::BatchItem;

// Start of a text field value
static TEXT_FIELD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""text"\s*:\s*""#).unwrap()
});

/// Outcome of reading one batch response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchParse {
    /// One text per batch item, in batch order
    Ok(Vec<String>),
    /// No JSON array could be read from the response
    ParseFailed(String),
    /// JSON was read but does not match the batch
    ShapeMismatch(String),
}

impl BatchParse {
    /// Short label for logs
    pub fn describe(&self) -> &'static str {
        match self {
            BatchParse::Ok(_) => "ok",
            BatchParse::ParseFailed(_) => "unparseable JSON",
            BatchParse::ShapeMismatch(_) => "shape mismatch",
        }
    }
}

/// First balanced top-level `[...]` span of `raw`.
///
/// Brackets inside string literals do not count.
pub fn extract_array_span(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in raw[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Whether a quote followed by `rest` closes a text value
fn closes_value(rest: &str) -> bool {
    let rest = rest.trim_start();
    if rest.is_empty() || rest.starts_with('}') || rest.starts_with(']') {
        return true;
    }
    rest.strip_prefix(',')
        .map(|after| after.trim_start().starts_with('"'))
        .unwrap_or(false)
}

/// Escape quotes and raw line breaks inside `"text"` values.
///
/// A quote only ends the value when it is followed by `}`, `]` or a comma
/// and the next key. Everything outside text values is left untouched.
pub fn escape_stray_quotes(json: &str) -> String {
    let mut out = String::with_capacity(json.len() + 16);
    let mut pos = 0;

    while let Some(m) = TEXT_FIELD_REGEX.find_at(json, pos) {
        out.push_str(&json[pos..m.end()]);
        pos = json.len();

        let value_start = m.end();
        let mut chars = json[value_start..].char_indices();
        while let Some((offset, c)) = chars.next() {
            match c {
                '\\' => {
                    out.push(c);
                    if let Some((_, next)) = chars.next() {
                        out.push(next);
                    }
                }
                '"' => {
                    let after = value_start + offset + 1;
                    if closes_value(&json[after..]) {
                        out.push('"');
                        pos = after;
                        break;
                    }
                    out.push_str("\\\"");
                }
                '\n' => out.push_str("\\n"),
                '\r' => {}
                _ => out.push(c),
            }
        }
    }

    if pos < json.len() {
        out.push_str(&json[pos..]);
    }
    out
}

/// Span from the first `[` to the last `]`, ignoring strings
fn outer_bracket_span(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    (end > start).then(|| &raw[start..=end])
}

/// Parse a JSON array, retrying once after quote repair
pub fn parse_array(raw: &str) -> Option<Vec<Value>> {
    // An odd number of stray quotes hides the closing bracket from the scan
    let span = extract_array_span(raw).or_else(|| outer_bracket_span(raw))?;
    match serde_json::from_str::<Vec<Value>>(span) {
        Ok(items) => Some(items),
        Err(first) => {
            debug!("Batch JSON did not parse ({}), trying quote repair", first);
            serde_json::from_str::<Vec<Value>>(&escape_stray_quotes(span)).ok()
        }
    }
}

/// Read an id given as a number or a numeric string
fn coerce_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Validate a response against its batch and return texts in batch order.
///
/// The array must have one element per item and its ids must cover the
/// batch. Blank translations fall back to the source text.
pub fn map_batch_response(raw: &str, batch: &[BatchItem]) -> BatchParse {
    let Some(items) = parse_array(raw) else {
        return BatchParse::ParseFailed(raw.to_string());
    };

    if items.len() != batch.len() {
        debug!("Batch response has {} items, expected {}", items.len(), batch.len());
        return BatchParse::ShapeMismatch(raw.to_string());
    }

    let mut by_id: HashMap<u64, String> = HashMap::with_capacity(items.len());
    for item in &items {
        let Some(id) = item.get("id").and_then(coerce_id) else {
            return BatchParse::ShapeMismatch(raw.to_string());
        };
        let text = match item.get("text") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        by_id.insert(id, text);
    }

    let mut texts = Vec::with_capacity(batch.len());
    for source in batch {
        let Some(text) = by_id.remove(&source.id) else {
            debug!("Batch response is missing id {}", source.id);
            return BatchParse::ShapeMismatch(raw.to_string());
        };
        if text.trim().is_empty() {
            texts.push(source.text.clone());
        } else {
            texts.push(text);
        }
    }

    BatchParse::Ok(texts)
}
