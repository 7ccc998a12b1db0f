// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Entity adapters shipped with the crate.

mod customer;
mod invoice;

pub use customer::CustomerAdapter;
pub use invoice::InvoiceAdapter;

use serde_json::{Map, Value};

use crate::services::qbo::value_as_string;

/// Text at a JSON pointer, if present and non-empty.
fn text_at(object: &Map<String, Value>, pointer: &str) -> Option<String> {
    let (head, rest) = split_pointer(pointer);
    let value = object.get(head)?;
    let value = if rest.is_empty() {
        value
    } else {
        value.pointer(rest)?
    };
    value_as_string(value).filter(|s| !s.trim().is_empty())
}

/// Number at a JSON pointer; QuickBooks occasionally quotes amounts.
fn number_at(object: &Map<String, Value>, pointer: &str) -> Option<f64> {
    let (head, rest) = split_pointer(pointer);
    let value = object.get(head)?;
    let value = if rest.is_empty() {
        value
    } else {
        value.pointer(rest)?
    };
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// "/A/B/C" -> ("A", "/B/C")
fn split_pointer(pointer: &str) -> (&str, &str) {
    let trimmed = pointer.trim_start_matches('/');
    match trimmed.find('/') {
        Some(idx) => (&trimmed[..idx], &trimmed[idx..]),
        None => (trimmed, ""),
    }
}

/// Insert `value` under `key` only when it carries text.
fn put_text(object: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
        object.insert(key.to_string(), Value::String(v.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pointer_helpers() {
        let object = json!({
            "Id": 42,
            "PrimaryEmailAddr": {"Address": "a@example.com"},
            "TotalAmt": "12.50",
            "Blank": "  "
        });
        let object = object.as_object().unwrap();

        assert_eq!(text_at(object, "/Id").as_deref(), Some("42"));
        assert_eq!(
            text_at(object, "/PrimaryEmailAddr/Address").as_deref(),
            Some("a@example.com")
        );
        assert_eq!(text_at(object, "/Blank"), None);
        assert_eq!(text_at(object, "/Missing/Address"), None);
        assert_eq!(number_at(object, "/TotalAmt"), Some(12.5));
    }
}
