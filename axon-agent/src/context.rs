//! Fitting tool output into a character budget before it enters history.
//!
//! Small payloads pass through verbatim. JSON objects get their long
//! values elided key by key; arrays keep a prefix and summarize the rest;
//! anything else is truncated with a marker.

use serde_json::{Map, Value};

const LONG_VALUE_CHARS: usize = 200;
const STRING_KEEP_CHARS: usize = 150;

/// Compress text to fit within `max_chars`.
pub fn compress_for_context(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => compress_object(&map, max_chars),
        Ok(Value::Array(items)) => compress_array(&items, max_chars),
        _ => {
            let keep = max_chars.saturating_sub(30);
            let truncated: String = text.chars().take(keep).collect();
            format!("{truncated}\n\n[... truncated to fit context]")
        }
    }
}

fn compress_object(map: &Map<String, Value>, max_chars: usize) -> String {
    let budget = max_chars.saturating_sub(50);
    let mut result = Map::new();

    for (key, value) in map {
        let rendered = value.to_string();
        let compressed = if rendered.chars().count() > LONG_VALUE_CHARS {
            match value {
                Value::String(s) => {
                    let keep: String = s.chars().take(STRING_KEEP_CHARS).collect();
                    Value::String(format!("{keep}..."))
                }
                Value::Array(items) => Value::String(format!("[{} items]", items.len())),
                Value::Object(inner) => Value::String(format!("{{... {} keys}}", inner.len())),
                other => other.clone(),
            }
        } else {
            value.clone()
        };
        result.insert(key.clone(), compressed);

        let current = serde_json::to_string_pretty(&Value::Object(result.clone()))
            .unwrap_or_default();
        if current.chars().count() > budget {
            result.insert(key.clone(), Value::String("[truncated]".into()));
            break;
        }
    }

    serde_json::to_string_pretty(&Value::Object(result)).unwrap_or_default()
}

fn compress_array(items: &[Value], max_chars: usize) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }
    let full = serde_json::to_string_pretty(&Value::Array(items.to_vec())).unwrap_or_default();
    if full.chars().count() <= max_chars {
        return full;
    }

    let keep = items.len().min(3);
    let mut rendered =
        serde_json::to_string_pretty(&Value::Array(items[..keep].to_vec())).unwrap_or_default();
    let remaining = items.len() - keep;
    if remaining > 0 {
        rendered = rendered.trim_end().trim_end_matches(']').trim_end().to_string();
        rendered.push_str(&format!(",\n  \"... {remaining} more items\"\n]"));
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_text_passes_through() {
        assert_eq!(compress_for_context("short", 100), "short");
    }

    #[test]
    fn plain_text_is_truncated_with_marker() {
        let text = "x".repeat(500);
        let out = compress_for_context(&text, 100);
        assert!(out.chars().count() <= 110);
        assert!(out.ends_with("[... truncated to fit context]"));
    }

    #[test]
    fn long_object_values_are_elided() {
        let payload = json!({
            "summary": "fine",
            "blob": "y".repeat(400),
        })
        .to_string();
        let out = compress_for_context(&payload, 300);
        assert!(out.contains("\"summary\": \"fine\""));
        assert!(out.contains("..."));
        assert!(!out.contains(&"y".repeat(400)));
    }

    #[test]
    fn long_arrays_keep_a_prefix() {
        let items: Vec<Value> = (0..100).map(|i| json!({"i": i})).collect();
        let payload = Value::Array(items).to_string();
        let out = compress_for_context(&payload, 200);
        assert!(out.contains("\"... 97 more items\""));
    }

    #[test]
    fn nested_long_arrays_become_counts() {
        let payload = json!({"rows": (0..200).collect::<Vec<i32>>()}).to_string();
        let out = compress_for_context(&payload, 300);
        assert!(out.contains("[200 items]"));
    }
}
