//! Canonical JSON and content hashing.
//!
//! Canonical form: object keys sorted lexicographically, no whitespace,
//! numbers in serde_json's shortest round-trip rendering. Two values that
//! are structurally equal — regardless of map insertion order — produce
//! the same canonical string and therefore the same hash.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Render a JSON value in canonical form.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Display on Value::String produces the escaped JSON form.
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// SHA-256 of arbitrary bytes, as lowercase hex.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// SHA-256 of a value's canonical JSON, as lowercase hex.
pub fn hash_value(value: &Value) -> String {
    sha256_hex(canonical_json(value))
}

/// First 16 hex chars of a value's canonical-JSON SHA-256. Used where a
/// short content fingerprint is enough (code hashes, repeat detection).
pub fn short_hash(value: &Value) -> String {
    let mut h = hash_value(value);
    h.truncate(16);
    h
}
