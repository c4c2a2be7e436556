//! Value Fingerprints
//!
//! A fingerprint is a 64-bit hash of a cell's value. The context compares
//! fingerprints to notice content changes that equality alone cannot see,
//! most importantly a container that was modified in place after it was
//! stored.
//!
//! Scalars are hashed directly. Arrays and objects have no native hash in
//! `serde_json`, so they fall back to a content hash over their MessagePack
//! encoding.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;
use serde_json::Value as Json;

/// Hash of a cell value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Get the raw hash value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Compute the fingerprint of a value.
pub fn fingerprint(value: &Json) -> Fingerprint {
    // DefaultHasher::new() uses fixed keys, so results are stable across runs.
    let mut hasher = DefaultHasher::new();
    match value {
        Json::Null => 0u8.hash(&mut hasher),
        Json::Bool(b) => {
            1u8.hash(&mut hasher);
            b.hash(&mut hasher);
        }
        Json::Number(n) => {
            2u8.hash(&mut hasher);
            // Each number form gets its own sub-tag so equal bit patterns
            // of different forms do not collide.
            if let Some(i) = n.as_i64() {
                0u8.hash(&mut hasher);
                i.hash(&mut hasher);
            } else if let Some(u) = n.as_u64() {
                1u8.hash(&mut hasher);
                u.hash(&mut hasher);
            } else if let Some(f) = n.as_f64() {
                2u8.hash(&mut hasher);
                f.to_bits().hash(&mut hasher);
            }
        }
        Json::String(s) => {
            3u8.hash(&mut hasher);
            s.hash(&mut hasher);
        }
        Json::Array(_) | Json::Object(_) => {
            4u8.hash(&mut hasher);
            content_bytes(value).hash(&mut hasher);
        }
    }
    Fingerprint(hasher.finish())
}

fn content_bytes(value: &Json) -> Vec<u8> {
    // Encoding a JSON tree cannot fail in practice; the textual form is a
    // sufficient fallback if it ever does.
    rmp_serde::to_vec(value).unwrap_or_else(|_| value.to_string().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equal_values_share_fingerprint() {
        assert_eq!(fingerprint(&json!(42)), fingerprint(&json!(42)));
        assert_eq!(fingerprint(&json!("x")), fingerprint(&json!("x")));
        assert_eq!(
            fingerprint(&json!({"a": [1, 2], "b": null})),
            fingerprint(&json!({"b": null, "a": [1, 2]}))
        );
    }

    #[test]
    fn scalar_types_are_distinguished() {
        assert_ne!(fingerprint(&json!(1)), fingerprint(&json!("1")));
        assert_ne!(fingerprint(&json!(null)), fingerprint(&json!(false)));
        assert_ne!(fingerprint(&json!(0)), fingerprint(&json!(false)));
    }

    #[test]
    fn number_forms_are_distinguished() {
        assert_ne!(fingerprint(&json!(-1i64)), fingerprint(&json!(u64::MAX)));
        assert_ne!(
            fingerprint(&json!(2.5f64)),
            fingerprint(&json!(2.5f64.to_bits() as i64))
        );
        assert_ne!(fingerprint(&json!(1)), fingerprint(&json!(1.0)));
    }

    #[test]
    fn container_mutation_changes_fingerprint() {
        let mut value = json!([1, 2, 3]);
        let before = fingerprint(&value);

        if let Json::Array(items) = &mut value {
            items.push(json!(4));
        }

        assert_ne!(before, fingerprint(&value));
    }

    #[test]
    fn display_is_hex() {
        let text = fingerprint(&json!(7)).to_string();
        assert_eq!(text.len(), 16);
        assert!(text.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
