// Canonical cache keys.
//
// A key is built from a type tag and a parameter bag. The bag is serialized
// with object keys sorted at every depth, nulls dropped, then lower-cased and
// stripped of whitespace, so insertion order never changes the key.

use std::{collections::BTreeMap, fmt};

use serde::Serialize;
use serde_json::Value;

use crate::error::GatewayError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new<P: Serialize + ?Sized>(tag: &str, params: &P) -> Result<Self, GatewayError> {
        let value = serde_json::to_value(params)
            .map_err(|e| GatewayError::Validation(format!("unserializable parameters: {e}")))?;
        Ok(Self::from_value(tag, &value))
    }

    pub fn from_value(tag: &str, params: &Value) -> Self {
        let mut canonical = String::new();
        write_canonical(params, &mut canonical);

        let canonical: String = canonical
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        CacheKey(format!("{tag}:{canonical}"))
    }

    // Key for a single resource addressed by an opaque, case sensitive id.
    pub fn for_id(tag: &str, id: &str) -> Self {
        CacheKey(format!("{tag}:{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn tag(&self) -> &str {
        self.0.split_once(':').map(|(tag, _)| tag).unwrap_or(&self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// serde_json's Map ordering depends on the `preserve_order` feature of
// whoever else is in the dependency graph, so sort explicitly.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> =
                map.iter().filter(|(_, v)| !v.is_null()).collect();

            out.push('{');
            for (i, (key, val)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(val, out);
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
