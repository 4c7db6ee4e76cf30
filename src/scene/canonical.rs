use crate::scene::model::SceneDef;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Largest integer magnitude that round-trips exactly through `f64`.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// Deterministic serialization of a parsed scene.
///
/// Produced from the typed boundary model (defaults applied), so whitespace, key order, numeric
/// spelling (`1`, `1.0`, `1e0`), color spelling, and omitted-vs-default fields never change it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CanonicalForm(Arc<[u8]>);

impl CanonicalForm {
    /// Canonical JSON bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false` for a validated scene.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for CanonicalForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanonicalForm")
            .field("len", &self.0.len())
            .finish()
    }
}

pub(crate) fn canonicalize(def: &SceneDef) -> Result<CanonicalForm, serde_json::Error> {
    let value = serde_json::to_value(def)?;
    let bytes = serde_json::to_vec(&normalize(value))?;
    Ok(CanonicalForm(bytes.into()))
}

fn normalize(v: Value) -> Value {
    match v {
        Value::Number(n) => normalize_number(n),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        Value::Object(map) => {
            // Sort explicitly: `Map` keeps insertion order when serde_json's `preserve_order`
            // feature is enabled anywhere in the dependency graph.
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, normalize(v))).collect();
            Value::Object(sorted.into_iter().collect::<Map<_, _>>())
        }
        other => other,
    }
}

fn normalize_number(n: Number) -> Value {
    let Some(f) = n.as_f64() else {
        return Value::Number(n);
    };
    if f == 0.0 {
        return Value::from(0);
    }
    if f.fract() == 0.0 && f.abs() < MAX_EXACT_INT {
        return Value::from(f as i64);
    }
    Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
#[path = "../../tests/unit/scene/canonical.rs"]
mod tests;
