//! Deep merge for layered configuration fragments.
//!
//! Layers are combined lowest-precedence first. Objects merge recursively,
//! scalars from the higher layer win, and array-valued keys are concatenated
//! instead of replaced so plugin and loader lists stay additive across
//! layers.

use serde_json::Value;

/// Merge `overlay` on top of `base`.
///
/// - object + object: recursive key-wise merge
/// - array + array: `base` elements followed by `overlay` elements
/// - anything + null: `base` is kept (an absent layer changes nothing)
/// - otherwise: `overlay` wins
pub fn merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (Value::Array(mut base), Value::Array(overlay)) => {
            base.extend(overlay);
            Value::Array(base)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Fold a sequence of layers in increasing precedence into one value.
pub fn merge_layers<I>(layers: I) -> Value
where
    I: IntoIterator<Item = Value>,
{
    layers
        .into_iter()
        .fold(Value::Null, |acc, layer| match acc {
            Value::Null => layer,
            acc => merge(acc, layer),
        })
}
