//! Shared key/value state exposed to the orchestrator by the task runner.
//!
//! Holds the active environment label, the banner/footer snippets used for
//! filename injection, and any stats objects a target chooses to persist
//! with `storeStatsTo`. Keys are dotted paths (`"webpack.stats"` lands under
//! an intermediate `webpack` object).

use serde_json::{Map, Value};

/// Key for the active environment label.
pub const ENVIRONMENT_KEY: &str = "environment";

#[derive(Debug, Default)]
pub struct SharedState {
    root: Map<String, Value>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value at a dotted key path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.root.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// The active environment label, if the runner configured one.
    pub fn environment(&self) -> Option<&str> {
        self.get_str(ENVIRONMENT_KEY)
    }

    /// Write a value at a dotted key path, creating intermediate objects.
    /// An intermediate segment holding a non-object value is replaced.
    pub fn set(&mut self, path: &str, value: Value) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let last = segments.pop().unwrap_or(path);
        let mut current = &mut self.root;
        for segment in segments {
            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Some(map) = slot.as_object_mut() else {
                return;
            };
            current = map;
        }
        current.insert(last.to_string(), value);
    }
}
