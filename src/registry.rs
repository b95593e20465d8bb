//! Process-wide build state, keyed by target name.
//!
//! Incremental caching has to survive across independent invocations within
//! one long-lived process (repeated watch triggers, repeated task runs) but
//! must not leak across restarts, so the state lives in an owned registry
//! passed by handle rather than in an ambient global. Entries are created
//! lazily and never evicted; targets are a small, statically known set.

use crate::cache::CachePlugin;
use crate::compiler::DependencySnapshot;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Default)]
struct TargetState {
    cache_plugin: Rc<CachePlugin>,
    deps: Option<DependencySnapshot>,
}

#[derive(Default)]
pub struct TargetRegistry {
    entries: HashMap<String, TargetState>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache-plugin instance for `target`, constructed on first call.
    /// At most one instance ever exists per target in this registry.
    pub fn cache_plugin(&mut self, target: &str) -> Rc<CachePlugin> {
        let entry = self.entries.entry(target.to_string()).or_default();
        Rc::clone(&entry.cache_plugin)
    }

    /// The dependency sets recorded after the last completed build of
    /// `target`, if it has ever been built in this process.
    pub fn recall(&self, target: &str) -> Option<&DependencySnapshot> {
        self.entries.get(target)?.deps.as_ref()
    }

    /// Record the dependency sets observed by the build that just finished.
    pub fn remember(&mut self, target: &str, snapshot: DependencySnapshot) {
        self.entries.entry(target.to_string()).or_default().deps = Some(snapshot);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn cache_plugin_is_a_per_target_singleton() {
        let mut registry = TargetRegistry::new();
        let first = registry.cache_plugin("app");
        let second = registry.cache_plugin("app");
        assert!(Rc::ptr_eq(&first, &second));

        let other = registry.cache_plugin("vendor");
        assert!(!Rc::ptr_eq(&first, &other));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn remember_then_recall_roundtrips() {
        let mut registry = TargetRegistry::new();
        assert!(registry.recall("app").is_none());

        let snapshot = DependencySnapshot {
            files: [PathBuf::from("/work/src/a.js")].into_iter().collect(),
            contexts: [PathBuf::from("/work/src")].into_iter().collect(),
        };
        registry.remember("app", snapshot.clone());
        assert_eq!(registry.recall("app"), Some(&snapshot));
        assert!(registry.recall("vendor").is_none());
    }

    #[test]
    fn entries_are_never_evicted() {
        let mut registry = TargetRegistry::new();
        registry.cache_plugin("app");
        registry.remember("app", DependencySnapshot::default());
        registry.remember("app", DependencySnapshot::default());
        assert_eq!(registry.len(), 1);
    }
}
