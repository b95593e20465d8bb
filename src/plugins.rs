//! Compiler plugins and environment-conditional injection.
//!
//! Targets declare plugin selections as an ordered list of
//! (environment predicate, factory) entries. The injector appends a freshly
//! constructed instance for every entry whose predicate matches the active
//! environment label, then strips debug-only options so neither the label
//! nor the selection list ever reaches the compiler.

use crate::resolve::{DEV_ENVIRONMENT, ResolvedConfig};
use std::any::Any;
use std::rc::Rc;

/// Instrumentation attached to a compiler instance. Plugins are shared
/// handles because the cache plugin in particular must keep its identity
/// across builds of the same target.
pub trait Plugin {
    fn name(&self) -> &str;

    /// Called by the compiler as the build advances, `ratio` in `0..=1`.
    fn on_progress(&self, _ratio: f64, _message: &str) {}

    /// Downcast hook so a compiler can recognize specific plugin kinds.
    fn as_any(&self) -> &dyn Any;
}

/// Matches an environment label either exactly or by negation: `"dev"`
/// matches only `dev`, `"!dev"` matches every label except `dev`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvPredicate {
    Is(String),
    Not(String),
}

impl EnvPredicate {
    /// Parse a predicate from its textual form; a leading `!` negates.
    pub fn parse(label: &str) -> Self {
        match label.strip_prefix('!') {
            Some(negated) => Self::Not(negated.to_string()),
            None => Self::Is(label.to_string()),
        }
    }

    pub fn matches(&self, active: &str) -> bool {
        match self {
            Self::Is(label) => label == active,
            Self::Not(label) => label != active,
        }
    }
}

/// One entry of an environment plugin selection list. The constructor and
/// its arguments are bound into the factory closure ahead of time.
pub struct EnvPluginSpec {
    pub predicate: EnvPredicate,
    construct: Box<dyn Fn() -> Rc<dyn Plugin>>,
}

impl EnvPluginSpec {
    pub fn new<F>(label: &str, construct: F) -> Self
    where
        F: Fn() -> Rc<dyn Plugin> + 'static,
    {
        Self {
            predicate: EnvPredicate::parse(label),
            construct: Box::new(construct),
        }
    }

    pub fn construct(&self) -> Rc<dyn Plugin> {
        (self.construct)()
    }
}

/// Append plugin instances for every matching spec entry, in spec order.
///
/// Skipped entirely when the config carries no environment label, including
/// the devtool stripping below. When the label is present but not the
/// development environment, the `devtool` option (source-map generation) is
/// removed from every build unit. The label itself is consumed so it does
/// not reach the compiler.
pub fn inject_env_plugins(config: &mut ResolvedConfig, specs: &[EnvPluginSpec]) {
    let Some(environment) = config.environment.take() else {
        return;
    };

    for spec in specs {
        if spec.predicate.matches(&environment) {
            config.plugins.push(spec.construct());
        }
    }

    if environment != DEV_ENVIRONMENT {
        for unit in &mut config.units {
            if let Some(object) = unit.as_object_mut() {
                object.remove("devtool");
            }
        }
    }
}
