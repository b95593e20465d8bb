//! Configuration resolution for one build target.
//!
//! Three layers — built-in defaults, task-wide options, target options —
//! merge into one resolved configuration of one or more build units. After
//! the merge the resolver normalizes paths, strips options that do not
//! apply to the active environment, flattens nested lint configuration, and
//! annotates filename-injection loaders. It never rejects input: deep
//! validation is deferred to compiler construction.

use crate::merge::{merge, merge_layers};
use crate::plugins::Plugin;
use crate::state::SharedState;
use regex::Regex;
use serde_json::{Value, json};
use std::path::Path;
use std::rc::Rc;
use std::sync::OnceLock;

/// The one environment label in which watch mode is reachable and
/// source maps survive.
pub const DEV_ENVIRONMENT: &str = "dev";

/// Marker pattern for loaders that wrap injected content around a source
/// file. Matching loaders get `banner`/`footer` query parameters appended
/// so build failures can be traced back to the original location.
const INJECT_LOADER_MARKER: &str = r"inject-filename-loader";

/// The merged, normalized configuration for one target: a single build unit
/// or an ordered sequence of them, plus the plugin instances to attach to
/// the compiler.
pub struct ResolvedConfig {
    pub units: Vec<Value>,
    /// True when the target layer was sequence-valued; a multi-unit build
    /// reports stats through children even for a one-element sequence.
    pub multi: bool,
    pub environment: Option<String>,
    pub plugins: Vec<Rc<dyn Plugin>>,
}

impl ResolvedConfig {
    /// The unit that target-level flags are read from.
    pub fn first(&self) -> &Value {
        &self.units[0]
    }
}

/// Built-in lowest-precedence layer.
pub fn builtin_defaults() -> Value {
    json!({
        "context": ".",
        "output": { "path": "." },
        "progress": true,
        "stats": {},
        "failOnError": true,
    })
}

/// Resolve the layered options for one target.
///
/// Merge order is strictly defaults → task options → target options; a
/// sequence-valued target layer yields one build unit per element, each
/// merged over the combined scalar layers.
pub fn resolve(
    task_options: Value,
    target_options: Value,
    state: &SharedState,
    cwd: &Path,
) -> ResolvedConfig {
    let base = merge_layers([builtin_defaults(), task_options]);

    let (mut units, multi) = match target_options {
        Value::Array(elements) if !elements.is_empty() => {
            let units = elements
                .into_iter()
                .map(|element| merge(base.clone(), element))
                .collect();
            (units, true)
        }
        Value::Array(_) => (vec![base], false),
        target => (vec![merge(base, target)], false),
    };

    for unit in &mut units {
        normalize_paths(unit, cwd);
        strip_watch_outside_dev(unit, state);
        flatten_lint_config(unit, state);
        annotate_inject_loaders(unit, state);
    }

    let environment = take_environment(&mut units);

    ResolvedConfig {
        units,
        multi,
        environment,
        plugins: Vec::new(),
    }
}

/// Resolve `context` and `output.path` against the working directory.
/// Already-absolute paths pass through untouched, so resolution is
/// idempotent.
fn normalize_paths(unit: &mut Value, cwd: &Path) {
    if let Some(context) = unit.get_mut("context") {
        absolutize(context, cwd);
    }
    if let Some(path) = unit
        .get_mut("output")
        .and_then(|output| output.get_mut("path"))
    {
        absolutize(path, cwd);
    }
}

fn absolutize(value: &mut Value, cwd: &Path) {
    if let Some(text) = value.as_str() {
        let path = Path::new(text);
        if !path.is_absolute() {
            *value = Value::String(cwd.join(path).to_string_lossy().into_owned());
        }
    }
}

/// Watch mode is only ever reachable in the development environment; in any
/// other environment the option is removed entirely, not set to false.
fn strip_watch_outside_dev(unit: &mut Value, state: &SharedState) {
    if state.environment() == Some(DEV_ENVIRONMENT) {
        return;
    }
    if let Some(object) = unit.as_object_mut() {
        object.remove("watch");
    }
}

/// Flatten a nested lint configuration: the default source options are
/// copied onto the lint object first, then the options of every task listed
/// under the active environment, later copies overriding earlier ones. The
/// nested `config` subtree is removed afterwards. Missing pieces are
/// skipped, not errors.
fn flatten_lint_config(unit: &mut Value, state: &SharedState) {
    let Some(lint) = unit.get_mut("lint") else {
        return;
    };
    if !lint.is_object() {
        return;
    }

    let Some(config) = lint.get("config").cloned() else {
        return;
    };

    let mut flattened: Vec<(String, Value)> = Vec::new();
    if let Some(options) = config
        .get("src")
        .and_then(|src| src.get("options"))
        .and_then(Value::as_object)
    {
        flattened.extend(options.clone());
    }

    let task_names = state
        .environment()
        .and_then(|env| config.get("tasks")?.get(env)?.as_array().cloned())
        .unwrap_or_default();
    for task in task_names.iter().filter_map(Value::as_str) {
        if let Some(options) = config
            .get("src")
            .and_then(|src| src.get(task))
            .and_then(|entry| entry.get("options"))
            .and_then(Value::as_object)
        {
            flattened.extend(options.clone());
        }
    }

    if let Some(lint_object) = lint.as_object_mut() {
        for (key, value) in flattened {
            lint_object.insert(key, value);
        }
        lint_object.remove("config");
    }
}

fn inject_loader_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(INJECT_LOADER_MARKER).expect("static pattern"))
}

/// Append encoded `banner`/`footer` query parameters to every
/// pre-processing loader that matches the filename-injection marker.
fn annotate_inject_loaders(unit: &mut Value, state: &SharedState) {
    let Some(pre_loaders) = unit
        .get_mut("module")
        .and_then(|module| module.get_mut("preLoaders"))
        .and_then(Value::as_array_mut)
    else {
        return;
    };

    let banner = urlencoding::encode(state.get_str("concat_banner").unwrap_or_default());
    let footer = urlencoding::encode(state.get_str("concat_footer").unwrap_or_default());

    for entry in pre_loaders {
        let Some(loader) = entry.get("loader").and_then(Value::as_str) else {
            continue;
        };
        if inject_loader_pattern().is_match(loader) {
            let annotated = format!("{loader}&banner={banner}&footer={footer}");
            entry["loader"] = Value::String(annotated);
        }
    }
}

/// Pull the environment label off the units so it never reaches the
/// compiler. The label is read from the first unit, like every other
/// target-level flag.
fn take_environment(units: &mut [Value]) -> Option<String> {
    let environment = units
        .first()
        .and_then(|unit| unit.get("environment"))
        .and_then(Value::as_str)
        .map(str::to_string);
    for unit in units {
        if let Some(object) = unit.as_object_mut() {
            object.remove("environment");
        }
    }
    environment
}

/// Truthiness for layered option values: absent, `false`, `0`, and the
/// empty string are off; objects and arrays count as set.
pub(crate) fn enabled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ENVIRONMENT_KEY;

    fn dev_state() -> SharedState {
        let mut state = SharedState::new();
        state.set(ENVIRONMENT_KEY, json!("dev"));
        state
    }

    fn prod_state() -> SharedState {
        let mut state = SharedState::new();
        state.set(ENVIRONMENT_KEY, json!("prod"));
        state
    }

    fn cwd() -> &'static Path {
        Path::new("/work/project")
    }

    #[test]
    fn defaults_fill_in_missing_options() {
        let config = resolve(Value::Null, Value::Null, &SharedState::new(), cwd());
        assert!(!config.multi);
        assert_eq!(config.units.len(), 1);
        assert_eq!(config.first()["failOnError"], json!(true));
        assert_eq!(config.first()["progress"], json!(true));
        assert_eq!(config.first()["stats"], json!({}));
    }

    #[test]
    fn target_layer_overrides_task_layer() {
        let config = resolve(
            json!({"entry": "task.js", "mode": "debug"}),
            json!({"entry": "target.js"}),
            &SharedState::new(),
            cwd(),
        );
        assert_eq!(config.first()["entry"], "target.js");
        assert_eq!(config.first()["mode"], "debug");
    }

    #[test]
    fn plugin_lists_concatenate_across_layers() {
        let config = resolve(
            json!({"loaders": ["task-loader"]}),
            json!({"loaders": ["target-loader"]}),
            &SharedState::new(),
            cwd(),
        );
        assert_eq!(
            config.first()["loaders"],
            json!(["task-loader", "target-loader"])
        );
    }

    #[test]
    fn relative_paths_resolve_against_cwd() {
        let config = resolve(
            Value::Null,
            json!({"context": "src", "output": {"path": "dist"}}),
            &SharedState::new(),
            cwd(),
        );
        assert_eq!(config.first()["context"], "/work/project/src");
        assert_eq!(config.first()["output"]["path"], "/work/project/dist");
    }

    #[test]
    fn path_resolution_is_idempotent() {
        let once = resolve(
            Value::Null,
            json!({"context": "src"}),
            &SharedState::new(),
            cwd(),
        );
        let twice = resolve(
            Value::Null,
            json!({"context": once.first()["context"].clone()}),
            &SharedState::new(),
            cwd(),
        );
        assert_eq!(once.first()["context"], twice.first()["context"]);
    }

    #[test]
    fn sequence_target_yields_ordered_units() {
        let config = resolve(
            json!({"mode": "debug"}),
            json!([
                {"name": "first", "context": "a"},
                {"name": "second", "context": "b"},
            ]),
            &SharedState::new(),
            cwd(),
        );
        assert!(config.multi);
        assert_eq!(config.units.len(), 2);
        assert_eq!(config.units[0]["name"], "first");
        assert_eq!(config.units[1]["name"], "second");
        // Uniform normalization across the sequence.
        assert_eq!(config.units[0]["context"], "/work/project/a");
        assert_eq!(config.units[1]["context"], "/work/project/b");
        assert_eq!(config.units[1]["mode"], "debug");
    }

    #[test]
    fn empty_sequence_falls_back_to_single_unit() {
        let config = resolve(json!({"mode": "debug"}), json!([]), &SharedState::new(), cwd());
        assert!(!config.multi);
        assert_eq!(config.units.len(), 1);
        assert_eq!(config.first()["mode"], "debug");
    }

    #[test]
    fn watch_survives_in_development() {
        let config = resolve(
            Value::Null,
            json!({"watch": true}),
            &dev_state(),
            cwd(),
        );
        assert_eq!(config.first()["watch"], json!(true));
    }

    #[test]
    fn watch_is_removed_outside_development() {
        for state in [prod_state(), SharedState::new()] {
            let config = resolve(Value::Null, json!({"watch": true}), &state, cwd());
            assert!(
                config.first().get("watch").is_none(),
                "watch must be absent, not false"
            );
        }
    }

    #[test]
    fn lint_config_flattens_in_task_order() {
        let config = resolve(
            Value::Null,
            json!({
                "lint": {
                    "files": ["src/**/*.js"],
                    "config": {
                        "src": {
                            "options": {"curly": true, "eqeqeq": false},
                            "strictpass": {"options": {"eqeqeq": true}},
                            "devpass": {"options": {"undef": true}},
                        },
                        "tasks": {"dev": ["strictpass", "devpass"]},
                    },
                },
            }),
            &dev_state(),
            cwd(),
        );
        let lint = &config.first()["lint"];
        assert_eq!(lint["curly"], json!(true));
        assert_eq!(lint["eqeqeq"], json!(true), "later task copy overrides");
        assert_eq!(lint["undef"], json!(true));
        assert_eq!(lint["files"], json!(["src/**/*.js"]));
        assert!(lint.get("config").is_none());
    }

    #[test]
    fn lint_flattening_tolerates_missing_pieces() {
        let config = resolve(
            Value::Null,
            json!({"lint": {"config": {}}}),
            &SharedState::new(),
            cwd(),
        );
        assert_eq!(config.first()["lint"], json!({}));
    }

    #[test]
    fn lint_sequence_is_left_alone() {
        let config = resolve(
            Value::Null,
            json!({"lint": ["src/a.js"]}),
            &dev_state(),
            cwd(),
        );
        assert_eq!(config.first()["lint"], json!(["src/a.js"]));
    }

    #[test]
    fn inject_loaders_gain_encoded_banner_and_footer() {
        let mut state = dev_state();
        state.set("concat_banner", json!("try {"));
        state.set("concat_footer", json!("} catch(e) {}"));

        let config = resolve(
            Value::Null,
            json!({
                "module": {
                    "preLoaders": [
                        {"test": ".js$", "loader": "inject-filename-loader?pre=1"},
                        {"test": ".css$", "loader": "style-loader"},
                    ],
                },
            }),
            &state,
            cwd(),
        );

        let loaders = config.first()["module"]["preLoaders"].as_array().unwrap();
        assert_eq!(
            loaders[0]["loader"],
            "inject-filename-loader?pre=1&banner=try%20%7B&footer=%7D%20catch%28e%29%20%7B%7D"
        );
        assert_eq!(loaders[1]["loader"], "style-loader");
    }

    #[test]
    fn environment_label_moves_onto_the_config() {
        let config = resolve(
            Value::Null,
            json!({"environment": "prod"}),
            &SharedState::new(),
            cwd(),
        );
        assert_eq!(config.environment.as_deref(), Some("prod"));
        assert!(config.first().get("environment").is_none());
    }

    #[test]
    fn enabled_follows_option_truthiness() {
        assert!(enabled(&json!({})));
        assert!(enabled(&json!([])));
        assert!(enabled(&json!("dist")));
        assert!(enabled(&json!(1)));
        assert!(!enabled(&json!(false)));
        assert!(!enabled(&json!(0)));
        assert!(!enabled(&json!("")));
        assert!(!enabled(&Value::Null));
    }
}
