//! The seam between the orchestrator and the external module compiler.
//!
//! The orchestrator never looks inside a compiler; it constructs one from a
//! resolved configuration, attaches plugins, and drives it through `run` or
//! `watch`. Each completed build (or rebuild, in watch mode) produces one
//! [`BuildReport`] handed to the completion callback.

use crate::plugins::Plugin;
use anyhow::Result;
use colored::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

/// File and directory dependencies observed by the compiler during a build.
/// Snapshotted into the target registry after every attempt and seeded back
/// into the next compiler instance for the same target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySnapshot {
    pub files: BTreeSet<PathBuf>,
    pub contexts: BTreeSet<PathBuf>,
}

/// Outcome of one build attempt, delivered once per run and once per watch
/// rebuild. The dependency sets are carried on the report so the completion
/// handler can persist them even when the attempt failed.
pub struct BuildReport {
    pub error: Option<anyhow::Error>,
    pub stats: Option<Stats>,
    pub file_dependencies: BTreeSet<PathBuf>,
    pub context_dependencies: BTreeSet<PathBuf>,
}

impl BuildReport {
    pub fn failed(error: anyhow::Error, deps: DependencySnapshot) -> Self {
        Self {
            error: Some(error),
            stats: None,
            file_dependencies: deps.files,
            context_dependencies: deps.contexts,
        }
    }

    pub fn completed(stats: Stats, deps: DependencySnapshot) -> Self {
        Self {
            error: None,
            stats: Some(stats),
            file_dependencies: deps.files,
            context_dependencies: deps.contexts,
        }
    }
}

/// An external compiler instance, constructed from one resolved target
/// configuration.
///
/// `watch` delivers rebuild reports serially through the same callback and
/// only returns if the underlying watcher shuts down; there is no cancel
/// operation.
pub trait Compiler {
    fn attach_plugin(&mut self, plugin: Rc<dyn Plugin>);

    /// Prime the compiler with dependency sets recorded by a previous build
    /// of the same target, so incremental tracking does not start cold.
    fn seed_dependencies(&mut self, snapshot: DependencySnapshot);

    /// Perform exactly one build, invoking the callback once.
    fn run(&mut self, on_done: &mut dyn FnMut(BuildReport)) -> Result<()>;

    /// Continuous rebuild mode with the given poll/debounce delay, invoking
    /// the callback on every rebuild.
    fn watch(&mut self, delay: Duration, on_done: &mut dyn FnMut(BuildReport)) -> Result<()>;
}

/// One produced artifact in the output directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub size: u64,
}

/// Structured report of a completed build. A multi-unit target produces one
/// child per build unit under an aggregating parent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub hash: String,
    pub duration_ms: u64,
    pub assets: Vec<Asset>,
    pub modules: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub children: Vec<Stats>,
}

impl Stats {
    /// True when this build or any child build reported compile errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.children.iter().any(Stats::has_errors)
    }

    /// Plain serializable form, suitable for persisting into shared state.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Human-readable summary controlled by render options.
    pub fn render(&self, opts: &StatsOptions) -> String {
        let mut out = String::new();
        self.render_into(&mut out, opts, 0);
        out.trim_end().to_string()
    }

    fn render_into(&self, out: &mut String, opts: &StatsOptions, depth: usize) {
        let pad = "  ".repeat(depth);
        if opts.hash && !self.hash.is_empty() {
            let _ = writeln!(out, "{pad}hash: {}", paint(&self.hash, opts, Paint::Dim));
        }
        if opts.timings {
            let _ = writeln!(out, "{pad}time: {}ms", self.duration_ms);
        }
        if opts.assets {
            for asset in &self.assets {
                let _ = writeln!(
                    out,
                    "{pad}{}  {} bytes",
                    paint(&asset.name, opts, Paint::Good),
                    asset.size
                );
            }
        }
        if opts.modules {
            for module in &self.modules {
                let _ = writeln!(out, "{pad}  [module] {module}");
            }
        }
        for warning in &self.warnings {
            let _ = writeln!(out, "{pad}{} {warning}", paint("!", opts, Paint::Warn));
        }
        for error in &self.errors {
            let _ = writeln!(out, "{pad}{} {error}", paint("x", opts, Paint::Bad));
        }
        if opts.children {
            for child in &self.children {
                child.render_into(out, opts, depth + 1);
            }
        }
    }
}

enum Paint {
    Good,
    Warn,
    Bad,
    Dim,
}

fn paint(text: &str, opts: &StatsOptions, paint: Paint) -> String {
    if !opts.colors {
        return text.to_string();
    }
    match paint {
        Paint::Good => text.green().to_string(),
        Paint::Warn => text.yellow().to_string(),
        Paint::Bad => text.red().to_string(),
        Paint::Dim => text.dimmed().to_string(),
    }
}

/// Render switches for [`Stats::render`]. Field names follow the layered
/// option keys (`chunkModules` etc.) so a user-supplied `stats` object can
/// overlay them directly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsOptions {
    pub colors: bool,
    pub hash: bool,
    pub timings: bool,
    pub assets: bool,
    pub chunks: bool,
    pub chunk_modules: bool,
    pub modules: bool,
    pub children: bool,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self {
            colors: false,
            hash: false,
            timings: false,
            assets: false,
            chunks: false,
            chunk_modules: false,
            modules: false,
            children: false,
        }
    }
}

impl StatsOptions {
    /// Asset-focused defaults used at normal verbosity: chunk and module
    /// detail suppressed.
    pub fn summary() -> Self {
        Self {
            colors: true,
            assets: true,
            children: true,
            ..Self::default()
        }
    }

    /// Everything on, used at elevated verbosity.
    pub fn full() -> Self {
        Self {
            colors: true,
            hash: true,
            timings: true,
            assets: true,
            chunks: true,
            chunk_modules: true,
            modules: true,
            children: true,
        }
    }

    /// Overlay a user-supplied render-options object on top of `self`.
    /// Non-object or malformed values leave the defaults untouched.
    pub fn overlay(self, user: &Value) -> Self {
        if !user.is_object() {
            return self;
        }
        let base = match serde_json::to_value(self) {
            Ok(base) => base,
            Err(_) => return self,
        };
        let merged = crate::merge::merge(base, user.clone());
        serde_json::from_value(merged).unwrap_or(self)
    }
}
