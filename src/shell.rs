//! Compiler adapter that drives an external compiler command.
//!
//! Each build unit supplies a `command` (string or argv array) executed in
//! the unit's `context` directory. Sources under the context are scanned as
//! file dependencies, an attached cache plugin decides whether anything
//! changed since the last build of the target, and whatever lands in
//! `output.path` is reported as assets.

use crate::cache::CachePlugin;
use crate::compiler::{Asset, BuildReport, Compiler, DependencySnapshot, Stats};
use crate::plugins::Plugin;
use crate::resolve::ResolvedConfig;
use anyhow::{Context, Result, anyhow, bail};
use notify::{Config as WatcherConfig, RecursiveMode, Watcher};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;
use std::sync::mpsc::channel;
use std::time::{Duration, Instant};
use walkdir::{DirEntry, WalkDir};

struct ShellUnit {
    name: String,
    context: PathBuf,
    output_path: PathBuf,
    command: Vec<String>,
}

pub struct ShellCompiler {
    units: Vec<ShellUnit>,
    multi: bool,
    plugins: Vec<Rc<dyn Plugin>>,
    seeded: Option<DependencySnapshot>,
}

impl std::fmt::Debug for ShellCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellCompiler")
            .field("units", &self.units.len())
            .field("multi", &self.multi)
            .field("plugins", &self.plugins.len())
            .finish_non_exhaustive()
    }
}

impl ShellCompiler {
    /// Construct from a resolved configuration. This is where malformed
    /// merges finally surface; the resolver itself never rejects input.
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let mut units = Vec::with_capacity(config.units.len());
        for (index, unit) in config.units.iter().enumerate() {
            units.push(parse_unit(index, unit)?);
        }
        Ok(Self {
            units,
            multi: config.multi,
            plugins: Vec::new(),
            seeded: None,
        })
    }

    fn cache_plugin(&self) -> Option<&CachePlugin> {
        self.plugins
            .iter()
            .find_map(|plugin| plugin.as_any().downcast_ref::<CachePlugin>())
    }

    fn progress(&self, ratio: f64, message: &str) {
        for plugin in &self.plugins {
            plugin.on_progress(ratio, message);
        }
    }

    fn build_once(&mut self) -> BuildReport {
        let started = Instant::now();
        self.progress(0.0, "scanning");

        let mut deps = DependencySnapshot::default();
        let mut unit_sources = Vec::with_capacity(self.units.len());
        for unit in &self.units {
            deps.contexts.insert(unit.context.clone());
            let sources = scan_sources(&unit.context, &unit.output_path);
            deps.files.extend(sources.iter().cloned());
            unit_sources.push(sources);
        }
        if let Some(seed) = self.seeded.take() {
            deps.files.extend(seed.files);
            deps.contexts.extend(seed.contexts);
        }

        // Without a cache plugin every build runs the command; with one,
        // an unchanged input set skips straight to asset collection.
        let inputs_changed = match self.cache_plugin() {
            Some(cache) => cache.refresh(&deps.files),
            None => true,
        };

        let total = self.units.len();
        let mut children = Vec::with_capacity(total);
        for (index, unit) in self.units.iter().enumerate() {
            self.progress(
                (index as f64 + 0.5) / total as f64,
                &format!("building {}", unit.name),
            );

            let unit_started = Instant::now();
            let mut errors = Vec::new();
            let mut warnings = Vec::new();
            if inputs_changed {
                let output = Command::new(&unit.command[0])
                    .args(&unit.command[1..])
                    .current_dir(&unit.context)
                    .output();
                match output {
                    Err(source) => {
                        let error = anyhow!(source).context(format!(
                            "failed to launch compiler command '{}' for unit '{}'",
                            unit.command[0], unit.name
                        ));
                        return BuildReport::failed(error, deps);
                    }
                    Ok(output) => {
                        let stderr = String::from_utf8_lossy(&output.stderr);
                        let stderr = stderr.trim();
                        if !output.status.success() {
                            errors.push(if stderr.is_empty() {
                                format!("compiler command exited with {}", output.status)
                            } else {
                                stderr.to_string()
                            });
                        } else if !stderr.is_empty() {
                            warnings.push(stderr.to_string());
                        }
                    }
                }
            }

            let assets = collect_assets(&unit.output_path);
            children.push(Stats {
                hash: fingerprint(&assets),
                duration_ms: unit_started.elapsed().as_millis() as u64,
                assets,
                modules: unit_sources[index]
                    .iter()
                    .map(|path| path.to_string_lossy().into_owned())
                    .collect(),
                errors,
                warnings,
                children: Vec::new(),
            });
        }
        self.progress(1.0, "done");

        // A sequence-valued target always reports through children, even
        // when the sequence has one element; a plain target reports flat.
        let stats = if !self.multi && children.len() == 1 {
            children.pop().unwrap_or_default()
        } else {
            Stats {
                hash: fingerprint_combined(&children),
                duration_ms: started.elapsed().as_millis() as u64,
                children,
                ..Stats::default()
            }
        };
        BuildReport::completed(stats, deps)
    }
}

impl Compiler for ShellCompiler {
    fn attach_plugin(&mut self, plugin: Rc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    fn seed_dependencies(&mut self, snapshot: DependencySnapshot) {
        self.seeded = Some(snapshot);
    }

    fn run(&mut self, on_done: &mut dyn FnMut(BuildReport)) -> Result<()> {
        let report = self.build_once();
        on_done(report);
        Ok(())
    }

    fn watch(&mut self, delay: Duration, on_done: &mut dyn FnMut(BuildReport)) -> Result<()> {
        let (tx, rx) = channel();
        let watcher_config = WatcherConfig::default().with_poll_interval(delay);
        let mut watcher = notify::RecommendedWatcher::new(tx, watcher_config)?;
        for unit in &self.units {
            watcher
                .watch(&unit.context, RecursiveMode::Recursive)
                .with_context(|| format!("failed to watch {}", unit.context.display()))?;
        }

        let report = self.build_once();
        on_done(report);

        while rx.recv().is_ok() {
            // Debounce: give the burst a moment, then drain it.
            std::thread::sleep(delay);
            while rx.try_recv().is_ok() {}
            let report = self.build_once();
            on_done(report);
        }
        Ok(())
    }
}

fn parse_unit(index: usize, unit: &Value) -> Result<ShellUnit> {
    if !unit.is_object() {
        bail!("build unit {index} is not an object");
    }
    let context = unit
        .get("context")
        .and_then(Value::as_str)
        .with_context(|| format!("build unit {index} has no string `context`"))?;
    let output_path = unit
        .get("output")
        .and_then(|output| output.get("path"))
        .and_then(Value::as_str)
        .with_context(|| format!("build unit {index} has no string `output.path`"))?;

    let command = match unit.get("command") {
        Some(Value::String(line)) => line.split_whitespace().map(str::to_string).collect(),
        Some(Value::Array(parts)) => parts
            .iter()
            .map(|part| {
                part.as_str()
                    .map(str::to_string)
                    .with_context(|| format!("build unit {index} has a non-string command part"))
            })
            .collect::<Result<Vec<String>>>()?,
        _ => bail!("build unit {index} has no `command`"),
    };
    if command.is_empty() {
        bail!("build unit {index} has an empty `command`");
    }

    let name = unit
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("unit-{index}"));

    Ok(ShellUnit {
        name,
        context: PathBuf::from(context),
        output_path: PathBuf::from(output_path),
        command,
    })
}

fn hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_string_lossy()
            .starts_with('.')
}

fn scan_sources(context: &Path, output_path: &Path) -> BTreeSet<PathBuf> {
    let mut files = BTreeSet::new();
    for entry in WalkDir::new(context)
        .into_iter()
        .filter_entry(|entry| !hidden(entry))
        .filter_map(|entry| entry.ok())
    {
        let path = entry.path();
        if entry.file_type().is_file() && !path.starts_with(output_path) {
            files.insert(path.to_path_buf());
        }
    }
    files
}

fn collect_assets(output_path: &Path) -> Vec<Asset> {
    let mut assets = Vec::new();
    for entry in WalkDir::new(output_path)
        .into_iter()
        .filter_map(|entry| entry.ok())
    {
        if entry.file_type().is_file() {
            let name = entry
                .path()
                .strip_prefix(output_path)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .into_owned();
            let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
            assets.push(Asset { name, size });
        }
    }
    assets.sort_by(|a, b| a.name.cmp(&b.name));
    assets
}

fn fingerprint(assets: &[Asset]) -> String {
    let mut hasher = Sha256::new();
    for asset in assets {
        hasher.update(asset.name.as_bytes());
        hasher.update(asset.size.to_le_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

fn fingerprint_combined(children: &[Stats]) -> String {
    let mut hasher = Sha256::new();
    for child in children {
        hasher.update(child.hash.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}
