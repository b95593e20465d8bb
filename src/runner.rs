//! Build execution: one resolved target driven to completion.
//!
//! The controller wires caching and progress instrumentation onto the
//! resolved configuration, constructs a compiler from it, dispatches either
//! a one-shot run or a continuous watch, and interprets every completion
//! into success/failure, rendered stats, and persisted dependency
//! snapshots.

use crate::compiler::{BuildReport, Compiler, DependencySnapshot, Stats, StatsOptions};
use crate::registry::TargetRegistry;
use crate::resolve::{ResolvedConfig, enabled};
use crate::state::SharedState;
use crate::ui::LogSink;
use anyhow::{Context, Result};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Poll/debounce delay used by watch mode unless the target overrides it.
pub const DEFAULT_WATCH_DELAY: Duration = Duration::from_millis(200);

/// Target-level execution flags, read from the first build unit. The
/// runner-side keepalive flag is honored in addition to the option.
#[derive(Debug, Clone)]
pub struct BuildFlags {
    pub watch: bool,
    pub cache: bool,
    pub keepalive: bool,
    pub store_stats_to: Option<String>,
    pub stats: Option<Value>,
    pub fail_on_error: bool,
    pub progress: bool,
    pub watch_delay: Duration,
}

impl BuildFlags {
    pub fn from_config(config: &ResolvedConfig, keepalive_flag: bool) -> Self {
        let first = config.first();
        let set = |key: &str| first.get(key).is_some_and(enabled);

        let watch = set("watch");
        Self {
            watch,
            // Watch mode's own incremental recompilation supersedes
            // snapshot-based caching.
            cache: if watch { false } else { set("cache") },
            keepalive: keepalive_flag || set("keepalive"),
            store_stats_to: first
                .get("storeStatsTo")
                .and_then(Value::as_str)
                .map(str::to_string),
            stats: first.get("stats").filter(|value| enabled(value)).cloned(),
            fail_on_error: set("failOnError"),
            progress: set("progress"),
            watch_delay: first
                .get("watchDelay")
                .and_then(Value::as_u64)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_WATCH_DELAY),
        }
    }
}

/// Completion signaling to the task runner: the first signal wins, every
/// later one is a no-op. Watch mode invokes the completion handler on every
/// rebuild, so the latch is what keeps "signal exactly once" true.
pub struct CompletionLatch {
    signaled: bool,
    notify: Box<dyn FnMut(bool)>,
}

impl CompletionLatch {
    pub fn new<F>(notify: F) -> Self
    where
        F: FnMut(bool) + 'static,
    {
        Self {
            signaled: false,
            notify: Box::new(notify),
        }
    }

    pub fn signal(&mut self, success: bool) {
        if !self.signaled {
            self.signaled = true;
            (self.notify)(success);
        }
    }

    pub fn signaled(&self) -> bool {
        self.signaled
    }
}

/// Finalizes each build attempt. Safe to invoke repeatedly in sequence;
/// watch mode calls it once per rebuild.
pub struct CompletionHandler<'a> {
    target: &'a str,
    flags: BuildFlags,
    registry: &'a mut TargetRegistry,
    state: &'a mut SharedState,
    sink: Rc<RefCell<dyn LogSink>>,
    latch: CompletionLatch,
}

impl<'a> CompletionHandler<'a> {
    pub fn new(
        target: &'a str,
        flags: BuildFlags,
        registry: &'a mut TargetRegistry,
        state: &'a mut SharedState,
        sink: Rc<RefCell<dyn LogSink>>,
        latch: CompletionLatch,
    ) -> Self {
        Self {
            target,
            flags,
            registry,
            state,
            sink,
            latch,
        }
    }

    pub fn handle(&mut self, report: BuildReport) {
        // Snapshot dependencies even on error, so a failed rebuild does not
        // lose tracking from a prior successful run.
        if self.flags.cache {
            self.registry.remember(
                self.target,
                DependencySnapshot {
                    files: report.file_dependencies.clone(),
                    contexts: report.context_dependencies.clone(),
                },
            );
        }

        if let Some(error) = &report.error {
            self.sink.borrow_mut().error(&format!("{error:#}"));
            self.latch.signal(false);
            return;
        }

        if let (Some(user_options), Some(stats)) = (&self.flags.stats, &report.stats) {
            let summary = StatsOptions::summary().overlay(user_options);
            let full = StatsOptions::full().overlay(user_options);
            let mut sink = self.sink.borrow_mut();
            sink.writeln(&stats.render(&summary));
            sink.verbose(&stats.render(&full));
        }

        if let Some(key) = &self.flags.store_stats_to
            && let Some(stats) = &report.stats
        {
            self.state.set(key, stats.to_json());
        }

        if self.flags.fail_on_error && report.stats.as_ref().is_some_and(Stats::has_errors) {
            self.sink
                .borrow_mut()
                .error(&format!("target '{}' completed with errors", self.target));
            self.latch.signal(false);
            return;
        }

        if !self.flags.keepalive {
            self.latch.signal(true);
        }
    }
}

/// Drive one build attempt for `target` to completion.
///
/// In watch mode this only returns when the underlying watcher shuts down;
/// with keepalive the completion callback is never invoked for normal
/// completion and the process is expected to stay alive until torn down
/// externally.
pub fn execute<F, D>(
    target: &str,
    mut config: ResolvedConfig,
    keepalive_flag: bool,
    registry: &mut TargetRegistry,
    state: &mut SharedState,
    sink: Rc<RefCell<dyn LogSink>>,
    make_compiler: F,
    on_complete: D,
) -> Result<()>
where
    F: FnOnce(&ResolvedConfig) -> Result<Box<dyn Compiler>>,
    D: FnMut(bool) + 'static,
{
    let flags = BuildFlags::from_config(&config, keepalive_flag);

    if flags.cache {
        // The registry-backed cache plugin supersedes the compiler's own
        // built-in cache.
        for unit in &mut config.units {
            if let Some(object) = unit.as_object_mut() {
                object.insert("cache".to_string(), Value::Bool(false));
            }
        }
        config.plugins.push(registry.cache_plugin(target));
    }
    if flags.progress {
        config
            .plugins
            .push(Rc::new(crate::progress::ProgressPlugin::new(Rc::clone(
                &sink,
            ))));
    }

    let mut compiler = make_compiler(&config)
        .with_context(|| format!("failed to construct compiler for target '{target}'"))?;
    for plugin in &config.plugins {
        compiler.attach_plugin(Rc::clone(plugin));
    }
    if flags.cache
        && let Some(snapshot) = registry.recall(target)
    {
        compiler.seed_dependencies(snapshot.clone());
    }

    let watch = flags.watch;
    let delay = flags.watch_delay;
    let mut handler = CompletionHandler::new(
        target,
        flags,
        registry,
        state,
        sink,
        CompletionLatch::new(on_complete),
    );
    let mut on_done = |report: BuildReport| handler.handle(report);

    if watch {
        compiler.watch(delay, &mut on_done)
    } else {
        compiler.run(&mut on_done)
    }
}
