//! # crank CLI Entry Point
//!
//! Thin task-runner shell around the library: parses CLI arguments with
//! clap, loads `crank.toml`, and routes each selected target through
//! resolution and execution.

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use colored::*;
use serde_json::{Value, json};
use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

use crank::compiler::Compiler;
use crank::config::{self, MANIFEST_NAME, Manifest};
use crank::merge::merge;
use crank::plugins;
use crank::registry::TargetRegistry;
use crank::resolve::{self, ResolvedConfig};
use crank::runner;
use crank::shell::ShellCompiler;
use crank::state::{ENVIRONMENT_KEY, SharedState};
use crank::ui::{LogSink, TerminalSink};

#[derive(Parser)]
#[command(name = "crank")]
#[command(about = "Per-target build orchestrator", version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and build targets once
    Build {
        /// Target name (defaults to every declared target)
        target: Option<String>,
        /// Never signal completion; keep the process alive
        #[arg(long)]
        keepalive: bool,
        /// Active environment label
        #[arg(long)]
        env: Option<String>,
        /// Show full build summaries
        #[arg(short, long)]
        verbose: bool,
    },
    /// Build continuously, rebuilding on source changes
    Watch {
        /// Target name (defaults to every declared target)
        target: Option<String>,
        /// Active environment label; watch mode is only reachable in dev
        #[arg(long, default_value = resolve::DEV_ENVIRONMENT)]
        env: String,
        /// Show full build summaries
        #[arg(short, long)]
        verbose: bool,
    },
    /// List targets declared in crank.toml
    Targets,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            target,
            keepalive,
            env,
            verbose,
        } => run_targets(target.as_deref(), keepalive, env.as_deref(), verbose, false),
        Commands::Watch {
            target,
            env,
            verbose,
        } => run_targets(target.as_deref(), true, Some(&env), verbose, true),
        Commands::Targets => list_targets(),
    }
}

fn list_targets() -> Result<()> {
    let manifest = config::load_manifest(Path::new(MANIFEST_NAME))?;
    if manifest.target.is_empty() {
        println!("{} No targets declared in {}", "!".yellow(), MANIFEST_NAME);
        return Ok(());
    }
    println!("{} Declared targets:", "▸".cyan());
    for name in manifest.target_names() {
        let units = match manifest.target_layer(name) {
            Some(Value::Array(elements)) => elements.len().max(1),
            _ => 1,
        };
        println!("   {} ({} unit{})", name.bold(), units, if units == 1 { "" } else { "s" });
    }
    Ok(())
}

fn run_targets(
    selected: Option<&str>,
    keepalive: bool,
    env: Option<&str>,
    verbose: bool,
    watch: bool,
) -> Result<()> {
    let manifest = config::load_manifest(Path::new(MANIFEST_NAME))?;
    let cwd = std::env::current_dir()?;

    let mut state = SharedState::new();
    for (key, value) in &manifest.state {
        state.set(key, value.clone());
    }
    if let Some(label) = env {
        state.set(ENVIRONMENT_KEY, json!(label));
    }
    let task_options = task_layer(&manifest.options, env);

    let names = select_targets(&manifest, selected, watch)?;

    let mut registry = TargetRegistry::new();
    let sink: Rc<RefCell<dyn LogSink>> = Rc::new(RefCell::new(TerminalSink::new(verbose)));
    let any_failed = Rc::new(Cell::new(false));

    for name in &names {
        let mut target_layer = manifest
            .target_layer(name)
            .cloned()
            .unwrap_or(Value::Null);
        if watch {
            target_layer = merge(target_layer, json!({"watch": true}));
        }

        let mut resolved = resolve::resolve(task_options.clone(), target_layer, &state, &cwd);
        // No environment-conditional plugins are registered from the CLI,
        // but the injection pass still owns devtool stripping.
        plugins::inject_env_plugins(&mut resolved, &[]);

        println!(
            "{} Building target '{}'{}",
            "▸".cyan(),
            name.bold(),
            if watch { " (watch)" } else { "" }
        );

        let label = name.clone();
        let failed = Rc::clone(&any_failed);
        runner::execute(
            name,
            resolved,
            keepalive,
            &mut registry,
            &mut state,
            Rc::clone(&sink),
            |config: &ResolvedConfig| -> Result<Box<dyn Compiler>> {
                Ok(Box::new(ShellCompiler::from_config(config)?))
            },
            move |success| {
                if success {
                    println!("{} Target '{}' built", "✓".green(), label.bold());
                } else {
                    println!("{} Target '{}' failed", "x".red(), label.bold());
                    failed.set(true);
                }
            },
        )?;
    }

    if any_failed.get() {
        bail!("one or more targets failed");
    }
    Ok(())
}

/// Task-wide options layer with the CLI environment label folded in, so the
/// label reaches the per-unit environment handling as well as shared state.
fn task_layer(options: &Value, env: Option<&str>) -> Value {
    match env {
        Some(label) => merge(options.clone(), json!({"environment": label})),
        None => options.clone(),
    }
}

/// Expand the CLI target selection against the manifest. Watch mode blocks
/// inside the first target's watcher, so it only ever accepts one target.
fn select_targets(manifest: &Manifest, selected: Option<&str>, watch: bool) -> Result<Vec<String>> {
    let names: Vec<String> = match selected {
        Some(name) => {
            if manifest.target_layer(name).is_none() {
                bail!("target '{name}' is not declared in {MANIFEST_NAME}");
            }
            vec![name.to_string()]
        }
        None => manifest.target_names().map(str::to_string).collect(),
    };
    if names.is_empty() {
        bail!("no targets declared in {MANIFEST_NAME}");
    }
    if watch && names.len() > 1 {
        bail!(
            "watch mode drives a single target at a time; pick one of: {}",
            names.join(", ")
        );
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_target_manifest() -> Manifest {
        toml::from_str(
            r#"
            [target.app]
            command = "true"
            [target.vendor]
            command = "true"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn build_without_a_target_selects_every_declaration() {
        let manifest = two_target_manifest();
        let names = select_targets(&manifest, None, false).unwrap();
        assert_eq!(names, vec!["app", "vendor"]);
    }

    #[test]
    fn watch_refuses_to_fan_out_over_multiple_targets() {
        let manifest = two_target_manifest();
        let error = select_targets(&manifest, None, true).unwrap_err();
        assert!(error.to_string().contains("single target"));
        assert!(error.to_string().contains("app"));

        let names = select_targets(&manifest, Some("vendor"), true).unwrap();
        assert_eq!(names, vec!["vendor"]);
    }

    #[test]
    fn unknown_target_is_rejected() {
        let manifest = two_target_manifest();
        assert!(select_targets(&manifest, Some("nope"), false).is_err());
    }

    #[test]
    fn env_flag_reaches_devtool_stripping() {
        let layer = task_layer(&Value::Null, Some("prod"));
        let mut resolved = resolve::resolve(
            layer,
            json!({"devtool": "source-map"}),
            &SharedState::new(),
            Path::new("/work"),
        );
        plugins::inject_env_plugins(&mut resolved, &[]);
        assert!(resolved.first().get("devtool").is_none());
        assert!(resolved.environment.is_none(), "label consumed by injection");
    }
}
