//! # crank - Per-Target Build Orchestrator
//!
//! crank sits between a task runner and an external module compiler. For
//! each declared build target it resolves a final configuration from
//! layered sources, decides execution mode (one-shot run vs. continuous
//! watch), drives the compiler through that mode, and interprets results
//! into success/failure plus optional persisted artifacts.
//!
//! ## Quick Start
//!
//! ```bash
//! # Build every target declared in crank.toml
//! crank build
//!
//! # Rebuild one target on every source change
//! crank watch app
//! ```
//!
//! ## Module Organization
//!
//! - [`resolve`] - Layered configuration resolution per target
//! - [`runner`] - Build execution and the completion protocol
//! - [`registry`] - Cross-invocation build state per target
//! - [`shell`] - Compiler adapter driving an external command

/// Per-target cache plugin with content fingerprints.
pub mod cache;

/// The seam to the external compiler: trait, reports, stats.
pub mod compiler;

/// Manifest (`crank.toml`) parsing.
pub mod config;

/// Deep merge for layered configuration fragments.
pub mod merge;

/// Compiler plugins and environment-conditional injection.
pub mod plugins;

/// In-place terminal progress rendering.
pub mod progress;

/// Process-wide build state, keyed by target name.
pub mod registry;

/// Configuration resolution for one build target.
pub mod resolve;

/// Build execution and completion handling.
pub mod runner;

/// Compiler adapter that drives an external compiler command.
pub mod shell;

/// Shared key/value state exposed by the task runner.
pub mod state;

/// Log sinks (terminal and in-memory).
pub mod ui;
