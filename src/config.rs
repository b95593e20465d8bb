//! Manifest (`crank.toml`) parsing.
//!
//! The manifest supplies the two user-controlled configuration layers and
//! the shared-state seed:
//!
//! ```toml
//! [state]
//! concat_banner = "try {"
//!
//! [options]            # task-wide layer
//! progress = true
//!
//! [target.app]         # target layer
//! context = "src"
//! command = "esbuild --bundle src/index.js --outdir=dist"
//!
//! [[target.vendor]]    # sequence-valued target: one unit per table
//! context = "vendor/a"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const MANIFEST_NAME: &str = "crank.toml";

#[derive(Deserialize, Debug, Default)]
pub struct Manifest {
    /// Task-wide options layer, applied to every target.
    #[serde(default)]
    pub options: Value,
    /// Per-target options layers, keyed by target name.
    #[serde(default)]
    pub target: BTreeMap<String, Value>,
    /// Seed values for the shared state (environment label, banner/footer
    /// snippets, and so on).
    #[serde(default)]
    pub state: BTreeMap<String, Value>,
}

impl Manifest {
    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.target.keys().map(String::as_str)
    }

    pub fn target_layer(&self, name: &str) -> Option<&Value> {
        self.target.get(name)
    }
}

pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}
