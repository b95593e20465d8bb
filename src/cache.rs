//! Per-target build cache plugin.
//!
//! One `CachePlugin` instance lives in the target registry per target for
//! the life of the process. It fingerprints input files by content hash so
//! the compiler can tell whether anything changed since the previous build
//! of that target and skip redundant work.

use crate::plugins::Plugin;
use sha2::{Digest, Sha256};
use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct CachePlugin {
    fingerprints: RefCell<HashMap<PathBuf, [u8; 32]>>,
}

impl CachePlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files currently fingerprinted.
    pub fn tracked(&self) -> usize {
        self.fingerprints.borrow().len()
    }

    /// Compare the given input set against the stored fingerprints, store
    /// the new fingerprints, and report whether a rebuild is needed.
    ///
    /// The first call for a target always reports a change, as does any
    /// added, removed, modified, or unreadable file.
    pub fn refresh(&self, files: &BTreeSet<PathBuf>) -> bool {
        let mut stored = self.fingerprints.borrow_mut();
        let mut changed = stored.is_empty();
        let mut next = HashMap::with_capacity(files.len());

        for file in files {
            match hash_file(file) {
                Some(digest) => {
                    if stored.get(file) != Some(&digest) {
                        changed = true;
                    }
                    next.insert(file.clone(), digest);
                }
                None => changed = true,
            }
        }
        if next.len() != stored.len() {
            changed = true;
        }

        *stored = next;
        changed
    }
}

fn hash_file(path: &Path) -> Option<[u8; 32]> {
    let bytes = fs::read(path).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Some(hasher.finalize().into())
}

impl Plugin for CachePlugin {
    fn name(&self) -> &str {
        "cache"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
