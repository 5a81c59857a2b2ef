//! Environment lookup abstraction
//!
//! The loader never touches `std::env` directly; it reads through an
//! [`Environment`] so the same resolution runs against the process
//! environment or an in-memory map.

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

/// A source of environment variables
pub trait Environment {
    /// Raw value of `key`, or `None` when unset
    fn var(&self, key: &str) -> Option<String>;

    /// Trimmed value of `key`; empty values are treated as unset
    fn non_empty(&self, key: &str) -> Option<String> {
        self.var(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// The environment of the running process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl<S: BuildHasher> Environment for HashMap<String, String, S> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl Environment for BTreeMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}
