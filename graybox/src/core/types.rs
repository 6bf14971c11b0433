//! Shared deterministic types for the execution tree.
//!
//! These types carry no references into the arena and no I/O handles, so they
//! can be copied freely between nodes and asserted on in tests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a follower-list entry relates to the node holding the list.
///
/// Derived from the entry's leader back-reference, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    /// The entry's leader is the holding node (owned dependent).
    Follower,
    /// The entry is listed but led elsewhere, or not led at all.
    Cooperator,
}

/// Lifecycle progress of a single node. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseFlags {
    pub pre_done: bool,
    pub task_done: bool,
    pub post_done: bool,
}

/// Execution-mode flags pushed from a node to its current followers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionModes {
    /// Interactive mode: diagnostics are also surfaced on the UI channel.
    pub gui: bool,
    /// No user interaction.
    pub batch: bool,
    /// No console output.
    pub silent: bool,
}

/// Keyword options handed to every phase call.
///
/// `silent` is the only option the engine itself interprets; everything else
/// is passed through untouched for models to read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub silent: Option<bool>,
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = Some(silent);
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Value of the first key in `keys` that is present.
    pub fn get(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter().find_map(|key| self.values.get(*key))
    }

    pub fn get_f64(&self, keys: &[&str]) -> Option<f64> {
        self.get(keys).and_then(Value::as_f64)
    }
}
