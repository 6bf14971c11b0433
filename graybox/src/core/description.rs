//! Declarative description of a forest and its structural invariants.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::types::Options;

/// Whole description file: run options plus node entries in file order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeDescription {
    pub options: Options,
    #[serde(rename = "node")]
    pub nodes: Vec<NodeEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeEntry {
    pub id: String,
    pub leader: Option<String>,
    /// Ids this node lists as cooperators, in order.
    pub cooperators: Vec<String>,
    pub nonlinear: Option<NonlinearEntry>,
    pub transient: Option<TransientEntry>,
}

impl NodeEntry {
    /// Entries with loop settings become control-loop nodes.
    pub fn is_loop(&self) -> bool {
        self.nonlinear.is_some() || self.transient.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonlinearEntry {
    pub min: i64,
    pub max: i64,
    pub tolerance: f64,
    pub relaxation: f64,
}

impl Default for NonlinearEntry {
    fn default() -> Self {
        Self {
            min: 0,
            max: 0,
            tolerance: 0.0,
            relaxation: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransientEntry {
    pub start: f64,
    pub end: f64,
    pub step: f64,
    pub theta: f64,
    pub steps: u32,
}

impl Default for TransientEntry {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: 0.0,
            step: 0.0,
            theta: 0.5,
            steps: 100,
        }
    }
}

/// Check invariants serde cannot express:
/// - ids are non-empty and unique
/// - referenced leaders and cooperators exist and are not the node itself
/// - leader and cooperator links together are acyclic
pub fn validate_description(description: &TreeDescription) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for (index, entry) in description.nodes.iter().enumerate() {
        if entry.id.trim().is_empty() {
            errors.push(format!("node[{index}]: id must not be empty"));
        } else if !seen.insert(entry.id.as_str()) {
            errors.push(format!("duplicate id '{}'", entry.id));
        }
    }

    for entry in &description.nodes {
        if let Some(leader) = &entry.leader {
            if leader == &entry.id {
                errors.push(format!("{}: node cannot lead itself", entry.id));
            } else if !seen.contains(leader.as_str()) {
                errors.push(format!("{}: unknown leader '{leader}'", entry.id));
            }
        }
        for cooperator in &entry.cooperators {
            if cooperator == &entry.id {
                errors.push(format!("{}: node cannot cooperate with itself", entry.id));
            } else if !seen.contains(cooperator.as_str()) {
                errors.push(format!("{}: unknown cooperator '{cooperator}'", entry.id));
            }
        }
    }

    if errors.is_empty() {
        errors.extend(follower_cycles(description));
    }
    errors
}

/// Every phase walks followers and cooperators alike, so both link kinds
/// count towards a cycle.
fn follower_cycles(description: &TreeDescription) -> Vec<String> {
    let mut links: HashMap<&str, Vec<&str>> = HashMap::new();
    for entry in &description.nodes {
        if let Some(leader) = &entry.leader {
            links.entry(leader.as_str()).or_default().push(entry.id.as_str());
        }
        links
            .entry(entry.id.as_str())
            .or_default()
            .extend(entry.cooperators.iter().map(String::as_str));
    }

    let mut errors = Vec::new();
    for entry in &description.nodes {
        let start = entry.id.as_str();
        let mut visited = HashSet::new();
        let mut pending: Vec<&str> = links.get(start).cloned().unwrap_or_default();
        while let Some(current) = pending.pop() {
            if current == start {
                errors.push(format!("{start}: follower and cooperator links form a cycle"));
                break;
            }
            if visited.insert(current) {
                pending.extend(links.get(current).into_iter().flatten().copied());
            }
        }
    }
    errors
}

/// Entries without a leader, in file order.
pub fn root_ids(description: &TreeDescription) -> Vec<&str> {
    description
        .nodes
        .iter()
        .filter(|entry| entry.leader.is_none())
        .map(|entry| entry.id.as_str())
        .collect()
}
