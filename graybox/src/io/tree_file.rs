//! Tree description files (TOML) and building a forest from them.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::core::arena::NodeId;
use crate::core::description::{TreeDescription, root_ids, validate_description};
use crate::forest::Forest;
use crate::node::Passive;

/// Nodes created by [`build`], keyed by their description id.
#[derive(Debug, Clone, Default)]
pub struct Built {
    pub roots: Vec<NodeId>,
    pub ids: BTreeMap<String, NodeId>,
}

/// Load and validate a description from disk.
pub fn load_tree_file(path: &Path) -> Result<TreeDescription> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read tree file {}", path.display()))?;
    parse_tree(&contents).with_context(|| format!("load tree file {}", path.display()))
}

pub fn parse_tree(contents: &str) -> Result<TreeDescription> {
    let description: TreeDescription = toml::from_str(contents).context("parse tree toml")?;
    let errors = validate_description(&description);
    if !errors.is_empty() {
        return Err(anyhow!("tree description invalid: {}", errors.join("; ")));
    }
    Ok(description)
}

/// Add every described node to `forest`, then wire leaders and cooperators
/// in file order. Expects a validated description.
pub fn build(forest: &mut Forest, description: &TreeDescription) -> Result<Built> {
    let mut built = Built::default();
    for entry in &description.nodes {
        let id = if entry.is_loop() {
            forest.add_loop(&entry.id, Passive)
        } else {
            forest.add(&entry.id, Passive)
        };
        if let Some(nonlinear) = entry.nonlinear {
            forest.configure_nonlinear(
                id,
                nonlinear.min,
                nonlinear.max,
                nonlinear.tolerance,
                nonlinear.relaxation,
            );
        }
        if let Some(transient) = entry.transient {
            forest.configure_transient(
                id,
                transient.start,
                transient.end,
                transient.step,
                transient.theta,
                transient.steps,
            );
        }
        built.ids.insert(entry.id.clone(), id);
    }

    let lookup = |name: &str| {
        built
            .ids
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("unknown node '{name}'"))
    };
    for entry in &description.nodes {
        let id = lookup(&entry.id)?;
        if let Some(leader) = &entry.leader {
            forest.attach_follower(lookup(leader)?, id);
        }
        for cooperator in &entry.cooperators {
            forest.attach_cooperator(id, lookup(cooperator)?);
        }
    }
    let roots = root_ids(description)
        .into_iter()
        .map(lookup)
        .collect::<Result<Vec<_>>>()?;
    debug!(nodes = built.ids.len(), roots = roots.len(), "forest built");
    built.roots = roots;
    Ok(built)
}
