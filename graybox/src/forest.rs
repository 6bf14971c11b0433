//! Arena of execution trees.
//!
//! A [`Forest`] owns every node and the collaborators shared by all of them
//! (journal, UI channel, rank oracle, session settings). Nodes reference each
//! other through [`NodeId`]s:
//!
//! - `leader`: the single node owning this one, `None` for a root.
//! - `followers`: ordered list of listed nodes. An entry whose leader is the
//!   holding node is a true follower, any other entry is a cooperator.
//!   Destroyed entries stay behind as holes.
//!
//! Several roots may live in one forest, which is how a node can be a true
//! follower in one tree and a cooperator in another.

use std::fmt::Write as _;

use tracing::{debug, warn};

use crate::core::arena::{NodeId, Slots, occupied};
use crate::core::settings::LoopState;
use crate::core::types::{ExecutionModes, PhaseFlags, Relation};
use crate::error::{Halt, Terminated};
use crate::io::journal::{Journal, Level};
use crate::io::rank::{RankOracle, SingleProcess};
use crate::io::ui::{HeadlessUi, UiChannel};
use crate::node::{Model, NodeCtx, NodeState, emit_warning, indent};
use crate::session::Session;

/// Default identifier of control-loop nodes.
pub const LOOP_IDENTIFIER: &str = "ControlLoop";

pub(crate) struct Node {
    pub(crate) state: NodeState,
    pub(crate) leader: Option<NodeId>,
    pub(crate) followers: Vec<Option<NodeId>>,
    pub(crate) model: Box<dyn Model>,
    type_name: &'static str,
}

pub struct Forest {
    pub(crate) nodes: Slots<Node>,
    pub(crate) journal: Journal,
    pub(crate) ui: Box<dyn UiChannel>,
    pub(crate) rank: Box<dyn RankOracle>,
    pub(crate) session: Session,
}

impl Default for Forest {
    fn default() -> Self {
        Self::new()
    }
}

impl Forest {
    /// Forest echoing to stdout, headless, single-process.
    pub fn new() -> Self {
        Self {
            nodes: Slots::new(),
            journal: Journal::new(),
            ui: Box::new(HeadlessUi),
            rank: Box::new(SingleProcess),
            session: Session::default(),
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_ui(mut self, ui: Box<dyn UiChannel>) -> Self {
        self.ui = ui;
        self
    }

    pub fn with_rank(mut self, rank: Box<dyn RankOracle>) -> Self {
        self.rank = rank;
        self
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// True if this process is a non-primary participant of a distributed run.
    pub fn is_non_primary(&self) -> bool {
        self.rank.is_non_primary()
    }

    /// Add a plain node. An empty `identifier` falls back to the model's type name.
    pub fn add<M: Model + 'static>(&mut self, identifier: &str, model: M) -> NodeId {
        let type_name = short_type_name::<M>();
        self.insert(identifier, type_name, Box::new(model), None)
    }

    /// Add a control-loop node. Both loop modes start inactive.
    pub fn add_loop<M: Model + 'static>(&mut self, identifier: &str, model: M) -> NodeId {
        self.insert(identifier, LOOP_IDENTIFIER, Box::new(model), Some(LoopState::default()))
    }

    fn insert(
        &mut self,
        identifier: &str,
        type_name: &'static str,
        model: Box<dyn Model>,
        control: Option<LoopState>,
    ) -> NodeId {
        let identifier = if identifier.is_empty() {
            type_name.to_string()
        } else {
            identifier.to_string()
        };
        let id = self.nodes.insert(Node {
            state: NodeState::new(identifier, control),
            leader: None,
            followers: Vec::new(),
            model,
            type_name,
        });
        debug!(node = %id, "node added");
        id
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn state(&self, id: NodeId) -> Option<&NodeState> {
        self.nodes.get(id).map(|node| &node.state)
    }

    pub fn state_mut(&mut self, id: NodeId) -> Option<&mut NodeState> {
        self.nodes.get_mut(id).map(|node| &mut node.state)
    }

    /// Concrete model of `id`, if the model opts into downcasting.
    pub fn model<T: 'static>(&self, id: NodeId) -> Option<&T> {
        self.nodes.get(id)?.model.as_any()?.downcast_ref()
    }

    pub fn identifier(&self, id: NodeId) -> Option<&str> {
        self.state(id).map(NodeState::identifier)
    }

    /// Rename a node. An empty value falls back to the model's type name.
    pub fn set_identifier(&mut self, id: NodeId, value: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.state.identifier = if value.is_empty() {
                node.type_name.to_string()
            } else {
                value.to_string()
            };
        }
    }

    pub fn flags(&self, id: NodeId) -> PhaseFlags {
        self.state(id).map(NodeState::flags).unwrap_or_default()
    }

    pub fn leader(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id)?.leader
    }

    /// Raw follower list of `id`, holes included.
    pub fn follower_slots(&self, id: NodeId) -> &[Option<NodeId>] {
        self.nodes
            .get(id)
            .map(|node| node.followers.as_slice())
            .unwrap_or(&[])
    }

    /// Live entries of the follower list, in list order.
    pub fn followers(&self, id: NodeId) -> Vec<NodeId> {
        occupied(self.follower_slots(id))
            .filter(|entry| self.nodes.contains(*entry))
            .collect()
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.leader(id).is_none()
    }

    /// Follow leader links up to the node without a leader.
    pub fn root(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(leader) = self.leader(current) {
            current = leader;
        }
        current
    }

    /// Distance from the root (root is 0).
    pub fn tree_level(&self, id: NodeId) -> usize {
        let mut level = 0;
        let mut current = id;
        while let Some(leader) = self.leader(current) {
            current = leader;
            level += 1;
        }
        level
    }

    pub fn indent(&self, id: NodeId) -> String {
        indent(self.tree_level(id))
    }

    /// Make `other` a true follower of `leader`. Appends once per node; a
    /// previous leader keeps listing `other`, which turns it into a
    /// cooperator there.
    pub fn attach_follower(&mut self, leader: NodeId, other: NodeId) -> NodeId {
        if leader == other {
            warn!(node = %leader, "refusing to attach a node to itself");
            return other;
        }
        if !self.nodes.contains(leader) {
            return other;
        }
        if let Some(node) = self.nodes.get_mut(other) {
            node.leader = Some(leader);
        } else {
            return other;
        }
        self.append_entry(leader, other);
        other
    }

    pub fn attach_followers(&mut self, leader: NodeId, others: &[NodeId]) {
        for other in others {
            self.attach_follower(leader, *other);
        }
    }

    /// List `other` under `leader` without touching `other`'s own leader.
    pub fn attach_cooperator(&mut self, leader: NodeId, other: NodeId) -> NodeId {
        if leader == other {
            warn!(node = %leader, "refusing to list a node as its own cooperator");
            return other;
        }
        if self.nodes.contains(other) {
            self.append_entry(leader, other);
        }
        other
    }

    pub fn attach_cooperators(&mut self, leader: NodeId, others: &[NodeId]) {
        for other in others {
            self.attach_cooperator(leader, *other);
        }
    }

    fn append_entry(&mut self, leader: NodeId, other: NodeId) {
        if let Some(node) = self.nodes.get_mut(leader) {
            if !node.followers.contains(&Some(other)) {
                node.followers.push(Some(other));
            }
        }
    }

    fn lists(&self, holder: NodeId, other: NodeId) -> bool {
        self.follower_slots(holder).contains(&Some(other))
    }

    pub fn is_follower(&self, holder: NodeId, other: NodeId) -> bool {
        self.leader(other) == Some(holder) && self.lists(holder, other)
    }

    pub fn is_cooperator(&self, holder: NodeId, other: NodeId) -> bool {
        self.nodes.contains(other) && self.leader(other) != Some(holder) && self.lists(holder, other)
    }

    /// How `other` relates to `holder`, `None` if it is not listed.
    pub fn relation(&self, holder: NodeId, other: NodeId) -> Option<Relation> {
        if self.is_follower(holder, other) {
            Some(Relation::Follower)
        } else if self.is_cooperator(holder, other) {
            Some(Relation::Cooperator)
        } else {
            None
        }
    }

    /// Depth-first search for `identifier`, starting at the root of `from`'s
    /// tree. `from` itself is checked first.
    pub fn find_by_identifier(&self, from: NodeId, identifier: &str) -> Option<NodeId> {
        if self.identifier(from) == Some(identifier) {
            return Some(from);
        }
        self.find_downwards(self.root(from), identifier)
    }

    fn find_downwards(&self, node: NodeId, identifier: &str) -> Option<NodeId> {
        if self.identifier(node)? == identifier {
            return Some(node);
        }
        self.followers(node)
            .into_iter()
            .find_map(|follower| self.find_downwards(follower, identifier))
    }

    pub fn modes(&self, id: NodeId) -> ExecutionModes {
        self.state(id).map(NodeState::modes).unwrap_or_default()
    }

    /// Silent flag of the node, also true on a non-primary rank.
    pub fn is_silent(&self, id: NodeId) -> bool {
        self.modes(id).silent || self.rank.is_non_primary()
    }

    /// Set interactive mode on `id` and its current subtree. Forced off, with
    /// a warning, when the UI channel is unavailable.
    pub fn set_gui(&mut self, id: NodeId, value: bool) {
        let value = if value && !self.ui.is_available() {
            self.warn(id, "'gui' is not set: no UI channel available", false);
            false
        } else {
            value
        };
        self.propagate(id, &mut |modes| modes.gui = value);
    }

    pub fn set_batch(&mut self, id: NodeId, value: bool) {
        self.propagate(id, &mut |modes| modes.batch = value);
    }

    pub fn set_silent(&mut self, id: NodeId, value: bool) {
        self.propagate(id, &mut |modes| modes.silent = value);
    }

    fn propagate(&mut self, id: NodeId, apply: &mut dyn FnMut(&mut ExecutionModes)) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        apply(&mut node.state.modes);
        for follower in self.followers(id) {
            self.propagate(follower, apply);
        }
    }

    /// Journal an indented message for `id`, echoed unless the node is silent.
    pub fn write(&mut self, id: NodeId, message: &str) {
        let line = format!("{}{}", self.indent(id), message);
        let echo = !self.is_silent(id);
        self.journal.info(&line, echo);
    }

    /// Non-fatal diagnostic: journal, UI channel in GUI mode, optional wait
    /// for acknowledgment.
    pub fn warn(&mut self, id: NodeId, message: &str, wait: bool) {
        let silent = self.is_silent(id);
        let gui = self.modes(id).gui;
        let identifier = self.identifier(id).unwrap_or_default().to_string();
        emit_warning(
            &mut self.journal,
            self.ui.as_mut(),
            &self.session.program,
            &identifier,
            gui,
            silent,
            message,
            wait,
        );
    }

    /// Log a fatal diagnostic, notify the UI in GUI mode and destroy the whole
    /// tree of `id`. The returned value must be propagated to end the run.
    pub fn terminate(&mut self, id: NodeId, message: &str) -> Terminated {
        let message = if message.is_empty() {
            "Fatal error"
        } else {
            message
        };
        let identifier = self.identifier(id).unwrap_or_default().to_string();
        let program = self.session.program.clone();
        let line = format!("??? '{program}', terminated due to: '{message}' ({identifier})");
        let silent = self.is_silent(id);
        self.journal.record(Level::Critical, &line, !silent);
        if self.modes(id).gui {
            self.ui
                .present_error(&format!("Termination: '{program}'"), message);
        }
        let root = self.root(id);
        self.destroy(root);
        Terminated {
            program,
            node: identifier,
            message: message.to_string(),
        }
    }

    /// Destroy `id`, its true followers and their true followers, bottom-up.
    /// Cooperators survive. The slot `id` occupied in its leader's list
    /// becomes a hole. Destroying a root also closes the journal file.
    pub fn destroy(&mut self, id: NodeId) -> bool {
        if !self.nodes.contains(id) {
            return false;
        }
        let was_root = self.is_root(id);
        self.destroy_downwards(id);
        if was_root {
            self.journal.teardown();
        }
        true
    }

    fn destroy_downwards(&mut self, id: NodeId) {
        for follower in self.followers(id) {
            if self.leader(follower) == Some(id) {
                self.destroy_downwards(follower);
            }
        }
        if let Some(leader) = self.leader(id) {
            if let Some(node) = self.nodes.get_mut(leader) {
                for slot in &mut node.followers {
                    if *slot == Some(id) {
                        *slot = None;
                    }
                }
            }
        }
        if self.nodes.remove(id).is_some() {
            debug!(node = %id, "node destroyed");
        }
    }

    /// Run a model hook of `id` with a [`NodeCtx`]. A `Halt` from the hook
    /// terminates the tree. Returns `Ok(None)` if `id` is gone.
    pub(crate) fn with_model<T>(
        &mut self,
        id: NodeId,
        hook: impl FnOnce(&mut dyn Model, &mut NodeCtx<'_>) -> Result<T, Halt>,
    ) -> Result<Option<T>, Terminated> {
        let level = self.tree_level(id);
        let silent = self.is_silent(id);
        let Some(node) = self.nodes.get_mut(id) else {
            return Ok(None);
        };
        let mut ctx = NodeCtx {
            state: &mut node.state,
            journal: &mut self.journal,
            ui: self.ui.as_mut(),
            program: &self.session.program,
            level,
            silent,
        };
        match hook(node.model.as_mut(), &mut ctx) {
            Ok(value) => Ok(Some(value)),
            Err(halt) => Err(self.terminate(id, &halt.0)),
        }
    }

    /// Structured description of `id` and its subtree.
    pub fn render(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.render_into(id, &mut out);
        out
    }

    fn render_into(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let identifier = node.state.identifier();
        match node.leader {
            None => {
                let _ = writeln!(out, "@root: '{identifier}', ");
                let _ = write!(out, "{{identifier: '{identifier}'");
            }
            Some(leader) => {
                let leader_id = self.identifier(leader).unwrap_or("None");
                let _ = write!(
                    out,
                    "{{identifier: '{identifier}', level: '{}', leader: '{leader_id}' (follower)",
                    self.tree_level(id)
                );
            }
        }
        if !node.followers.is_empty() {
            let names: Vec<String> = node
                .followers
                .iter()
                .map(|slot| {
                    let name = slot.and_then(|entry| self.identifier(entry)).unwrap_or("None");
                    format!("'{name}'")
                })
                .collect();
            let _ = write!(out, ", followers: [{}]", names.join(", "));
        }
        out.push('}');
        if let Some(state) = node.state.loop_state() {
            render_loop(out, identifier, state, node.leader.is_none());
        }
        for follower in self.followers(id) {
            let _ = write!(out, ",\n{}", self.indent(follower));
            if self.is_cooperator(id, follower) {
                let _ = write!(out, "{{cooperator: '{}'}}", self.identifier(follower).unwrap_or("None"));
            } else {
                self.render_into(follower, out);
            }
        }
    }
}

fn render_loop(out: &mut String, identifier: &str, state: &LoopState, is_root: bool) {
    let nonlinear = &state.nonlinear;
    if state.is_nonlinear() {
        let _ = write!(
            out,
            "\n{{nonLinear: {{id: '{identifier}', it: '{}', nItMin: '{}', nItMax: '{}', epsilon: '{}', omega: '{}'}}}}",
            state.iteration,
            nonlinear.min_iterations,
            nonlinear.max_iterations,
            nonlinear.tolerance,
            nonlinear.relaxation
        );
    }
    if state.is_transient() {
        let transient = &state.transient;
        if is_root {
            let _ = write!(
                out,
                "\n{{transient: {{t: '{:.6}', tBegin: '{}', tEnd: '{}', dt: '{}', theta: '{}'}}}}",
                transient.time,
                transient.start_time,
                transient.end_time,
                transient.time_step,
                transient.theta
            );
        } else {
            out.push_str("{steady}");
        }
    }
}

/// Last path segment of a type name, without generic arguments.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Passive;
    use crate::test_support::{ScriptedUi, quiet_forest};

    #[test]
    fn empty_identifier_falls_back_to_type_name() {
        let mut forest = quiet_forest();
        let plain = forest.add("", Passive);
        let looped = forest.add_loop("", Passive);
        assert_eq!(forest.identifier(plain), Some("Passive"));
        assert_eq!(forest.identifier(looped), Some(LOOP_IDENTIFIER));

        forest.set_identifier(plain, "pump");
        assert_eq!(forest.identifier(plain), Some("pump"));
        forest.set_identifier(plain, "");
        assert_eq!(forest.identifier(plain), Some("Passive"));
    }

    #[test]
    fn self_attach_is_ignored() {
        let mut forest = quiet_forest();
        let a = forest.add("a", Passive);
        forest.attach_follower(a, a);
        forest.attach_cooperator(a, a);
        assert!(forest.followers(a).is_empty());
        assert!(forest.is_root(a));
    }

    #[test]
    fn reattaching_moves_leadership_and_leaves_cooperator_entry() {
        let mut forest = quiet_forest();
        let first = forest.add("first", Passive);
        let second = forest.add("second", Passive);
        let child = forest.add("child", Passive);
        forest.attach_follower(first, child);
        forest.attach_follower(second, child);

        assert_eq!(forest.leader(child), Some(second));
        assert_eq!(forest.relation(second, child), Some(Relation::Follower));
        assert_eq!(forest.relation(first, child), Some(Relation::Cooperator));
    }

    #[test]
    fn modes_propagate_to_current_subtree_only() {
        let mut forest = quiet_forest();
        let root = forest.add("root", Passive);
        let a = forest.add("a", Passive);
        let b = forest.add("b", Passive);
        forest.attach_follower(root, a);
        forest.attach_follower(a, b);
        forest.set_batch(root, true);
        assert!(forest.modes(b).batch);

        let late = forest.add("late", Passive);
        forest.attach_follower(root, late);
        assert!(!forest.modes(late).batch);
    }

    #[test]
    fn gui_is_forced_off_without_ui_channel() {
        let mut forest = quiet_forest();
        let root = forest.add("root", Passive);
        forest.set_gui(root, true);
        assert!(!forest.modes(root).gui);
        assert!(forest.journal().lines().iter().any(|l| l.contains("'gui' is not set")));
    }

    #[test]
    fn warn_surfaces_on_ui_in_gui_mode_and_waits() {
        let ui = ScriptedUi::new(true);
        let events = ui.events();
        let mut forest = quiet_forest().with_ui(Box::new(ui));
        let root = forest.add("root", Passive);
        forest.set_gui(root, true);
        forest.warn(root, "low pressure", true);

        let events = events.borrow();
        assert!(events.iter().any(|e| e == "info:graybox - Warning:low pressure"));
        assert!(events.iter().any(|e| e.starts_with("ack:")));
    }

    #[test]
    fn render_marks_holes_and_cooperators() {
        let mut forest = quiet_forest();
        let root = forest.add("root", Passive);
        let a = forest.add("a", Passive);
        let b = forest.add("b", Passive);
        let other = forest.add("other", Passive);
        let shared = forest.add("shared", Passive);
        forest.attach_followers(root, &[a, b]);
        forest.attach_follower(other, shared);
        forest.attach_cooperator(root, shared);
        forest.destroy(a);

        let text = forest.render(root);
        assert!(text.starts_with("@root: 'root', \n{identifier: 'root'"));
        assert!(text.contains("followers: ['None', 'b', 'shared']"));
        assert!(text.contains("{identifier: 'b', level: '1', leader: 'root' (follower)}"));
        assert!(text.contains("{cooperator: 'shared'}"));
    }

    #[test]
    fn short_type_name_strips_path_and_generics() {
        assert_eq!(short_type_name::<Passive>(), "Passive");
        assert_eq!(short_type_name::<Vec<u8>>(), "Vec");
    }
}
