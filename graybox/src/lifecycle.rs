//! The pre / task / post lifecycle and the top-level `execute` entry point.
//!
//! Every phase walks the follower list depth-first in list order, children
//! before the node itself. Results are not aggregated: a follower's failed
//! load or save is journaled by its own call and does not change the
//! parent's return value.

use tracing::{debug, instrument};

use crate::core::arena::NodeId;
use crate::core::types::Options;
use crate::error::Terminated;
use crate::forest::Forest;

/// Returned by `execute` on a non-primary rank.
pub const SKIPPED_RESIDUAL: f64 = -1.0;

#[derive(Debug, Clone, Copy)]
enum Phase {
    Pre,
    Post,
}

impl Forest {
    /// Run the whole lifecycle of `id`: prolog, pre-process, control,
    /// post-process, epilog. Returns the residual of the control phase, or
    /// [`SKIPPED_RESIDUAL`] without side effects on a non-primary rank.
    #[instrument(skip(self, options), fields(node = %id))]
    pub fn execute(&mut self, id: NodeId, options: &Options) -> Result<f64, Terminated> {
        if self.rank.is_non_primary() {
            debug!("non-primary rank, execution skipped");
            return Ok(SKIPPED_RESIDUAL);
        }
        if let Some(silent) = options.silent {
            self.set_silent(id, silent);
        }
        self.prolog(id)?;
        self.pre_process(id, options)?;
        let residual = self.control(id, options)?;
        self.post_process(id, options)?;
        self.epilog(id);
        Ok(residual)
    }

    /// Pre-process followers, then load this node's data if it has none.
    /// Returns false only if this node's own load failed.
    pub fn pre_process(&mut self, id: NodeId, options: &Options) -> Result<bool, Terminated> {
        self.persist_phase(id, options, Phase::Pre)
    }

    /// Post-process followers, then save this node's data if it has none.
    pub fn post_process(&mut self, id: NodeId, options: &Options) -> Result<bool, Terminated> {
        self.persist_phase(id, options, Phase::Post)
    }

    fn persist_phase(
        &mut self,
        id: NodeId,
        options: &Options,
        phase: Phase,
    ) -> Result<bool, Terminated> {
        if !self.contains(id) {
            return Ok(false);
        }
        for follower in self.followers(id) {
            match phase {
                Phase::Pre => self.pre_process(follower, options)?,
                Phase::Post => self.post_process(follower, options)?,
            };
            self.note_cooperator(id, follower);
        }
        let identifier = self.identifier(id).unwrap_or_default().to_string();
        let label = match phase {
            Phase::Pre => "Pre",
            Phase::Post => "Post",
        };
        if self.has_followers_at_root(id) {
            self.write(id, &format!("--- {label} ({identifier})"));
        }

        let has_data = self.state(id).is_some_and(|state| state.has_data());
        let ok = if has_data {
            true
        } else {
            let loaded = match phase {
                Phase::Pre => self.with_model(id, |model, ctx| model.load(ctx))?,
                Phase::Post => self.with_model(id, |model, ctx| model.save(ctx))?,
            };
            loaded.unwrap_or(false)
        };
        if !ok {
            debug!(node = %identifier, phase = label, "persistence hook reported failure");
        }
        if let Some(state) = self.state_mut(id) {
            match phase {
                Phase::Pre => state.flags.pre_done = true,
                Phase::Post => state.flags.post_done = true,
            }
        }
        Ok(ok)
    }

    /// Run `task` on every follower, then this node's own work. Returns the
    /// node's own residual.
    pub fn task(&mut self, id: NodeId, options: &Options) -> Result<f64, Terminated> {
        if !self.contains(id) {
            return Ok(0.0);
        }
        for follower in self.followers(id) {
            self.task(follower, options)?;
            self.note_cooperator(id, follower);
        }
        if self.has_followers_at_root(id) {
            let identifier = self.identifier(id).unwrap_or_default().to_string();
            self.write(id, &format!("--- Task ({identifier})"));
        }
        let residual = self
            .with_model(id, |model, ctx| model.task(ctx, options))?
            .unwrap_or(0.0);
        if let Some(state) = self.state_mut(id) {
            state.flags.task_done = true;
        }
        Ok(residual)
    }

    /// Drive the task phase. Plain nodes run `task` once; control-loop nodes
    /// with an active mode iterate, see `control_loop`.
    pub fn control(&mut self, id: NodeId, options: &Options) -> Result<f64, Terminated> {
        if let Some(state) = self.state(id).and_then(|state| state.loop_state()).copied() {
            if state.is_nonlinear() || state.is_transient() {
                return self.control_loop(id, options, state);
            }
        }
        self.control_once(id, options)
    }

    fn control_once(&mut self, id: NodeId, options: &Options) -> Result<f64, Terminated> {
        let is_root = self.is_root(id);
        if is_root {
            self.report_exec_time(id);
            self.write(id, "=== Task-processing");
        }
        let residual = self.task(id, options)?;
        if is_root {
            self.report_exec_time(id);
        }
        self.write(id, "=== Post-processing");
        Ok(residual)
    }

    fn note_cooperator(&mut self, id: NodeId, follower: NodeId) {
        if self.is_cooperator(id, follower) {
            let name = self.identifier(follower).unwrap_or_default().to_string();
            self.write(id, &format!("    ['{name}' is cooperator]"));
        }
    }

    /// Phase banners are only written inside trees that have structure.
    fn has_followers_at_root(&self, id: NodeId) -> bool {
        !self.follower_slots(self.root(id)).is_empty()
    }
}
