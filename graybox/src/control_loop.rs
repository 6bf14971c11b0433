//! Nonlinear-iteration and transient control for control-loop nodes.
//!
//! A node added with `Forest::add_loop` carries a [`LoopState`]. While neither
//! mode is active its control phase is the plain single-task one; otherwise
//! `control` hands over to [`Forest::control_loop`].

use tracing::{debug, instrument};

use crate::core::arena::NodeId;
use crate::core::convergence::{iterate_nonlinear, next_time};
use crate::core::settings::{LoopState, Transient};
use crate::core::types::Options;
use crate::error::Terminated;
use crate::forest::Forest;

impl Forest {
    /// Loop parameters of `id`, `None` for plain nodes.
    pub fn loop_state(&self, id: NodeId) -> Option<LoopState> {
        self.state(id)?.loop_state().copied()
    }

    /// Set nonlinear-iteration parameters, clamped into range. Nonlinear mode
    /// is active afterwards iff `max_iterations > 0`. Returns false if `id` is
    /// not a control-loop node.
    pub fn configure_nonlinear(
        &mut self,
        id: NodeId,
        min_iterations: i64,
        max_iterations: i64,
        tolerance: f64,
        relaxation: f64,
    ) -> bool {
        let Some(state) = self.state_mut(id).and_then(|s| s.loop_state_mut()) else {
            return false;
        };
        state
            .nonlinear
            .configure(min_iterations, max_iterations, tolerance, relaxation);
        true
    }

    /// Set transient parameters, clamped into range. Transient mode is active
    /// afterwards iff `end_time > 0`. A `time_step` below the minimum is
    /// derived from `steps`.
    pub fn configure_transient(
        &mut self,
        id: NodeId,
        start_time: f64,
        end_time: f64,
        time_step: f64,
        theta: f64,
        steps: u32,
    ) -> bool {
        let Some(state) = self.state_mut(id).and_then(|s| s.loop_state_mut()) else {
            return false;
        };
        state
            .transient
            .configure(start_time, end_time, time_step, theta, steps);
        true
    }

    /// Run the `initial_condition` hook on followers, then on `id`.
    pub fn initial_condition(&mut self, id: NodeId) -> Result<(), Terminated> {
        for follower in self.followers(id) {
            self.initial_condition(follower)?;
        }
        self.with_model(id, |model, ctx| model.initial_condition(ctx))?;
        Ok(())
    }

    /// Run the `update_nonlinear` hook on followers, then on `id`.
    pub fn update_nonlinear(&mut self, id: NodeId) -> Result<(), Terminated> {
        for follower in self.followers(id) {
            self.update_nonlinear(follower)?;
        }
        self.with_model(id, |model, ctx| model.update_nonlinear(ctx))?;
        Ok(())
    }

    /// Push time, step and theta down the subtree, then run the
    /// `update_transient` hooks. The root is authoritative for these fields
    /// when it is itself in transient mode.
    pub fn update_transient(&mut self, id: NodeId) -> Result<(), Terminated> {
        let root = self.root(id);
        let source = self
            .loop_state(root)
            .filter(LoopState::is_transient)
            .or_else(|| self.loop_state(id))
            .map(|state| state.transient);
        match source {
            Some(source) => self.update_transient_from(id, &source),
            None => Ok(()),
        }
    }

    fn update_transient_from(&mut self, id: NodeId, source: &Transient) -> Result<(), Terminated> {
        for follower in self.followers(id) {
            self.update_transient_from(follower, source)?;
        }
        if let Some(state) = self.state_mut(id).and_then(|s| s.loop_state_mut()) {
            state.transient.time = source.time;
            state.transient.time_step = source.time_step;
            state.transient.theta = source.theta;
        }
        self.with_model(id, |model, ctx| model.update_transient(ctx))?;
        Ok(())
    }

    /// Iterative control phase of a control-loop node with `settings` active.
    #[instrument(skip(self, options, settings), fields(node = %id))]
    pub(crate) fn control_loop(
        &mut self,
        id: NodeId,
        options: &Options,
        settings: LoopState,
    ) -> Result<f64, Terminated> {
        let is_root = self.is_root(id);
        if is_root {
            self.report_exec_time(id);
        }
        self.write(id, &format!("=== Control ({})", settings.describe_mode()));
        self.initial_condition(id)?;

        let residual = if settings.is_transient() {
            let mut residual = f64::INFINITY;
            let mut time = 0.0;
            // Step and end time are re-read every step; hooks may change them.
            while let Some(next) = self
                .loop_state(id)
                .and_then(|state| next_time(time, &state.transient))
            {
                self.set_time(id, next);
                self.write(id, &format!("### Physical time: {next:.6}"));
                self.update_transient(id)?;
                let nonlinear = self.loop_state(id).is_some_and(|state| state.is_nonlinear());
                residual = if nonlinear {
                    self.nonlinear_iteration(id, options)?
                } else {
                    self.task(id, options)?
                };
                time = next;
            }
            residual
        } else {
            self.nonlinear_iteration(id, options)?
        };

        if is_root {
            self.report_exec_time(id);
        }
        self.write(id, "=== Post-processing");
        Ok(residual)
    }

    fn nonlinear_iteration(
        &mut self,
        id: NodeId,
        options: &Options,
    ) -> Result<f64, Terminated> {
        let settings = self.loop_state(id).map(|state| state.nonlinear).unwrap_or_default();
        let outcome = iterate_nonlinear(&settings, |iteration| {
            if let Some(state) = self.state_mut(id).and_then(|s| s.loop_state_mut()) {
                state.iteration = iteration;
            }
            self.write(id, &format!("+++ Iteration: {iteration}"));
            self.update_nonlinear(id)?;
            self.task(id, options)
        })?;
        if !outcome.converged {
            debug!(
                iterations = outcome.last_iteration + 1,
                residual = outcome.residual,
                "nonlinear iteration hit the iteration cap"
            );
        }
        Ok(outcome.residual)
    }

    fn set_time(&mut self, id: NodeId, time: f64) {
        if let Some(state) = self.state_mut(id).and_then(|s| s.loop_state_mut()) {
            state.transient.time = time;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Halt;
    use crate::node::{Model, NodeCtx, Passive};
    use crate::test_support::{Recorder, ScriptedResiduals, event_log, quiet_forest};

    /// Widens the time step to `wide_step` from its first transient update on
    /// and records the time of every task.
    struct AdaptiveStep {
        wide_step: f64,
        times: Vec<f64>,
    }

    impl Model for AdaptiveStep {
        fn update_transient(&mut self, ctx: &mut NodeCtx<'_>) -> Result<(), Halt> {
            if let Some(state) = ctx.state.loop_state_mut() {
                state.transient.time_step = self.wide_step;
            }
            Ok(())
        }

        fn task(&mut self, ctx: &mut NodeCtx<'_>, _options: &Options) -> Result<f64, Halt> {
            let time = ctx.state.loop_state().map_or(0.0, |s| s.transient.time);
            self.times.push(time);
            Ok(0.0)
        }

        fn as_any(&self) -> Option<&dyn std::any::Any> {
            Some(self)
        }
    }

    #[test]
    fn configure_on_plain_node_is_refused() {
        let mut forest = quiet_forest();
        let plain = forest.add("plain", Passive);
        assert!(!forest.configure_nonlinear(plain, 0, 5, 0.1, 1.0));
        assert!(!forest.configure_transient(plain, 0.0, 1.0, 0.1, 0.5, 0));
        assert!(forest.loop_state(plain).is_none());
    }

    #[test]
    fn inactive_loop_behaves_like_plain_node() {
        let (model, calls) = ScriptedResiduals::new(&[0.3]);
        let mut forest = quiet_forest();
        let root = forest.add_loop("loop", model);
        let residual = forest.control(root, &Options::new()).expect("control");
        assert_eq!(residual, 0.3);
        assert_eq!(calls.borrow().len(), 1);
        assert!(!forest.journal().lines().iter().any(|l| l.starts_with("=== Control")));
    }

    #[test]
    fn nonlinear_stops_on_tolerance_after_minimum() {
        let (model, calls) = ScriptedResiduals::new(&[1.0, 0.5, 0.1, 0.005, 0.001]);
        let mut forest = quiet_forest();
        let root = forest.add_loop("loop", model);
        forest.configure_nonlinear(root, 2, 10, 0.01, 1.0);

        let residual = forest.control(root, &Options::new()).expect("control");
        assert_eq!(residual, 0.005);
        assert_eq!(calls.borrow().len(), 4);
        assert_eq!(forest.loop_state(root).map(|s| s.iteration), Some(3));
        let lines = forest.journal().lines();
        assert!(lines.iter().any(|l| l == "=== Control (steady & non-linear: 10)"));
        assert!(lines.iter().any(|l| l == "+++ Iteration: 3"));
    }

    #[test]
    fn nonlinear_respects_minimum_iterations() {
        let (model, calls) = ScriptedResiduals::new(&[0.0]);
        let mut forest = quiet_forest();
        let root = forest.add_loop("loop", model);
        forest.configure_nonlinear(root, 3, 10, 0.01, 1.0);
        forest.control(root, &Options::new()).expect("control");
        assert_eq!(calls.borrow().len(), 4);
    }

    #[test]
    fn nonlinear_runs_max_plus_one_iterations_without_convergence() {
        let (model, calls) = ScriptedResiduals::new(&[0.9]);
        let mut forest = quiet_forest();
        let root = forest.add_loop("loop", model);
        forest.configure_nonlinear(root, 0, 4, 0.01, 1.0);
        let residual = forest.control(root, &Options::new()).expect("control");
        assert_eq!(residual, 0.9);
        assert_eq!(calls.borrow().len(), 5);
    }

    #[test]
    fn transient_visits_each_time_once() {
        let (model, calls) = ScriptedResiduals::new(&[0.2]);
        let mut forest = quiet_forest();
        let root = forest.add_loop("loop", model);
        forest.configure_transient(root, 0.0, 1.0, 0.25, 0.5, 0);

        forest.control(root, &Options::new()).expect("control");
        let times: Vec<f64> = calls.borrow().iter().map(|(_, t)| *t).collect();
        assert_eq!(times, vec![0.25, 0.5, 0.75, 1.0]);
        assert!(
            forest
                .journal()
                .lines()
                .iter()
                .any(|l| l == "### Physical time: 0.250000")
        );
    }

    #[test]
    fn step_changed_by_hook_applies_to_next_step() {
        let mut forest = quiet_forest();
        let model = AdaptiveStep {
            wide_step: 0.5,
            times: Vec::new(),
        };
        let root = forest.add_loop("loop", model);
        forest.configure_transient(root, 0.0, 1.0, 0.25, 0.5, 0);

        forest.control(root, &Options::new()).expect("control");
        let times = forest
            .model::<AdaptiveStep>(root)
            .map(|m| m.times.clone())
            .expect("model");
        assert_eq!(times, vec![0.25, 0.75, 1.25]);
    }

    #[test]
    fn transient_with_nonlinear_runs_inner_loop_per_step() {
        let (model, calls) = ScriptedResiduals::new(&[0.5, 0.0]);
        let mut forest = quiet_forest();
        let root = forest.add_loop("loop", model);
        forest.configure_transient(root, 0.0, 0.5, 0.25, 0.5, 0);
        forest.configure_nonlinear(root, 0, 5, 0.01, 1.0);

        let residual = forest.control(root, &Options::new()).expect("control");
        assert_eq!(residual, 0.0);
        let calls = calls.borrow();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1], (1, 0.25));
        assert_eq!(calls[2], (0, 0.5));
    }

    #[test]
    fn update_transient_copies_root_time_into_loop_followers() {
        let (model, calls) = ScriptedResiduals::new(&[0.0]);
        let mut forest = quiet_forest();
        let root = forest.add_loop("root", Passive);
        let inner = forest.add_loop("inner", model);
        forest.attach_follower(root, inner);
        forest.configure_transient(root, 0.0, 0.2, 0.1, 0.7, 0);

        forest.control(root, &Options::new()).expect("control");
        let inner_state = forest.loop_state(inner).expect("loop");
        assert!((inner_state.transient.time - 0.2).abs() < 1e-12);
        assert_eq!(inner_state.transient.theta, 0.7);
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn hooks_fan_out_children_first() {
        let log = event_log();
        let mut forest = quiet_forest();
        let root = forest.add_loop("root", Recorder::new("root", &log));
        let child = forest.add("child", Recorder::new("child", &log));
        forest.attach_follower(root, child);
        forest.configure_nonlinear(root, 0, 1, 1.0, 1.0);

        forest.control(root, &Options::new()).expect("control");
        assert_eq!(
            *log.borrow(),
            vec![
                "initial:child",
                "initial:root",
                "nonlinear:child",
                "nonlinear:root",
                "task:child",
                "task:root"
            ]
        );
    }

    #[test]
    fn zero_length_transient_returns_infinity() {
        let (model, calls) = ScriptedResiduals::new(&[0.1]);
        let mut forest = quiet_forest();
        let root = forest.add_loop("loop", model);
        forest.configure_transient(root, 0.0, 1.0, 0.25, 0.5, 0);
        if let Some(state) = forest.state_mut(root).and_then(|s| s.loop_state_mut()) {
            state.transient.time_step = -1.0;
        }
        let residual = forest.control(root, &Options::new()).expect("control");
        assert!(residual.is_infinite());
        assert!(calls.borrow().is_empty());
    }
}
