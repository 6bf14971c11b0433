//! Training glue: fit the weights of a theoretical submodel to data.
//!
//! No minimization algorithm ships with the crate. Callers plug backends in
//! through [`Optimizer`]; [`Trainer`] runs every backend from every initial
//! weight set and keeps the best fit.

use thiserror::Error;
use tracing::debug;

use crate::core::types::Options;
use crate::error::Halt;
use crate::node::{Model, NodeCtx};

/// Failure reported by an optimizer backend. Never fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{backend}: {reason}")]
pub struct BackendError {
    pub backend: String,
    pub reason: String,
}

impl BackendError {
    pub fn new(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            reason: reason.into(),
        }
    }
}

/// Best point found by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub weights: Vec<f64>,
    pub value: f64,
}

pub trait Optimizer {
    fn name(&self) -> &str;

    /// Minimize `objective` starting from `initial`.
    fn minimize(
        &self,
        objective: &dyn Fn(&[f64]) -> f64,
        initial: &[f64],
    ) -> Result<Minimum, BackendError>;
}

/// `f(x, weights) -> y` for one input row.
pub type Submodel = Box<dyn Fn(&[f64], &[f64]) -> Vec<f64>>;

/// Summary of the last training run.
#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    pub backend: String,
    pub mse: f64,
    pub attempts: usize,
    pub failures: usize,
}

/// Option keys for the acceptable mean squared error of a fit.
pub const GOAL_KEYS: &[&str] = &["goal", "target_mse"];

/// Model whose task fits the weights of a submodel to `(inputs, targets)`.
/// A fit worse than the `goal` option is kept but warned about.
pub struct Trainer {
    inputs: Vec<Vec<f64>>,
    targets: Vec<Vec<f64>>,
    submodel: Submodel,
    initial_sets: Vec<Vec<f64>>,
    backends: Vec<Box<dyn Optimizer>>,
    weights: Option<Vec<f64>>,
    report: Option<FitReport>,
}

impl Trainer {
    pub fn new(submodel: Submodel) -> Self {
        Self {
            inputs: Vec::new(),
            targets: Vec::new(),
            submodel,
            initial_sets: Vec::new(),
            backends: Vec::new(),
            weights: None,
            report: None,
        }
    }

    pub fn with_data(mut self, inputs: Vec<Vec<f64>>, targets: Vec<Vec<f64>>) -> Self {
        self.inputs = inputs;
        self.targets = targets;
        self
    }

    pub fn with_initial_sets(mut self, sets: Vec<Vec<f64>>) -> Self {
        self.initial_sets = sets;
        self
    }

    pub fn with_backend(mut self, backend: Box<dyn Optimizer>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Fitted weights, `None` before the first successful fit.
    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    pub fn report(&self) -> Option<&FitReport> {
        self.report.as_ref()
    }

    /// Evaluate the submodel at `x` with the fitted weights, or with the first
    /// initial weight set before training.
    pub fn predict(&self, x: &[f64]) -> Vec<f64> {
        let weights = self
            .weights
            .as_deref()
            .or_else(|| self.initial_sets.first().map(Vec::as_slice))
            .unwrap_or(&[]);
        (self.submodel)(x, weights)
    }

    /// Mean squared error of the submodel over the training set.
    pub fn mse(&self, weights: &[f64]) -> f64 {
        mean_squared_error(&self.submodel, &self.inputs, &self.targets, weights)
    }

    fn fit(&self, ctx: &mut NodeCtx<'_>) -> Option<(Minimum, FitReport)> {
        let objective = |weights: &[f64]| self.mse(weights);
        let mut best: Option<(Minimum, String)> = None;
        let mut attempts = 0;
        let mut failures = 0;
        for backend in &self.backends {
            for initial in &self.initial_sets {
                attempts += 1;
                match backend.minimize(&objective, initial) {
                    Ok(found) if found.value.is_finite() => {
                        debug!(backend = backend.name(), mse = found.value, "backend finished");
                        let better = best
                            .as_ref()
                            .is_none_or(|(current, _)| found.value < current.value);
                        if better {
                            best = Some((found, backend.name().to_string()));
                        }
                    }
                    Ok(found) => {
                        failures += 1;
                        ctx.warn(&format!(
                            "backend '{}' returned non-finite error {}",
                            backend.name(),
                            found.value
                        ));
                    }
                    Err(err) => {
                        failures += 1;
                        ctx.warn(&format!("backend failed: {err}"));
                    }
                }
            }
        }
        best.map(|(minimum, backend)| {
            let report = FitReport {
                backend,
                mse: minimum.value,
                attempts,
                failures,
            };
            (minimum, report)
        })
    }
}

impl Model for Trainer {
    fn task(&mut self, ctx: &mut NodeCtx<'_>, options: &Options) -> Result<f64, Halt> {
        if self.inputs.is_empty() || self.inputs.len() != self.targets.len() {
            ctx.warn("training data missing or inconsistent, fit skipped");
            return Ok(1.0);
        }
        if self.backends.is_empty() || self.initial_sets.is_empty() {
            ctx.warn("no backend or initial weights given, fit skipped");
            return Ok(1.0);
        }
        match self.fit(ctx) {
            Some((minimum, report)) => {
                ctx.write(&format!(
                    "+++ Fit: backend '{}', mse: {:.6}",
                    report.backend, report.mse
                ));
                if let Some(goal) = options.get_f64(GOAL_KEYS) {
                    if report.mse > goal {
                        ctx.warn(&format!("fit missed goal: mse {:.6} > {goal:.6}", report.mse));
                    }
                }
                self.weights = Some(minimum.weights);
                self.report = Some(report);
                ctx.state.set_ready(true);
                Ok(minimum.value.clamp(0.0, 1.0))
            }
            None => {
                ctx.warn("every backend failed, keeping previous weights");
                Ok(1.0)
            }
        }
    }

    fn as_any(&self) -> Option<&dyn std::any::Any> {
        Some(self)
    }
}

/// Mean over rows and output components of the squared prediction error.
/// Empty data yields infinity.
pub fn mean_squared_error(
    submodel: &dyn Fn(&[f64], &[f64]) -> Vec<f64>,
    inputs: &[Vec<f64>],
    targets: &[Vec<f64>],
    weights: &[f64],
) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (x, y) in inputs.iter().zip(targets) {
        let predicted = submodel(x, weights);
        for (p, t) in predicted.iter().zip(y) {
            sum += (p - t).powi(2);
            count += 1;
        }
    }
    if count == 0 {
        return f64::INFINITY;
    }
    sum / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::Forest;
    use crate::test_support::quiet_forest;

    /// Backend that reports a fixed answer, ignoring the objective search.
    struct Fixed {
        name: &'static str,
        weights: Vec<f64>,
    }

    impl Optimizer for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn minimize(
            &self,
            objective: &dyn Fn(&[f64]) -> f64,
            _initial: &[f64],
        ) -> Result<Minimum, BackendError> {
            Ok(Minimum {
                value: objective(&self.weights),
                weights: self.weights.clone(),
            })
        }
    }

    struct Broken;

    impl Optimizer for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn minimize(
            &self,
            _objective: &dyn Fn(&[f64]) -> f64,
            _initial: &[f64],
        ) -> Result<Minimum, BackendError> {
            Err(BackendError::new("broken", "diverged"))
        }
    }

    fn linear() -> Submodel {
        Box::new(|x: &[f64], w: &[f64]| vec![w.first().copied().unwrap_or(0.0) * x[0]])
    }

    fn line_data() -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        let inputs = vec![vec![1.0], vec![2.0], vec![3.0]];
        let targets = vec![vec![2.0], vec![4.0], vec![6.0]];
        (inputs, targets)
    }

    fn run(forest: &mut Forest, trainer: Trainer) -> (crate::core::arena::NodeId, f64) {
        let id = forest.add("trainer", trainer);
        let residual = forest.task(id, &Options::new()).expect("task");
        (id, residual)
    }

    #[test]
    fn keeps_lowest_error_across_backends() {
        let (inputs, targets) = line_data();
        let trainer = Trainer::new(linear())
            .with_data(inputs, targets)
            .with_initial_sets(vec![vec![0.0]])
            .with_backend(Box::new(Fixed { name: "rough", weights: vec![1.5] }))
            .with_backend(Box::new(Fixed { name: "exact", weights: vec![2.0] }));
        let mut forest = quiet_forest();
        let (id, residual) = run(&mut forest, trainer);

        assert_eq!(residual, 0.0);
        let trainer = forest.model::<Trainer>(id).expect("trainer");
        assert_eq!(trainer.weights(), Some(&[2.0][..]));
        assert_eq!(trainer.report().map(|r| r.backend.as_str()), Some("exact"));
        assert_eq!(trainer.predict(&[5.0]), vec![10.0]);
        assert!(forest.state(id).is_some_and(|s| s.is_ready()));
    }

    #[test]
    fn failing_backend_warns_and_others_still_count() {
        let (inputs, targets) = line_data();
        let trainer = Trainer::new(linear())
            .with_data(inputs, targets)
            .with_initial_sets(vec![vec![0.0], vec![1.0]])
            .with_backend(Box::new(Broken))
            .with_backend(Box::new(Fixed { name: "exact", weights: vec![2.0] }));
        let mut forest = quiet_forest();
        let (id, _) = run(&mut forest, trainer);

        let report = forest.model::<Trainer>(id).and_then(Trainer::report).cloned();
        assert_eq!(report.map(|r| (r.attempts, r.failures)), Some((4, 2)));
        let warnings = forest
            .journal()
            .lines()
            .iter()
            .filter(|l| l.contains("broken: diverged"))
            .count();
        assert_eq!(warnings, 2);
    }

    #[test]
    fn all_failures_keep_last_known_good_state() {
        let (inputs, targets) = line_data();
        let trainer = Trainer::new(linear())
            .with_data(inputs, targets)
            .with_initial_sets(vec![vec![0.5]])
            .with_backend(Box::new(Broken));
        let mut forest = quiet_forest();
        let id = forest.add("trainer", trainer);
        forest.state_mut(id).expect("state").set_ready(false);

        let residual = forest.task(id, &Options::new()).expect("task");
        assert_eq!(residual, 1.0);
        let trainer = forest.model::<Trainer>(id).expect("trainer");
        assert!(trainer.weights().is_none());
        assert_eq!(trainer.predict(&[2.0]), vec![1.0]);
        assert!(!forest.state(id).expect("state").is_ready());
    }

    #[test]
    fn residual_is_clamped_to_one() {
        let (inputs, targets) = line_data();
        let trainer = Trainer::new(linear())
            .with_data(inputs, targets)
            .with_initial_sets(vec![vec![0.0]])
            .with_backend(Box::new(Fixed { name: "zero", weights: vec![0.0] }));
        let mut forest = quiet_forest();
        let (_, residual) = run(&mut forest, trainer);
        assert_eq!(residual, 1.0);
    }

    #[test]
    fn fit_worse_than_goal_is_kept_with_warning() {
        let (inputs, targets) = line_data();
        let trainer = Trainer::new(linear())
            .with_data(inputs, targets)
            .with_initial_sets(vec![vec![0.0]])
            .with_backend(Box::new(Fixed { name: "rough", weights: vec![1.9] }));
        let mut forest = quiet_forest();
        let id = forest.add("trainer", trainer);

        forest.task(id, &Options::new().with("goal", 0.01)).expect("task");
        let missed = |forest: &Forest| {
            forest
                .journal()
                .lines()
                .iter()
                .filter(|l| l.contains("fit missed goal"))
                .count()
        };
        assert_eq!(missed(&forest), 1);
        assert_eq!(forest.model::<Trainer>(id).and_then(Trainer::weights), Some(&[1.9][..]));

        forest.task(id, &Options::new().with("target_mse", 0.1)).expect("task");
        assert_eq!(missed(&forest), 1);
    }

    #[test]
    fn mse_of_empty_data_is_infinite() {
        let model = linear();
        assert!(mean_squared_error(&model, &[], &[], &[1.0]).is_infinite());
    }
}
