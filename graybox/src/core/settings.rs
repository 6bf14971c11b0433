//! Loop parameters and their clamping rules.
//!
//! Out-of-range inputs are clamped into the valid range, never rejected.

use tracing::debug;

/// Upper bound for `max_iterations`.
pub const MAX_ITERATIONS_LIMIT: i64 = 1_000_000;
/// Upper bound for `end_time`.
pub const END_TIME_LIMIT: f64 = 1e6;
/// Step sizes below this count as "not given".
pub const MIN_TIME_STEP: f64 = 1e-20;
/// Slack added to the current time when comparing against `end_time`.
pub const TIME_EPSILON: f64 = 1e-10;

/// Nonlinear-iteration parameters. Active iff `max_iterations > 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nonlinear {
    pub min_iterations: u32,
    pub max_iterations: u32,
    pub tolerance: f64,
    pub relaxation: f64,
}

impl Default for Nonlinear {
    fn default() -> Self {
        Self {
            min_iterations: 0,
            max_iterations: 0,
            tolerance: 0.0,
            relaxation: 1.0,
        }
    }
}

impl Nonlinear {
    pub fn is_active(&self) -> bool {
        self.max_iterations > 0
    }

    /// Apply new settings. `max_iterations` is always taken (clamped); the
    /// remaining values are only taken when nonlinear mode ends up active.
    pub fn configure(
        &mut self,
        min_iterations: i64,
        max_iterations: i64,
        tolerance: f64,
        relaxation: f64,
    ) {
        let max = max_iterations.clamp(0, MAX_ITERATIONS_LIMIT);
        if max != max_iterations {
            debug!(requested = max_iterations, clamped = max, "max_iterations clamped");
        }
        self.max_iterations = max as u32;
        if max > 0 {
            self.min_iterations = min_iterations.clamp(0, max) as u32;
            self.tolerance = clamp_f64(tolerance, 0.0, 1.0);
            self.relaxation = clamp_f64(relaxation, 0.0, 2.0);
        }
    }
}

/// Transient parameters. Active iff `end_time > 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transient {
    pub time: f64,
    pub start_time: f64,
    pub end_time: f64,
    pub time_step: f64,
    /// Time discretization scheme (theta).
    pub theta: f64,
}

impl Default for Transient {
    fn default() -> Self {
        Self {
            time: 0.0,
            start_time: 0.0,
            end_time: 0.0,
            time_step: 1e-2,
            theta: 0.5,
        }
    }
}

impl Transient {
    pub fn is_active(&self) -> bool {
        self.end_time > 0.0
    }

    /// Apply new settings. A `time_step` below [`MIN_TIME_STEP`] is derived
    /// from `steps` instead; a zero step count is raised to one.
    pub fn configure(&mut self, start_time: f64, end_time: f64, time_step: f64, theta: f64, steps: u32) {
        self.end_time = clamp_f64(end_time, 0.0, END_TIME_LIMIT);
        if !self.is_active() {
            return;
        }
        let start = clamp_f64(start_time, 0.0, self.end_time);
        let step = if time_step < MIN_TIME_STEP {
            let steps = if steps == 0 {
                debug!("transient step count of zero raised to one");
                1
            } else {
                steps
            };
            (self.end_time - start) / f64::from(steps)
        } else {
            time_step
        };
        self.start_time = start;
        self.time_step = step;
        self.theta = clamp_f64(theta, 0.0, 1.0);
    }
}

/// Parameters carried by a control-loop node.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopState {
    /// Index of the current nonlinear iteration (0-based).
    pub iteration: u32,
    pub nonlinear: Nonlinear,
    pub transient: Transient,
}

impl LoopState {
    pub fn is_nonlinear(&self) -> bool {
        self.nonlinear.is_active()
    }

    pub fn is_transient(&self) -> bool {
        self.transient.is_active()
    }

    /// Short mode label used in the control banner.
    pub fn describe_mode(&self) -> String {
        let max = self.nonlinear.max_iterations;
        if !self.is_transient() {
            return format!("steady & non-linear: {max}");
        }
        if self.is_nonlinear() {
            format!("transient: {} & non-linear: {max}", self.transient.end_time)
        } else {
            format!("transient: {} & linear", self.transient.end_time)
        }
    }
}

/// Clamp that maps NaN to the lower bound.
fn clamp_f64(value: f64, low: f64, high: f64) -> f64 {
    if value.is_nan() {
        return low;
    }
    value.clamp(low, high)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonlinear_clamps_every_bound() {
        let mut nonlinear = Nonlinear::default();
        nonlinear.configure(50, 2_000_000, 3.0, -1.0);
        assert_eq!(nonlinear.max_iterations, 1_000_000);
        assert_eq!(nonlinear.min_iterations, 50);
        assert_eq!(nonlinear.tolerance, 1.0);
        assert_eq!(nonlinear.relaxation, 0.0);

        nonlinear.configure(20, 10, 0.01, 1.5);
        assert_eq!(nonlinear.min_iterations, 10);
    }

    #[test]
    fn negative_max_iterations_disables_nonlinear_and_keeps_rest() {
        let mut nonlinear = Nonlinear::default();
        nonlinear.configure(1, 5, 0.2, 1.2);
        nonlinear.configure(3, -4, 0.9, 0.1);
        assert!(!nonlinear.is_active());
        assert_eq!(nonlinear.min_iterations, 1);
        assert_eq!(nonlinear.tolerance, 0.2);
    }

    #[test]
    fn transient_keeps_explicit_step() {
        let mut transient = Transient::default();
        transient.configure(0.0, 1.0, 0.25, 0.5, 100);
        assert!(transient.is_active());
        assert_eq!(transient.time_step, 0.25);
    }

    #[test]
    fn transient_derives_step_from_count_when_step_is_zero() {
        let mut transient = Transient::default();
        transient.configure(1.0, 3.0, 0.0, 2.0, 4);
        assert_eq!(transient.start_time, 1.0);
        assert_eq!(transient.time_step, 0.5);
        assert_eq!(transient.theta, 1.0);
    }

    #[test]
    fn transient_zero_step_and_zero_count_does_not_divide_by_zero() {
        let mut transient = Transient::default();
        transient.configure(0.0, 2.0, 0.0, 0.5, 0);
        assert_eq!(transient.time_step, 2.0);
        assert!(transient.time_step.is_finite());
    }

    #[test]
    fn transient_clamps_end_and_start() {
        let mut transient = Transient::default();
        transient.configure(-5.0, 5e6, 1.0, 0.5, 1);
        assert_eq!(transient.end_time, END_TIME_LIMIT);
        assert_eq!(transient.start_time, 0.0);

        transient.configure(0.0, -1.0, 1.0, 0.5, 1);
        assert!(!transient.is_active());
    }

    #[test]
    fn describe_mode_covers_combinations() {
        let mut state = LoopState::default();
        state.nonlinear.configure(0, 7, 0.1, 1.0);
        assert_eq!(state.describe_mode(), "steady & non-linear: 7");
        state.transient.configure(0.0, 2.0, 0.5, 0.5, 1);
        assert_eq!(state.describe_mode(), "transient: 2 & non-linear: 7");
        state.nonlinear.configure(0, 0, 0.0, 1.0);
        assert_eq!(state.describe_mode(), "transient: 2 & linear");
    }
}
