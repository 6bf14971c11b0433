//! Nonlinear-iteration and transient-stepping algorithms.
//!
//! Both are written against closures so the engine can drive the real task
//! phase while tests drive scripted residual sequences.

use crate::core::settings::{Nonlinear, TIME_EPSILON, Transient};

/// Result of one nonlinear-iteration run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Iterated {
    /// Index of the last iteration performed (0-based).
    pub last_iteration: u32,
    /// Residual returned by the last iteration.
    pub residual: f64,
    /// True if the loop stopped on tolerance rather than on the iteration cap.
    pub converged: bool,
}

/// Call `step(iteration)` for iterations `0, 1, ..` until the residual is at
/// most `tolerance` with at least `min_iterations` done, or until iteration
/// `max_iterations` has run.
pub fn iterate_nonlinear<E, F>(settings: &Nonlinear, mut step: F) -> Result<Iterated, E>
where
    F: FnMut(u32) -> Result<f64, E>,
{
    let mut iteration = 0u32;
    loop {
        let residual = step(iteration)?;
        if residual <= settings.tolerance && iteration >= settings.min_iterations {
            return Ok(Iterated {
                last_iteration: iteration,
                residual,
                converged: true,
            });
        }
        if iteration >= settings.max_iterations {
            return Ok(Iterated {
                last_iteration: iteration,
                residual,
                converged: false,
            });
        }
        iteration += 1;
    }
}

/// Next physical time of a transient run at `time`, or `None` once
/// `time + TIME_EPSILON` reaches `end_time`. A non-positive or non-finite step
/// ends the run.
pub fn next_time(time: f64, transient: &Transient) -> Option<f64> {
    let step = transient.time_step;
    if !(step.is_finite() && step > 0.0) || time + TIME_EPSILON >= transient.end_time {
        return None;
    }
    Some(time + step)
}
