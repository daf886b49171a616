use nalgebra::RealField;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Iteration settings for the Riccati solvers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiccatiConfig<T> {
    /// Step size of the incremental form.
    pub alpha: T,
    /// Stop once the largest squared entrywise change of P falls to this value.
    pub epsilon: T,
    /// Hard cap on iterations for callers with deadlines; unbounded when `None`.
    pub max_iterations: Option<usize>,
}

impl<T: RealField + Copy> RiccatiConfig<T> {
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > T::zero()) || !(self.epsilon > T::zero()) {
            return Err(Error::Configuration(
                "riccati step size and tolerance must be positive",
            ));
        }
        if self.max_iterations == Some(0) {
            return Err(Error::Configuration("riccati iteration cap must be positive"));
        }
        Ok(())
    }
}

impl<T: RealField + Copy> Default for RiccatiConfig<T> {
    fn default() -> Self {
        RiccatiConfig {
            alpha: T::one(),
            epsilon: nalgebra::convert(1e-4),
            max_iterations: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Accept the step and keep iterating.
    Continue,
    /// Accept the step, it is below tolerance.
    Converged,
    /// Reject the step, it moved further than the one before.
    Diverged,
    /// Accept the step, no more are allowed.
    LimitReached,
}

/// Early-exit policy of the Riccati iteration.
///
/// A step whose delta grows compared to the previous accepted one (or is not
/// finite) is rejected and the iteration stops, keeping the last accepted P.
/// This is a heuristic, not a convergence proof.
#[derive(Debug, Clone)]
pub struct ConvergenceGuard<T> {
    epsilon: T,
    max_iterations: Option<usize>,
    previous: Option<T>,
    accepted: usize,
}

impl<T: RealField + Copy> ConvergenceGuard<T> {
    pub fn new(config: &RiccatiConfig<T>) -> ConvergenceGuard<T> {
        ConvergenceGuard {
            epsilon: config.epsilon,
            max_iterations: config.max_iterations,
            previous: None,
            accepted: 0,
        }
    }

    pub fn observe(&mut self, delta: T) -> Verdict {
        if !delta.is_finite() {
            return Verdict::Diverged;
        }
        if let Some(previous) = self.previous {
            if delta > previous {
                return Verdict::Diverged;
            }
        }
        self.previous = Some(delta);
        self.accepted += 1;

        if delta <= self.epsilon {
            Verdict::Converged
        } else if self.max_iterations.is_some_and(|max| self.accepted >= max) {
            Verdict::LimitReached
        } else {
            Verdict::Continue
        }
    }

    /// Number of steps accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted
    }
}
