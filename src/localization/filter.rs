use nalgebra::{RealField, SMatrix, SVector};

use crate::utils::state::GaussianState;

/// Running estimate of one vehicle or subsystem.
///
/// S : State Size, U: Control Size
///
/// Created zero-initialised and mutated in place by [`crate::localization::Ekf`].
/// `controls` holds the last commanded control so that motion models depending
/// on control history can read it during the time update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Filter<T: RealField, const S: usize, const U: usize> {
    pub state: SVector<T, S>,
    pub covariance: SMatrix<T, S, S>,
    pub controls: SVector<T, U>,
}

impl<T: RealField + Copy, const S: usize, const U: usize> Filter<T, S, U> {
    pub fn new() -> Filter<T, S, U> {
        Filter {
            state: SVector::zeros(),
            covariance: SMatrix::zeros(),
            controls: SVector::zeros(),
        }
    }

    pub fn from_gaussian(estimate: GaussianState<T, S>) -> Filter<T, S, U> {
        Filter {
            state: estimate.x,
            covariance: estimate.cov,
            controls: SVector::zeros(),
        }
    }

    pub fn gaussian_state(&self) -> GaussianState<T, S> {
        GaussianState {
            x: self.state,
            cov: self.covariance,
        }
    }
}

impl<T: RealField + Copy, const S: usize, const U: usize> Default for Filter<T, S, U> {
    fn default() -> Self {
        Filter::new()
    }
}
