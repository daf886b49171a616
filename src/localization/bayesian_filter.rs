use nalgebra::{RealField, SVector};

use crate::error::Result;
use crate::utils::state::GaussianState;

/// One recursive estimation loop: S : State Size, Z: Observation Size, U: Control Size
pub trait BayesianFilter<T: RealField, const S: usize, const Z: usize, const U: usize> {
    /// Applies control `u` over `dt` and fuses observation `z`.
    fn update_estimate(&mut self, u: &SVector<T, U>, z: &SVector<T, Z>, dt: T) -> Result<()>;

    fn gaussian_estimate(&self) -> GaussianState<T, S>;
}
