use nalgebra::{RealField, SMatrix, SVector};

/// Mean and covariance snapshot of an estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianState<T: RealField, const D: usize> {
    /// State Vector
    pub x: SVector<T, D>,
    /// Covariance Matrix
    pub cov: SMatrix<T, D, D>,
}

impl<T: RealField + Copy, const D: usize> GaussianState<T, D> {
    /// One-sigma bound of every state component.
    pub fn standard_deviations(&self) -> SVector<T, D> {
        self.cov.diagonal().map(|v| v.max(T::zero()).sqrt())
    }
}
