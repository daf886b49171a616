//! Fixed-dimension linear algebra shared by the estimator and the controller.
//!
//! Every system is solved through a decomposition (Householder QR for general
//! square systems, Cholesky for symmetric positive-definite ones); explicit
//! inverses are never formed.

use nalgebra::{Cholesky, Const, DimMin, RealField, SMatrix};

use crate::error::{Error, Result};

/// Solves `a * x = b` for a general square `a`.
pub fn solve<T: RealField + Copy, const N: usize, const C: usize>(
    a: &SMatrix<T, N, N>,
    b: &SMatrix<T, N, C>,
) -> Result<SMatrix<T, N, C>>
where
    Const<N>: DimMin<Const<N>, Output = Const<N>>,
{
    let qr = (*a).qr();
    let diagonal = qr.r().diagonal().abs();
    if diagonal.min() <= T::default_epsilon() * nalgebra::convert(N as f64) * diagonal.max() {
        return Err(Error::NumericalFailure("singular linear system"));
    }
    let Some(x) = qr.solve(b) else {
        return Err(Error::NumericalFailure("singular linear system"));
    };
    check_solution(a, b, &x)?;
    Ok(x)
}

/// Cholesky factor of a symmetric positive-definite matrix, reusable across
/// right-hand sides.
pub struct SpdFactor<T: RealField, const N: usize> {
    a: SMatrix<T, N, N>,
    cholesky: Cholesky<T, Const<N>>,
}

impl<T: RealField + Copy, const N: usize> SpdFactor<T, N> {
    pub fn new(a: &SMatrix<T, N, N>) -> Result<SpdFactor<T, N>> {
        let Some(cholesky) = Cholesky::new(*a) else {
            return Err(Error::NumericalFailure("matrix is not positive definite"));
        };
        Ok(SpdFactor { a: *a, cholesky })
    }

    /// Solves `a * x = b` with the stored factor.
    pub fn solve<const C: usize>(&self, b: &SMatrix<T, N, C>) -> Result<SMatrix<T, N, C>> {
        let x = self.cholesky.solve(b);
        check_solution(&self.a, b, &x)?;
        Ok(x)
    }
}

/// Solves `a * x = b` for a symmetric positive-definite `a`.
pub fn solve_spd<T: RealField + Copy, const N: usize, const C: usize>(
    a: &SMatrix<T, N, N>,
    b: &SMatrix<T, N, C>,
) -> Result<SMatrix<T, N, C>> {
    SpdFactor::new(a)?.solve(b)
}

/// Rejects solutions that are not finite or whose residual exceeds the
/// relative tolerance `sqrt(eps)`.
fn check_solution<T: RealField + Copy, const N: usize, const C: usize>(
    a: &SMatrix<T, N, N>,
    b: &SMatrix<T, N, C>,
    x: &SMatrix<T, N, C>,
) -> Result<()> {
    if !is_finite(x) {
        return Err(Error::NumericalFailure("solution is not finite"));
    }
    let residual = (a * x - b).abs().max();
    let scale = a.abs().max() * x.abs().max() + b.abs().max();
    if residual > T::default_epsilon().sqrt() * scale.max(T::one()) {
        return Err(Error::NumericalFailure("residual above tolerance"));
    }
    Ok(())
}

/// `(m + mᵀ) / 2`
pub fn symmetrize<T: RealField + Copy, const N: usize>(m: &SMatrix<T, N, N>) -> SMatrix<T, N, N> {
    (m + m.transpose()) * nalgebra::convert::<f64, T>(0.5)
}

/// Largest squared entrywise difference between two matrices.
pub fn max_squared_delta<T: RealField + Copy, const R: usize, const C: usize>(
    a: &SMatrix<T, R, C>,
    b: &SMatrix<T, R, C>,
) -> T {
    (a - b).map(|d| d * d).max()
}

pub fn is_finite<T: RealField + Copy, const R: usize, const C: usize>(m: &SMatrix<T, R, C>) -> bool {
    m.iter().all(|v| v.is_finite())
}

pub fn is_symmetric<T: RealField + Copy, const N: usize>(m: &SMatrix<T, N, N>, tolerance: T) -> bool {
    (m - m.transpose()).abs().max() <= tolerance
}

pub fn is_positive_definite<T: RealField + Copy, const N: usize>(m: &SMatrix<T, N, N>) -> bool {
    Cholesky::new(*m).is_some()
}

/// Accepts singular matrices whose smallest eigenvalue is above `-tolerance`
/// (relative to the largest entry) by factorising a slightly shifted copy.
pub fn is_positive_semidefinite<T: RealField + Copy, const N: usize>(
    m: &SMatrix<T, N, N>,
    tolerance: T,
) -> bool {
    let shift = tolerance * m.abs().max().max(T::one());
    Cholesky::new(m + SMatrix::<T, N, N>::identity() * shift).is_some()
}
