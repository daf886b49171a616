use nalgebra::{Const, DimMin, RealField, SMatrix, SVector};

use crate::control::riccati::{ConvergenceGuard, RiccatiConfig, Verdict};
use crate::error::{Error, Result};
use crate::utils::linalg;

/// Plant that can produce its own linearization for a sampling period.
pub trait LinearModel<T: RealField, const S: usize, const U: usize> {
    fn a(&self, dt: T) -> SMatrix<T, S, S>;
    fn b(&self, dt: T) -> SMatrix<T, S, U>;
}

/// Riccati iteration used to derive the feedback gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiccatiForm {
    /// P += alpha * (A^T * P + P * A - P * B * R^-1 * B^T * P + Q)^-1 * P
    ///
    /// L = R^-1 * B^T * P
    Incremental,
    /// P = Q + A^T * P * A - A^T * P * B * (R + B^T * P * B)^-1 * B^T * P * A
    ///
    /// L = (R + B^T * P * B)^-1 * B^T * P * A
    Recursive,
}

impl From<bool> for RiccatiForm {
    /// `is_discrete` selects the incremental form, its absence the recursive one.
    fn from(is_discrete: bool) -> Self {
        if is_discrete {
            RiccatiForm::Incremental
        } else {
            RiccatiForm::Recursive
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiccatiStatus {
    /// No model installed yet, the gain is zero.
    Unconfigured,
    Converged { iterations: usize },
    /// A step moved P further than the previous one; the last accepted P is kept.
    StoppedEarly { iterations: usize },
    IterationLimit { iterations: usize },
}

/// Linear-quadratic regulator: S : State Size, U: Control Size
///
/// Holds the linearized plant (A, B), the costs (Q, R), the Riccati solution P
/// and the feedback gain L. The gain is only rederived by
/// [`LqController::update_model`]; computing a control signal never iterates.
#[derive(Debug, Clone)]
pub struct LqController<T: RealField, const S: usize, const U: usize> {
    a: SMatrix<T, S, S>,
    b: SMatrix<T, S, U>,
    q: SMatrix<T, S, S>,
    r: SMatrix<T, U, U>,
    p: SMatrix<T, S, S>,
    l: SMatrix<T, U, S>,
    u: SVector<T, U>,
    config: RiccatiConfig<T>,
    status: RiccatiStatus,
}

impl<T: RealField + Copy, const S: usize, const U: usize> LqController<T, S, U> {
    pub fn new(q: SMatrix<T, S, S>, r: SMatrix<T, U, U>) -> Result<LqController<T, S, U>> {
        LqController::with_config(q, r, RiccatiConfig::default())
    }

    pub fn with_config(
        q: SMatrix<T, S, S>,
        r: SMatrix<T, U, U>,
        config: RiccatiConfig<T>,
    ) -> Result<LqController<T, S, U>> {
        config.validate()?;
        validate_costs(&q, &r)?;
        Ok(LqController {
            a: SMatrix::zeros(),
            b: SMatrix::zeros(),
            q,
            r,
            p: q,
            l: SMatrix::zeros(),
            u: SVector::zeros(),
            config,
            status: RiccatiStatus::Unconfigured,
        })
    }

    /// Installs new costs and reseeds P with Q. The gain is kept until the
    /// next model update.
    pub fn set_costs(&mut self, q: SMatrix<T, S, S>, r: SMatrix<T, U, U>) -> Result<()> {
        validate_costs(&q, &r)?;
        self.q = q;
        self.r = r;
        self.reset_riccati();
        Ok(())
    }

    /// P = Q
    pub fn reset_riccati(&mut self) {
        self.p = self.q;
    }

    /// u = -L * x
    pub fn control_signal(&mut self, x: &SVector<T, S>) -> SVector<T, U> {
        self.u = -(self.l * x);
        self.u
    }

    /// u = -L * (x - reference)
    pub fn control_signal_to(
        &mut self,
        x: &SVector<T, S>,
        reference: &SVector<T, S>,
    ) -> SVector<T, U> {
        self.control_signal(&(x - reference))
    }

    /// Control computed by the last call to one of the `control_signal` methods.
    pub fn last_control(&self) -> &SVector<T, U> {
        &self.u
    }

    pub fn a(&self) -> &SMatrix<T, S, S> {
        &self.a
    }

    pub fn b(&self) -> &SMatrix<T, S, U> {
        &self.b
    }

    pub fn q(&self) -> &SMatrix<T, S, S> {
        &self.q
    }

    pub fn r(&self) -> &SMatrix<T, U, U> {
        &self.r
    }

    /// Current Riccati solution P.
    pub fn riccati_solution(&self) -> &SMatrix<T, S, S> {
        &self.p
    }

    /// Feedback gain L.
    pub fn gain(&self) -> &SMatrix<T, U, S> {
        &self.l
    }

    pub fn status(&self) -> RiccatiStatus {
        self.status
    }

    pub fn config(&self) -> &RiccatiConfig<T> {
        &self.config
    }

    /// Runs a Riccati iteration from the current P until the guard stops it.
    fn iterate(
        &self,
        mut step: impl FnMut(&SMatrix<T, S, S>) -> Result<SMatrix<T, S, S>>,
    ) -> Result<(SMatrix<T, S, S>, RiccatiStatus)> {
        let mut guard = ConvergenceGuard::new(&self.config);
        let mut p = self.p;
        loop {
            let next = step(&p)?;
            match guard.observe(linalg::max_squared_delta(&next, &p)) {
                Verdict::Continue => p = next,
                Verdict::Converged => {
                    let iterations = guard.accepted();
                    return Ok((next, RiccatiStatus::Converged { iterations }));
                }
                Verdict::Diverged => {
                    let iterations = guard.accepted();
                    log::warn!("riccati iteration diverging after {iterations} steps, keeping last P");
                    return Ok((p, RiccatiStatus::StoppedEarly { iterations }));
                }
                Verdict::LimitReached => {
                    let iterations = guard.accepted();
                    log::warn!("riccati iteration cap of {iterations} steps reached");
                    return Ok((next, RiccatiStatus::IterationLimit { iterations }));
                }
            }
        }
    }
}

impl<T: RealField + Copy, const S: usize, const U: usize> LqController<T, S, U>
where
    Const<S>: DimMin<Const<S>, Output = Const<S>>,
    Const<U>: DimMin<Const<U>, Output = Const<U>>,
{
    /// Installs a new linearization and rederives the gain with the selected
    /// Riccati form, starting from the current P.
    ///
    /// Nothing is committed when a linear system along the way cannot be
    /// solved. Divergence is not an error: the last accepted P is used and the
    /// returned status says so.
    pub fn update_model(
        &mut self,
        a: SMatrix<T, S, S>,
        b: SMatrix<T, S, U>,
        form: impl Into<RiccatiForm>,
    ) -> Result<RiccatiStatus> {
        if !linalg::is_finite(&a) || !linalg::is_finite(&b) {
            return Err(Error::Configuration("plant matrices are not finite"));
        }
        let form = form.into();
        log::trace!("A = {a}");
        log::trace!("B = {b}");

        let (p, l, status) = match form {
            RiccatiForm::Incremental => self.solve_incremental(&a, &b)?,
            RiccatiForm::Recursive => self.solve_recursive(&a, &b)?,
        };
        if !linalg::is_finite(&l) {
            return Err(Error::NumericalFailure("feedback gain is not finite"));
        }

        log::debug!("{form:?} riccati solve finished: {status:?}");
        log::trace!("L = {l}");
        self.a = a;
        self.b = b;
        self.p = p;
        self.l = l;
        self.status = status;
        Ok(status)
    }

    pub fn update_from_linear_model(
        &mut self,
        model: &impl LinearModel<T, S, U>,
        dt: T,
        form: impl Into<RiccatiForm>,
    ) -> Result<RiccatiStatus> {
        self.update_model(model.a(dt), model.b(dt), form)
    }

    fn solve_incremental(
        &self,
        a: &SMatrix<T, S, S>,
        b: &SMatrix<T, S, U>,
    ) -> Result<(SMatrix<T, S, S>, SMatrix<T, U, S>, RiccatiStatus)> {
        // B * R^-1 * B^T
        let brb = b * linalg::solve_spd(&self.r, &b.transpose())?;
        let (p, status) = self.iterate(|p| {
            let residual = a.transpose() * p + p * a - p * brb * p + self.q;
            Ok(p + linalg::solve(&residual, p)? * self.config.alpha)
        })?;

        let l = linalg::solve_spd(&self.r, &(b.transpose() * p))?;
        Ok((p, l, status))
    }

    /// `R + B^T * P * B` is only required to be non-singular: P carried over
    /// from the incremental form may be indefinite.
    fn solve_recursive(
        &self,
        a: &SMatrix<T, S, S>,
        b: &SMatrix<T, S, U>,
    ) -> Result<(SMatrix<T, S, S>, SMatrix<T, U, S>, RiccatiStatus)> {
        let (p, status) = self.iterate(|p| {
            let bt_p = b.transpose() * p;
            // (R + B^T * P * B)^-1 * B^T * P
            let k = linalg::solve(&(self.r + bt_p * b), &bt_p)?;
            Ok(linalg::symmetrize(
                &(self.q + a.transpose() * (p - p * b * k) * a),
            ))
        })?;

        let bt_p = b.transpose() * p;
        let l = linalg::solve(&(self.r + bt_p * b), &(bt_p * a))?;
        Ok((p, l, status))
    }
}

impl<T: RealField + Copy, const S: usize, const U: usize> Default for LqController<T, S, U> {
    /// Identity costs, unconfigured.
    fn default() -> Self {
        let q = SMatrix::identity();
        LqController {
            a: SMatrix::zeros(),
            b: SMatrix::zeros(),
            q,
            r: SMatrix::identity(),
            p: q,
            l: SMatrix::zeros(),
            u: SVector::zeros(),
            config: RiccatiConfig::default(),
            status: RiccatiStatus::Unconfigured,
        }
    }
}

fn validate_costs<T: RealField + Copy, const S: usize, const U: usize>(
    q: &SMatrix<T, S, S>,
    r: &SMatrix<T, U, U>,
) -> Result<()> {
    if !linalg::is_finite(q) || !linalg::is_finite(r) {
        return Err(Error::Configuration("cost matrices are not finite"));
    }
    let tolerance = T::default_epsilon().sqrt();
    if !linalg::is_symmetric(q, tolerance * q.abs().max().max(T::one()))
        || !linalg::is_positive_semidefinite(q, tolerance)
    {
        return Err(Error::Configuration(
            "state cost Q must be symmetric positive semi-definite",
        ));
    }
    if !linalg::is_symmetric(r, tolerance * r.abs().max().max(T::one()))
        || !linalg::is_positive_definite(r)
    {
        return Err(Error::Configuration(
            "control cost R must be symmetric positive definite",
        ));
    }
    Ok(())
}
