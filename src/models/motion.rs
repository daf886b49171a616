use nalgebra::{Matrix3, Matrix4, Matrix4x3, Quaternion, RealField, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::models::state::Cart3dQuat as States;

/// S : State Size, U: Control Size
pub trait MotionModel<T: RealField, const S: usize, const U: usize> {
    /// Deterministic state transition over `dt`.
    fn propagate(&self, x: &SVector<T, S>, u: &SVector<T, U>, dt: T) -> SVector<T, S>;

    /// Linearization of [`MotionModel::propagate`] at `(x, u, dt)`.
    fn jacobian(&self, x: &SVector<T, S>, u: &SVector<T, U>, dt: T) -> SMatrix<T, S, S>;

    /// Additive process noise accumulated over `dt`.
    fn process_noise(&self, _dt: T) -> SMatrix<T, S, S> {
        SMatrix::zeros()
    }
}

/// motion model
///
/// p_{t+1} = p_t + v_t * dt
///
/// v_{t+1} = v_t
///
/// q_{t+1} = q_t ⊗ exp(-w_t * dt / 2)
///
/// w_{t+1} = w_t
///
/// The attitude increment is the closed-form exponential of a constant body
/// rate, so the result does not depend on how an interval is split into steps.
/// Controls are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstantVelocities6D<T> {
    /// Spectral density of the white acceleration driving the velocities.
    pub acceleration_density: T,
    /// Spectral density of the white angular acceleration driving the rates.
    pub angular_acceleration_density: T,
}

impl<T: RealField + Copy> ConstantVelocities6D<T> {
    pub fn new(acceleration_density: T, angular_acceleration_density: T) -> Self {
        ConstantVelocities6D {
            acceleration_density,
            angular_acceleration_density,
        }
    }
}

/// `sin(n * dt / 2) / n` and `g'(n) / n` for the rate magnitude `n`, with
/// series expansions near zero where the closed forms cancel badly.
fn rate_coefficients<T: RealField + Copy>(n: T, dt: T) -> (T, T) {
    let a = dt * nalgebra::convert::<f64, T>(0.5);
    let x = a * n;
    let three = nalgebra::convert::<f64, T>(3.0);
    if x.abs() < nalgebra::convert::<f64, T>(1e-3) {
        let x2 = x * x;
        let g = a * (T::one() - x2 / nalgebra::convert::<f64, T>(6.0));
        let h = -a * a * a / three * (T::one() - x2 / nalgebra::convert::<f64, T>(10.0));
        (g, h)
    } else {
        let g = x.sin() / n;
        let h = (x * x.cos() - x.sin()) / (n * n * n);
        (g, h)
    }
}

fn attitude<T: RealField + Copy>(x: &SVector<T, 13>) -> Quaternion<T> {
    Quaternion::new(x[States::QW], x[States::QX], x[States::QY], x[States::QZ])
}

fn body_rate<T: RealField + Copy>(x: &SVector<T, 13>) -> Vector3<T> {
    Vector3::new(x[States::WX], x[States::WY], x[States::WZ])
}

/// Attitude increment `exp(-w * dt / 2)`.
fn rate_increment<T: RealField + Copy>(w: &Vector3<T>, dt: T) -> Quaternion<T> {
    let n = w.norm();
    let (g, _) = rate_coefficients(n, dt);
    let v = w * -g;
    Quaternion::new((n * dt * nalgebra::convert::<f64, T>(0.5)).cos(), v.x, v.y, v.z)
}

/// `q ⊗ p = left(q) * p`, components ordered `[w, x, y, z]`.
#[allow(clippy::deprecated_cfg_attr)]
fn left_product<T: RealField + Copy>(q: &Quaternion<T>) -> Matrix4<T> {
    #[cfg_attr(rustfmt, rustfmt_skip)]
    Matrix4::new(
        q.w, -q.i, -q.j, -q.k,
        q.i,  q.w, -q.k,  q.j,
        q.j,  q.k,  q.w, -q.i,
        q.k, -q.j,  q.i,  q.w,
    )
}

/// `q ⊗ p = right(p) * q`, components ordered `[w, x, y, z]`.
#[allow(clippy::deprecated_cfg_attr)]
fn right_product<T: RealField + Copy>(p: &Quaternion<T>) -> Matrix4<T> {
    #[cfg_attr(rustfmt, rustfmt_skip)]
    Matrix4::new(
        p.w, -p.i, -p.j, -p.k,
        p.i,  p.w,  p.k, -p.j,
        p.j, -p.k,  p.w,  p.i,
        p.k,  p.j, -p.i,  p.w,
    )
}

impl<T: RealField + Copy, const U: usize> MotionModel<T, 13, U> for ConstantVelocities6D<T> {
    fn propagate(&self, x: &SVector<T, 13>, _u: &SVector<T, U>, dt: T) -> SVector<T, 13> {
        let mut out = *x;
        for i in 0..3 {
            out[States::POSITION + i] += x[States::VELOCITY + i] * dt;
        }

        let q = attitude(x) * rate_increment(&body_rate(x), dt);
        out[States::QW] = q.w;
        out[States::QX] = q.i;
        out[States::QY] = q.j;
        out[States::QZ] = q.k;
        out
    }

    fn jacobian(&self, x: &SVector<T, 13>, _u: &SVector<T, U>, dt: T) -> SMatrix<T, 13, 13> {
        let mut f = SMatrix::<T, 13, 13>::identity();
        for i in 0..3 {
            f[(States::POSITION + i, States::VELOCITY + i)] = dt;
        }

        let q = attitude(x);
        let w = body_rate(x);
        let dq = rate_increment(&w, dt);
        let (g, h) = rate_coefficients(w.norm(), dt);
        let a: T = dt * nalgebra::convert::<f64, T>(0.5);

        // d(dq)/dw, rows [w, x, y, z]
        let mut ddq = Matrix4x3::<T>::zeros();
        ddq.fixed_view_mut::<1, 3>(0, 0)
            .copy_from(&(w.transpose() * (-a * g)));
        ddq.fixed_view_mut::<3, 3>(1, 0)
            .copy_from(&(Matrix3::identity() * -g - w * w.transpose() * h));

        f.fixed_view_mut::<4, 4>(States::ATTITUDE, States::ATTITUDE)
            .copy_from(&right_product(&dq));
        f.fixed_view_mut::<4, 3>(States::ATTITUDE, States::ANGULAR_RATE)
            .copy_from(&(left_product(&q) * ddq));
        f
    }

    /// White-noise acceleration on each translational axis and white-noise
    /// angular acceleration on each rate.
    fn process_noise(&self, dt: T) -> SMatrix<T, 13, 13> {
        let mut noise = SMatrix::<T, 13, 13>::zeros();
        let qa = self.acceleration_density;
        let dt2 = dt * dt;
        let dt3 = dt2 * dt;
        for i in 0..3 {
            let p = States::POSITION + i;
            let v = States::VELOCITY + i;
            noise[(p, p)] = qa * dt3 / nalgebra::convert::<f64, T>(3.0);
            noise[(p, v)] = qa * dt2 / nalgebra::convert::<f64, T>(2.0);
            noise[(v, p)] = noise[(p, v)];
            noise[(v, v)] = qa * dt;
            let r = States::ANGULAR_RATE + i;
            noise[(r, r)] = self.angular_acceleration_density * dt;
        }
        noise
    }
}
