use nalgebra::{RealField, SMatrix, SVector};

use crate::error::{Error, Result};
use crate::localization::{BayesianFilter, Filter};
use crate::models::measurement::{Measurement, SensorModel};
use crate::models::motion::MotionModel;
use crate::utils::linalg;
use crate::utils::state::GaussianState;

/// Extended Kalman filter operations.
///
/// Stateless: every call reads and writes only the [`Filter`] it is given, and
/// writes it only on success. A failed call leaves the prior estimate intact so
/// the caller can skip the step without ever seeing NaNs.
pub struct Ekf;

/// Residual of a measurement update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Innovation<T: RealField, const Z: usize> {
    /// y = z - h(x)
    pub residual: SVector<T, Z>,
    /// S = H * P * H^T + R
    pub covariance: SMatrix<T, Z, Z>,
    /// Normalized innovation squared, y^T * S^-1 * y
    pub nis: T,
}

impl Ekf {
    /// x = f(x, u, dt), P = F * P * F^T + Q(dt), with F evaluated before propagation.
    pub fn time_update<T, const S: usize, const U: usize>(
        filter: &mut Filter<T, S, U>,
        model: &impl MotionModel<T, S, U>,
        dt: T,
    ) -> Result<()>
    where
        T: RealField + Copy,
    {
        let f = model.jacobian(&filter.state, &filter.controls, dt);
        let state = model.propagate(&filter.state, &filter.controls, dt);
        let covariance =
            linalg::symmetrize(&(f * filter.covariance * f.transpose() + model.process_noise(dt)));

        if !linalg::is_finite(&state) || !linalg::is_finite(&covariance) {
            return Err(Error::NumericalFailure("time update is not finite"));
        }
        filter.state = state;
        filter.covariance = covariance;
        Ok(())
    }

    /// Fuses one measurement. The gain is obtained by a Cholesky solve against
    /// the innovation covariance and the covariance is updated in Joseph form,
    /// P = (I - K * H) * P * (I - K * H)^T + K * R * K^T.
    pub fn measurement_update<T, const S: usize, const Z: usize, const U: usize>(
        filter: &mut Filter<T, S, U>,
        measurement: Measurement<T, Z>,
        sensor: &impl SensorModel<T, S, Z>,
    ) -> Result<Innovation<T, Z>>
    where
        T: RealField + Copy,
    {
        let y = measurement.z - sensor.predict(&filter.state);
        let h = sensor.jacobian(&filter.state);
        let pht = filter.covariance * h.transpose();
        let s = linalg::symmetrize(&(h * pht + measurement.r));

        // K = P * H^T * S^-1, i.e. S * K^T = H * P since S and P are symmetric
        let s_factor = linalg::SpdFactor::new(&s)?;
        let k = s_factor.solve(&pht.transpose())?.transpose();
        let nis = y.dot(&s_factor.solve(&y)?);

        let state = filter.state + k * y;
        let i_kh = SMatrix::<T, S, S>::identity() - k * h;
        let covariance = linalg::symmetrize(
            &(i_kh * filter.covariance * i_kh.transpose() + k * measurement.r * k.transpose()),
        );

        if !linalg::is_finite(&state) || !linalg::is_finite(&covariance) {
            return Err(Error::NumericalFailure("measurement update is not finite"));
        }
        filter.state = state;
        filter.covariance = covariance;
        Ok(Innovation {
            residual: y,
            covariance: s,
            nis,
        })
    }
}

/// Estimation loop pairing a [`Filter`] with its motion and sensor model.
///
/// S : State Size, Z: Observation Size, U: Control Size
pub struct ExtendedKalmanFilter<T: RealField, M, O, const S: usize, const Z: usize, const U: usize>
{
    pub filter: Filter<T, S, U>,
    motion_model: M,
    sensor_model: O,
    skipped_updates: usize,
}

impl<T, M, O, const S: usize, const Z: usize, const U: usize> ExtendedKalmanFilter<T, M, O, S, Z, U>
where
    T: RealField + Copy,
    M: MotionModel<T, S, U>,
    O: SensorModel<T, S, Z>,
{
    pub fn new(
        initial_state: GaussianState<T, S>,
        motion_model: M,
        sensor_model: O,
    ) -> ExtendedKalmanFilter<T, M, O, S, Z, U> {
        ExtendedKalmanFilter {
            filter: Filter::from_gaussian(initial_state),
            motion_model,
            sensor_model,
            skipped_updates: 0,
        }
    }

    pub fn motion_model(&self) -> &M {
        &self.motion_model
    }

    pub fn sensor_model(&self) -> &O {
        &self.sensor_model
    }

    /// Measurement updates dropped because they could not be solved.
    pub fn skipped_updates(&self) -> usize {
        self.skipped_updates
    }
}

impl<T, M, O, const S: usize, const Z: usize, const U: usize> BayesianFilter<T, S, Z, U>
    for ExtendedKalmanFilter<T, M, O, S, Z, U>
where
    T: RealField + Copy,
    M: MotionModel<T, S, U>,
    O: SensorModel<T, S, Z>,
{
    /// A failed time update is returned to the caller; a failed measurement
    /// update is skipped and the predicted estimate kept.
    fn update_estimate(&mut self, u: &SVector<T, U>, z: &SVector<T, Z>, dt: T) -> Result<()> {
        self.filter.controls = *u;
        Ekf::time_update(&mut self.filter, &self.motion_model, dt)?;

        let measurement = Measurement::with_nominal_noise(*z, &self.sensor_model);
        if let Err(error) = Ekf::measurement_update(&mut self.filter, measurement, &self.sensor_model)
        {
            log::warn!("skipping measurement update: {error}");
            self.skipped_updates += 1;
        }
        Ok(())
    }

    fn gaussian_estimate(&self) -> GaussianState<T, S> {
        self.filter.gaussian_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::measurement::DirectObservation;
    use crate::models::motion::ConstantVelocities6D;
    use crate::models::state::Cart3dQuat as States;
    use nalgebra::{Matrix3, Matrix6, Vector1, Vector3, Vector6};
    use std::f64::consts::PI;

    type Filter13 = Filter<f64, 13, 1>;

    fn initialized() -> Filter13 {
        let mut filter = Filter13::new();
        States::initialize(&mut filter);
        filter
    }

    fn position_sensor() -> DirectObservation<f64, 13, 3> {
        DirectObservation::position(Matrix3::identity()).unwrap()
    }

    #[test]
    fn time_update_at_zero_dt_is_noop() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let model = ConstantVelocities6D::new(1.0, 1.0);
        let mut filter = Filter13::new();
        filter.covariance = SMatrix::from_fn(|r, c| if r == c { 2.0 } else { 0.1 });
        let prior = filter;

        Ekf::time_update(&mut filter, &model, 0.0)?;

        let f = model.jacobian(&prior.state, &prior.controls, 0.0);
        approx::assert_abs_diff_eq!(SVector::<f64, 13>::zeros(), filter.state);
        approx::assert_abs_diff_eq!(
            f * prior.covariance * f.transpose(),
            filter.covariance,
            epsilon = 1e-12
        );
        Ok(())
    }

    #[test]
    fn time_update_stand_still() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut filter = initialized();
        let reference = filter.state;
        Ekf::time_update(&mut filter, &ConstantVelocities6D::default(), 1.0)?;
        assert!((reference - filter.state).norm() < 1e-3);
        Ok(())
    }

    #[test]
    fn time_update_moving_positive_x() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut filter = initialized();
        filter.state[States::VX] = 1.0;
        let mut reference = filter.state;
        reference[States::X] = 1.0;

        Ekf::time_update(&mut filter, &ConstantVelocities6D::default(), 1.0)?;
        assert!((reference - filter.state).norm() < 1e-3);
        Ok(())
    }

    #[test]
    fn time_update_moving_negative_x() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut filter = initialized();
        filter.state[States::VX] = -1.0;
        let mut reference = filter.state;
        reference[States::X] = -1.0;

        Ekf::time_update(&mut filter, &ConstantVelocities6D::default(), 1.0)?;
        assert!((reference - filter.state).norm() < 1e-3);
        Ok(())
    }

    fn flipped_about_x(filter: &Filter13) -> SVector<f64, 13> {
        let mut reference = filter.state;
        reference[States::QW] = 0.0;
        reference[States::QX] = -1.0;
        reference
    }

    #[test]
    fn time_update_rotation_positive_x() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut filter = initialized();
        filter.state[States::WX] = 1.0;
        let reference = flipped_about_x(&filter);

        Ekf::time_update(&mut filter, &ConstantVelocities6D::default(), PI)?;
        assert!((reference - filter.state).norm() < 1e-7);
        Ok(())
    }

    #[test]
    fn time_update_repeated_rotation_positive_x(
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut filter = initialized();
        filter.state[States::WX] = 1.0;
        let reference = flipped_about_x(&filter);

        let model = ConstantVelocities6D::default();
        for _ in 0..100 {
            Ekf::time_update(&mut filter, &model, PI / 100.0)?;
        }
        assert!((reference - filter.state).norm() < 1e-5);
        Ok(())
    }

    #[test]
    fn measurement_update_halfway() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut filter = initialized();
        let mut reference = filter.state;
        reference[States::X] = 0.5;
        reference[States::Y] = 0.5;
        reference[States::Z] = 0.5;

        let measurement = Measurement::new(Vector3::new(1.0, 1.0, 1.0), Matrix3::identity());
        let innovation = Ekf::measurement_update(&mut filter, measurement, &position_sensor())?;

        assert!((reference - filter.state).norm() < 1e-5);
        approx::assert_abs_diff_eq!(Vector3::new(1.0, 1.0, 1.0), innovation.residual);
        approx::assert_abs_diff_eq!(Matrix3::identity() * 2.0, innovation.covariance);
        approx::assert_abs_diff_eq!(1.5, innovation.nis, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(0.5, filter.covariance[(States::X, States::X)], epsilon = 1e-12);
        approx::assert_abs_diff_eq!(1.0, filter.covariance[(States::VX, States::VX)], epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn measurement_update_correlated_noise() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let mut filter = initialized();
        filter.covariance[(States::X, States::Y)] = 0.3;
        filter.covariance[(States::Y, States::X)] = 0.3;
        filter.covariance[(States::X, States::VX)] = 0.2;
        filter.covariance[(States::VX, States::X)] = 0.2;
        let prior = filter;

        #[rustfmt::skip]
        let r = Matrix3::new(
            2.0, 0.5, 0.0,
            0.5, 1.0, 0.2,
            0.0, 0.2, 0.5,
        );
        let z = Vector3::new(1.0, -2.0, 0.5);
        let sensor = position_sensor();
        let innovation = Ekf::measurement_update(&mut filter, Measurement::new(z, r), &sensor)?;

        let h = sensor.jacobian(&prior.state);
        let s = h * prior.covariance * h.transpose() + r;
        let y = z - sensor.predict(&prior.state);
        approx::assert_abs_diff_eq!(s, innovation.covariance, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(y.dot(&linalg::solve(&s, &y)?), innovation.nis, epsilon = 1e-9);
        approx::assert_abs_diff_eq!(
            prior.state + prior.covariance * h.transpose() * linalg::solve(&s, &y)?,
            filter.state,
            epsilon = 1e-9
        );
        Ok(())
    }

    #[test]
    fn singular_innovation_keeps_prior() {
        let mut filter = Filter13::new();
        filter.state[States::X] = 3.0;
        let prior = filter;

        let measurement = Measurement::new(Vector3::new(1.0, 1.0, 1.0), Matrix3::zeros());
        let result = Ekf::measurement_update(&mut filter, measurement, &position_sensor());

        assert!(matches!(result, Err(Error::NumericalFailure(_))));
        assert_eq!(prior, filter);
    }

    #[test]
    fn covariance_stays_symmetric_positive() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let model = ConstantVelocities6D::new(0.1, 0.01);
        let gps = DirectObservation::gps(Matrix6::identity() * 1e-4)?;
        let mut filter = initialized();
        filter.covariance *= 1e3;
        filter.state[States::WZ] = 0.3;

        for i in 0..200 {
            Ekf::time_update(&mut filter, &model, 0.01)?;
            let t = i as f64 * 0.01;
            let z = Vector6::new(t, 0.0, 0.0, 1.0, 0.0, 0.0);
            Ekf::measurement_update(&mut filter, Measurement::with_nominal_noise(z, &gps), &gps)?;
            assert!(linalg::is_symmetric(&filter.covariance, 0.0));
            assert!(linalg::is_positive_semidefinite(&filter.covariance, 1e-9));
        }
        Ok(())
    }

    #[test]
    fn estimation_loop_tracks_constant_velocity(
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut initial = initialized();
        initial.covariance *= 10.0;
        let mut ekf: ExtendedKalmanFilter<f64, _, _, 13, 6, 1> = ExtendedKalmanFilter::new(
            initial.gaussian_state(),
            ConstantVelocities6D::new(0.01, 0.01),
            DirectObservation::gps(Matrix6::identity() * 0.01)?,
        );

        let dt = 0.1;
        let velocity = Vector3::new(1.0, -2.0, 0.5);
        for i in 1..=100 {
            let position = velocity * (i as f64 * dt);
            let z = Vector6::new(
                position.x, position.y, position.z, velocity.x, velocity.y, velocity.z,
            );
            ekf.update_estimate(&Vector1::zeros(), &z, dt)?;
        }

        let estimate = ekf.gaussian_estimate();
        approx::assert_abs_diff_eq!(
            velocity * 10.0,
            estimate.x.fixed_rows::<3>(States::POSITION).into_owned(),
            epsilon = 1e-2
        );
        approx::assert_abs_diff_eq!(
            velocity,
            estimate.x.fixed_rows::<3>(States::VELOCITY).into_owned(),
            epsilon = 1e-2
        );
        assert_eq!(0, ekf.skipped_updates());
        Ok(())
    }

    #[test]
    fn estimation_loop_skips_unusable_measurement(
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut initial = initialized();
        initial.state[States::VX] = 1.0;
        let mut ekf: ExtendedKalmanFilter<f64, _, _, 13, 6, 1> = ExtendedKalmanFilter::new(
            initial.gaussian_state(),
            ConstantVelocities6D::default(),
            DirectObservation::gps(Matrix6::identity())?,
        );

        let z = Vector6::new(f64::NAN, 0.0, 0.0, 0.0, 0.0, 0.0);
        ekf.update_estimate(&Vector1::zeros(), &z, 1.0)?;

        assert_eq!(1, ekf.skipped_updates());
        approx::assert_abs_diff_eq!(1.0, ekf.filter.state[States::X], epsilon = 1e-12);
        assert!(linalg::is_finite(&ekf.filter.covariance));
        Ok(())
    }
}
