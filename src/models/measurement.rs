use nalgebra::{RealField, SMatrix, SVector};

use crate::error::{Error, Result};
use crate::models::state::Cart3dQuat as States;
use crate::utils::linalg;

/// S : State Size, Z: Observation Size
pub trait SensorModel<T: RealField, const S: usize, const Z: usize> {
    /// Expected measurement for state `x`.
    fn predict(&self, x: &SVector<T, S>) -> SVector<T, Z>;

    /// Linearization of [`SensorModel::predict`] at `x`.
    fn jacobian(&self, x: &SVector<T, S>) -> SMatrix<T, Z, S>;

    /// Noise covariance used when a reading does not bring its own.
    fn noise(&self) -> &SMatrix<T, Z, Z>;
}

/// One sensor reading, consumed by a single measurement update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement<T: RealField, const Z: usize> {
    /// Observed vector
    pub z: SVector<T, Z>,
    /// Noise covariance of this reading
    pub r: SMatrix<T, Z, Z>,
}

impl<T: RealField + Copy, const Z: usize> Measurement<T, Z> {
    pub fn new(z: SVector<T, Z>, r: SMatrix<T, Z, Z>) -> Measurement<T, Z> {
        Measurement { z, r }
    }

    pub fn with_nominal_noise<const S: usize>(
        z: SVector<T, Z>,
        sensor: &impl SensorModel<T, S, Z>,
    ) -> Measurement<T, Z> {
        Measurement {
            z,
            r: *sensor.noise(),
        }
    }
}

/// Sensor reading `Z` state components directly, e.g. a position fix.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectObservation<T: RealField, const S: usize, const Z: usize> {
    offsets: [usize; Z],
    noise: SMatrix<T, Z, Z>,
}

impl<T: RealField + Copy, const S: usize, const Z: usize> DirectObservation<T, S, Z> {
    pub fn new(offsets: [usize; Z], noise: SMatrix<T, Z, Z>) -> Result<Self> {
        if offsets.iter().any(|offset| *offset >= S) {
            return Err(Error::Configuration("observed offset outside the state"));
        }
        if !linalg::is_symmetric(&noise, T::default_epsilon().sqrt())
            || !linalg::is_positive_definite(&noise)
        {
            return Err(Error::Configuration(
                "sensor noise must be symmetric positive definite",
            ));
        }
        Ok(DirectObservation { offsets, noise })
    }

    pub fn offsets(&self) -> &[usize; Z] {
        &self.offsets
    }
}

impl<T: RealField + Copy> DirectObservation<T, 13, 3> {
    /// Position fix `[x, y, z]`.
    pub fn position(noise: SMatrix<T, 3, 3>) -> Result<Self> {
        DirectObservation::new([States::X, States::Y, States::Z], noise)
    }
}

impl<T: RealField + Copy> DirectObservation<T, 13, 6> {
    /// GPS fix `[x, y, z, vx, vy, vz]`.
    pub fn gps(noise: SMatrix<T, 6, 6>) -> Result<Self> {
        DirectObservation::new(
            [
                States::X,
                States::Y,
                States::Z,
                States::VX,
                States::VY,
                States::VZ,
            ],
            noise,
        )
    }
}

impl<T: RealField + Copy, const S: usize, const Z: usize> SensorModel<T, S, Z>
    for DirectObservation<T, S, Z>
{
    fn predict(&self, x: &SVector<T, S>) -> SVector<T, Z> {
        SVector::from_fn(|row, _| x[self.offsets[row]])
    }

    fn jacobian(&self, _x: &SVector<T, S>) -> SMatrix<T, Z, S> {
        let mut h = SMatrix::zeros();
        for (row, offset) in self.offsets.iter().enumerate() {
            h[(row, *offset)] = T::one();
        }
        h
    }

    fn noise(&self) -> &SMatrix<T, Z, Z> {
        &self.noise
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Matrix6, Vector3, Vector6};

    #[test]
    fn gps_reads_position_and_velocity() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let gps = DirectObservation::<f64, 13, 6>::gps(Matrix6::identity())?;
        let x = SVector::<f64, 13>::from_fn(|i, _| i as f64);
        approx::assert_abs_diff_eq!(
            Vector6::new(0.0, 1.0, 2.0, 3.0, 4.0, 5.0),
            gps.predict(&x)
        );

        let h = gps.jacobian(&x);
        approx::assert_abs_diff_eq!(gps.predict(&x), h * x);
        Ok(())
    }

    #[test]
    fn nominal_noise_is_owned_per_instance() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let coarse = DirectObservation::<f64, 13, 3>::position(Matrix3::identity() * 4.0)?;
        let fine = DirectObservation::<f64, 13, 3>::position(Matrix3::identity() * 0.01)?;
        let z = Vector3::new(1.0, 2.0, 3.0);
        approx::assert_abs_diff_eq!(
            4.0,
            Measurement::with_nominal_noise(z, &coarse).r[(0, 0)]
        );
        approx::assert_abs_diff_eq!(
            0.01,
            Measurement::with_nominal_noise(z, &fine).r[(2, 2)]
        );
        Ok(())
    }

    #[test]
    fn rejects_bad_configuration() {
        assert_eq!(
            Err(Error::Configuration("observed offset outside the state")),
            DirectObservation::<f64, 4, 2>::new([1, 4], SMatrix::identity())
        );
        assert!(DirectObservation::<f64, 4, 2>::new([0, 1], SMatrix::zeros()).is_err());
    }
}
