use nalgebra::{RealField, SMatrix, SVector};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::localization::Filter;

/// Maps state component names to offsets in a state vector.
#[derive(Debug, Clone)]
pub struct StateLayout {
    offsets: FxHashMap<&'static str, usize>,
    size: usize,
}

impl StateLayout {
    /// Assigns consecutive offsets in the order the names are given.
    pub fn new(names: &[&'static str]) -> StateLayout {
        let offsets = names
            .iter()
            .enumerate()
            .map(|(offset, name)| (*name, offset))
            .collect();
        StateLayout {
            offsets,
            size: names.len(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn offset(&self, name: &str) -> Option<usize> {
        self.offsets.get(name).copied()
    }

    pub fn get<T: RealField + Copy, const S: usize>(
        &self,
        state: &SVector<T, S>,
        name: &str,
    ) -> Result<T> {
        let offset = self.checked_offset::<S>(name)?;
        Ok(state[offset])
    }

    pub fn set<T: RealField + Copy, const S: usize>(
        &self,
        state: &mut SVector<T, S>,
        name: &str,
        value: T,
    ) -> Result<()> {
        let offset = self.checked_offset::<S>(name)?;
        state[offset] = value;
        Ok(())
    }

    fn checked_offset<const S: usize>(&self, name: &str) -> Result<usize> {
        if self.size != S {
            return Err(Error::Configuration("state vector does not match layout"));
        }
        self.offset(name)
            .ok_or(Error::Configuration("unknown state component"))
    }
}

/// Cartesian position and velocity, attitude quaternion and body rates.
///
/// `[x, y, z, vx, vy, vz, qw, qx, qy, qz, wx, wy, wz]`
pub struct Cart3dQuat;

impl Cart3dQuat {
    pub const NOF_STATES: usize = 13;

    pub const X: usize = 0;
    pub const Y: usize = 1;
    pub const Z: usize = 2;
    pub const VX: usize = 3;
    pub const VY: usize = 4;
    pub const VZ: usize = 5;
    pub const QW: usize = 6;
    pub const QX: usize = 7;
    pub const QY: usize = 8;
    pub const QZ: usize = 9;
    pub const WX: usize = 10;
    pub const WY: usize = 11;
    pub const WZ: usize = 12;

    pub const POSITION: usize = Self::X;
    pub const VELOCITY: usize = Self::VX;
    pub const ATTITUDE: usize = Self::QW;
    pub const ANGULAR_RATE: usize = Self::WX;

    pub fn layout() -> StateLayout {
        StateLayout::new(&[
            "x", "y", "z", "vx", "vy", "vz", "qw", "qx", "qy", "qz", "wx", "wy", "wz",
        ])
    }

    /// Identity attitude at the origin, at rest, with unit covariance.
    pub fn initialize<T: RealField + Copy, const U: usize>(filter: &mut Filter<T, 13, U>) {
        filter.state = SVector::zeros();
        filter.state[Self::QW] = T::one();
        filter.covariance = SMatrix::identity();
    }
}
