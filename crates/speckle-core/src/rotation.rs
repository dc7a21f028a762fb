//! Extrinsic particle orientations.
//!
//! A [`Rotation`] wraps a unit quaternion. Rotating a particle by `R` is
//! equivalent to evaluating its body-frame form factor at $R^{-1}\mathbf{q}$,
//! which is what [`Rotation::to_body_frame`] computes.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::propagation::PropagationError;

/// Two rotations closer than this angle (rad) are treated as equal.
pub const SIMILARITY_TOLERANCE: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation(UnitQuaternion<f64>);

impl Rotation {
    pub fn identity() -> Self {
        Self(UnitQuaternion::identity())
    }

    /// Build from `[w, x, y, z]`; the quaternion is normalised.
    pub fn from_quaternion(q: [f64; 4]) -> Result<Self, PropagationError> {
        let norm = q.iter().map(|c| c * c).sum::<f64>().sqrt();
        if !(norm.is_finite() && norm > 0.0) {
            return Err(PropagationError::InvalidParameter(format!(
                "quaternion {q:?} cannot be normalised"
            )));
        }
        Ok(Self(UnitQuaternion::from_quaternion(Quaternion::new(
            q[0], q[1], q[2], q[3],
        ))))
    }

    /// Rotation by `angle` (rad) about `axis`.
    pub fn from_axis_angle(axis: [f64; 3], angle: f64) -> Result<Self, PropagationError> {
        let v = Vector3::new(axis[0], axis[1], axis[2]);
        let unit = nalgebra::Unit::try_new(v, f64::EPSILON).ok_or_else(|| {
            PropagationError::InvalidParameter(format!("rotation axis {axis:?} has zero length"))
        })?;
        Ok(Self(UnitQuaternion::from_axis_angle(&unit, angle)))
    }

    /// Uniformly distributed random rotation (Shoemake's method).
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let u1: f64 = rng.gen();
        let u2: f64 = rng.gen();
        let u3: f64 = rng.gen();
        let tau = 2.0 * std::f64::consts::PI;
        let a = (1.0 - u1).sqrt();
        let b = u1.sqrt();
        Self(UnitQuaternion::from_quaternion(Quaternion::new(
            b * (tau * u3).cos(),
            a * (tau * u2).sin(),
            a * (tau * u2).cos(),
            b * (tau * u3).sin(),
        )))
    }

    /// `[w, x, y, z]`
    pub fn as_quaternion(&self) -> [f64; 4] {
        let q = self.0.quaternion();
        [q.w, q.i, q.j, q.k]
    }

    pub fn rotate_vector(&self, v: [f64; 3]) -> [f64; 3] {
        let r = self.0 * Vector3::new(v[0], v[1], v[2]);
        [r.x, r.y, r.z]
    }

    /// Apply the inverse rotation: lab-frame vector to body frame.
    pub fn to_body_frame(&self, v: [f64; 3]) -> [f64; 3] {
        let r = self.0.inverse_transform_vector(&Vector3::new(v[0], v[1], v[2]));
        [r.x, r.y, r.z]
    }

    /// Angle (rad) of the rotation taking `self` to `other`.
    pub fn angle_to(&self, other: &Rotation) -> f64 {
        self.0.angle_to(&other.0)
    }

    pub fn is_similar(&self, other: &Rotation) -> bool {
        self.angle_to(other) < SIMILARITY_TOLERANCE
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self::identity()
    }
}

/// Similarity of optional rotations, `None` being the identity.
pub fn rotations_similar(a: Option<&Rotation>, b: Option<&Rotation>) -> bool {
    let a = a.copied().unwrap_or_default();
    let b = b.copied().unwrap_or_default();
    a.is_similar(&b)
}

impl Serialize for Rotation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_quaternion().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Rotation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let q = <[f64; 4]>::deserialize(deserializer)?;
        Rotation::from_quaternion(q).map_err(serde::de::Error::custom)
    }
}
