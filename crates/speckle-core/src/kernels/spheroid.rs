//! Homogeneous spheroid.
//!
//! The spheroid has equatorial semi-axis `a`, polar semi-axis `c` and its
//! symmetry axis along body-frame y. After rotation the axis points along
//! $\hat{n} = (-\sin\varphi\cos\theta,\ \cos\varphi\cos\theta,\ \sin\theta)$
//! and, evaluated on the detector plane ($q_z$ neglected),
//!
//! $$ H^2 = a^2 (q_x^2 + q_y^2) + (c^2 - a^2)\cos^2\theta\,(q_y\cos\varphi - q_x\sin\varphi)^2 $$
//!
//! with amplitude $\sqrt{|K|}\; 3(\sin H - H\cos H)/H^3$.

use ndarray::{ArrayD, ArrayViewD, IxDyn};
use num_complex::Complex64;
use speckle_geometry::primitives::spheroid_semi_axes;

use super::sphere::sphere_form_factor;
use super::SolidAngle;
use crate::propagation::PropagationError;
use crate::qmap::{as_vectors, field_shape};
use crate::rotation::Rotation;

/// Tilt angles `(θ, φ)` of the rotated symmetry axis.
pub fn spheroid_tilt(rotation: Option<&Rotation>) -> (f64, f64) {
    let axis = rotation
        .map(|r| r.rotate_vector([0.0, 1.0, 0.0]))
        .unwrap_or([0.0, 1.0, 0.0]);
    let theta = axis[2].clamp(-1.0, 1.0).asin();
    let phi = (-axis[0]).atan2(axis[1]);
    (theta, phi)
}

/// Normalised spheroid form factor at detector-plane components `(qx, qy)`.
pub fn spheroid_form_factor(qx: f64, qy: f64, a: f64, c: f64, theta: f64, phi: f64) -> f64 {
    let along = theta.cos() * (qy * phi.cos() - qx * phi.sin());
    let h2 = a * a * (qx * qx + qy * qy) + (c * c - a * a) * along * along;
    sphere_form_factor(h2.max(0.0).sqrt())
}

/// Amplitude of a homogeneous spheroid on a 2-D xyz coordinate field.
pub fn spheroid_amplitude(
    qmap: &ArrayViewD<'_, f64>,
    diameter: f64,
    flattening: f64,
    rotation: Option<&Rotation>,
    f0: f64,
    dn: Complex64,
    omega: &SolidAngle,
) -> Result<ArrayD<Complex64>, PropagationError> {
    let q = as_vectors(qmap)?;
    omega.check_len(q.nrows())?;
    let (a, c) = spheroid_semi_axes(diameter, flattening);
    let (theta, phi) = spheroid_tilt(rotation);
    let volume = std::f64::consts::PI / 6.0 * diameter.powi(3);
    let sqrt_k = f0 * volume * dn.norm();

    let values: Vec<Complex64> = q
        .outer_iter()
        .enumerate()
        .map(|(i, v)| {
            let f = spheroid_form_factor(v[0], v[1], a, c, theta, phi);
            Complex64::new(sqrt_k * f * omega.sqrt_at(i), 0.0)
        })
        .collect();
    Ok(ArrayD::from_shape_vec(IxDyn(&field_shape(qmap)), values)?)
}
