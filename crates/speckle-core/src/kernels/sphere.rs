//! Homogeneous sphere.
//!
//! $$ F(q) = \sqrt{|K|}\;\frac{3\,(\sin x - x\cos x)}{x^3}, \qquad x = qR, \quad K = (F_0 V \Delta n)^2 $$

use ndarray::{ArrayD, ArrayViewD, IxDyn};
use num_complex::Complex64;

use super::SolidAngle;
use crate::propagation::PropagationError;
use crate::qmap::{as_vectors, field_shape};

/// Normalised sphere form factor with $f(0) = 1$.
pub fn sphere_form_factor(x: f64) -> f64 {
    if x.abs() < 1e-3 {
        let x2 = x * x;
        1.0 - x2 / 10.0 + x2 * x2 / 280.0
    } else {
        3.0 * (x.sin() - x * x.cos()) / (x * x * x)
    }
}

/// Amplitude of a homogeneous sphere.
///
/// # Arguments
/// * `qmap` - Coordinate field `(..., 3)`; only $|\mathbf{q}|$ is used.
/// * `diameter` - Sphere diameter (m).
/// * `f0` - Incident amplitude at the particle.
/// * `dn` - Refractive-index decrement.
/// * `omega` - Solid angle per sample.
pub fn sphere_amplitude(
    qmap: &ArrayViewD<'_, f64>,
    diameter: f64,
    f0: f64,
    dn: Complex64,
    omega: &SolidAngle,
) -> Result<ArrayD<Complex64>, PropagationError> {
    let q = as_vectors(qmap)?;
    omega.check_len(q.nrows())?;
    let r = diameter / 2.0;
    let volume = 4.0 / 3.0 * std::f64::consts::PI * r.powi(3);
    let sqrt_k = (f0 * volume * dn).norm();

    let values: Vec<Complex64> = q
        .outer_iter()
        .enumerate()
        .map(|(i, v)| {
            let qn = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
            Complex64::new(sqrt_k * sphere_form_factor(qn * r) * omega.sqrt_at(i), 0.0)
        })
        .collect();
    Ok(ArrayD::from_shape_vec(IxDyn(&field_shape(qmap)), values)?)
}
