//! Per-shape diffraction kernels.
//!
//! Each kernel maps particle parameters, a coordinate field and the incident
//! amplitude $F_0 = \sqrt{I_0}\,2\pi/\lambda^2$ to a complex amplitude field
//! with the shape of the coordinate field minus its trailing vector axis.
//!
//! | Model | Kernel | Coordinate field |
//! |-------|--------|------------------|
//! | Sphere | [`sphere`] | unrotated, xyz |
//! | Spheroid | [`spheroid`] | unrotated, xyz, 2-D only |
//! | Map | [`map`] via [`crate::nfft`] | body frame, zyx |
//! | Atoms | [`atoms`] (external simulator) | produced by the simulator |

pub mod atoms;
pub mod map;
pub mod sphere;
pub mod spheroid;

use ndarray::{Array2, ArrayD, ArrayViewD};
use num_complex::Complex64;

use crate::propagation::PropagationError;
use crate::qmap::as_vectors;

/// Below this offset (m) per axis a particle counts as centred.
pub const POSITION_TOLERANCE: f64 = 1e-12;

/// Solid angle per output sample used to scale amplitudes.
#[derive(Debug, Clone)]
pub enum SolidAngle {
    /// Same value everywhere, $p^2/D^2$.
    Uniform(f64),
    /// One value per pixel in row-major order.
    PerPixel(Vec<f64>),
}

impl SolidAngle {
    pub fn per_pixel(omega: &Array2<f64>) -> Self {
        SolidAngle::PerPixel(omega.iter().copied().collect())
    }

    pub(crate) fn check_len(&self, n: usize) -> Result<(), PropagationError> {
        match self {
            SolidAngle::PerPixel(v) if v.len() != n => Err(PropagationError::InvalidParameter(
                format!("{} solid angles for {n} samples", v.len()),
            )),
            _ => Ok(()),
        }
    }

    #[inline]
    pub(crate) fn sqrt_at(&self, i: usize) -> f64 {
        match self {
            SolidAngle::Uniform(omega) => omega.sqrt(),
            SolidAngle::PerPixel(v) => v[i].sqrt(),
        }
    }
}

/// Incident amplitude $F_0 = \sqrt{I_0}\,2\pi/\lambda^2$ for a fluence `I_0` (photons/m²).
pub fn primary_amplitude(fluence: f64, wavelength: f64) -> f64 {
    fluence.sqrt() * 2.0 * std::f64::consts::PI / (wavelength * wavelength)
}

pub fn is_off_centre(position: &[f64; 3]) -> bool {
    position.iter().any(|v| v.abs() > POSITION_TOLERANCE)
}

/// Multiply `field` by $\exp(-i\,\mathbf{v}\cdot\mathbf{q})$ using the unrotated
/// xyz coordinate field `qmap0`.
pub fn apply_phase_shift(
    field: &mut ArrayD<Complex64>,
    position: [f64; 3],
    qmap0: &ArrayViewD<'_, f64>,
) -> Result<(), PropagationError> {
    let q = as_vectors(qmap0)?;
    if q.nrows() != field.len() {
        return Err(PropagationError::InvalidParameter(format!(
            "phase shift: {} scattering vectors for {} samples",
            q.nrows(),
            field.len()
        )));
    }
    for (f, row) in field.iter_mut().zip(q.outer_iter()) {
        let phase = position[0] * row[0] + position[1] * row[1] + position[2] * row[2];
        *f *= Complex64::from_polar(1.0, -phase);
    }
    Ok(())
}
