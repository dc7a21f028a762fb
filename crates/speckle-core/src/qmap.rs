//! Reciprocal-space coordinate generation.
//!
//! For a pixel at $\mathbf{p} = (x, y, D)$ relative to the interaction point
//! the elastic scattering vector is
//!
//! $$ \mathbf{q} = \mathbf{k}_{out} - \mathbf{k}_{in} = \frac{2\pi}{\lambda}\left(\frac{x}{l}, \frac{y}{l}, \frac{D}{l} - 1\right), \qquad l = |\mathbf{p}| $$
//!
//! The longitudinal component is evaluated as $-(x^2+y^2)/(l(D+l))$, which
//! is algebraically identical but free of cancellation near the beam axis.

use ndarray::{Array2, Array3, Array4, ArrayViewD, Axis, CowArray, Ix2};

use crate::propagation::PropagationError;
use crate::rotation::Rotation;
use crate::types::{AxisOrder, DetectorState, Polarization};

/// Safety factor applied to the real-space sampling so that the largest
/// scaled frequency stays strictly inside `[-0.5, 0.5)`.
const SAMPLING_MARGIN: f64 = 0.999;

/// Wavenumber $k = 2\pi/\lambda$.
pub fn wavenumber(wavelength: f64) -> f64 {
    2.0 * std::f64::consts::PI / wavelength
}

fn order_components(q: [f64; 3], order: AxisOrder) -> [f64; 3] {
    match order {
        AxisOrder::Xyz => q,
        AxisOrder::Zyx => [q[2], q[1], q[0]],
    }
}

fn orient(q: [f64; 3], rotation: Option<&Rotation>) -> [f64; 3] {
    match rotation {
        Some(r) => r.to_body_frame(q),
        None => q,
    }
}

impl DetectorState {
    /// Pixel offset `(x, y)` from the beam centre (m).
    fn pixel_offset(&self, ix: usize, iy: usize) -> (f64, f64) {
        (
            (ix as f64 - self.cx) * self.pixel_size,
            (iy as f64 - self.cy) * self.pixel_size,
        )
    }

    /// Scattering vector (lab frame, xyz) at a detector position offset `(x, y)`.
    fn scattering_vector(&self, x: f64, y: f64, k: f64) -> [f64; 3] {
        let d = self.distance;
        let r2 = x * x + y * y;
        let l = (r2 + d * d).sqrt();
        [k * x / l, k * y / l, -k * r2 / (l * (d + l))]
    }

    pub fn validate(&self) -> Result<(), PropagationError> {
        if self.nx == 0 || self.ny == 0 {
            return Err(PropagationError::InvalidParameter(format!(
                "detector must have pixels, got {}x{}",
                self.nx, self.ny
            )));
        }
        if !(self.pixel_size > 0.0 && self.distance > 0.0) {
            return Err(PropagationError::InvalidParameter(format!(
                "pixel size ({}) and distance ({}) must be positive",
                self.pixel_size, self.distance
            )));
        }
        if matches!(self.binning, Some(0)) {
            return Err(PropagationError::InvalidParameter(
                "binning factor must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Per-pixel scattering vectors, shape `(ny, nx, 3)`.
    ///
    /// # Arguments
    /// * `wavelength` - Photon wavelength (m).
    /// * `rotation` - Particle orientation; vectors are expressed in the body frame.
    /// * `order` - Component order of the trailing axis.
    pub fn generate_qmap(
        &self,
        wavelength: f64,
        rotation: Option<&Rotation>,
        order: AxisOrder,
    ) -> Array3<f64> {
        let k = wavenumber(wavelength);
        let mut qmap = Array3::zeros((self.ny, self.nx, 3));
        for iy in 0..self.ny {
            for ix in 0..self.nx {
                let (x, y) = self.pixel_offset(ix, iy);
                let q = order_components(orient(self.scattering_vector(x, y, k), rotation), order);
                for c in 0..3 {
                    qmap[[iy, ix, c]] = q[c];
                }
            }
        }
        qmap
    }

    /// Cubic grid of scattering vectors spanning `±qmax` with `qn` samples
    /// per axis, shape `(qn, qn, qn, 3)`, indexed `[iz, iy, ix]`.
    pub fn generate_qmap_3d(
        &self,
        qn: usize,
        qmax: f64,
        rotation: Option<&Rotation>,
        order: AxisOrder,
    ) -> Array4<f64> {
        let axis = linspace_symmetric(qmax, qn);
        let mut qmap = Array4::zeros((qn, qn, qn, 3));
        for iz in 0..qn {
            for iy in 0..qn {
                for ix in 0..qn {
                    let q = order_components(orient([axis[ix], axis[iy], axis[iz]], rotation), order);
                    for c in 0..3 {
                        qmap[[iz, iy, ix, c]] = q[c];
                    }
                }
            }
        }
        qmap
    }

    /// Solid angle subtended by each pixel, $\Omega = p^2 D / l^3$, shape `(ny, nx)`.
    pub fn pixel_solid_angles(&self) -> Array2<f64> {
        let p2 = self.pixel_size * self.pixel_size;
        Array2::from_shape_fn((self.ny, self.nx), |(iy, ix)| {
            let (x, y) = self.pixel_offset(ix, iy);
            let l = (x * x + y * y + self.distance * self.distance).sqrt();
            p2 * self.distance / (l * l * l)
        })
    }

    /// Solid angle of a pixel on the beam axis, $p^2/D^2$.
    pub fn uniform_solid_angle(&self) -> f64 {
        (self.pixel_size / self.distance).powi(2)
    }

    /// Polarization factor per pixel, shape `(ny, nx)`.
    pub fn polarization_factors(&self, polarization: Polarization) -> Array2<f64> {
        Array2::from_shape_fn((self.ny, self.nx), |(iy, ix)| {
            let (x, y) = self.pixel_offset(ix, iy);
            let l2 = x * x + y * y + self.distance * self.distance;
            let (sx, sy) = (x * x / l2, y * y / l2);
            match polarization {
                Polarization::Horizontal => 1.0 - sx,
                Polarization::Vertical => 1.0 - sy,
                Polarization::Unpolarized => 1.0 - (sx + sy) / 2.0,
                Polarization::Ignore => 1.0,
            }
        })
    }

    /// Largest $|\mathbf{q}|$ reached along the detector axes (edge midpoints).
    pub fn q_max_edge(&self, wavelength: f64) -> f64 {
        let k = wavenumber(wavelength);
        let (x_lo, y_lo) = self.pixel_offset(0, 0);
        let (x_hi, y_hi) = self.pixel_offset(self.nx - 1, self.ny - 1);
        let x = x_lo.abs().max(x_hi.abs());
        let y = y_lo.abs().max(y_hi.abs());
        norm(self.scattering_vector(x, 0.0, k)).max(norm(self.scattering_vector(0.0, y, k)))
    }

    /// Largest $|\mathbf{q}|$ on the detector (farthest corner).
    pub fn q_max_corner(&self, wavelength: f64) -> f64 {
        let k = wavenumber(wavelength);
        let (x_lo, y_lo) = self.pixel_offset(0, 0);
        let (x_hi, y_hi) = self.pixel_offset(self.nx - 1, self.ny - 1);
        let x = x_lo.abs().max(x_hi.abs());
        let y = y_lo.abs().max(y_hi.abs());
        norm(self.scattering_vector(x, y, k))
    }

    /// Real-space voxel size a density map needs so that every pixel of
    /// this detector, in any particle orientation, samples inside the
    /// unaliased band of the map.
    pub fn resolution_element_r(&self, wavelength: f64) -> f64 {
        std::f64::consts::PI / self.q_max_corner(wavelength) * SAMPLING_MARGIN
    }

    /// Half-period resolution at the detector edge, $\pi/|q_{edge}|$.
    pub fn max_resolution(&self, wavelength: f64) -> f64 {
        std::f64::consts::PI / self.q_max_edge(wavelength)
    }

    /// Nyquist pixel size for a particle of diameter `d`: $D\lambda/d$.
    pub fn nyquist_pixel_size(&self, wavelength: f64, particle_diameter: f64) -> f64 {
        self.distance * wavelength / particle_diameter
    }

    /// Ratio of the Nyquist pixel size to the actual pixel size.
    pub fn linear_sampling_ratio(&self, wavelength: f64, particle_diameter: f64) -> f64 {
        self.nyquist_pixel_size(wavelength, particle_diameter) / self.pixel_size
    }
}

/// Voxel size required for a reciprocal volume reaching `qmax` per axis.
pub fn resolution_element_r_3d(qmax: f64) -> f64 {
    std::f64::consts::PI / (3f64.sqrt() * qmax) * SAMPLING_MARGIN
}

fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

fn linspace_symmetric(qmax: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => {
            let step = 2.0 * qmax / (n - 1) as f64;
            (0..n).map(|i| -qmax + i as f64 * step).collect()
        }
    }
}

/// View a coordinate field of shape `(..., 3)` as a `(n, 3)` list of vectors
/// in row-major order of the leading axes.
pub fn as_vectors<'a, 'b: 'a>(qmap: &'a ArrayViewD<'b, f64>) -> Result<CowArray<'a, f64, Ix2>, PropagationError> {
    let last = qmap.ndim().checked_sub(1).map(|a| qmap.len_of(Axis(a)));
    if last != Some(3) {
        return Err(PropagationError::InvalidParameter(format!(
            "coordinate field must end in a 3-vector axis, got shape {:?}",
            qmap.shape()
        )));
    }
    let n = qmap.len() / 3;
    let standard = qmap.as_standard_layout();
    Ok(standard.into_shape((n, 3))?)
}

/// Shape of the amplitude field matching a coordinate field.
pub fn field_shape(qmap: &ArrayViewD<'_, f64>) -> Vec<usize> {
    let shape = qmap.shape();
    shape[..shape.len().saturating_sub(1)].to_vec()
}
