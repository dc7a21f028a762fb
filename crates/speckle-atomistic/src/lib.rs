//! # Speckle Atomistic
//!
//! A direct-summation implementation of the engine's
//! [`AtomisticSimulator`] interface. For every scattering vector it
//! evaluates
//!
//! $$ F(\mathbf{q}) = r_e \sqrt{\Phi\,\Omega}\ \sum_j f_j\!\left(\tfrac{|\mathbf{q}|}{4\pi}\right) e^{-i\mathbf{q}\cdot\mathbf{r}_j} $$
//!
//! with $\Phi$ the photon fluence, $\Omega$ the pixel solid angle and
//! $f_j$ the Cromer–Mann form factor of atom $j$. The structure is
//! recentred on its centre of mass, so the particle position is handled
//! entirely by the engine's phase shift.
//!
//! The cost is one complex exponential per atom and sample, so this is
//! intended for small molecules and tests rather than large assemblies.

use std::sync::Arc;

use ndarray::{ArrayD, IxDyn};
use num_complex::Complex64;
use speckle_compute::{ComputeBackend, CpuBackend};
use speckle_core::kernels::atoms::{AtomisticError, AtomisticSimulator, AtomsGeometry, AtomsRequest, AtomsResponse};
use speckle_core::qmap::{as_vectors, field_shape};
use speckle_core::AxisOrder;
use speckle_geometry::AtomicStructure;
use speckle_materials::elements::{cromer_mann_form_factor, Element};
use speckle_materials::ELECTRON_RADIUS;

/// Interface version implemented by [`DirectSumSimulator`].
pub const VERSION: &str = "0.2.0";

/// Metres to Å⁻¹ conversion of `|q|/4π`.
const INVERSE_ANGSTROM: f64 = 1e-10;

pub struct DirectSumSimulator {
    backend: Arc<dyn ComputeBackend>,
}

impl Default for DirectSumSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectSumSimulator {
    pub fn new() -> Self {
        Self {
            backend: Arc::new(CpuBackend::new()),
        }
    }

    pub fn with_backend(backend: Arc<dyn ComputeBackend>) -> Self {
        Self { backend }
    }

    fn coefficients(request: &AtomsRequest) -> Result<Vec<[f64; 9]>, AtomisticError> {
        match &request.form_factors {
            Some(table) => {
                if table.len() != request.atomic_numbers.len() {
                    return Err(AtomisticError::InvalidRequest(format!(
                        "{} form-factor rows for {} atoms",
                        table.len(),
                        request.atomic_numbers.len()
                    )));
                }
                Ok(table.clone())
            }
            None => request
                .atomic_numbers
                .iter()
                .map(|&z| {
                    Element::from_z(z)
                        .map(|e| e.cromer_mann)
                        .map_err(|e| AtomisticError::InvalidRequest(e.to_string()))
                })
                .collect(),
        }
    }
}

impl AtomisticSimulator for DirectSumSimulator {
    fn version(&self) -> &str {
        VERSION
    }

    fn simulate(&mut self, request: &AtomsRequest) -> Result<AtomsResponse, AtomisticError> {
        let invalid = |e: &dyn std::fmt::Display| AtomisticError::InvalidRequest(e.to_string());
        let coefficients = Self::coefficients(request)?;
        let structure = AtomicStructure::new(request.atomic_numbers.clone(), request.positions.clone())
            .and_then(|s| s.recentred())
            .map_err(|e| invalid(&e))?;

        let detector = &request.detector;
        let rotation = request.rotation.as_ref();
        let (qmap, omega): (ArrayD<f64>, Vec<f64>) = match request.geometry {
            AtomsGeometry::Detector => {
                let omega = if detector.solid_angle_correction {
                    detector.pixel_solid_angles().iter().copied().collect()
                } else {
                    vec![detector.uniform_solid_angle()]
                };
                (
                    detector.generate_qmap(request.wavelength, rotation, AxisOrder::Xyz).into_dyn(),
                    omega,
                )
            }
            AtomsGeometry::Volume { qn, qmax } => (
                detector.generate_qmap_3d(qn, qmax, rotation, AxisOrder::Xyz).into_dyn(),
                vec![detector.uniform_solid_angle()],
            ),
        };
        let view = qmap.view();
        let q = as_vectors(&view).map_err(|e| AtomisticError::Failed(e.to_string()))?;
        log::debug!(
            "direct sum over {} atoms at {} scattering vectors",
            structure.len(),
            q.nrows()
        );

        let scale = request.fluence.sqrt() * ELECTRON_RADIUS;
        let positions = &structure.positions;
        let sum = |i: usize| {
            let v = q.row(i);
            let s = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt() / (4.0 * std::f64::consts::PI) * INVERSE_ANGSTROM;
            let f: Complex64 = positions
                .iter()
                .zip(&coefficients)
                .map(|(r, c)| {
                    let phase = v[0] * r[0] + v[1] * r[1] + v[2] * r[2];
                    Complex64::from_polar(cromer_mann_form_factor(c, s), -phase)
                })
                .sum();
            let omega_i = if omega.len() == 1 { omega[0] } else { omega[i] };
            f * scale * omega_i.sqrt()
        };
        let values = self
            .backend
            .parallel_fill(q.nrows(), &sum)
            .map_err(|e| AtomisticError::Failed(e.to_string()))?;

        let amplitude = ArrayD::from_shape_vec(IxDyn(&field_shape(&view)), values.to_vec())
            .map_err(|e| AtomisticError::Failed(e.to_string()))?;
        Ok(AtomsResponse {
            amplitude,
            qmap,
            axis_order: AxisOrder::Xyz,
        })
    }
}
