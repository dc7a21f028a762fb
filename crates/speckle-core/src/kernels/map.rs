//! Arbitrary density maps.
//!
//! The coordinate field (body frame, zyx) is rescaled by $\Delta x/2\pi$ so
//! that the map's Nyquist band maps onto $[-\tfrac12, \tfrac12)$. Samples
//! outside that band cannot be represented by the grid: they are zeroed
//! before the transform and their outputs are set to NaN afterwards.

use std::sync::Arc;

use ndarray::{Array3, ArrayD, ArrayViewD, IxDyn};
use num_complex::Complex64;
use speckle_compute::ComputeBackend;
use speckle_geometry::{grid_size_for_radius, resample_trilinear, voxelise};
use speckle_materials::MaterialProvider;

use super::SolidAngle;
use crate::nfft::ndft;
use crate::propagation::PropagationError;
use crate::qmap::{as_vectors, field_shape};
use crate::types::MapGeometry;

/// A complex Δn grid indexed `[iz, iy, ix]`, centred on voxel `n/2`.
#[derive(Debug, Clone)]
pub struct DensityMap {
    pub density: Arc<Array3<Complex64>>,
    /// Voxel size (m).
    pub dx: f64,
}

/// Amplitude and bookkeeping of one map evaluation.
#[derive(Debug)]
pub struct MapAmplitude {
    pub amplitude: ArrayD<Complex64>,
    /// Samples outside the band, now NaN.
    pub invalid: usize,
    pub non_finite_density: usize,
    pub non_finite_vectors: usize,
}

fn check_voxel_limit(required: usize, limit: usize) -> Result<(), PropagationError> {
    if required > limit {
        return Err(PropagationError::DensityMapTooLarge { required, limit });
    }
    Ok(())
}

/// Build the density grid for `geometry` at a voxel size no coarser than
/// `dx_required`.
///
/// Bodies are voxelised at `dx_required`. Custom maps finer than required
/// are used as they are; coarser ones are resampled.
pub fn sample_density_map(
    geometry: &MapGeometry,
    wavelength: f64,
    dx_required: f64,
    max_voxels_per_axis: usize,
) -> Result<DensityMap, PropagationError> {
    match geometry {
        MapGeometry::Body { body, material } => {
            check_voxel_limit(
                grid_size_for_radius(body.bounding_radius(), dx_required),
                max_voxels_per_axis,
            )?;
            let dn = material.refractive_index_decrement(wavelength)?;
            let fill = voxelise(body, dx_required)?;
            Ok(DensityMap {
                density: Arc::new(fill.mapv(|f| dn * f)),
                dx: dx_required,
            })
        }
        MapGeometry::Custom { density, dx } => {
            if !(dx.is_finite() && *dx > 0.0) {
                return Err(PropagationError::InvalidParameter(format!(
                    "custom map voxel size must be positive, got {dx}"
                )));
            }
            if *dx <= dx_required {
                return Ok(DensityMap {
                    density: Arc::clone(density),
                    dx: *dx,
                });
            }
            let (nz, ny, nx) = density.dim();
            let extent = nx.max(ny).max(nz) as f64 * dx;
            check_voxel_limit(
                grid_size_for_radius(extent / 2.0, dx_required),
                max_voxels_per_axis,
            )?;
            Ok(DensityMap {
                density: Arc::new(resample_trilinear(density, *dx, dx_required)?),
                dx: dx_required,
            })
        }
    }
}

/// Amplitude of a density map, $F = F_0\,\Delta x^3\sqrt{\Omega}\;\hat f$.
pub fn map_amplitude(
    backend: &dyn ComputeBackend,
    map: &DensityMap,
    qmap_zyx: &ArrayViewD<'_, f64>,
    f0: f64,
    omega: &SolidAngle,
) -> Result<MapAmplitude, PropagationError> {
    let q = as_vectors(qmap_zyx)?;
    omega.check_len(q.nrows())?;

    let scale = map.dx / (2.0 * std::f64::consts::PI);
    let mut scaled = q.mapv(|v| v * scale);
    let mut invalid_rows = vec![false; scaled.nrows()];
    let mut non_finite_vectors = 0;
    for (row, flag) in scaled.outer_iter_mut().zip(invalid_rows.iter_mut()) {
        if row.iter().any(|v| !v.is_finite()) {
            non_finite_vectors += 1;
        }
        if row.iter().any(|v| !(*v >= -0.5 && *v < 0.5)) {
            *flag = true;
        }
    }
    for (mut row, flag) in scaled.outer_iter_mut().zip(&invalid_rows) {
        if *flag {
            row.fill(0.0);
        }
    }
    let non_finite_density = map.density.iter().filter(|v| !(v.re.is_finite() && v.im.is_finite())).count();

    let pattern = ndft(backend, &map.density, &scaled.view())?;

    let norm = f0 * map.dx.powi(3);
    let nan = Complex64::new(f64::NAN, f64::NAN);
    let values: Vec<Complex64> = pattern
        .iter()
        .zip(&invalid_rows)
        .enumerate()
        .map(|(i, (v, bad))| if *bad { nan } else { v * norm * omega.sqrt_at(i) })
        .collect();

    Ok(MapAmplitude {
        amplitude: ArrayD::from_shape_vec(IxDyn(&field_shape(qmap_zyx)), values)?,
        invalid: invalid_rows.iter().filter(|b| **b).count(),
        non_finite_density,
        non_finite_vectors,
    })
}
