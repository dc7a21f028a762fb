//! Discretisation of bodies into cubic density grids.
//!
//! Grids are indexed `[iz, iy, ix]` and voxel `i` along an axis sits at
//! $(i - \lfloor n/2 \rfloor)\,\Delta x$, so the body origin coincides with
//! voxel `n/2`. This is the same centring the non-uniform Fourier transform
//! in `speckle-core` assumes.

use ndarray::Array3;
use num_complex::Complex64;

use crate::primitives::Body;
use crate::GeometryError;

/// Sub-voxel sample offsets along one axis, in units of the voxel size.
const SUPERSAMPLE: [f64; 2] = [-0.25, 0.25];

/// Number of voxels per axis needed to hold a body of bounding radius `radius`
/// at voxel size `dx`. Always even, with one voxel of padding on each side.
pub fn grid_size_for_radius(radius: f64, dx: f64) -> usize {
    2 * (radius / dx).ceil() as usize + 2
}

/// Discretise `body` at voxel size `dx` into a fill-fraction grid.
///
/// Each voxel is sampled at 2×2×2 interior points; the stored value is the
/// fraction of samples inside the body, in `[0, 1]`.
///
/// # Arguments
/// * `body` - The shape to discretise.
/// * `dx` - Voxel edge length in metres.
pub fn voxelise(body: &Body, dx: f64) -> Result<Array3<f64>, GeometryError> {
    body.validate()?;
    if !(dx.is_finite() && dx > 0.0) {
        return Err(GeometryError::InvalidParameter(format!(
            "voxel size must be positive, got {dx}"
        )));
    }

    let n = grid_size_for_radius(body.bounding_radius(), dx);
    let half = (n / 2) as f64;
    let total = (SUPERSAMPLE.len() as f64).powi(3);

    let grid = Array3::from_shape_fn((n, n, n), |(iz, iy, ix)| {
        let centre = [
            (ix as f64 - half) * dx,
            (iy as f64 - half) * dx,
            (iz as f64 - half) * dx,
        ];
        let mut inside = 0usize;
        for oz in SUPERSAMPLE {
            for oy in SUPERSAMPLE {
                for ox in SUPERSAMPLE {
                    let p = [centre[0] + ox * dx, centre[1] + oy * dx, centre[2] + oz * dx];
                    if body.contains(&p) {
                        inside += 1;
                    }
                }
            }
        }
        inside as f64 / total
    });

    log::debug!("voxelised {:?} into {n}^3 voxels at dx = {dx:.3e} m", body);
    Ok(grid)
}

/// Resample a centred complex grid from voxel size `dx_in` to `dx_out` by
/// trilinear interpolation. Points outside the input grid are zero.
///
/// The physical extent of the map is preserved; the output is cubic even if
/// the input is not.
pub fn resample_trilinear(
    grid: &Array3<Complex64>,
    dx_in: f64,
    dx_out: f64,
) -> Result<Array3<Complex64>, GeometryError> {
    if !(dx_in > 0.0 && dx_out > 0.0 && dx_in.is_finite() && dx_out.is_finite()) {
        return Err(GeometryError::InvalidParameter(format!(
            "voxel sizes must be positive, got {dx_in} -> {dx_out}"
        )));
    }
    let (nz, ny, nx) = grid.dim();
    let extent = nx.max(ny).max(nz) as f64 * dx_in;
    let n_out = grid_size_for_radius(extent / 2.0, dx_out);
    let half_out = (n_out / 2) as f64;
    let centre_in = [(nz / 2) as f64, (ny / 2) as f64, (nx / 2) as f64];
    let dims = [nz, ny, nx];

    let sample = |idx: [isize; 3]| -> Complex64 {
        if idx
            .iter()
            .zip(dims.iter())
            .any(|(&i, &n)| i < 0 || i as usize >= n)
        {
            Complex64::new(0.0, 0.0)
        } else {
            grid[[idx[0] as usize, idx[1] as usize, idx[2] as usize]]
        }
    };

    let out = Array3::from_shape_fn((n_out, n_out, n_out), |(iz, iy, ix)| {
        // Fractional input index for each axis, zyx order.
        let f = [
            (iz as f64 - half_out) * dx_out / dx_in + centre_in[0],
            (iy as f64 - half_out) * dx_out / dx_in + centre_in[1],
            (ix as f64 - half_out) * dx_out / dx_in + centre_in[2],
        ];
        let base = [f[0].floor(), f[1].floor(), f[2].floor()];
        let t = [f[0] - base[0], f[1] - base[1], f[2] - base[2]];
        let b = [base[0] as isize, base[1] as isize, base[2] as isize];

        let mut acc = Complex64::new(0.0, 0.0);
        for dz in 0..2 {
            let wz = if dz == 0 { 1.0 - t[0] } else { t[0] };
            for dy in 0..2 {
                let wy = if dy == 0 { 1.0 - t[1] } else { t[1] };
                for dxi in 0..2 {
                    let wx = if dxi == 0 { 1.0 - t[2] } else { t[2] };
                    let w = wz * wy * wx;
                    if w != 0.0 {
                        acc += sample([b[0] + dz, b[1] + dy, b[2] + dxi]) * w;
                    }
                }
            }
        }
        acc
    });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sphere_voxel_volume() {
        let body = Body::Sphere { diameter: 100e-9 };
        let dx = 5e-9;
        let grid = voxelise(&body, dx).unwrap();
        let volume = grid.sum() * dx.powi(3);
        assert_relative_eq!(volume, body.volume(), max_relative = 0.03);
    }

    #[test]
    fn test_grid_is_centred() {
        let body = Body::Cube { diameter: 40e-9 };
        let grid = voxelise(&body, 4e-9).unwrap();
        let n = grid.dim().0;
        assert_eq!(n % 2, 0);
        assert_relative_eq!(grid[[n / 2, n / 2, n / 2]], 1.0);
        assert_relative_eq!(grid[[0, 0, 0]], 0.0);
    }

    #[test]
    fn test_shapes_share_volume() {
        let dx = 4e-9;
        for body in [
            Body::Cube { diameter: 80e-9 },
            Body::Icosahedron { diameter: 80e-9 },
            Body::Spheroid {
                diameter: 80e-9,
                flattening: 0.6,
            },
        ] {
            let grid = voxelise(&body, dx).unwrap();
            assert_relative_eq!(grid.sum() * dx.powi(3), body.volume(), max_relative = 0.05);
        }
    }

    #[test]
    fn test_resample_identity_and_coarsening() {
        let body = Body::Sphere { diameter: 60e-9 };
        let fine = voxelise(&body, 2e-9)
            .unwrap()
            .mapv(|v| Complex64::new(v * 1e-5, 0.0));

        let same = resample_trilinear(&fine, 2e-9, 2e-9).unwrap();
        let n = fine.dim().0;
        let m = same.dim().0;
        assert!(m >= n);
        assert_eq!(same[[m / 2, m / 2, m / 2]], fine[[n / 2, n / 2, n / 2]]);

        let coarse = resample_trilinear(&fine, 2e-9, 4e-9).unwrap();
        let mass_fine: f64 = fine.iter().map(|c| c.re).sum::<f64>() * (2e-9f64).powi(3);
        let mass_coarse: f64 = coarse.iter().map(|c| c.re).sum::<f64>() * (4e-9f64).powi(3);
        assert_relative_eq!(mass_coarse, mass_fine, max_relative = 0.05);
    }

    #[test]
    fn test_invalid_voxel_size() {
        assert!(voxelise(&Body::Sphere { diameter: 1e-8 }, 0.0).is_err());
    }
}
