//! Non-uniform discrete Fourier transform of a 3-D grid.
//!
//! For a grid $f$ of shape $(N_z, N_y, N_x)$ and frequencies
//! $\mathbf{x}_m \in [-\tfrac12, \tfrac12)^3$ (zyx order) this computes
//!
//! $$ \hat f(\mathbf{x}_m) = \sum_{\mathbf{k}} f[\mathbf{k}] \exp\!\left(-2\pi i\,(\mathbf{k} - \mathbf{N}/2)\cdot\mathbf{x}_m\right) $$
//!
//! with the gridding method. The grid is divided by the Fourier transform
//! of a Gaussian kernel, zero-padded onto a grid oversampled by
//! [`OVERSAMPLING`], and transformed with FFTs along each axis. Each sample
//! is then interpolated from the $2W$ nearest points per axis with the
//! truncated Gaussian ($W$ = [`HALF_WIDTH`]). The error is of order
//! $10^{-9}\sum|f|$; the cost is one FFT of the padded grid plus $(2W)^3$
//! operations per sample, independent of the number of voxels. The
//! interpolation is distributed over the compute backend.

use std::f64::consts::PI;

use ndarray::{Array1, Array3, ArrayView2, Axis};
use num_complex::Complex64;
use rustfft::FftPlanner;
use speckle_compute::{ComputeBackend, ComputeError};

/// Ratio of the padded grid to the input grid along each axis.
pub const OVERSAMPLING: usize = 2;
/// Interpolation points on each side of a sample, per axis.
pub const HALF_WIDTH: usize = 10;

/// Gaussian $\exp(-b u^2)$ in padded-grid units, width tuned to
/// [`OVERSAMPLING`] and [`HALF_WIDTH`].
fn gaussian_exponent() -> f64 {
    let r = OVERSAMPLING as f64;
    PI * (r - 0.5) / (r * HALF_WIDTH as f64)
}

/// Deconvolution factors for centred frequencies $k - N/2$ on one axis.
fn correction(n: usize, padded: usize, b: f64) -> Vec<f64> {
    let half = (n / 2) as f64;
    let m = padded as f64;
    (0..n)
        .map(|k| {
            let kappa = k as f64 - half;
            (b / PI).sqrt() * (PI * PI * kappa * kappa / (b * m * m)).exp()
        })
        .collect()
}

/// Padded index of centred frequency `k - n/2`.
fn wrap(k: usize, n: usize, padded: usize) -> usize {
    (k as i64 - (n / 2) as i64).rem_euclid(padded as i64) as usize
}

fn fft_along(grid: &mut Array3<Complex64>, axis: usize, planner: &mut FftPlanner<f64>) {
    let len = grid.len_of(Axis(axis));
    let fft = planner.plan_fft_forward(len);
    let zero = Complex64::new(0.0, 0.0);
    let mut buffer = vec![zero; len];
    let mut scratch = vec![zero; fft.get_inplace_scratch_len()];
    for mut lane in grid.lanes_mut(Axis(axis)) {
        for (b, v) in buffer.iter_mut().zip(lane.iter()) {
            *b = *v;
        }
        fft.process_with_scratch(&mut buffer, &mut scratch);
        for (v, b) in lane.iter_mut().zip(&buffer) {
            *v = *b;
        }
    }
}

/// Padded indices and kernel weights around padded coordinate `u`.
fn stencil(u: f64, padded: usize, b: f64) -> ([usize; 2 * HALF_WIDTH], [f64; 2 * HALF_WIDTH]) {
    let mut idx = [0usize; 2 * HALF_WIDTH];
    let mut w = [0.0; 2 * HALF_WIDTH];
    let first = u.floor() as i64 - HALF_WIDTH as i64 + 1;
    for t in 0..2 * HALF_WIDTH {
        let j = first + t as i64;
        let d = u - j as f64;
        idx[t] = j.rem_euclid(padded as i64) as usize;
        w[t] = (-b * d * d).exp();
    }
    (idx, w)
}

/// Evaluate the transform of `grid` at each row of `freqs`.
///
/// # Arguments
/// * `backend` - Executes the per-sample interpolation.
/// * `grid` - Complex values indexed `[iz, iy, ix]`.
/// * `freqs` - `(M, 3)` normalised frequencies in zyx order.
///
/// Rows containing a non-finite frequency evaluate to NaN.
pub fn ndft(
    backend: &dyn ComputeBackend,
    grid: &Array3<Complex64>,
    freqs: &ArrayView2<'_, f64>,
) -> Result<Array1<Complex64>, ComputeError> {
    if freqs.ncols() != 3 {
        return Err(ComputeError::DeviceError(format!(
            "frequencies must be (M, 3), got {:?}",
            freqs.shape()
        )));
    }
    let (nz, ny, nx) = grid.dim();
    if nz * ny * nx == 0 {
        return Ok(Array1::zeros(freqs.nrows()));
    }
    let (mz, my, mx) = (OVERSAMPLING * nz, OVERSAMPLING * ny, OVERSAMPLING * nx);
    let b = gaussian_exponent();

    let (cz, cy, cx) = (correction(nz, mz, b), correction(ny, my, b), correction(nx, mx, b));
    let mut padded = Array3::<Complex64>::zeros((mz, my, mx));
    for ((iz, iy, ix), v) in grid.indexed_iter() {
        padded[[wrap(iz, nz, mz), wrap(iy, ny, my), wrap(ix, nx, mx)]] = v * (cz[iz] * cy[iy] * cx[ix]);
    }

    let mut planner = FftPlanner::new();
    for axis in 0..3 {
        fft_along(&mut padded, axis, &mut planner);
    }
    let values = padded
        .as_slice()
        .ok_or_else(|| ComputeError::DeviceError("padded grid is not contiguous".into()))?;

    let freqs = freqs.to_owned();
    backend.parallel_fill(freqs.nrows(), &|m| {
        let x = [freqs[[m, 0]], freqs[[m, 1]], freqs[[m, 2]]];
        if x.iter().any(|v| !v.is_finite()) {
            return Complex64::new(f64::NAN, f64::NAN);
        }
        let (iz, wz) = stencil(x[0] * mz as f64, mz, b);
        let (iy, wy) = stencil(x[1] * my as f64, my, b);
        let (ix, wx) = stencil(x[2] * mx as f64, mx, b);
        let mut acc = Complex64::new(0.0, 0.0);
        for (&z, &w_z) in iz.iter().zip(&wz) {
            let mut plane = Complex64::new(0.0, 0.0);
            for (&y, &w_y) in iy.iter().zip(&wy) {
                let row = &values[(z * my + y) * mx..(z * my + y + 1) * mx];
                let inner: Complex64 = ix.iter().zip(&wx).map(|(&i, &w)| row[i] * w).sum();
                plane += inner * w_y;
            }
            acc += plane * w_z;
        }
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use speckle_compute::CpuBackend;

    fn brute_force(grid: &Array3<Complex64>, x: [f64; 3]) -> Complex64 {
        let (nz, ny, nx) = grid.dim();
        let mut acc = Complex64::new(0.0, 0.0);
        for ((iz, iy, ix), v) in grid.indexed_iter() {
            let k = [
                iz as f64 - (nz / 2) as f64,
                iy as f64 - (ny / 2) as f64,
                ix as f64 - (nx / 2) as f64,
            ];
            let phase = -2.0 * PI * (k[0] * x[0] + k[1] * x[1] + k[2] * x[2]);
            acc += v * Complex64::from_polar(1.0, phase);
        }
        acc
    }

    /// Deterministic spread of samples over the unit cube.
    fn spread_samples(n: usize) -> ndarray::Array2<f64> {
        ndarray::Array2::from_shape_fn((n, 3), |(m, c)| {
            let t = (m * 7 + c * 13) as f64 * 0.618_033_988_75;
            t.fract() - 0.5
        })
    }

    fn l1(grid: &Array3<Complex64>) -> f64 {
        grid.iter().map(|v| v.norm()).sum()
    }

    #[test]
    fn test_centre_voxel_gives_flat_field() {
        let mut grid = Array3::zeros((4, 4, 4));
        grid[[2, 2, 2]] = Complex64::new(1.5, -0.5);
        let freqs = array![[0.0, 0.0, 0.0], [0.3, -0.2, 0.1], [-0.5, 0.49, 0.25]];
        let out = ndft(&CpuBackend::new(), &grid, &freqs.view()).unwrap();
        for v in out.iter() {
            assert_abs_diff_eq!(v.re, 1.5, epsilon = 1e-8);
            assert_abs_diff_eq!(v.im, -0.5, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_matches_direct_sum() {
        let grid = Array3::from_shape_fn((3, 4, 5), |(z, y, x)| {
            Complex64::new((z + 2 * y) as f64 * 0.1, x as f64 * -0.05)
        });
        let freqs = array![
            [0.11, -0.37, 0.42],
            [-0.25, 0.0, 0.33],
            [0.0, 0.0, 0.0],
            [-0.5, -0.5, -0.5],
            [0.4999, 0.2, -0.0123]
        ];
        let out = ndft(&CpuBackend::new(), &grid, &freqs.view()).unwrap();
        let tol = 1e-7 * l1(&grid);
        for (m, row) in freqs.outer_iter().enumerate() {
            let expected = brute_force(&grid, [row[0], row[1], row[2]]);
            assert_abs_diff_eq!(out[m].re, expected.re, epsilon = tol);
            assert_abs_diff_eq!(out[m].im, expected.im, epsilon = tol);
        }
        // Zero frequency is the plain sum.
        assert_abs_diff_eq!(out[2].re, grid.iter().map(|c| c.re).sum::<f64>(), epsilon = tol);
    }

    #[test]
    fn test_larger_odd_grid_matches_direct_sum() {
        let grid = Array3::from_shape_fn((9, 12, 7), |(z, y, x)| {
            let r = ((z * 31 + y * 17 + x * 7) % 13) as f64 / 13.0;
            Complex64::new(r - 0.5, 0.25 * (1.0 - r))
        });
        let freqs = spread_samples(40);
        let out = ndft(&CpuBackend::new(), &grid, &freqs.view()).unwrap();
        let tol = 1e-7 * l1(&grid);
        for (m, row) in freqs.outer_iter().enumerate() {
            let expected = brute_force(&grid, [row[0], row[1], row[2]]);
            assert_abs_diff_eq!(out[m].re, expected.re, epsilon = tol);
            assert_abs_diff_eq!(out[m].im, expected.im, epsilon = tol);
        }
    }

    #[test]
    fn test_single_voxel_off_centre_is_pure_phase() {
        let mut grid = Array3::zeros((4, 4, 4));
        grid[[2, 2, 3]] = Complex64::new(1.0, 0.0);
        let freqs = array![[0.0, 0.0, 0.25]];
        let out = ndft(&CpuBackend::new(), &grid, &freqs.view()).unwrap();
        // k_x = 1, x = 0.25: exp(-iπ/2) = -i.
        assert_abs_diff_eq!(out[0].re, 0.0, epsilon = 1e-8);
        assert_abs_diff_eq!(out[0].im, -1.0, epsilon = 1e-8);
    }

    #[test]
    fn test_non_finite_frequency_is_nan() {
        let grid = Array3::from_elem((2, 2, 2), Complex64::new(1.0, 0.0));
        let freqs = array![[f64::NAN, 0.0, 0.0], [0.0, 0.0, 0.0]];
        let out = ndft(&CpuBackend::new(), &grid, &freqs.view()).unwrap();
        assert!(out[0].re.is_nan());
        assert_abs_diff_eq!(out[1].re, 8.0, epsilon = 1e-8);
    }
}
