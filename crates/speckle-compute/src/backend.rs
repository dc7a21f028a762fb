//! Compute backend trait and device description.
//!
//! The [`ComputeBackend`] trait abstracts over execution environments so that
//! the diffraction kernels in `speckle-core` stay device-agnostic. Every hot
//! loop in the engine (non-uniform Fourier sums, atomistic direct sums) is an
//! independent evaluation per output sample, which maps onto a single
//! "fill this vector" primitive.

use ndarray::Array1;
use num_complex::Complex64;
use thiserror::Error;

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Backend not available: {0}")]
    Unavailable(String),

    #[error("Device error: {0}")]
    DeviceError(String),
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub compute_units: Option<usize>,
}

/// Abstraction over compute backends.
///
/// Implementations decide how the per-sample closures are scheduled. The
/// closures must be pure functions of their index: backends are free to
/// evaluate them in any order and on any thread.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// Evaluate `fill_fn(i)` for every `i` in `0..len` and collect the results.
    ///
    /// This is the entry point for the non-uniform discrete Fourier transform:
    /// each query frequency is an independent sum over the density grid.
    fn parallel_fill(
        &self,
        len: usize,
        fill_fn: &(dyn Fn(usize) -> Complex64 + Send + Sync),
    ) -> Result<Array1<Complex64>, ComputeError>;

    /// Real-valued counterpart of [`parallel_fill`](Self::parallel_fill).
    fn parallel_fill_real(
        &self,
        len: usize,
        fill_fn: &(dyn Fn(usize) -> f64 + Send + Sync),
    ) -> Result<Array1<f64>, ComputeError> {
        let complex = self.parallel_fill(len, &|i| Complex64::new(fill_fn(i), 0.0))?;
        Ok(complex.mapv(|c| c.re))
    }
}
