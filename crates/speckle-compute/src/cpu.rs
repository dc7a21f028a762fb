//! CPU compute backend using Rayon for shared-memory parallelism.

use ndarray::Array1;
use num_complex::Complex64;
use rayon::prelude::*;

use crate::backend::{ComputeBackend, ComputeError, DeviceInfo};

/// CPU backend that parallelises work across threads via Rayon.
///
/// By default work runs on Rayon's global pool. [`CpuBackend::with_threads`]
/// builds a dedicated pool so that several engines can run side by side
/// without oversubscribing the machine.
pub struct CpuBackend {
    num_threads: usize,
    pool: Option<rayon::ThreadPool>,
}

impl CpuBackend {
    /// Create a new CPU backend using all available threads.
    pub fn new() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
            pool: None,
        }
    }

    /// Create a CPU backend with a dedicated pool of `num_threads` threads.
    pub fn with_threads(num_threads: usize) -> Result<Self, ComputeError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("speckle-cpu-{i}"))
            .build()
            .map_err(|e| ComputeError::Unavailable(e.to_string()))?;
        Ok(Self {
            num_threads: pool.current_num_threads(),
            pool: Some(pool),
        })
    }

    fn run<T: Send>(&self, job: impl FnOnce() -> T + Send) -> T {
        match &self.pool {
            Some(pool) => pool.install(job),
            None => job(),
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            compute_units: Some(self.num_threads),
        }
    }

    fn parallel_fill(
        &self,
        len: usize,
        fill_fn: &(dyn Fn(usize) -> Complex64 + Send + Sync),
    ) -> Result<Array1<Complex64>, ComputeError> {
        let data: Vec<Complex64> =
            self.run(|| (0..len).into_par_iter().map(fill_fn).collect());

        if data.len() != len {
            return Err(ComputeError::DeviceError(format!(
                "expected {len} samples, produced {}",
                data.len()
            )));
        }
        Ok(Array1::from_vec(data))
    }

    fn parallel_fill_real(
        &self,
        len: usize,
        fill_fn: &(dyn Fn(usize) -> f64 + Send + Sync),
    ) -> Result<Array1<f64>, ComputeError> {
        let data: Vec<f64> = self.run(|| (0..len).into_par_iter().map(fill_fn).collect());
        Ok(Array1::from_vec(data))
    }
}
