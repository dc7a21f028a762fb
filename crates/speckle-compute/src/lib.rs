//! # Speckle Compute
//!
//! Compute backend abstraction for the Speckle diffraction engine. The
//! [`ComputeBackend`](backend::ComputeBackend) trait isolates the physics
//! kernels in `speckle-core` from how their data-parallel loops are executed.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Status |
//! |---------|-------------|--------|
//! | CPU (Rayon) | `cpu` (default) | Implemented |

pub mod backend;

#[cfg(feature = "cpu")]
pub mod cpu;

pub use backend::{ComputeBackend, ComputeError, DeviceInfo};

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;
