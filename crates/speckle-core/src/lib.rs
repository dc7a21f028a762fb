//! # Speckle Core
//!
//! The propagation engine of Speckle. Given a source, a detector and one or
//! more particle models, an [`Experiment`] simulates single shots of
//! coherent X-ray diffraction: it computes the complex scattering amplitude
//! of every particle on the detector (or in a 3-D reciprocal volume), adds
//! the amplitudes coherently, applies polarization, converts the result to
//! photon counts and optionally bins the frame.
//!
//! ## Architecture
//!
//! Sources, detectors and particle populations are consulted through the
//! [`SourceModel`], [`DetectorModel`] and [`ParticleSampler`] traits; the
//! reference implementations [`Source`], [`Detector`] and [`ParticleModel`]
//! cover the common cases. Particle instances are a closed
//! [`ParticleKind`] enum, and each variant has one kernel in [`kernels`].
//! The atomistic model is delegated to an [`AtomisticSimulator`] installed
//! at run time.
//!
//! ## Modules
//!
//! - [`types`]: per-shot states and particle instances.
//! - [`rotation`]: particle orientations.
//! - [`qmap`]: scattering-vector fields and detector geometry.
//! - [`cache`]: single-slot qmap cache.
//! - [`kernels`]: sphere, spheroid, density-map and atomistic kernels.
//! - [`nfft`]: non-uniform discrete Fourier transform (gridded FFT).
//! - [`detection`], [`binning`]: photon detection, masks and downsampling.
//! - [`source`], [`detector`], [`particle`]: reference collaborators.
//! - [`propagation`]: the engine, its errors and results.
//! - [`diagnostics`]: structured per-shot event stream.

pub mod binning;
pub mod cache;
pub mod detection;
pub mod detector;
pub mod diagnostics;
pub mod kernels;
pub mod nfft;
pub mod particle;
pub mod propagation;
pub mod qmap;
pub mod rotation;
pub mod source;
pub mod types;
pub mod variation;

pub use detector::{Detector, DetectorModel};
pub use kernels::atoms::{AtomisticError, AtomisticSimulator, AtomsGeometry, AtomsRequest, AtomsResponse};
pub use particle::{Arrival, ParticleModel, ParticleSampler, RotationMode};
pub use propagation::{EngineOptions, ErrorKind, Experiment, PropagationError, PropagationResult};
pub use rotation::Rotation;
pub use source::{FocusProfile, Source, SourceModel};
pub use types::{
    AxisOrder, DetectorState, Dimensionality, MapGeometry, ParticleInstance, ParticleKind, ParticleShape,
    Polarization, SourceState,
};
pub use variation::Variation;
