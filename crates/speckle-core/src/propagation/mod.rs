//! Shot propagation.
//!
//! The [`Experiment`] ties a source, a set of particle models and a
//! detector together and turns each shot into a [`PropagationResult`].
//! This module also defines the engine's error type and result records.

mod experiment;

pub use experiment::Experiment;

use std::collections::BTreeMap;

use ndarray::{Array3, ArrayD};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use speckle_compute::ComputeError;
use speckle_geometry::GeometryError;
use speckle_materials::MaterialError;
use thiserror::Error;

use crate::diagnostics::Diagnostics;
use crate::kernels::atoms::AtomisticError;
use crate::types::{DetectorState, ParticleInstance, Polarization, SourceState};

/// Errors that abort a shot.
#[derive(Debug, Error)]
pub enum PropagationError {
    #[error("Invalid dimensionality {0}, expected 2 or 3")]
    InvalidDimensionality(usize),

    #[error("Spheroid particles are not supported in 3-D propagation")]
    SpheroidIn3d,

    #[error("Polarization {0:?} is not supported in 3-D propagation; use Ignore")]
    PolarizationIn3d(Polarization),

    #[error("Solid-angle correction is not supported in 3-D propagation")]
    SolidAngleCorrectionIn3d,

    #[error("Invalid particle model name '{0}', expected sphere, spheroid, map or atoms")]
    InvalidModelName(String),

    #[error("No particle models configured")]
    NoParticleModels,

    #[error("Density map needs {required} voxels per axis, limit is {limit}")]
    DensityMapTooLarge { required: usize, limit: usize },

    #[error("Qmap cache is empty")]
    EmptyCache,

    #[error("No atomistic simulator installed")]
    AtomisticSimulatorMissing,

    #[error("Atomistic simulator version {found} is older than the required {minimum}")]
    AtomisticVersionTooOld { found: String, minimum: String },

    #[error("Atomistic simulator error: {0}")]
    Atomistic(#[from] AtomisticError),

    #[error("Invalid atomistic response: {0}")]
    InvalidAtomisticResponse(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Compute backend error: {0}")]
    Compute(#[from] ComputeError),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Material(#[from] MaterialError),
}

/// Coarse classification of [`PropagationError`] for callers that only
/// need to decide whether to fix the job, the environment, or report a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    ExternalDependency,
    Internal,
}

impl PropagationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PropagationError::InvalidDimensionality(_)
            | PropagationError::SpheroidIn3d
            | PropagationError::PolarizationIn3d(_)
            | PropagationError::SolidAngleCorrectionIn3d
            | PropagationError::InvalidModelName(_)
            | PropagationError::NoParticleModels
            | PropagationError::DensityMapTooLarge { .. }
            | PropagationError::InvalidParameter(_)
            | PropagationError::Geometry(_)
            | PropagationError::Material(_) => ErrorKind::Configuration,
            PropagationError::AtomisticSimulatorMissing
            | PropagationError::AtomisticVersionTooOld { .. }
            | PropagationError::Atomistic(_)
            | PropagationError::InvalidAtomisticResponse(_) => ErrorKind::ExternalDependency,
            PropagationError::EmptyCache
            | PropagationError::Compute(_)
            | PropagationError::Shape(_) => ErrorKind::Internal,
        }
    }
}

fn default_max_map_voxels() -> usize {
    256
}

/// Engine switches that do not change the physics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Return the density grid of every map particle.
    #[serde(default)]
    pub save_map3d: bool,
    /// Return the coordinate field every particle was evaluated on.
    #[serde(default)]
    pub save_qmap: bool,
    /// Largest density-map edge the engine will allocate.
    #[serde(default = "default_max_map_voxels")]
    pub max_map_voxels_per_axis: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            save_map3d: false,
            save_qmap: false,
            max_map_voxels_per_axis: default_max_map_voxels(),
        }
    }
}

/// Per-particle entry of [`ShotMetadata`].
#[derive(Debug, Clone, Serialize)]
pub struct ParticleRecord {
    pub instance: ParticleInstance,
    /// Photon fluence at the particle (photons/m²).
    pub fluence: f64,
    /// Primary-wave amplitude.
    pub f0: f64,
    /// Voxel size of the sampled density map (map particles only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dx: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShotMetadata {
    pub source: SourceState,
    /// Keyed `particle_00`, `particle_01`, ... in sampling order.
    pub particles: BTreeMap<String, ParticleRecord>,
    pub detector: DetectorState,
}

/// Detector-side output of a shot, either at full or at binned resolution.
#[derive(Debug, Clone, Serialize)]
pub struct DetectorData {
    /// Total complex amplitude, polarization-corrected.
    pub fourier: ArrayD<Complex64>,
    /// Detected photon counts.
    pub intensity: ArrayD<f64>,
    pub mask: ArrayD<u16>,
    /// Full-period resolution at the detector edge (m).
    pub full_period_resolution: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DensityRecord {
    pub density: Array3<Complex64>,
    pub dx: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PropagationResult {
    pub metadata: ShotMetadata,
    pub data: DetectorData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binned: Option<DetectorData>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub qmaps: BTreeMap<String, ArrayD<f64>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub maps3d: BTreeMap<String, DensityRecord>,
    pub diagnostics: Diagnostics,
}

impl PropagationResult {
    /// Number of particles that contributed to the shot.
    pub fn particle_count(&self) -> usize {
        self.metadata.particles.len()
    }

    /// Expected photon count, $|F|^2$, before detection.
    pub fn expected_intensity(&self) -> ArrayD<f64> {
        self.data.fourier.mapv(|f| f.norm_sqr())
    }
}
