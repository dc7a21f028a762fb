//! Core types shared across the Speckle engine.
//!
//! This module defines the per-shot states consumed by the propagation engine:
//! the source state, the detector geometry, and the particle instances
//! illuminated in a shot.

use std::sync::Arc;

use ndarray::Array3;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use speckle_geometry::{AtomicStructure, Body};
use speckle_materials::Material;

use crate::propagation::PropagationError;
use crate::rotation::Rotation;

/// Polarization of the incident beam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarization {
    Horizontal,
    Vertical,
    Unpolarized,
    #[default]
    Ignore,
}

/// State of the source for one shot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceState {
    /// Photon wavelength (m).
    pub wavelength: f64,
    /// Pulse energy (J).
    pub pulse_energy: f64,
    pub polarization: Polarization,
}

/// Detector geometry for one shot.
///
/// Pixel `(ix, iy)` sits at `((ix - cx) p, (iy - cy) p, distance)` relative to
/// the interaction point, with the beam travelling along +z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorState {
    pub nx: usize,
    pub ny: usize,
    /// Beam centre in pixel units.
    pub cx: f64,
    pub cy: f64,
    /// Pixel edge length (m).
    pub pixel_size: f64,
    /// Sample-to-detector distance (m).
    pub distance: f64,
    pub solid_angle_correction: bool,
    pub binning: Option<usize>,
}

/// Ordering of the three components of each scattering vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisOrder {
    /// `[qx, qy, qz]`
    Xyz,
    /// `[qz, qy, qx]`, the order density maps are indexed in.
    Zyx,
}

/// Detector-plane or reciprocal-volume propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dimensionality {
    Two,
    Three,
}

impl Dimensionality {
    pub fn from_ndim(ndim: usize) -> Result<Self, PropagationError> {
        match ndim {
            2 => Ok(Dimensionality::Two),
            3 => Ok(Dimensionality::Three),
            other => Err(PropagationError::InvalidDimensionality(other)),
        }
    }

    pub fn ndim(self) -> usize {
        match self {
            Dimensionality::Two => 2,
            Dimensionality::Three => 3,
        }
    }
}

/// Which of the four particle models an instance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticleShape {
    Sphere,
    Spheroid,
    Map,
    Atoms,
}

impl ParticleShape {
    /// Resolve a model name as used in job files.
    pub fn from_model_name(name: &str) -> Result<Self, PropagationError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sphere" => Ok(ParticleShape::Sphere),
            "spheroid" => Ok(ParticleShape::Spheroid),
            "map" => Ok(ParticleShape::Map),
            "atoms" => Ok(ParticleShape::Atoms),
            _ => Err(PropagationError::InvalidModelName(name.to_string())),
        }
    }

    pub fn model_name(self) -> &'static str {
        match self {
            ParticleShape::Sphere => "sphere",
            ParticleShape::Spheroid => "spheroid",
            ParticleShape::Map => "map",
            ParticleShape::Atoms => "atoms",
        }
    }
}

/// Geometry behind a density-map particle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum MapGeometry {
    /// A homogeneous body voxelised on demand.
    Body { body: Body, material: Material },
    /// A user-supplied complex Δn grid indexed `[iz, iy, ix]`.
    Custom {
        #[serde(skip)]
        density: Arc<Array3<Complex64>>,
        /// Voxel size of `density` (m).
        dx: f64,
    },
}

/// Model-specific parameters of a particle instance.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParticleKind {
    Sphere {
        diameter: f64,
        material: Material,
    },
    Spheroid {
        /// Volume-equivalent diameter (m).
        diameter: f64,
        /// Ratio of polar to equatorial semi-axis.
        flattening: f64,
        material: Material,
    },
    Map {
        geometry: MapGeometry,
    },
    Atoms {
        structure: AtomicStructure,
        /// Per-atom Cromer–Mann coefficients overriding the element table.
        #[serde(skip_serializing_if = "Option::is_none")]
        form_factors: Option<Vec<[f64; 9]>>,
    },
}

impl ParticleKind {
    pub fn shape(&self) -> ParticleShape {
        match self {
            ParticleKind::Sphere { .. } => ParticleShape::Sphere,
            ParticleKind::Spheroid { .. } => ParticleShape::Spheroid,
            ParticleKind::Map { .. } => ParticleShape::Map,
            ParticleKind::Atoms { .. } => ParticleShape::Atoms,
        }
    }
}

/// One particle in the interaction volume for one shot.
#[derive(Debug, Clone, Serialize)]
pub struct ParticleInstance {
    /// Name of the particle model that produced this instance.
    pub model: String,
    /// Offset from the interaction point (m).
    pub position: [f64; 3],
    /// Extrinsic orientation; `None` is the identity.
    pub rotation: Option<Rotation>,
    #[serde(flatten)]
    pub kind: ParticleKind,
}

impl ParticleInstance {
    pub fn new(model: impl Into<String>, kind: ParticleKind) -> Self {
        Self {
            model: model.into(),
            position: [0.0; 3],
            rotation: None,
            kind,
        }
    }

    pub fn with_position(mut self, position: [f64; 3]) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = Some(rotation);
        self
    }
}
