//! Particle sampling.
//!
//! A [`ParticleModel`] describes a population of particles of one kind and
//! draws, per shot, how many of them are in the interaction volume and the
//! concrete [`ParticleInstance`] of each.

use rand::rngs::StdRng;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};

use crate::propagation::PropagationError;
use crate::rotation::Rotation;
use crate::types::{MapGeometry, ParticleInstance, ParticleKind, ParticleShape};
use crate::variation::Variation;

/// Source of particle instances for one particle model.
pub trait ParticleSampler: Send {
    fn name(&self) -> &str;

    fn shape(&self) -> ParticleShape;

    /// Number of particles of this model in the interaction volume this shot.
    fn next_count(&mut self, rng: &mut StdRng) -> usize;

    fn next_instance(&mut self, rng: &mut StdRng) -> ParticleInstance;
}

/// How the particle count per shot is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arrival {
    /// Exactly `round(number)` particles every shot.
    #[default]
    Synchronised,
    /// Poisson-distributed with mean `number`.
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RotationMode {
    /// No rotation; the body frame is the lab frame.
    #[default]
    None,
    Fixed { quaternion: Rotation },
    /// Uniformly distributed over SO(3).
    Random,
}

/// Reference [`ParticleSampler`].
#[derive(Debug, Clone)]
pub struct ParticleModel {
    name: String,
    template: ParticleKind,
    pub number: f64,
    pub arrival: Arrival,
    /// Mean position (m).
    pub position: [f64; 3],
    pub position_variation: [Variation; 3],
    /// Applied to the diameter of spheres, spheroids and map bodies.
    pub diameter_variation: Variation,
    pub flattening_variation: Variation,
    pub rotation: RotationMode,
}

impl ParticleModel {
    pub fn new(name: impl Into<String>, template: ParticleKind) -> Result<Self, PropagationError> {
        validate_kind(&template)?;
        Ok(Self {
            name: name.into(),
            template,
            number: 1.0,
            arrival: Arrival::Synchronised,
            position: [0.0; 3],
            position_variation: [Variation::None; 3],
            diameter_variation: Variation::None,
            flattening_variation: Variation::None,
            rotation: RotationMode::None,
        })
    }

    pub fn with_number(mut self, number: f64, arrival: Arrival) -> Self {
        self.number = number;
        self.arrival = arrival;
        self
    }

    pub fn with_position(mut self, position: [f64; 3]) -> Self {
        self.position = position;
        self
    }

    pub fn with_position_variation(mut self, variation: [Variation; 3]) -> Self {
        self.position_variation = variation;
        self
    }

    pub fn with_diameter_variation(mut self, variation: Variation) -> Self {
        self.diameter_variation = variation;
        self
    }

    pub fn with_flattening_variation(mut self, variation: Variation) -> Self {
        self.flattening_variation = variation;
        self
    }

    pub fn with_rotation(mut self, rotation: RotationMode) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn template(&self) -> &ParticleKind {
        &self.template
    }

    fn sample_kind(&self, rng: &mut StdRng) -> ParticleKind {
        let mut kind = self.template.clone();
        match &mut kind {
            ParticleKind::Sphere { diameter, .. } => {
                *diameter = self.diameter_variation.sample_positive(*diameter, rng);
            }
            ParticleKind::Spheroid {
                diameter,
                flattening,
                ..
            } => {
                *diameter = self.diameter_variation.sample_positive(*diameter, rng);
                *flattening = self.flattening_variation.sample_positive(*flattening, rng);
            }
            ParticleKind::Map {
                geometry: MapGeometry::Body { body, .. },
            } => {
                let d = self.diameter_variation.sample_positive(body.diameter(), rng);
                *body = body.with_diameter(d);
            }
            ParticleKind::Map {
                geometry: MapGeometry::Custom { .. },
            }
            | ParticleKind::Atoms { .. } => {}
        }
        kind
    }
}

fn positive(name: &str, value: f64) -> Result<(), PropagationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PropagationError::InvalidParameter(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

fn validate_kind(kind: &ParticleKind) -> Result<(), PropagationError> {
    match kind {
        ParticleKind::Sphere { diameter, .. } => positive("diameter", *diameter),
        ParticleKind::Spheroid {
            diameter,
            flattening,
            ..
        } => {
            positive("diameter", *diameter)?;
            positive("flattening", *flattening)
        }
        ParticleKind::Map { geometry } => match geometry {
            MapGeometry::Body { body, .. } => Ok(body.validate()?),
            MapGeometry::Custom { density, dx } => {
                positive("dx", *dx)?;
                if density.is_empty() {
                    return Err(PropagationError::InvalidParameter(
                        "custom density map is empty".into(),
                    ));
                }
                Ok(())
            }
        },
        ParticleKind::Atoms {
            structure,
            form_factors,
        } => {
            if structure.is_empty() {
                return Err(PropagationError::InvalidParameter(
                    "atomic structure has no atoms".into(),
                ));
            }
            match form_factors {
                Some(table) if table.len() != structure.len() => {
                    Err(PropagationError::InvalidParameter(format!(
                        "{} form-factor rows for {} atoms",
                        table.len(),
                        structure.len()
                    )))
                }
                _ => Ok(()),
            }
        }
    }
}

impl ParticleSampler for ParticleModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> ParticleShape {
        self.template.shape()
    }

    fn next_count(&mut self, rng: &mut StdRng) -> usize {
        if !(self.number > 0.0) {
            return 0;
        }
        match self.arrival {
            Arrival::Synchronised => self.number.round() as usize,
            Arrival::Random => match Poisson::new(self.number) {
                Ok(dist) => {
                    let n: f64 = dist.sample(rng);
                    n as usize
                }
                Err(_) => 0,
            },
        }
    }

    fn next_instance(&mut self, rng: &mut StdRng) -> ParticleInstance {
        let mut position = self.position;
        for (p, v) in position.iter_mut().zip(&self.position_variation) {
            *p = v.sample(*p, rng);
        }
        let instance = ParticleInstance::new(self.name.clone(), self.sample_kind(rng)).with_position(position);
        match self.rotation {
            RotationMode::None => instance,
            RotationMode::Fixed { quaternion } => instance.with_rotation(quaternion),
            RotationMode::Random => instance.with_rotation(Rotation::random(rng)),
        }
    }
}
