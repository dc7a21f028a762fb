//! X-ray source model.
//!
//! Supplies the per-shot [`SourceState`] and the photon fluence at a
//! particle's position in the focus.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::propagation::PropagationError;
use crate::types::{Polarization, SourceState};
use crate::variation::Variation;

/// Planck constant times speed of light (J·m).
const HC: f64 = 6.626_070_15e-34 * 299_792_458.0;

/// Source of incident photons, consulted once per shot.
pub trait SourceModel: Send {
    fn next_state(&mut self, rng: &mut StdRng) -> SourceState;

    /// Photon fluence (photons/m²) at `position` for a pulse of `pulse_energy` (J).
    fn intensity(&self, position: [f64; 3], pulse_energy: f64) -> f64;
}

/// Transverse beam profile in the focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusProfile {
    #[default]
    TopHat,
    /// `focus_diameter` is the FWHM.
    Gaussian,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Photon wavelength (m).
    pub wavelength: f64,
    /// Focus diameter (m).
    pub focus_diameter: f64,
    #[serde(default)]
    pub profile: FocusProfile,
    /// Mean pulse energy (J).
    pub pulse_energy: f64,
    #[serde(default)]
    pub pulse_energy_variation: Variation,
    #[serde(default)]
    pub polarization: Polarization,
}

impl Source {
    pub fn new(wavelength: f64, focus_diameter: f64, pulse_energy: f64) -> Result<Self, PropagationError> {
        let source = Self {
            wavelength,
            focus_diameter,
            profile: FocusProfile::TopHat,
            pulse_energy,
            pulse_energy_variation: Variation::None,
            polarization: Polarization::Ignore,
        };
        source.validate()?;
        Ok(source)
    }

    pub fn with_profile(mut self, profile: FocusProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_polarization(mut self, polarization: Polarization) -> Self {
        self.polarization = polarization;
        self
    }

    pub fn with_pulse_energy_variation(mut self, variation: Variation) -> Self {
        self.pulse_energy_variation = variation;
        self
    }

    pub fn validate(&self) -> Result<(), PropagationError> {
        for (name, v) in [
            ("wavelength", self.wavelength),
            ("focus_diameter", self.focus_diameter),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(PropagationError::InvalidParameter(format!(
                    "{name} must be positive, got {v}"
                )));
            }
        }
        if !(self.pulse_energy.is_finite() && self.pulse_energy >= 0.0) {
            return Err(PropagationError::InvalidParameter(format!(
                "pulse_energy must be non-negative, got {}",
                self.pulse_energy
            )));
        }
        Ok(())
    }

    /// Photon energy $hc/\lambda$ (J).
    pub fn photon_energy(&self) -> f64 {
        HC / self.wavelength
    }
}

impl SourceModel for Source {
    fn next_state(&mut self, rng: &mut StdRng) -> SourceState {
        let pulse_energy = self
            .pulse_energy_variation
            .sample(self.pulse_energy, rng)
            .max(0.0);
        SourceState {
            wavelength: self.wavelength,
            pulse_energy,
            polarization: self.polarization,
        }
    }

    fn intensity(&self, position: [f64; 3], pulse_energy: f64) -> f64 {
        let photons = pulse_energy / self.photon_energy();
        let r2 = position[0] * position[0] + position[1] * position[1];
        match self.profile {
            FocusProfile::TopHat => {
                let radius = self.focus_diameter / 2.0;
                if r2 <= radius * radius {
                    photons / (std::f64::consts::PI * radius * radius)
                } else {
                    0.0
                }
            }
            FocusProfile::Gaussian => {
                let sigma = self.focus_diameter / (2.0 * (2.0 * std::f64::consts::LN_2).sqrt());
                let two_sigma2 = 2.0 * sigma * sigma;
                photons / (std::f64::consts::PI * two_sigma2) * (-r2 / two_sigma2).exp()
            }
        }
    }
}
