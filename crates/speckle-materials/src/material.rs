//! Materials described either by an explicit refractive-index decrement or by
//! their atomic composition and mass density.
//!
//! Far from absorption edges the decrement of a compound follows from its
//! electron number density $n_e$:
//!
//! $$ \Delta n = \frac{r_e \lambda^2}{2\pi} \, n_e, \qquad n_e = \frac{\rho}{\sum_j c_j m_j} \sum_j c_j Z_j $$
//!
//! where $c_j$ are the relative atom counts of the formula unit, $m_j$ the
//! atomic masses and $\rho$ the mass density. Anomalous dispersion is not
//! modelled, so $\beta = 0$ for composition-based materials.

use std::collections::BTreeMap;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::elements::Element;
use crate::provider::{MaterialError, MaterialProvider};
use crate::{ATOMIC_MASS_UNIT, ELECTRON_RADIUS};

/// A scattering material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Material {
    /// Wavelength-independent decrement $\delta + i\beta$.
    Decrement { delta: f64, beta: f64 },
    /// Relative atom counts per formula unit and mass density in kg/m³.
    Composition {
        atomic_composition: BTreeMap<String, f64>,
        mass_density: f64,
    },
    /// One of the named presets, see [`Material::PRESETS`].
    Preset { name: String },
}

struct PresetData {
    name: &'static str,
    composition: &'static [(&'static str, f64)],
    mass_density: f64,
}

const PRESET_TABLE: &[PresetData] = &[
    PresetData {
        name: "protein",
        composition: &[("H", 86.0), ("C", 52.0), ("N", 13.0), ("O", 15.0), ("S", 0.3)],
        mass_density: 1350.0,
    },
    PresetData {
        name: "virus",
        composition: &[
            ("H", 72.43),
            ("C", 47.52),
            ("N", 13.55),
            ("O", 17.17),
            ("S", 1.03),
            ("P", 0.86),
        ],
        mass_density: 1455.0,
    },
    PresetData {
        name: "cell",
        composition: &[("H", 23.0), ("C", 3.0), ("N", 1.0), ("O", 10.0), ("S", 1.0)],
        mass_density: 1000.0,
    },
    PresetData {
        name: "latex",
        composition: &[("H", 1.0), ("C", 1.0)],
        mass_density: 1050.0,
    },
    PresetData {
        name: "water",
        composition: &[("H", 2.0), ("O", 1.0)],
        mass_density: 995.0,
    },
    PresetData {
        name: "dna",
        composition: &[("H", 11.0), ("C", 10.0), ("N", 4.0), ("O", 6.0), ("P", 1.0)],
        mass_density: 1700.0,
    },
    PresetData {
        name: "lipid",
        composition: &[("H", 69.0), ("C", 36.0), ("O", 6.0), ("P", 1.0)],
        mass_density: 1000.0,
    },
    PresetData {
        name: "sucrose",
        composition: &[("C", 12.0), ("H", 22.0), ("O", 11.0)],
        mass_density: 1587.0,
    },
    PresetData {
        name: "gold",
        composition: &[("Au", 1.0)],
        mass_density: 19300.0,
    },
];

impl Material {
    /// Names accepted by [`Material::Preset`].
    pub const PRESETS: [&'static str; 9] = [
        "protein", "virus", "cell", "latex", "water", "dna", "lipid", "sucrose", "gold",
    ];

    /// Build a named preset as an explicit composition.
    pub fn preset(name: &str) -> Result<Self, MaterialError> {
        let data = PRESET_TABLE
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| MaterialError::NotFound(name.to_string()))?;
        Ok(Material::Composition {
            atomic_composition: data
                .composition
                .iter()
                .map(|(s, c)| (s.to_string(), *c))
                .collect(),
            mass_density: data.mass_density,
        })
    }

    /// Resolve presets into their composition; other variants are returned as is.
    pub fn resolved(&self) -> Result<Material, MaterialError> {
        match self {
            Material::Preset { name } => Material::preset(name),
            other => Ok(other.clone()),
        }
    }

    /// Electron number density in m⁻³, if the material is composition based.
    pub fn electron_density(&self) -> Result<Option<f64>, MaterialError> {
        match self.resolved()? {
            Material::Decrement { .. } => Ok(None),
            Material::Composition {
                atomic_composition,
                mass_density,
            } => composition_electron_density(&atomic_composition, mass_density).map(Some),
            Material::Preset { name } => Err(MaterialError::NotFound(name)),
        }
    }
}

fn composition_electron_density(
    composition: &BTreeMap<String, f64>,
    mass_density: f64,
) -> Result<f64, MaterialError> {
    if composition.is_empty() {
        return Err(MaterialError::DataError("empty atomic composition".into()));
    }
    let mut unit_mass = 0.0;
    let mut unit_electrons = 0.0;
    for (symbol, count) in composition {
        if *count < 0.0 || !count.is_finite() {
            return Err(MaterialError::DataError(format!(
                "invalid atom count {count} for {symbol}"
            )));
        }
        let element = Element::from_symbol(symbol)?;
        unit_mass += count * element.mass * ATOMIC_MASS_UNIT;
        unit_electrons += count * element.z as f64;
    }
    if unit_mass <= 0.0 {
        return Err(MaterialError::DataError("formula unit has zero mass".into()));
    }
    Ok(mass_density / unit_mass * unit_electrons)
}

impl MaterialProvider for Material {
    fn name(&self) -> &str {
        match self {
            Material::Decrement { .. } => "decrement",
            Material::Composition { .. } => "composition",
            Material::Preset { name } => name,
        }
    }

    fn refractive_index_decrement(&self, wavelength: f64) -> Result<Complex64, MaterialError> {
        if !(wavelength.is_finite() && wavelength > 0.0) {
            return Err(MaterialError::InvalidWavelength(wavelength));
        }
        match self {
            Material::Decrement { delta, beta } => Ok(Complex64::new(*delta, *beta)),
            _ => {
                let n_e = self.electron_density()?.unwrap_or(0.0);
                let delta =
                    ELECTRON_RADIUS * wavelength * wavelength / (2.0 * std::f64::consts::PI) * n_e;
                Ok(Complex64::new(delta, 0.0))
            }
        }
    }
}
