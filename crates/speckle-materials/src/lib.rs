//! # Speckle Materials
//!
//! Material property providers for the Speckle diffraction engine. Hard
//! X-ray scattering from soft matter is governed by the refractive-index
//! decrement $\Delta n = 1 - \tilde{n} = \delta + i\beta$, which every material
//! exposes through the [`MaterialProvider`](provider::MaterialProvider) trait.
//!
//! ## Available data sources
//!
//! | Source | Module | Notes |
//! |--------|--------|-------|
//! | Explicit $\delta + i\beta$ | [`material`] | Wavelength independent |
//! | Atomic composition + mass density | [`material`] | Forward scattering, no anomalous dispersion |
//! | Element table (Z, weight, Cromer–Mann) | [`elements`] | H, C, N, O, P, S, Fe, Au |

pub mod elements;
pub mod material;
pub mod provider;

pub use elements::{Element, ELEMENTS};
pub use material::Material;
pub use provider::{MaterialError, MaterialProvider};

/// Classical electron radius $r_e$ in metres.
pub const ELECTRON_RADIUS: f64 = 2.8179403262e-15;

/// Atomic mass constant in kg.
pub const ATOMIC_MASS_UNIT: f64 = 1.66053906660e-27;
