//! Material property provider trait.
//!
//! All material data sources implement [`MaterialProvider`], which returns the
//! complex refractive-index decrement at a given X-ray wavelength.

use num_complex::Complex64;
use thiserror::Error;

/// Errors from material providers.
#[derive(Debug, Error)]
pub enum MaterialError {
    #[error("Material not found: {0}")]
    NotFound(String),

    #[error("Unknown element: {0}")]
    UnknownElement(String),

    #[error("Invalid wavelength {0} m (must be finite and positive)")]
    InvalidWavelength(f64),

    #[error("Data error: {0}")]
    DataError(String),
}

/// Provides wavelength-dependent refractive-index decrements.
pub trait MaterialProvider: Send + Sync {
    /// Human-readable name of this material.
    fn name(&self) -> &str;

    /// Complex refractive-index decrement $\Delta n = \delta + i\beta$ at a
    /// wavelength given in metres.
    fn refractive_index_decrement(&self, wavelength: f64) -> Result<Complex64, MaterialError>;

    /// Complex refractive index $\tilde{n} = 1 - \delta - i\beta$.
    ///
    /// Default implementation derives from the decrement.
    fn refractive_index(&self, wavelength: f64) -> Result<Complex64, MaterialError> {
        let dn = self.refractive_index_decrement(wavelength)?;
        Ok(Complex64::new(1.0, 0.0) - dn)
    }
}
