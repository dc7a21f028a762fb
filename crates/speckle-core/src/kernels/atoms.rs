//! Interface to an external atomistic scattering simulator.
//!
//! The engine never computes atomistic patterns itself. It packages the shot
//! into an [`AtomsRequest`], hands it to whatever [`AtomisticSimulator`] was
//! installed, and checks the [`AtomsResponse`] against the requested
//! geometry. Unlike the other kernels, the simulator also decides the
//! coordinate field, which the engine registers in its qmap cache.

use ndarray::{ArrayD, IxDyn};
use num_complex::Complex64;
use serde::Serialize;
use thiserror::Error;

use crate::propagation::PropagationError;
use crate::rotation::Rotation;
use crate::types::{AxisOrder, DetectorState, Dimensionality, Polarization};

/// Oldest simulator interface the engine can talk to.
pub const MIN_SIMULATOR_VERSION: &str = "0.1.0";

#[derive(Debug, Error)]
pub enum AtomisticError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Simulation failed: {0}")]
    Failed(String),
}

/// Where the simulator should evaluate the pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AtomsGeometry {
    /// Every pixel of the request's detector, field shape `(ny, nx)`.
    Detector,
    /// A cubic grid spanning `±qmax`, field shape `(qn, qn, qn)`.
    Volume { qn: usize, qmax: f64 },
}

impl AtomsGeometry {
    pub fn dimensionality(&self) -> Dimensionality {
        match self {
            AtomsGeometry::Detector => Dimensionality::Two,
            AtomsGeometry::Volume { .. } => Dimensionality::Three,
        }
    }
}

/// Everything a simulator needs for one particle in one shot.
#[derive(Debug, Clone, Serialize)]
pub struct AtomsRequest {
    pub wavelength: f64,
    /// Photon fluence at the particle (photons/m²).
    pub fluence: f64,
    pub polarization: Polarization,
    pub atomic_numbers: Vec<u32>,
    /// Positions in metres; not necessarily centred.
    pub positions: Vec<[f64; 3]>,
    /// Optional per-atom Cromer–Mann coefficients.
    pub form_factors: Option<Vec<[f64; 9]>>,
    pub rotation: Option<Rotation>,
    pub detector: DetectorState,
    pub geometry: AtomsGeometry,
}

/// What a simulator returns.
#[derive(Debug, Clone)]
pub struct AtomsResponse {
    /// Complex amplitude, already scaled to the detector (photons^½).
    pub amplitude: ArrayD<Complex64>,
    /// Coordinate field the amplitude was evaluated on, shape `(..., 3)`.
    pub qmap: ArrayD<f64>,
    pub axis_order: AxisOrder,
}

/// A blocking, non-reentrant atomistic scattering simulator.
pub trait AtomisticSimulator: Send {
    /// Interface version as `major.minor.patch`.
    fn version(&self) -> &str;

    fn simulate(&mut self, request: &AtomsRequest) -> Result<AtomsResponse, AtomisticError>;
}

fn parse_version(v: &str) -> Option<(u64, u64, u64)> {
    let mut parts = v.trim().split('.').map(|p| p.parse::<u64>().ok());
    let major = parts.next()??;
    let minor = parts.next().unwrap_or(Some(0))?;
    let patch = parts.next().unwrap_or(Some(0))?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

/// Fail unless `simulator` reports at least [`MIN_SIMULATOR_VERSION`].
pub fn check_version(simulator: &dyn AtomisticSimulator) -> Result<(), PropagationError> {
    let found = simulator.version();
    let too_old = || PropagationError::AtomisticVersionTooOld {
        found: found.to_string(),
        minimum: MIN_SIMULATOR_VERSION.to_string(),
    };
    let have = parse_version(found).ok_or_else(too_old)?;
    let need = parse_version(MIN_SIMULATOR_VERSION).ok_or_else(too_old)?;
    if have < need {
        return Err(too_old());
    }
    Ok(())
}

/// Expected amplitude-field shape for a request.
pub fn expected_shape(request: &AtomsRequest) -> Vec<usize> {
    match request.geometry {
        AtomsGeometry::Detector => vec![request.detector.ny, request.detector.nx],
        AtomsGeometry::Volume { qn, .. } => vec![qn, qn, qn],
    }
}

/// Check a response against its request.
pub fn validate_response(request: &AtomsRequest, response: &AtomsResponse) -> Result<(), PropagationError> {
    let expected = expected_shape(request);
    if response.amplitude.shape() != expected.as_slice() {
        return Err(PropagationError::InvalidAtomisticResponse(format!(
            "amplitude shape {:?}, expected {:?}",
            response.amplitude.shape(),
            expected
        )));
    }
    let mut qmap_shape = expected;
    qmap_shape.push(3);
    if response.qmap.shape() != qmap_shape.as_slice() {
        return Err(PropagationError::InvalidAtomisticResponse(format!(
            "coordinate field shape {:?}, expected {:?}",
            response.qmap.shape(),
            qmap_shape
        )));
    }
    Ok(())
}

/// Convenience constructor for an empty field of the requested shape.
pub fn zero_amplitude(request: &AtomsRequest) -> ArrayD<Complex64> {
    ArrayD::zeros(IxDyn(&expected_shape(request)))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Versioned(&'static str);

    impl AtomisticSimulator for Versioned {
        fn version(&self) -> &str {
            self.0
        }

        fn simulate(&mut self, _request: &AtomsRequest) -> Result<AtomsResponse, AtomisticError> {
            Err(AtomisticError::Failed("not used".into()))
        }
    }

    #[test]
    fn test_version_check() {
        assert!(check_version(&Versioned("0.1.0")).is_ok());
        assert!(check_version(&Versioned("0.2")).is_ok());
        assert!(check_version(&Versioned("1.0.3")).is_ok());
        assert!(matches!(
            check_version(&Versioned("0.0.9")),
            Err(PropagationError::AtomisticVersionTooOld { .. })
        ));
        assert!(check_version(&Versioned("latest")).is_err());
        assert!(check_version(&Versioned("")).is_err());
    }

    #[test]
    fn test_response_shape_validation() {
        let request = AtomsRequest {
            wavelength: 1e-10,
            fluence: 1e20,
            polarization: Polarization::Ignore,
            atomic_numbers: vec![6],
            positions: vec![[0.0; 3]],
            form_factors: None,
            rotation: None,
            detector: DetectorState {
                nx: 4,
                ny: 3,
                cx: 1.5,
                cy: 1.0,
                pixel_size: 1e-4,
                distance: 0.1,
                solid_angle_correction: false,
                binning: None,
            },
            geometry: AtomsGeometry::Detector,
        };
        let good = AtomsResponse {
            amplitude: zero_amplitude(&request),
            qmap: ArrayD::zeros(IxDyn(&[3, 4, 3])),
            axis_order: AxisOrder::Zyx,
        };
        assert!(validate_response(&request, &good).is_ok());

        let bad = AtomsResponse {
            qmap: ArrayD::zeros(IxDyn(&[4, 3, 3])),
            ..good
        };
        assert!(matches!(
            validate_response(&request, &bad),
            Err(PropagationError::InvalidAtomisticResponse(_))
        ));
    }
}
