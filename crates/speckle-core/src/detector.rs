//! Pixel detector model.
//!
//! [`Detector`] is the reference [`DetectorModel`]: a flat, rectangular
//! pixel array perpendicular to the beam with an optional static mask
//! (gaps through the beam centre and a central hole), a noise model and a
//! saturation level.

use ndarray::{Array2, ArrayD, Ix2};
use num_complex::Complex64;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::binning::{bin_amplitude, bin_intensity};
use crate::detection::{self, gap_and_hole_mask, NoiseModel, PixelMask};
use crate::propagation::PropagationError;
use crate::types::DetectorState;

/// Minimum number of usable fine pixels for a binned pixel to be valid.
pub const MIN_VALID_PIXELS: usize = 1;

/// Detector consulted by the engine once per shot.
pub trait DetectorModel: Send {
    fn next_state(&mut self, rng: &mut StdRng) -> DetectorState;

    /// Expected photon counts to measured counts plus a pixel mask.
    fn detect_photons(&self, intensity: &ArrayD<f64>, rng: &mut StdRng) -> (ArrayD<f64>, ArrayD<u16>);

    fn binning(&self) -> Option<usize>;

    /// Bin a 2-D frame and its mask; `None` without binning.
    fn bin_photons(
        &self,
        counts: &ArrayD<f64>,
        mask: &ArrayD<u16>,
    ) -> Result<Option<(Array2<f64>, Array2<u16>)>, PropagationError> {
        let Some(factor) = self.binning() else {
            return Ok(None);
        };
        let counts = counts.view().into_dimensionality::<Ix2>()?;
        let mask = mask.view().into_dimensionality::<Ix2>()?;
        Ok(Some(bin_intensity(
            &counts,
            &mask,
            factor,
            PixelMask::IN_MASK,
            MIN_VALID_PIXELS,
        )))
    }

    /// Bin a 2-D complex amplitude consistently with [`DetectorModel::bin_photons`].
    fn bin_fourier(
        &self,
        fourier: &ArrayD<Complex64>,
        mask: &ArrayD<u16>,
    ) -> Result<Option<(Array2<Complex64>, Array2<u16>)>, PropagationError> {
        let Some(factor) = self.binning() else {
            return Ok(None);
        };
        let fourier = fourier.view().into_dimensionality::<Ix2>()?;
        let mask = mask.view().into_dimensionality::<Ix2>()?;
        Ok(Some(bin_amplitude(
            &fourier,
            &mask,
            factor,
            PixelMask::IN_MASK,
            MIN_VALID_PIXELS,
        )))
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detector {
    /// Sample-to-detector distance (m).
    pub distance: f64,
    /// Pixel edge length (m).
    pub pixel_size: f64,
    pub nx: usize,
    pub ny: usize,
    /// Beam centre in pixels; the array centre when unset.
    #[serde(default)]
    pub cx: Option<f64>,
    #[serde(default)]
    pub cy: Option<f64>,
    #[serde(default)]
    pub binning: Option<usize>,
    #[serde(default = "default_true")]
    pub solid_angle_correction: bool,
    #[serde(default)]
    pub noise: NoiseModel,
    /// Photon count at which pixels saturate.
    #[serde(default)]
    pub saturation: Option<f64>,
    /// Width of the horizontal gap in pixels.
    #[serde(default)]
    pub x_gap: f64,
    #[serde(default)]
    pub y_gap: f64,
    #[serde(default)]
    pub hole_diameter: f64,
}

impl Detector {
    pub fn new(distance: f64, pixel_size: f64, nx: usize, ny: usize) -> Result<Self, PropagationError> {
        let detector = Self {
            distance,
            pixel_size,
            nx,
            ny,
            cx: None,
            cy: None,
            binning: None,
            solid_angle_correction: true,
            noise: NoiseModel::None,
            saturation: None,
            x_gap: 0.0,
            y_gap: 0.0,
            hole_diameter: 0.0,
        };
        detector.validate()?;
        Ok(detector)
    }

    pub fn with_centre(mut self, cx: f64, cy: f64) -> Self {
        self.cx = Some(cx);
        self.cy = Some(cy);
        self
    }

    pub fn with_binning(mut self, factor: usize) -> Self {
        self.binning = Some(factor);
        self
    }

    pub fn with_solid_angle_correction(mut self, enabled: bool) -> Self {
        self.solid_angle_correction = enabled;
        self
    }

    pub fn with_noise(mut self, noise: NoiseModel) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_saturation(mut self, level: f64) -> Self {
        self.saturation = Some(level);
        self
    }

    pub fn with_gaps(mut self, x_gap: f64, y_gap: f64) -> Self {
        self.x_gap = x_gap;
        self.y_gap = y_gap;
        self
    }

    pub fn with_hole(mut self, diameter: f64) -> Self {
        self.hole_diameter = diameter;
        self
    }

    pub fn state(&self) -> DetectorState {
        DetectorState {
            nx: self.nx,
            ny: self.ny,
            cx: self.cx.unwrap_or((self.nx as f64 - 1.0) / 2.0),
            cy: self.cy.unwrap_or((self.ny as f64 - 1.0) / 2.0),
            pixel_size: self.pixel_size,
            distance: self.distance,
            solid_angle_correction: self.solid_angle_correction,
            binning: self.binning,
        }
    }

    pub fn validate(&self) -> Result<(), PropagationError> {
        self.state().validate()?;
        if let Some(level) = self.saturation {
            if !(level > 0.0) {
                return Err(PropagationError::InvalidParameter(format!(
                    "saturation level must be positive, got {level}"
                )));
            }
        }
        Ok(())
    }

    /// Static gap/hole mask, if any is configured.
    pub fn static_mask(&self) -> Option<Array2<u16>> {
        if self.x_gap <= 0.0 && self.y_gap <= 0.0 && self.hole_diameter <= 0.0 {
            return None;
        }
        let state = self.state();
        Some(gap_and_hole_mask(
            self.nx,
            self.ny,
            state.cx,
            state.cy,
            self.x_gap,
            self.y_gap,
            self.hole_diameter,
        ))
    }
}

impl DetectorModel for Detector {
    fn next_state(&mut self, _rng: &mut StdRng) -> DetectorState {
        self.state()
    }

    fn detect_photons(&self, intensity: &ArrayD<f64>, rng: &mut StdRng) -> (ArrayD<f64>, ArrayD<u16>) {
        // Only a detector-plane frame can carry the static mask.
        let static_mask = self.static_mask().map(|m| m.into_dyn());
        detection::detect_photons(intensity, &self.noise, self.saturation, static_mask.as_ref(), rng)
    }

    fn binning(&self) -> Option<usize> {
        self.binning
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;
    use rand::SeedableRng;

    #[test]
    fn test_default_centre() {
        let d = Detector::new(0.1, 100e-6, 4, 5).unwrap();
        let s = d.state();
        assert_eq!(s.cx, 1.5);
        assert_eq!(s.cy, 2.0);
        assert!(s.solid_angle_correction);
        assert!(Detector::new(0.1, 0.0, 4, 4).is_err());
    }

    #[test]
    fn test_static_mask_applies_to_frames_only() {
        let d = Detector::new(0.1, 100e-6, 8, 8).unwrap().with_hole(3.0);
        let mut rng = StdRng::seed_from_u64(1);
        let (_, mask) = d.detect_photons(&ArrayD::from_elem(IxDyn(&[8, 8]), 1.0), &mut rng);
        assert_eq!(mask[[4, 4]] & PixelMask::MISSING, PixelMask::MISSING);
        assert_eq!(mask[[0, 0]], 0);

        let (_, mask3) = d.detect_photons(&ArrayD::from_elem(IxDyn(&[8, 8, 8]), 1.0), &mut rng);
        assert!(mask3.iter().all(|&m| m == 0));
    }

    #[test]
    fn test_bin_photons() {
        let d = Detector::new(0.1, 100e-6, 4, 4).unwrap().with_binning(2);
        let counts = ArrayD::from_elem(IxDyn(&[4, 4]), 1.0);
        let mask = ArrayD::zeros(IxDyn(&[4, 4]));
        let (binned, bmask) = d.bin_photons(&counts, &mask).unwrap().unwrap();
        assert_eq!(binned.dim(), (2, 2));
        assert!(binned.iter().all(|&v| v == 4.0));
        assert!(bmask.iter().all(|&m| m == 0));

        let unbinned = Detector::new(0.1, 100e-6, 4, 4).unwrap();
        assert!(unbinned.bin_photons(&counts, &mask).unwrap().is_none());
    }
}
