//! Photon detection: noise, saturation and pixel masks.
//!
//! Mask bits follow the CXI convention; `0` is a good pixel.

use ndarray::{Array2, ArrayD};
use rand::Rng;
use rand_distr::{Distribution, Normal, Poisson};
use serde::{Deserialize, Serialize};

/// Pixel-mask bits.
pub struct PixelMask;

impl PixelMask {
    pub const INVALID: u16 = 1;
    pub const SATURATED: u16 = 2;
    pub const HOT: u16 = 4;
    pub const DEAD: u16 = 8;
    pub const SHADOWED: u16 = 16;
    pub const IN_PEAKMASK: u16 = 32;
    pub const TO_BE_IGNORED: u16 = 64;
    pub const BAD: u16 = 128;
    pub const OUT_OF_RESOLUTION_LIMITS: u16 = 256;
    pub const MISSING: u16 = 512;
    pub const NOISY: u16 = 1024;

    /// Union of all bits that make a pixel unusable.
    pub const IN_MASK: u16 = Self::INVALID
        | Self::SATURATED
        | Self::HOT
        | Self::DEAD
        | Self::SHADOWED
        | Self::IN_PEAKMASK
        | Self::TO_BE_IGNORED
        | Self::BAD
        | Self::OUT_OF_RESOLUTION_LIMITS
        | Self::MISSING
        | Self::NOISY;
}

/// Read-out statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoiseModel {
    /// Expected photon counts, no sampling.
    #[default]
    None,
    Poisson,
    /// Gaussian noise of absolute standard deviation `spread` (photons),
    /// clipped at zero.
    Normal { spread: f64 },
    /// Poisson sampling followed by Gaussian read-out noise, rounded to
    /// whole photons and clipped at zero.
    NormalPoisson { spread: f64 },
}

fn poisson_sample<R: Rng + ?Sized>(lambda: f64, rng: &mut R) -> f64 {
    if lambda <= 0.0 {
        return 0.0;
    }
    match Poisson::new(lambda) {
        Ok(dist) => dist.sample(rng),
        Err(_) => lambda,
    }
}

fn normal_sample<R: Rng + ?Sized>(mean: f64, spread: f64, rng: &mut R) -> f64 {
    match Normal::new(mean, spread.abs()) {
        Ok(dist) => dist.sample(rng),
        Err(_) => mean,
    }
}

impl NoiseModel {
    pub fn sample<R: Rng + ?Sized>(&self, expected: f64, rng: &mut R) -> f64 {
        match self {
            NoiseModel::None => expected,
            NoiseModel::Poisson => poisson_sample(expected, rng),
            NoiseModel::Normal { spread } => normal_sample(expected, *spread, rng).max(0.0),
            NoiseModel::NormalPoisson { spread } => {
                normal_sample(poisson_sample(expected, rng), *spread, rng).round().max(0.0)
            }
        }
    }
}

/// Convert expected photon counts to measured counts and a mask.
///
/// Non-finite inputs count as zero photons and are flagged `INVALID`;
/// counts above `saturation` are clipped and flagged `SATURATED`. Bits of
/// `static_mask`, when its shape matches, are OR-ed into the result.
pub fn detect_photons<R: Rng + ?Sized>(
    intensity: &ArrayD<f64>,
    noise: &NoiseModel,
    saturation: Option<f64>,
    static_mask: Option<&ArrayD<u16>>,
    rng: &mut R,
) -> (ArrayD<f64>, ArrayD<u16>) {
    let mut mask = match static_mask {
        Some(m) if m.shape() == intensity.shape() => m.clone(),
        _ => ArrayD::zeros(intensity.raw_dim()),
    };
    let mut counts = ArrayD::zeros(intensity.raw_dim());
    for ((out, m), &expected) in counts.iter_mut().zip(mask.iter_mut()).zip(intensity.iter()) {
        if !expected.is_finite() {
            *m |= PixelMask::INVALID;
            *out = 0.0;
            continue;
        }
        let mut value = noise.sample(expected, rng);
        if let Some(level) = saturation {
            if value > level {
                value = level;
                *m |= PixelMask::SATURATED;
            }
        }
        *out = value;
    }
    (counts, mask)
}

/// Static detector mask: horizontal/vertical gaps through the beam centre
/// and a circular central hole, all flagged `MISSING`. Sizes are in pixels.
pub fn gap_and_hole_mask(
    nx: usize,
    ny: usize,
    cx: f64,
    cy: f64,
    x_gap: f64,
    y_gap: f64,
    hole_diameter: f64,
) -> Array2<u16> {
    Array2::from_shape_fn((ny, nx), |(iy, ix)| {
        let dx = ix as f64 - cx;
        let dy = iy as f64 - cy;
        let in_x_gap = x_gap > 0.0 && dx.abs() < x_gap / 2.0;
        let in_y_gap = y_gap > 0.0 && dy.abs() < y_gap / 2.0;
        let in_hole = hole_diameter > 0.0 && (dx * dx + dy * dy).sqrt() < hole_diameter / 2.0;
        if in_x_gap || in_y_gap || in_hole {
            PixelMask::MISSING
        } else {
            0
        }
    })
}
