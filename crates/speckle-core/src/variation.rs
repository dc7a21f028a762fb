//! Shot-to-shot variation of scalar parameters.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Variation {
    #[default]
    None,
    /// Gaussian with standard deviation `spread`.
    Normal { spread: f64 },
    /// Uniform on `[mean - spread/2, mean + spread/2]`.
    Uniform { spread: f64 },
}

impl Variation {
    pub fn sample<R: Rng + ?Sized>(&self, mean: f64, rng: &mut R) -> f64 {
        match *self {
            Variation::None => mean,
            Variation::Normal { spread } => match Normal::new(mean, spread.abs()) {
                Ok(dist) => dist.sample(rng),
                Err(_) => mean,
            },
            Variation::Uniform { spread } => {
                if spread == 0.0 {
                    mean
                } else {
                    mean + spread.abs() * (rng.gen::<f64>() - 0.5)
                }
            }
        }
    }

    /// Draw a strictly positive value, redrawing non-positive samples.
    pub fn sample_positive<R: Rng + ?Sized>(&self, mean: f64, rng: &mut R) -> f64 {
        for _ in 0..1000 {
            let v = self.sample(mean, rng);
            if v > 0.0 {
                return v;
            }
        }
        mean
    }
}
