//! Element table: atomic numbers, standard atomic weights and Cromer–Mann
//! coefficients for the elements found in biological samples and common
//! calibration particles.
//!
//! Cromer–Mann coefficients are stored as `[a1, b1, a2, b2, a3, b3, a4, b4, c]`
//! and parameterise the non-dispersive atomic form factor
//!
//! $$ f_0(s) = \sum_{i=1}^{4} a_i \exp(-b_i s^2) + c, \qquad s = \frac{\sin\theta}{\lambda} = \frac{|q|}{4\pi} $$
//!
//! with $s$ in Å⁻¹.

use crate::provider::MaterialError;

/// One entry of the element table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Element {
    pub z: u32,
    pub symbol: &'static str,
    /// Standard atomic weight in atomic mass units.
    pub mass: f64,
    pub cromer_mann: [f64; 9],
}

pub const ELEMENTS: [Element; 8] = [
    Element {
        z: 1,
        symbol: "H",
        mass: 1.008,
        cromer_mann: [
            0.489918, 20.6593, 0.262003, 7.74039, 0.196767, 49.5519, 0.049879, 2.20159, 0.001305,
        ],
    },
    Element {
        z: 6,
        symbol: "C",
        mass: 12.011,
        cromer_mann: [2.31, 20.8439, 1.02, 10.2075, 1.5886, 0.5687, 0.865, 51.6512, 0.2156],
    },
    Element {
        z: 7,
        symbol: "N",
        mass: 14.007,
        cromer_mann: [12.2126, 0.0057, 3.1322, 9.8933, 2.0125, 28.9975, 1.1663, 0.5826, -11.529],
    },
    Element {
        z: 8,
        symbol: "O",
        mass: 15.999,
        cromer_mann: [3.0485, 13.2771, 2.2868, 5.7011, 1.5463, 0.3239, 0.867, 32.9089, 0.2508],
    },
    Element {
        z: 15,
        symbol: "P",
        mass: 30.974,
        cromer_mann: [6.4345, 1.9067, 4.1791, 27.157, 1.78, 0.526, 1.4908, 68.1645, 1.1149],
    },
    Element {
        z: 16,
        symbol: "S",
        mass: 32.06,
        cromer_mann: [6.9053, 1.4679, 5.2034, 22.2151, 1.4379, 0.2536, 1.5863, 56.172, 0.8669],
    },
    Element {
        z: 26,
        symbol: "Fe",
        mass: 55.845,
        cromer_mann: [
            11.7695, 4.7611, 7.3573, 0.3072, 3.5222, 15.3535, 2.3045, 76.8805, 1.0369,
        ],
    },
    Element {
        z: 79,
        symbol: "Au",
        mass: 196.967,
        cromer_mann: [
            16.8819, 0.4611, 18.5913, 8.6216, 25.5582, 1.4826, 5.86, 36.3956, 12.0658,
        ],
    },
];

impl Element {
    /// Look up an element by its symbol (case-insensitive).
    pub fn from_symbol(symbol: &str) -> Result<&'static Element, MaterialError> {
        let symbol = symbol.trim();
        ELEMENTS
            .iter()
            .find(|e| e.symbol.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| MaterialError::UnknownElement(symbol.to_string()))
    }

    /// Look up an element by atomic number.
    pub fn from_z(z: u32) -> Result<&'static Element, MaterialError> {
        ELEMENTS
            .iter()
            .find(|e| e.z == z)
            .ok_or_else(|| MaterialError::UnknownElement(format!("Z = {z}")))
    }

    /// Atomic form factor $f_0(s)$ in electrons, `s` in Å⁻¹.
    pub fn form_factor(&self, s: f64) -> f64 {
        cromer_mann_form_factor(&self.cromer_mann, s)
    }
}

/// Evaluate a Cromer–Mann parameterisation at `s = sinθ/λ` (Å⁻¹).
pub fn cromer_mann_form_factor(c: &[f64; 9], s: f64) -> f64 {
    let s2 = s * s;
    c[0] * (-c[1] * s2).exp()
        + c[2] * (-c[3] * s2).exp()
        + c[4] * (-c[5] * s2).exp()
        + c[6] * (-c[7] * s2).exp()
        + c[8]
}
