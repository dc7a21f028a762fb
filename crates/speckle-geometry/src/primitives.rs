//! Particle bodies used to build electron-density maps.
//!
//! Every body is centred at the origin of its own frame and sized by the
//! diameter `d` of the sphere with the same volume, so that swapping the
//! shape of a particle leaves its total scattering power unchanged.

use serde::{Deserialize, Serialize};

use crate::GeometryError;

/// Edge length of a regular icosahedron of unit volume-equivalent diameter.
///
/// $V = \tfrac{5}{12}(3+\sqrt{5})\,a^3 = \tfrac{\pi}{6} d^3$
const ICOSAHEDRON_VOLUME_FACTOR: f64 = 2.181_694_990_624_912;

/// A closed body centred at the origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Body {
    Sphere {
        diameter: f64,
    },
    /// Rotationally symmetric about the body-frame y axis.
    Spheroid {
        diameter: f64,
        flattening: f64,
    },
    Cube {
        diameter: f64,
    },
    Icosahedron {
        diameter: f64,
    },
}

/// Semi-axes `(a, c)` of a spheroid with volume-equivalent diameter `d` and
/// flattening `f = c / a`; `a` is equatorial, `c` polar.
pub fn spheroid_semi_axes(diameter: f64, flattening: f64) -> (f64, f64) {
    let r = diameter / 2.0;
    (r * flattening.powf(-1.0 / 3.0), r * flattening.powf(2.0 / 3.0))
}

impl Body {
    pub fn diameter(&self) -> f64 {
        match self {
            Body::Sphere { diameter }
            | Body::Spheroid { diameter, .. }
            | Body::Cube { diameter }
            | Body::Icosahedron { diameter } => *diameter,
        }
    }

    /// The same shape at a different volume-equivalent diameter.
    pub fn with_diameter(&self, diameter: f64) -> Body {
        match *self {
            Body::Sphere { .. } => Body::Sphere { diameter },
            Body::Spheroid { flattening, .. } => Body::Spheroid {
                diameter,
                flattening,
            },
            Body::Cube { .. } => Body::Cube { diameter },
            Body::Icosahedron { .. } => Body::Icosahedron { diameter },
        }
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        let d = self.diameter();
        if !(d.is_finite() && d > 0.0) {
            return Err(GeometryError::InvalidParameter(format!(
                "body diameter must be positive, got {d}"
            )));
        }
        if let Body::Spheroid { flattening, .. } = self {
            if !(flattening.is_finite() && *flattening > 0.0) {
                return Err(GeometryError::InvalidParameter(format!(
                    "spheroid flattening must be positive, got {flattening}"
                )));
            }
        }
        Ok(())
    }

    /// Volume in m³; identical for all shapes of the same diameter.
    pub fn volume(&self) -> f64 {
        std::f64::consts::PI / 6.0 * self.diameter().powi(3)
    }

    /// Radius of the smallest origin-centred sphere enclosing the body.
    pub fn bounding_radius(&self) -> f64 {
        match self {
            Body::Sphere { diameter } => diameter / 2.0,
            Body::Spheroid {
                diameter,
                flattening,
            } => {
                let (a, c) = spheroid_semi_axes(*diameter, *flattening);
                a.max(c)
            }
            Body::Cube { diameter } => cube_edge(*diameter) * 3f64.sqrt() / 2.0,
            Body::Icosahedron { diameter } => {
                icosahedron_edge(*diameter) * (2.0 * std::f64::consts::PI / 5.0).sin()
            }
        }
    }

    /// Check whether a point (body frame, metres) lies inside the body.
    pub fn contains(&self, p: &[f64; 3]) -> bool {
        match self {
            Body::Sphere { diameter } => {
                let r = diameter / 2.0;
                p[0] * p[0] + p[1] * p[1] + p[2] * p[2] <= r * r
            }
            Body::Spheroid {
                diameter,
                flattening,
            } => {
                let (a, c) = spheroid_semi_axes(*diameter, *flattening);
                (p[0] * p[0] + p[2] * p[2]) / (a * a) + p[1] * p[1] / (c * c) <= 1.0
            }
            Body::Cube { diameter } => {
                let h = cube_edge(*diameter) / 2.0;
                p.iter().all(|x| x.abs() <= h)
            }
            Body::Icosahedron { diameter } => {
                let inradius = icosahedron_inradius(icosahedron_edge(*diameter));
                icosahedron_face_normals()
                    .iter()
                    .all(|n| n[0] * p[0] + n[1] * p[1] + n[2] * p[2] <= inradius)
            }
        }
    }
}

fn cube_edge(diameter: f64) -> f64 {
    diameter * (std::f64::consts::PI / 6.0).cbrt()
}

fn icosahedron_edge(diameter: f64) -> f64 {
    diameter * (std::f64::consts::PI / 6.0 / ICOSAHEDRON_VOLUME_FACTOR).cbrt()
}

fn icosahedron_inradius(edge: f64) -> f64 {
    edge * 3f64.sqrt() * (3.0 + 5f64.sqrt()) / 12.0
}

/// Outward unit normals of the 20 faces: the vertex directions of the dual
/// dodecahedron.
fn icosahedron_face_normals() -> [[f64; 3]; 20] {
    let phi = (1.0 + 5f64.sqrt()) / 2.0;
    let inv = 1.0 / phi;
    let s = 1.0 / 3f64.sqrt();
    let mut normals = [[0.0; 3]; 20];
    let mut k = 0;
    for &x in &[-1.0, 1.0] {
        for &y in &[-1.0, 1.0] {
            for &z in &[-1.0, 1.0] {
                normals[k] = [x * s, y * s, z * s];
                k += 1;
            }
        }
    }
    for &a in &[-1.0, 1.0] {
        for &b in &[-1.0, 1.0] {
            normals[k] = [0.0, a * inv * s, b * phi * s];
            normals[k + 1] = [a * inv * s, b * phi * s, 0.0];
            normals[k + 2] = [a * phi * s, 0.0, b * inv * s];
            k += 3;
        }
    }
    normals
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_spheroid_semi_axes_preserve_volume() {
        let (a, c) = spheroid_semi_axes(100e-9, 0.5);
        assert_relative_eq!(a * a * c, (50e-9f64).powi(3), max_relative = 1e-12);
        assert_relative_eq!(c / a, 0.5, max_relative = 1e-12);
    }

    #[test]
    fn test_icosahedron_geometry() {
        let d = 1.0;
        let a = icosahedron_edge(d);
        assert_relative_eq!(
            ICOSAHEDRON_VOLUME_FACTOR * a.powi(3),
            std::f64::consts::PI / 6.0,
            max_relative = 1e-12
        );
        let body = Body::Icosahedron { diameter: d };
        let ratio = icosahedron_inradius(a) / body.bounding_radius();
        assert_relative_eq!(ratio, 0.794_654_472, max_relative = 1e-6);
        for n in icosahedron_face_normals() {
            assert_relative_eq!(n[0] * n[0] + n[1] * n[1] + n[2] * n[2], 1.0, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_contains() {
        let sphere = Body::Sphere { diameter: 2.0 };
        assert!(sphere.contains(&[0.0, 0.99, 0.0]));
        assert!(!sphere.contains(&[0.8, 0.8, 0.0]));

        // Prolate spheroid: long axis along y.
        let spheroid = Body::Spheroid {
            diameter: 2.0,
            flattening: 2.0,
        };
        let (a, c) = spheroid_semi_axes(2.0, 2.0);
        assert!(spheroid.contains(&[0.0, 0.99 * c, 0.0]));
        assert!(!spheroid.contains(&[1.01 * a, 0.0, 0.0]));

        let ico = Body::Icosahedron { diameter: 1.0 };
        assert!(ico.contains(&[0.0, 0.0, 0.0]));
        assert!(!ico.contains(&[0.0, 0.0, ico.bounding_radius() * 1.01]));
    }

    #[test]
    fn test_validate() {
        assert!(Body::Cube { diameter: -1.0 }.validate().is_err());
        assert!(Body::Spheroid {
            diameter: 1.0,
            flattening: 0.0
        }
        .validate()
        .is_err());
        assert!(Body::Sphere { diameter: 1e-7 }.validate().is_ok());
    }
}
