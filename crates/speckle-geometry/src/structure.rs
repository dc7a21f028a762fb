//! Atomic structures for the atoms particle model.

use std::path::Path;

use serde::{Deserialize, Serialize};
use speckle_materials::Element;

use crate::parsers::{self, ParsedAtom};
use crate::GeometryError;

/// A set of atoms: atomic numbers and positions in metres.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AtomicStructure {
    pub atomic_numbers: Vec<u32>,
    pub positions: Vec<[f64; 3]>,
}

impl AtomicStructure {
    pub fn new(atomic_numbers: Vec<u32>, positions: Vec<[f64; 3]>) -> Result<Self, GeometryError> {
        if atomic_numbers.len() != positions.len() {
            return Err(GeometryError::InvalidParameter(format!(
                "{} atomic numbers but {} positions",
                atomic_numbers.len(),
                positions.len()
            )));
        }
        Ok(Self {
            atomic_numbers,
            positions,
        })
    }

    /// Build from parsed atoms, resolving element symbols.
    pub fn from_parsed(atoms: &[ParsedAtom]) -> Result<Self, GeometryError> {
        let atomic_numbers = atoms
            .iter()
            .map(|a| Element::from_symbol(&a.symbol).map(|e| e.z))
            .collect::<Result<Vec<_>, _>>()?;
        let positions = atoms.iter().map(|a| a.position).collect();
        Self::new(atomic_numbers, positions)
    }

    /// Load an `.xyz` or `.pdb` file.
    pub fn from_file(path: &Path) -> Result<Self, GeometryError> {
        let atoms = parsers::parse_file(path)?;
        Self::from_parsed(&atoms)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Mass-weighted centre using standard atomic weights.
    pub fn centre_of_mass(&self) -> Result<[f64; 3], GeometryError> {
        let mut total = 0.0;
        let mut com = [0.0; 3];
        for (z, p) in self.atomic_numbers.iter().zip(&self.positions) {
            let m = Element::from_z(*z)?.mass;
            total += m;
            for k in 0..3 {
                com[k] += m * p[k];
            }
        }
        if total == 0.0 {
            return Err(GeometryError::InvalidParameter("empty atomic structure".into()));
        }
        Ok(com.map(|c| c / total))
    }

    /// Mass-weighted radius of gyration about the centre of mass.
    pub fn radius_of_gyration(&self) -> Result<f64, GeometryError> {
        let com = self.centre_of_mass()?;
        let mut total = 0.0;
        let mut acc = 0.0;
        for (z, p) in self.atomic_numbers.iter().zip(&self.positions) {
            let m = Element::from_z(*z)?.mass;
            let r2: f64 = (0..3).map(|k| (p[k] - com[k]).powi(2)).sum();
            total += m;
            acc += m * r2;
        }
        Ok((acc / total).sqrt())
    }

    /// Copy of the structure translated so its centre of mass is the origin.
    pub fn recentred(&self) -> Result<Self, GeometryError> {
        let com = self.centre_of_mass()?;
        Ok(Self {
            atomic_numbers: self.atomic_numbers.clone(),
            positions: self
                .positions
                .iter()
                .map(|p| [p[0] - com[0], p[1] - com[1], p[2] - com[2]])
                .collect(),
        })
    }
}
