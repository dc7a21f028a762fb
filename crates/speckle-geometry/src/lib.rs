//! # Speckle Geometry
//!
//! Geometry handling for the Speckle diffraction engine. This crate provides:
//!
//! - **Bodies** ([`primitives`]): sphere, spheroid, cube and icosahedron,
//!   each sized by the diameter of the sphere of equal volume.
//! - **Voxelisation** ([`discretise`]): converts a body into a cubic
//!   fill-fraction grid at a given voxel size, and resamples complex density
//!   maps onto a different voxel size.
//! - **Atomic structures** ([`structure`], [`parsers`]): `.xyz` and `.pdb`
//!   import, centre of mass and radius of gyration.
//!
//! All lengths are in metres.

pub mod discretise;
pub mod parsers;
pub mod primitives;
pub mod structure;

use thiserror::Error;

pub use discretise::{resample_trilinear, voxelise, grid_size_for_radius};
pub use primitives::Body;
pub use structure::AtomicStructure;

/// Errors raised while building particle geometry.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Parse(#[from] parsers::ParseError),

    #[error(transparent)]
    Material(#[from] speckle_materials::MaterialError),
}
