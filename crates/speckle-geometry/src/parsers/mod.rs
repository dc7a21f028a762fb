//! File format parsers for importing atomic structures.
//!
//! Supported formats:
//! - [`.xyz`](xyz) : XYZ molecular coordinate files
//! - [`.pdb`](pdb) : Protein Data Bank `ATOM`/`HETATM` records
//!
//! Coordinates in both formats are in ångström; parsers return metres.

pub mod pdb;
pub mod xyz;

use std::path::Path;

use thiserror::Error;

pub(crate) const ANGSTROM: f64 = 1e-10;

/// Errors during structure file parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    FormatError { line: usize, message: String },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
}

/// A parsed atom: element symbol and position in metres.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAtom {
    pub symbol: String,
    pub position: [f64; 3],
}

/// Read a structure file, choosing the parser from the file extension.
pub fn parse_file(path: &Path) -> Result<Vec<ParsedAtom>, ParseError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let content = std::fs::read_to_string(path)?;
    match ext.as_str() {
        "xyz" => xyz::parse_xyz(&content),
        "pdb" | "ent" => pdb::parse_pdb(&content),
        other => Err(ParseError::UnsupportedFormat(other.to_string())),
    }
}

pub(crate) fn parse_coordinate(field: &str, line: usize, axis: char) -> Result<f64, ParseError> {
    field.trim().parse::<f64>().map_err(|_| ParseError::FormatError {
        line,
        message: format!("Invalid {axis} coordinate: '{}'", field.trim()),
    })
}
