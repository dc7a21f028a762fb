//! Parser for `.xyz` molecular coordinate files.
//!
//! The XYZ format is a simple plain-text format:
//! ```text
//! <num_atoms>
//! <comment line>
//! <element> <x> <y> <z>
//! <element> <x> <y> <z>
//! ...
//! ```
//!
//! Coordinates are in ångström and converted to metres.

use super::{parse_coordinate, ParseError, ParsedAtom, ANGSTROM};

/// Parse an XYZ file from a string.
pub fn parse_xyz(content: &str) -> Result<Vec<ParsedAtom>, ParseError> {
    let lines: Vec<&str> = content.lines().collect();

    if lines.len() < 2 {
        return Err(ParseError::FormatError {
            line: 1,
            message: "XYZ file needs a count line and a comment line".into(),
        });
    }

    let num_atoms: usize = lines[0].trim().parse().map_err(|_| ParseError::FormatError {
        line: 1,
        message: "First line must be the number of atoms".into(),
    })?;

    let mut atoms = Vec::with_capacity(num_atoms);
    for (idx, line) in lines[2..].iter().enumerate() {
        let line_no = idx + 3;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            return Err(ParseError::FormatError {
                line: line_no,
                message: format!("Expected 'element x y z', got '{line}'"),
            });
        }
        let x = parse_coordinate(parts[1], line_no, 'x')?;
        let y = parse_coordinate(parts[2], line_no, 'y')?;
        let z = parse_coordinate(parts[3], line_no, 'z')?;

        atoms.push(ParsedAtom {
            symbol: parts[0].to_string(),
            position: [x * ANGSTROM, y * ANGSTROM, z * ANGSTROM],
        });
    }

    if atoms.len() != num_atoms {
        return Err(ParseError::FormatError {
            line: 1,
            message: format!("Header says {} atoms but found {}", num_atoms, atoms.len()),
        });
    }

    Ok(atoms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_water() {
        let content = "3\nwater\nO 0.0 0.0 0.117\nH 0.0 0.757 -0.469\nH 0.0 -0.757 -0.469\n";
        let atoms = parse_xyz(content).unwrap();
        assert_eq!(atoms.len(), 3);
        assert_eq!(atoms[0].symbol, "O");
        assert_relative_eq!(atoms[1].position[1], 0.757e-10, max_relative = 1e-12);
    }

    #[test]
    fn test_atom_count_mismatch() {
        let content = "2\ncomment\nC 0 0 0\n";
        assert!(matches!(
            parse_xyz(content),
            Err(ParseError::FormatError { line: 1, .. })
        ));
    }

    #[test]
    fn test_bad_coordinate_reports_line() {
        let content = "1\ncomment\nC 0 zero 0\n";
        match parse_xyz(content) {
            Err(ParseError::FormatError { line, message }) => {
                assert_eq!(line, 3);
                assert!(message.contains("y coordinate"));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
