//! Parser for Protein Data Bank files.
//!
//! Only `ATOM` and `HETATM` records are read; everything else is skipped.
//! Fields are fixed-column: x, y, z occupy columns 31–54 and the element
//! symbol columns 77–78. Older files without an element column fall back to
//! the leading letters of the atom name (columns 13–16).

use super::{parse_coordinate, ParseError, ParsedAtom, ANGSTROM};

fn column(line: &str, start: usize, end: usize) -> Option<&str> {
    // PDB columns are 1-based and inclusive.
    line.get(start - 1..end.min(line.len()))
}

fn element_symbol(line: &str) -> Option<String> {
    if let Some(e) = column(line, 77, 78).map(str::trim).filter(|e| !e.is_empty()) {
        return Some(normalise_symbol(e));
    }
    let name = column(line, 13, 16)?.trim();
    let letters: String = name.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let first = letters.chars().next()?;
    Some(first.to_ascii_uppercase().to_string())
}

fn normalise_symbol(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Parse the atoms of a PDB file from a string.
pub fn parse_pdb(content: &str) -> Result<Vec<ParsedAtom>, ParseError> {
    let mut atoms = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        if !(line.starts_with("ATOM") || line.starts_with("HETATM")) {
            continue;
        }
        let (Some(xs), Some(ys), Some(zs)) =
            (column(line, 31, 38), column(line, 39, 46), column(line, 47, 54))
        else {
            return Err(ParseError::FormatError {
                line: line_no,
                message: "Record too short for coordinates".into(),
            });
        };
        let x = parse_coordinate(xs, line_no, 'x')?;
        let y = parse_coordinate(ys, line_no, 'y')?;
        let z = parse_coordinate(zs, line_no, 'z')?;
        let symbol = element_symbol(line).ok_or_else(|| ParseError::FormatError {
            line: line_no,
            message: "Missing element symbol".into(),
        })?;

        atoms.push(ParsedAtom {
            symbol,
            position: [x * ANGSTROM, y * ANGSTROM, z * ANGSTROM],
        });
    }

    if atoms.is_empty() {
        return Err(ParseError::FormatError {
            line: 0,
            message: "No ATOM or HETATM records found".into(),
        });
    }
    Ok(atoms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLE: &str = "\
HEADER    TEST
ATOM      1  N   MET A   1      27.340  24.430   2.614  1.00  9.67           N
ATOM      2  CA  MET A   1      26.266  25.413   2.842  1.00 10.38           C
HETATM    3 FE   HEM A 154      15.000  -1.500   0.250  1.00 12.00          FE
TER
END
";

    #[test]
    fn test_parse_records() {
        let atoms = parse_pdb(SAMPLE).unwrap();
        assert_eq!(atoms.len(), 3);
        assert_eq!(atoms[0].symbol, "N");
        assert_eq!(atoms[1].symbol, "C");
        assert_eq!(atoms[2].symbol, "Fe");
        assert_relative_eq!(atoms[0].position[0], 27.340e-10, max_relative = 1e-12);
        assert_relative_eq!(atoms[2].position[1], -1.5e-10, max_relative = 1e-12);
    }

    #[test]
    fn test_element_from_atom_name() {
        let line = "ATOM      1  CA  GLY A   1       1.000   2.000   3.000";
        let atoms = parse_pdb(line).unwrap();
        assert_eq!(atoms[0].symbol, "C");
    }

    #[test]
    fn test_empty_file() {
        assert!(parse_pdb("HEADER only\nEND\n").is_err());
    }
}
