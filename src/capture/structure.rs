//! Structure file loading for the direct-binding backend.
//!
//! Two formats are recognised, distinguished by extension:
//! - XYZ: atom count, comment line, then `Element X Y Z` rows
//! - PDB: fixed-column `ATOM`/`HETATM` records

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::scene::{Atom, Scene, atomic_number};

/// Errors while reading a structure file
#[derive(Debug, Error)]
pub enum StructureError {
    #[error("unsupported structure format: {0}")]
    UnsupportedFormat(String),

    #[error("{file}: line {line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Recognised structure formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureFormat {
    Xyz,
    Pdb,
}

impl StructureFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xyz" => Some(StructureFormat::Xyz),
            "pdb" => Some(StructureFormat::Pdb),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StructureFormat::Xyz => "xyz",
            StructureFormat::Pdb => "pdb",
        }
    }
}

/// Load a structure file into a scene named after the file stem
pub fn load_structure(path: &Path) -> Result<Scene, StructureError> {
    let format = StructureFormat::from_path(path)
        .ok_or_else(|| StructureError::UnsupportedFormat(path.display().to_string()))?;
    let contents = fs::read_to_string(path)?;
    let file = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "structure".to_string());

    let atoms = match format {
        StructureFormat::Xyz => parse_xyz(&file, &contents)?,
        StructureFormat::Pdb => parse_pdb(&file, &contents)?,
    };

    let mut scene = Scene::new(name);
    scene.atoms = atoms;
    Ok(scene)
}

/// Parse XYZ text. The declared count is informational; every atom row is read.
pub fn parse_xyz(file: &str, contents: &str) -> Result<Vec<Atom>, StructureError> {
    let parse_err = |line: usize, message: String| StructureError::Parse {
        file: file.to_string(),
        line,
        message,
    };

    let mut lines = contents.lines();
    let header = lines.next().ok_or_else(|| parse_err(1, "empty file".to_string()))?;
    let declared: usize = header
        .trim()
        .parse()
        .map_err(|_| parse_err(1, format!("invalid atom count '{}'", header.trim())))?;

    // Comment line
    lines.next();

    // The header is untrusted: never reserve more than the file can hold
    let mut atoms = Vec::with_capacity(declared.min(contents.lines().count()));
    for (idx, line) in lines.enumerate() {
        let line_no = idx + 3;
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }
        if parts.len() < 4 {
            return Err(parse_err(line_no, "expected 'Element X Y Z'".to_string()));
        }
        let coord = |i: usize, axis: &str| -> Result<f32, StructureError> {
            parts[i]
                .parse()
                .map_err(|_| parse_err(line_no, format!("invalid {} coordinate '{}'", axis, parts[i])))
        };
        atoms.push(Atom::new(
            coord(1, "X")?,
            coord(2, "Y")?,
            coord(3, "Z")?,
            atomic_number(parts[0]),
        ));
    }

    Ok(atoms)
}

/// Parse the ATOM/HETATM records of a PDB file
pub fn parse_pdb(file: &str, contents: &str) -> Result<Vec<Atom>, StructureError> {
    let mut atoms = Vec::new();

    for (idx, line) in contents.lines().enumerate() {
        if !line.starts_with("ATOM") && !line.starts_with("HETATM") {
            continue;
        }
        let line_no = idx + 1;
        let parse_err = |message: String| StructureError::Parse {
            file: file.to_string(),
            line: line_no,
            message,
        };
        if line.len() < 54 {
            return Err(parse_err("ATOM/HETATM record shorter than 54 columns".to_string()));
        }
        let column = |range: std::ops::Range<usize>, axis: &str| -> Result<f32, StructureError> {
            let raw = line.get(range).unwrap_or("").trim();
            raw.parse()
                .map_err(|_| parse_err(format!("invalid {} coordinate '{}'", axis, raw)))
        };
        let x = column(30..38, "X")?;
        let y = column(38..46, "Y")?;
        let z = column(46..54, "Z")?;

        // Element columns 77-78, falling back to the atom name (13-16)
        let element = line
            .get(76..78)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| element_from_atom_name(line));

        atoms.push(Atom::new(x, y, z, atomic_number(&element)));
    }

    Ok(atoms)
}

/// Guess the element from the atom name field: the first alphabetic character
fn element_from_atom_name(line: &str) -> String {
    line.get(12..16)
        .unwrap_or("")
        .chars()
        .find(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_string())
        .unwrap_or_default()
}

/// Read the declared atom count from an XYZ header without parsing the body
pub fn xyz_declared_count(path: &Path) -> Option<usize> {
    let contents = fs::read_to_string(path).ok()?;
    contents.lines().next()?.trim().parse().ok()
}
