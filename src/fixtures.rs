//! Fixture discovery: structure files under `<base>/structures/`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capture::{StructureFormat, sanitize_name};
use crate::capture::structure::xyz_declared_count;

/// A structure file that becomes the input of one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    pub path: PathBuf,
    /// File name, e.g. `water.xyz`
    pub name: String,
    pub format: StructureFormat,
    /// Atom count from the XYZ header, when available
    pub declared_atoms: Option<usize>,
}

impl Fixture {
    /// Logical screenshot name for this structure, e.g. `structure_water_xyz`.
    ///
    /// Built from the whole file name so `water.xyz` and `water.pdb` stay apart.
    pub fn shot_name(&self) -> String {
        format!("structure_{}", sanitize_name(&self.name))
    }
}

/// Find every recognised structure file in `dir`, sorted by file name.
///
/// A missing directory yields no fixtures.
pub fn discover(dir: &Path) -> std::io::Result<Vec<Fixture>> {
    if !dir.is_dir() {
        debug!("no fixture directory at {}", dir.display());
        return Ok(Vec::new());
    }

    let mut fixtures = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(format) = StructureFormat::from_path(&path) else {
            continue;
        };
        let declared_atoms = match format {
            StructureFormat::Xyz => xyz_declared_count(&path),
            StructureFormat::Pdb => None,
        };
        fixtures.push(Fixture {
            name: path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
            path,
            format,
            declared_atoms,
        });
    }

    fixtures.sort_by(|a, b| a.name.cmp(&b.name));
    debug!("discovered {} fixtures in {}", fixtures.len(), dir.display());
    Ok(fixtures)
}
