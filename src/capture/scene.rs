//! In-memory scene model for direct rendering.
//!
//! A scene is a set of positioned atoms plus a camera pose and an optional
//! background colour. It is what the direct-binding backend hands to a
//! [`SceneRenderer`](super::render::SceneRenderer).

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// A positioned point entity (an atom)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub position: Vec3,
    pub atomic_number: u8,
}

impl Atom {
    pub fn new(x: f32, y: f32, z: f32, atomic_number: u8) -> Self {
        Self {
            position: Vec3::new(x, y, z),
            atomic_number,
        }
    }
}

/// Camera position, look-at target and up vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
}

impl CameraPose {
    pub fn new(position: impl Into<Vec3>, target: impl Into<Vec3>, up: impl Into<Vec3>) -> Self {
        Self {
            position: position.into(),
            target: target.into(),
            up: up.into(),
        }
    }

    /// Camera on the +Z axis at `distance`, looking at the origin
    pub fn on_z_axis(distance: f32) -> Self {
        Self::looking_at_origin(Vec3::new(0.0, 0.0, distance))
    }

    pub fn looking_at_origin(position: impl Into<Vec3>) -> Self {
        Self::new(position, Vec3::ZERO, Vec3::Y)
    }
}

impl Default for CameraPose {
    fn default() -> Self {
        Self::on_z_axis(10.0)
    }
}

/// A renderable scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub name: String,
    pub atoms: Vec<Atom>,
    pub camera: CameraPose,
    /// Background colour as linear RGB in [0, 1]; renderer default when `None`
    pub background: Option<[f32; 3]>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            atoms: Vec::new(),
            camera: CameraPose::default(),
            background: None,
        }
    }

    /// Add an atom
    pub fn atom(mut self, x: f32, y: f32, z: f32, atomic_number: u8) -> Self {
        self.atoms.push(Atom::new(x, y, z, atomic_number));
        self
    }

    pub fn push(&mut self, atom: Atom) {
        self.atoms.push(atom);
    }

    /// Set the camera pose
    pub fn camera(mut self, pose: CameraPose) -> Self {
        self.camera = pose;
        self
    }

    /// Set the background colour
    pub fn background(mut self, rgb: [f32; 3]) -> Self {
        self.background = Some(rgb);
        self
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Axis-aligned bounds as (min, max); `None` for an empty scene
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = self.atoms.first()?.position;
        Some(
            self.atoms[1..]
                .iter()
                .fold((first, first), |(min, max), a| (min.min(a.position), max.max(a.position))),
        )
    }

    /// Centre of the bounding box
    pub fn center(&self) -> Option<Vec3> {
        let (min, max) = self.bounds()?;
        Some((min + max) / 2.0)
    }

    /// Point the camera at the scene centre from +Z, far enough back that
    /// every atom (plus its radius) fits in a 45 degree field of view.
    pub fn auto_frame(&mut self, margin_factor: f32) {
        let Some((min, max)) = self.bounds() else {
            self.camera = CameraPose::default();
            return;
        };
        let center = (min + max) / 2.0;
        let half_size = (max - min) / 2.0;
        let max_radius = self
            .atoms
            .iter()
            .map(|a| vdw_radius(a.atomic_number))
            .fold(0.0f32, f32::max);
        let extent = half_size.max_element() + max_radius;
        let half_fov = (super::render::FIELD_OF_VIEW_DEG / 2.0).to_radians();
        let distance = (extent * margin_factor / half_fov.tan()).max(1.0) + half_size.z;

        self.camera = CameraPose::new(center + Vec3::Z * distance, center, Vec3::Y);
    }
}

/// CPK colour for an atomic number, linear RGB in [0, 1]
pub fn cpk_color(atomic_number: u8) -> [f32; 3] {
    match atomic_number {
        1 => [1.0, 1.0, 1.0],  // H
        6 => [0.5, 0.5, 0.5],  // C
        7 => [0.2, 0.2, 1.0],  // N
        8 => [1.0, 0.0, 0.0],  // O
        9 => [0.7, 1.0, 1.0],  // F
        15 => [1.0, 0.5, 0.0], // P
        16 => [1.0, 1.0, 0.0], // S
        17 => [0.0, 1.0, 0.0], // Cl
        35 => [0.6, 0.1, 0.1], // Br
        53 => [0.5, 0.0, 0.5], // I
        11 => [0.0, 0.0, 1.0], // Na
        12 => [0.0, 0.5, 0.0], // Mg
        19 => [0.5, 0.0, 0.5], // K
        20 => [0.5, 0.5, 0.5], // Ca
        26 => [0.9, 0.4, 0.0], // Fe
        29 => [0.8, 0.5, 0.2], // Cu
        30 => [0.5, 0.5, 0.7], // Zn
        _ => [1.0, 0.7, 0.8],
    }
}

/// Van der Waals radius in Angstroms
pub fn vdw_radius(atomic_number: u8) -> f32 {
    match atomic_number {
        1 => 1.20,
        6 => 1.70,
        7 => 1.55,
        8 => 1.52,
        9 => 1.47,
        15 => 1.80,
        16 => 1.80,
        17 => 1.75,
        35 => 1.85,
        53 => 1.98,
        11 => 2.27,
        12 => 1.73,
        19 => 2.75,
        20 => 2.31,
        26 => 2.04,
        29 => 1.40,
        30 => 1.39,
        _ => 1.50,
    }
}

/// Atomic number for an element symbol (case-insensitive); 0 when unknown
pub fn atomic_number(symbol: &str) -> u8 {
    match symbol.trim().to_ascii_uppercase().as_str() {
        "H" => 1,
        "HE" => 2,
        "LI" => 3,
        "BE" => 4,
        "B" => 5,
        "C" => 6,
        "N" => 7,
        "O" => 8,
        "F" => 9,
        "NE" => 10,
        "NA" => 11,
        "MG" => 12,
        "AL" => 13,
        "SI" => 14,
        "P" => 15,
        "S" => 16,
        "CL" => 17,
        "AR" => 18,
        "K" => 19,
        "CA" => 20,
        "MN" => 25,
        "FE" => 26,
        "CO" => 27,
        "NI" => 28,
        "CU" => 29,
        "ZN" => 30,
        "SE" => 34,
        "BR" => 35,
        "I" => 53,
        _ => 0,
    }
}
