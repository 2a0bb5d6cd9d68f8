//! Scene rendering capability used by the direct-binding backend.
//!
//! [`SceneRenderer`] is the seam to the application's rendering library:
//! configure a camera, then render a scene straight to an image file.
//! [`SoftwareRenderer`] is the bundled implementation, a small perspective
//! rasterizer that draws every atom as a shaded sphere in CPK colours.

use std::cmp::Ordering;
use std::path::Path;

use glam::{Mat4, Vec3};

use super::framebuffer::{Framebuffer, to_channel};
use super::scene::{CameraPose, Scene, cpk_color, vdw_radius};
use super::types::RenderError;

/// Vertical field of view, in degrees
pub const FIELD_OF_VIEW_DEG: f32 = 45.0;

/// Atoms closer than this to the camera plane are culled
const NEAR_PLANE: f32 = 0.1;

/// Ball-and-stick style: draw atoms at a fraction of their vdW radius
const ATOM_SCALE: f32 = 0.35;

const DEFAULT_BACKGROUND: [f32; 3] = [0.0, 0.0, 0.0];

/// Render capability of the application under test
pub trait SceneRenderer {
    /// Set the camera used by subsequent renders
    fn configure_camera(&mut self, pose: &CameraPose);

    /// Render `scene` and write the image to `path`
    fn render_to_file(&mut self, scene: &Scene, path: &Path) -> Result<(), RenderError>;

    /// Identifier used in logs and reports
    fn name(&self) -> &str {
        "renderer"
    }
}

/// CPU renderer producing PNG files
#[derive(Debug, Clone)]
pub struct SoftwareRenderer {
    width: u32,
    height: u32,
    camera: CameraPose,
    caption: bool,
}

/// An atom after projection to screen space
#[derive(Debug, Clone, Copy)]
struct Projected {
    x: f32,
    y: f32,
    depth: f32,
    radius: f32,
    color: [f32; 3],
}

impl SoftwareRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            camera: CameraPose::default(),
            caption: true,
        }
    }

    /// Enable or disable the scene caption in the lower left corner
    pub fn caption(mut self, enabled: bool) -> Self {
        self.caption = enabled;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Render `scene` with the configured camera into a framebuffer
    pub fn render(&self, scene: &Scene) -> Result<Framebuffer, RenderError> {
        let background = scene.background.unwrap_or(DEFAULT_BACKGROUND);
        let bg = [
            to_channel(background[0]),
            to_channel(background[1]),
            to_channel(background[2]),
        ];
        let mut fb = Framebuffer::with_color(self.width, self.height, bg);

        let mut projected = self.project(scene)?;
        // Painter's algorithm: far atoms first
        projected.sort_by(|a, b| b.depth.partial_cmp(&a.depth).unwrap_or(Ordering::Equal));
        for atom in &projected {
            fb.draw_sphere(atom.x, atom.y, atom.radius, atom.color);
        }

        if self.caption {
            let text = format!("{} ({} atoms)", scene.name, scene.len());
            let fg = if luminance(background) > 0.5 { [0, 0, 0] } else { [255, 255, 255] };
            fb.draw_text(8, self.height.saturating_sub(16), &text, fg, bg);
        }

        Ok(fb)
    }

    fn project(&self, scene: &Scene) -> Result<Vec<Projected>, RenderError> {
        let transform = ViewTransform::new(&self.camera)?;
        let focal = (self.height as f32 / 2.0) / (FIELD_OF_VIEW_DEG / 2.0).to_radians().tan();
        let cx = self.width as f32 / 2.0;
        let cy = self.height as f32 / 2.0;

        let projected = scene
            .atoms
            .iter()
            .filter_map(|atom| {
                let view = transform.to_view(atom.position);
                let (x, y, depth) = (view.x, view.y, view.z);
                if depth <= NEAR_PLANE {
                    return None;
                }
                Some(Projected {
                    x: cx + x * focal / depth,
                    y: cy - y * focal / depth,
                    depth,
                    radius: vdw_radius(atom.atomic_number) * ATOM_SCALE * focal / depth,
                    color: cpk_color(atom.atomic_number),
                })
            })
            .collect();
        Ok(projected)
    }
}

impl SceneRenderer for SoftwareRenderer {
    fn configure_camera(&mut self, pose: &CameraPose) {
        self.camera = *pose;
    }

    fn render_to_file(&mut self, scene: &Scene, path: &Path) -> Result<(), RenderError> {
        let fb = self.render(scene)?;
        fb.save_png(path)
    }

    fn name(&self) -> &str {
        "software"
    }
}

/// World-to-view transform of a camera pose
struct ViewTransform {
    view: Mat4,
}

impl ViewTransform {
    fn new(pose: &CameraPose) -> Result<Self, RenderError> {
        let forward = pose.target - pose.position;
        if forward.length_squared() < 1e-12 {
            return Err(RenderError::Camera("camera position equals target".to_string()));
        }
        if forward.cross(pose.up).length_squared() < 1e-12 {
            return Err(RenderError::Camera("up vector is parallel to view direction".to_string()));
        }
        Ok(Self {
            view: Mat4::look_at_rh(pose.position, pose.target, pose.up),
        })
    }

    /// World point to (x, y, depth) in view space; depth is positive in front
    fn to_view(&self, p: Vec3) -> Vec3 {
        let v = self.view.transform_point3(p);
        Vec3::new(v.x, v.y, -v.z)
    }
}

fn luminance(rgb: [f32; 3]) -> f32 {
    0.2126 * rgb[0] + 0.7152 * rgb[1] + 0.0722 * rgb[2]
}
