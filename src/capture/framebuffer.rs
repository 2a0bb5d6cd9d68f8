//! RGB drawing surface shared by the software renderer and the mock driver.
//!
//! Provides the primitives needed to produce inspectable test images:
//! - `draw_rect()` - Draw a filled rectangle
//! - `draw_text()` - Draw text using font8x8 glyphs
//! - `draw_sphere()` - Draw a Lambert-shaded disc standing in for a sphere
//! - `get_pixel()` / `set_pixel()` - Direct pixel access

use font8x8::{BASIC_FONTS, UnicodeFonts};
use glam::Vec3;
use image::{Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;

use super::types::RenderError;

/// Light direction used for sphere shading (towards the viewer, upper left)
const LIGHT_DIR: Vec3 = Vec3::new(-0.40, 0.50, 0.77);
const AMBIENT: f32 = 0.25;

#[derive(Debug, Clone)]
pub struct Framebuffer {
    image: RgbImage,
}

impl Framebuffer {
    /// Create a new framebuffer with the given dimensions, initialized to black
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::new(width, height),
        }
    }

    /// Create a framebuffer initialized to a specific color
    pub fn with_color(width: u32, height: u32, color: [u8; 3]) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, Rgb(color)),
        }
    }

    /// Load a framebuffer from encoded image bytes (PNG or any format `image` understands)
    pub fn from_png_bytes(data: &[u8]) -> Result<Self, RenderError> {
        let img = image::load_from_memory(data)?;
        Ok(Self { image: img.to_rgb8() })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Draw a filled rectangle, clipped to the buffer
    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
        for py in y..y.saturating_add(h).min(self.height()) {
            for px in x..x.saturating_add(w).min(self.width()) {
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Draw text using font8x8 glyphs
    ///
    /// Each character is 8x8 pixels. Text does not wrap.
    pub fn draw_text(&mut self, x: u32, y: u32, text: &str, fg: [u8; 3], bg: [u8; 3]) {
        let mut cursor_x = x;
        for ch in text.chars() {
            if cursor_x >= self.width() {
                break;
            }
            self.draw_char(cursor_x, y, ch, fg, bg);
            cursor_x += 8;
        }
    }

    fn draw_char(&mut self, x: u32, y: u32, ch: char, fg: [u8; 3], bg: [u8; 3]) {
        let glyph = BASIC_FONTS.get(ch).unwrap_or([0u8; 8]);
        for (row_idx, row) in glyph.iter().enumerate() {
            let py = y + row_idx as u32;
            for bit in 0..8 {
                // font8x8 stores LSB as leftmost pixel
                let is_fg = (row >> bit) & 1 == 1;
                self.set_pixel(x + bit, py, if is_fg { fg } else { bg });
            }
        }
    }

    /// Draw a shaded disc centred at (cx, cy), approximating a lit sphere.
    ///
    /// Pixels are overwritten; callers draw far-to-near.
    pub fn draw_sphere(&mut self, cx: f32, cy: f32, radius: f32, color: [f32; 3]) {
        if radius <= 0.0 {
            return;
        }
        let light = LIGHT_DIR.normalize();
        let min_x = (cx - radius).floor().max(0.0) as u32;
        let min_y = (cy - radius).floor().max(0.0) as u32;
        let max_x = (cx + radius).ceil().min(self.width() as f32 - 1.0);
        let max_y = (cy + radius).ceil().min(self.height() as f32 - 1.0);
        if max_x < 0.0 || max_y < 0.0 {
            return;
        }

        for py in min_y..=max_y as u32 {
            for px in min_x..=max_x as u32 {
                let dx = (px as f32 + 0.5 - cx) / radius;
                // Screen y grows downwards; normal y grows upwards
                let dy = (cy - (py as f32 + 0.5)) / radius;
                let d2 = dx * dx + dy * dy;
                if d2 > 1.0 {
                    continue;
                }
                let normal = Vec3::new(dx, dy, (1.0 - d2).sqrt());
                let lambert = normal.dot(light).max(0.0);
                let intensity = AMBIENT + (1.0 - AMBIENT) * lambert;
                let shaded = [
                    to_channel(color[0] * intensity),
                    to_channel(color[1] * intensity),
                    to_channel(color[2] * intensity),
                ];
                self.set_pixel(px, py, shaded);
            }
        }
    }

    /// Get the color of a pixel; out-of-range reads return black
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width() || y >= self.height() {
            return [0, 0, 0];
        }
        self.image.get_pixel(x, y).0
    }

    /// Set the color of a pixel; out-of-range writes are ignored
    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if x >= self.width() || y >= self.height() {
            return;
        }
        self.image.put_pixel(x, y, Rgb(color));
    }

    /// Encode the framebuffer as PNG bytes
    pub fn to_png(&self) -> Result<Vec<u8>, RenderError> {
        let mut bytes = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
        Ok(bytes)
    }

    /// Encode as PNG and write to `path`
    pub fn save_png(&self, path: &Path) -> Result<(), RenderError> {
        let bytes = self.to_png()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// Convert a [0, 1] float color channel to a byte
pub fn to_channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
