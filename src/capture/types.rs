// Core types for capture functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::scene::Scene;
use crate::driver::DriverError;

/// What a backend is asked to capture
#[derive(Debug, Clone, Copy)]
pub enum CaptureTarget<'a> {
    /// Render an in-memory scene (direct binding only)
    Scene(&'a Scene),
    /// Whatever the display or page currently shows
    CurrentDisplay,
}

impl CaptureTarget<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            CaptureTarget::Scene(_) => "scene",
            CaptureTarget::CurrentDisplay => "current display",
        }
    }
}

/// A capture request: logical name, description and the destination allocated
/// by the session
#[derive(Debug, Clone)]
pub struct ShotPlan {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
}

impl ShotPlan {
    pub fn new(name: impl Into<String>, description: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            path: path.into(),
        }
    }
}

/// Represents a captured screenshot or render output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotRecord {
    /// Logical name (e.g. "rotation_before")
    pub name: String,

    /// Human description of what the image should show
    pub description: String,

    /// Where the image was written
    pub path: PathBuf,

    /// Backend that produced it (e.g. "direct", "screen", "browser")
    pub source: String,

    /// When the capture completed
    pub timestamp: DateTime<Utc>,
}

impl ScreenshotRecord {
    /// Create a record for a capture that just completed
    pub fn new(shot: ShotPlan, source: impl Into<String>) -> Self {
        Self {
            name: shot.name,
            description: shot.description,
            path: shot.path,
            source: source.into(),
            timestamp: Utc::now(),
        }
    }

    /// File name component of the storage path
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Error types for capture operations
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The renderer failed to produce an image
    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    /// The destination cannot be written
    #[error("output path is not writable: {path}: {source}")]
    Unwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The capture completed but left a zero-byte file
    #[error("capture produced an empty file: {0}")]
    EmptyOutput(PathBuf),

    /// The capture utility cannot be found or executed
    #[error("capture utility `{0}` is not available")]
    ToolUnavailable(String),

    /// The capture utility reported failure
    #[error("capture utility `{program}` exited with {status}")]
    ToolFailed { program: String, status: String },

    /// The capture utility did not finish in time
    #[error("capture utility `{program}` timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    /// The capture utility succeeded but no file appeared
    #[error("capture output missing: {0}")]
    MissingOutput(PathBuf),

    /// Browser capture without an attached automation session
    #[error("no active automation session")]
    NoSession,

    /// The backend cannot satisfy this kind of target
    #[error("{backend} backend cannot capture a {target} target")]
    UnsupportedTarget { backend: &'static str, target: &'static str },

    /// The UI driver failed while taking the screenshot
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a scene renderer
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("degenerate camera: {0}")]
    Camera(String),

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
