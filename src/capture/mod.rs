pub mod backend;
pub mod framebuffer;
pub mod render;
pub mod scene;
pub mod structure;
pub mod types;
pub mod utils;

pub use backend::{BrowserCapture, CaptureBackend, DirectCapture, ScreenCapture};
pub use framebuffer::Framebuffer;
pub use render::{SceneRenderer, SoftwareRenderer};
pub use scene::{Atom, CameraPose, Scene};
pub use structure::{StructureError, StructureFormat, load_structure};
pub use types::{CaptureError, CaptureResult, CaptureTarget, RenderError, ScreenshotRecord, ShotPlan};
pub use utils::{generate_timestamp, sanitize_name, screenshot_file_name};
