//! Capture backend abstraction.
//!
//! Three strategies produce screenshots for a session:
//! - `DirectCapture` drives the application's renderer in-process
//! - `ScreenCapture` shells out to a screen-grab utility on an X display
//! - `BrowserCapture` screenshots the page of a browser-automation session
//!
//! The orchestrator only talks to [`CaptureBackend`]; test cases reach the
//! automation session, when there is one, through [`CaptureBackend::ui_driver`].

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use super::render::{SceneRenderer, SoftwareRenderer};
use super::types::{CaptureError, CaptureResult, CaptureTarget, ScreenshotRecord, ShotPlan};
use super::utils::resolve_program;
use crate::config::{BrowserSettings, CaptureSettings};
use crate::driver::{ChromeDriver, UiDriver};

/// Trait for capture backends
pub trait CaptureBackend {
    /// Capture `target` into `shot.path` and describe the result
    fn capture(&mut self, target: CaptureTarget<'_>, shot: ShotPlan) -> CaptureResult<ScreenshotRecord>;

    /// Source type identifier ("direct", "screen", "browser")
    fn source_type(&self) -> &str;

    /// Human-readable label for reports
    fn describe(&self) -> String {
        self.source_type().to_string()
    }

    /// Acquire whatever the backend needs before the first capture
    fn start(&mut self) -> CaptureResult<()> {
        Ok(())
    }

    /// Release resources. Must be safe to call more than once.
    fn stop(&mut self) {}

    /// Automation session, for backends that have one
    fn ui_driver(&mut self) -> Option<&mut dyn UiDriver> {
        None
    }
}

/// The destination's directory must exist and accept writes
fn check_destination(path: &Path) -> CaptureResult<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let unwritable = |source: std::io::Error| CaptureError::Unwritable {
        path: path.to_path_buf(),
        source,
    };

    let meta = fs::metadata(parent).map_err(unwritable)?;
    if !meta.is_dir() {
        return Err(unwritable(std::io::Error::new(
            std::io::ErrorKind::NotADirectory,
            format!("{} is not a directory", parent.display()),
        )));
    }
    if meta.permissions().readonly() {
        return Err(unwritable(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            format!("{} is read-only", parent.display()),
        )));
    }
    Ok(())
}

/// A finished capture must have left a non-empty file behind
fn verify_output(path: &Path) -> CaptureResult<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => Err(CaptureError::EmptyOutput(path.to_path_buf())),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(CaptureError::MissingOutput(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Direct binding
// ============================================================================

/// Renders scenes in-process through a [`SceneRenderer`]
pub struct DirectCapture {
    renderer: Box<dyn SceneRenderer>,
}

impl DirectCapture {
    pub fn new(renderer: Box<dyn SceneRenderer>) -> Self {
        Self { renderer }
    }

    /// Direct capture with the bundled software renderer
    pub fn software(width: u32, height: u32) -> Self {
        Self::new(Box::new(SoftwareRenderer::new(width, height)))
    }
}

impl CaptureBackend for DirectCapture {
    fn capture(&mut self, target: CaptureTarget<'_>, shot: ShotPlan) -> CaptureResult<ScreenshotRecord> {
        let scene = match target {
            CaptureTarget::Scene(scene) => scene,
            other => {
                return Err(CaptureError::UnsupportedTarget {
                    backend: "direct",
                    target: other.label(),
                });
            }
        };

        check_destination(&shot.path)?;
        self.renderer.configure_camera(&scene.camera);
        self.renderer.render_to_file(scene, &shot.path)?;
        verify_output(&shot.path)?;

        debug!("rendered '{}' ({} atoms) to {}", scene.name, scene.len(), shot.path.display());
        Ok(ScreenshotRecord::new(shot, self.source_type()))
    }

    fn source_type(&self) -> &str {
        "direct"
    }

    fn describe(&self) -> String {
        format!("direct ({} renderer)", self.renderer.name())
    }
}

// ============================================================================
// Screen capture
// ============================================================================

/// Grabs the X display with an external utility (scrot by default)
pub struct ScreenCapture {
    settings: CaptureSettings,
}

impl ScreenCapture {
    pub fn new(settings: CaptureSettings) -> Self {
        Self { settings }
    }

    fn run_tool(&self, path: &Path) -> CaptureResult<()> {
        let program = &self.settings.tool;
        let mut child = Command::new(program)
            .args(&self.settings.tool_args)
            .arg(path)
            .env("DISPLAY", &self.settings.display)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    CaptureError::ToolUnavailable(program.clone())
                }
                _ => CaptureError::Io(e),
            })?;

        match child.wait_timeout(self.settings.timeout)? {
            Some(status) if status.success() => Ok(()),
            Some(status) => Err(CaptureError::ToolFailed {
                program: program.clone(),
                status: status.to_string(),
            }),
            None => {
                if let Err(e) = child.kill() {
                    warn!("failed to kill {}: {}", program, e);
                }
                let _ = child.wait();
                Err(CaptureError::Timeout {
                    program: program.clone(),
                    timeout: self.settings.timeout,
                })
            }
        }
    }
}

impl CaptureBackend for ScreenCapture {
    fn capture(&mut self, target: CaptureTarget<'_>, shot: ShotPlan) -> CaptureResult<ScreenshotRecord> {
        if let CaptureTarget::Scene(_) = target {
            return Err(CaptureError::UnsupportedTarget {
                backend: "screen",
                target: target.label(),
            });
        }

        check_destination(&shot.path)?;
        self.run_tool(&shot.path)?;
        verify_output(&shot.path)?;

        debug!("captured display {} to {}", self.settings.display, shot.path.display());
        Ok(ScreenshotRecord::new(shot, self.source_type()))
    }

    fn source_type(&self) -> &str {
        "screen"
    }

    fn describe(&self) -> String {
        format!("screen ({} on {})", self.settings.tool, self.settings.display)
    }

    fn start(&mut self) -> CaptureResult<()> {
        let tool = resolve_program(&self.settings.tool)
            .ok_or_else(|| CaptureError::ToolUnavailable(self.settings.tool.clone()))?;
        info!("screen capture via {} on display {}", tool.display(), self.settings.display);
        Ok(())
    }
}

// ============================================================================
// Browser automation
// ============================================================================

/// Screenshots the page of a browser-automation session.
///
/// `start` launches Chrome unless a driver was injected with
/// [`BrowserCapture::with_driver`], then loads the application URL.
pub struct BrowserCapture {
    settings: BrowserSettings,
    settle_poll: Duration,
    driver: Option<Box<dyn UiDriver>>,
}

impl BrowserCapture {
    pub fn new(settings: BrowserSettings, settle_poll: Duration) -> Self {
        Self {
            settings,
            settle_poll,
            driver: None,
        }
    }

    /// Use an existing driver instead of launching a browser
    pub fn with_driver(mut self, driver: Box<dyn UiDriver>) -> Self {
        self.driver = Some(driver);
        self
    }
}

impl CaptureBackend for BrowserCapture {
    fn capture(&mut self, target: CaptureTarget<'_>, shot: ShotPlan) -> CaptureResult<ScreenshotRecord> {
        if let CaptureTarget::Scene(_) = target {
            return Err(CaptureError::UnsupportedTarget {
                backend: "browser",
                target: target.label(),
            });
        }
        let driver = match self.driver.as_mut() {
            Some(d) if d.is_attached() => d,
            _ => return Err(CaptureError::NoSession),
        };

        check_destination(&shot.path)?;
        driver.screenshot(&shot.path)?;
        verify_output(&shot.path)?;

        debug!("browser screenshot to {}", shot.path.display());
        Ok(ScreenshotRecord::new(shot, "browser"))
    }

    fn source_type(&self) -> &str {
        "browser"
    }

    fn describe(&self) -> String {
        let driver = self.driver.as_ref().map(|d| d.name()).unwrap_or("chrome");
        format!("browser ({} at {})", driver, self.settings.app_url)
    }

    fn start(&mut self) -> CaptureResult<()> {
        if self.driver.is_none() {
            let driver = ChromeDriver::launch(&self.settings, self.settle_poll)?;
            self.driver = Some(Box::new(driver));
        }
        if let Some(driver) = self.driver.as_mut() {
            driver.navigate(&self.settings.app_url)?;
            info!("browser session attached to {}", self.settings.app_url);
        }
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            if let Err(e) = driver.close() {
                warn!("failed to close automation session: {}", e);
            }
        }
    }

    fn ui_driver(&mut self) -> Option<&mut dyn UiDriver> {
        match self.driver.as_mut() {
            Some(driver) => Some(driver.as_mut()),
            None => None,
        }
    }
}

impl Drop for BrowserCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
