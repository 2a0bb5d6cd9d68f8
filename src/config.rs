//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for GUI Vision, supporting:
//! - Environment variables for all configurable values
//! - Defaults matching the layout the harness expects on a CI box
//!   (Xvfb on `:99`, the viewer's dev server on port 1420)
//! - Typed settings structs handed to backends and the orchestrator
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `GUI_VISION_BASE_DIR` | Test-run base directory | `./visual-tests` |
//! | `GUI_VISION_APP_URL` | Application entry point | `http://localhost:1420` |
//! | `GUI_VISION_DISPLAY` | X display used for capture and the app | `:99` |
//! | `GUI_VISION_CAPTURE_TOOL` | Screen capture utility | `scrot` |
//! | `GUI_VISION_CAPTURE_TIMEOUT` | Capture utility timeout in seconds | `5` |
//! | `GUI_VISION_STARTUP_TIMEOUT` | App start-up ceiling in seconds | `15` |
//! | `GUI_VISION_SHUTDOWN_GRACE` | Grace period before killing the app (s) | `5` |
//! | `GUI_VISION_SETTLE_POLL` | Settle-wait poll interval (ms) | `100` |
//! | `GUI_VISION_WINDOW_SIZE` | Browser window size | `1920x1080` |
//! | `GUI_VISION_RENDER_SIZE` | Direct render size | `800x600` |
//! | `GUI_VISION_HEADLESS` | Run the browser headless | `true` |
//!
//! # Example
//!
//! ```bash
//! # Point the browser suite at a different dev server
//! export GUI_VISION_APP_URL="http://127.0.0.1:5173"
//!
//! # Capture from a different virtual display
//! export GUI_VISION_DISPLAY=":1"
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

// ============================================================================
// Default Values
// ============================================================================

/// Default test-run base directory
pub const DEFAULT_BASE_DIR: &str = "./visual-tests";

/// Default application entry point (viewer dev server)
pub const DEFAULT_APP_URL: &str = "http://localhost:1420";

/// Default X display
pub const DEFAULT_DISPLAY: &str = ":99";

/// Default screen capture utility
pub const DEFAULT_CAPTURE_TOOL: &str = "scrot";

/// Default capture utility timeout (seconds)
pub const DEFAULT_CAPTURE_TIMEOUT: u64 = 5;

/// Default application start-up ceiling (seconds)
pub const DEFAULT_STARTUP_TIMEOUT: u64 = 15;

/// Default grace period between terminate and kill (seconds)
pub const DEFAULT_SHUTDOWN_GRACE: u64 = 5;

/// Default settle poll interval (milliseconds)
pub const DEFAULT_SETTLE_POLL: u64 = 100;

/// Default browser window width (pixels)
pub const DEFAULT_WINDOW_WIDTH: u32 = 1920;

/// Default browser window height (pixels)
pub const DEFAULT_WINDOW_HEIGHT: u32 = 1080;

/// Default direct render width (pixels)
pub const DEFAULT_RENDER_WIDTH: u32 = 800;

/// Default direct render height (pixels)
pub const DEFAULT_RENDER_HEIGHT: u32 = 600;

/// Report file name, relative to the base directory
pub const REPORT_FILE_NAME: &str = "VISUAL_VALIDATION_REPORT.md";

/// Machine-readable results, relative to the base directory
pub const RESULTS_FILE_NAME: &str = "results.json";

/// Screenshot directory, relative to the base directory
pub const SCREENSHOTS_DIR_NAME: &str = "screenshots";

/// Fixture directory, relative to the base directory
pub const STRUCTURES_DIR_NAME: &str = "structures";

/// Log file receiving the application's stdout/stderr
pub const APP_LOG_FILE_NAME: &str = "app-under-test.log";

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_BASE_DIR: &str = "GUI_VISION_BASE_DIR";
pub const ENV_APP_URL: &str = "GUI_VISION_APP_URL";
pub const ENV_DISPLAY: &str = "GUI_VISION_DISPLAY";
pub const ENV_CAPTURE_TOOL: &str = "GUI_VISION_CAPTURE_TOOL";
pub const ENV_CAPTURE_TIMEOUT: &str = "GUI_VISION_CAPTURE_TIMEOUT";
pub const ENV_STARTUP_TIMEOUT: &str = "GUI_VISION_STARTUP_TIMEOUT";
pub const ENV_SHUTDOWN_GRACE: &str = "GUI_VISION_SHUTDOWN_GRACE";
pub const ENV_SETTLE_POLL: &str = "GUI_VISION_SETTLE_POLL";
pub const ENV_WINDOW_SIZE: &str = "GUI_VISION_WINDOW_SIZE";
pub const ENV_RENDER_SIZE: &str = "GUI_VISION_RENDER_SIZE";
pub const ENV_HEADLESS: &str = "GUI_VISION_HEADLESS";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for GUI Vision
#[derive(Debug, Clone)]
pub struct Config {
    /// Where fixtures, screenshots and the report live
    pub base_dir: PathBuf,
    /// Screen-capture settings
    pub capture: CaptureSettings,
    /// Browser automation settings
    pub browser: BrowserSettings,
    /// Application-under-test process settings
    pub app: AppSettings,
    /// Wait/settle timing
    pub timing: TimingSettings,
    /// Direct render output size
    pub render_width: u32,
    pub render_height: u32,
}

/// Settings for the OS screen-capture backend
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Capture utility invoked as `<tool> [args..] <output>`
    pub tool: String,
    /// Extra arguments placed before the output path
    pub tool_args: Vec<String>,
    /// Display identifier exported as `DISPLAY`
    pub display: String,
    /// Hard timeout for one capture call
    pub timeout: Duration,
}

/// Settings for the browser automation session
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Application entry point
    pub app_url: String,
    pub window_width: u32,
    pub window_height: u32,
    pub headless: bool,
    /// Explicit Chrome executable; auto-detected when `None`
    pub chrome_executable: Option<PathBuf>,
    /// DevTools request timeout
    pub request_timeout: Duration,
}

/// Settings for launching the application under test
#[derive(Debug, Clone)]
pub struct AppSettings {
    /// Program and arguments; empty means the app is managed externally
    pub command: Vec<String>,
    /// Working directory for the app process
    pub working_dir: Option<PathBuf>,
    /// Display exported to the app
    pub display: String,
    /// `host:port` polled for readiness; without one the full ceiling is slept
    pub ready_probe: Option<String>,
    /// Upper bound on start-up
    pub startup_timeout: Duration,
    /// Time allowed between SIGTERM and SIGKILL
    pub shutdown_grace: Duration,
}

/// Timing for settle waits
#[derive(Debug, Clone, Copy)]
pub struct TimingSettings {
    pub settle_poll: Duration,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let (render_width, render_height) = env::var(ENV_RENDER_SIZE)
            .ok()
            .and_then(|s| parse_dimensions(&s))
            .unwrap_or((DEFAULT_RENDER_WIDTH, DEFAULT_RENDER_HEIGHT));

        Self {
            base_dir: PathBuf::from(
                env::var(ENV_BASE_DIR).unwrap_or_else(|_| DEFAULT_BASE_DIR.to_string()),
            ),
            capture: CaptureSettings::from_env(),
            browser: BrowserSettings::from_env(),
            app: AppSettings::from_env(),
            timing: TimingSettings::from_env(),
            render_width,
            render_height,
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            capture: CaptureSettings::defaults(),
            browser: BrowserSettings::defaults(),
            app: AppSettings::defaults(),
            timing: TimingSettings::defaults(),
            render_width: DEFAULT_RENDER_WIDTH,
            render_height: DEFAULT_RENDER_HEIGHT,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl CaptureSettings {
    pub fn from_env() -> Self {
        Self {
            tool: env::var(ENV_CAPTURE_TOOL).unwrap_or_else(|_| DEFAULT_CAPTURE_TOOL.to_string()),
            tool_args: Vec::new(),
            display: env::var(ENV_DISPLAY).unwrap_or_else(|_| DEFAULT_DISPLAY.to_string()),
            timeout: Duration::from_secs(env_u64(ENV_CAPTURE_TIMEOUT, DEFAULT_CAPTURE_TIMEOUT)),
        }
    }

    pub fn defaults() -> Self {
        Self {
            tool: DEFAULT_CAPTURE_TOOL.to_string(),
            tool_args: Vec::new(),
            display: DEFAULT_DISPLAY.to_string(),
            timeout: Duration::from_secs(DEFAULT_CAPTURE_TIMEOUT),
        }
    }
}

impl BrowserSettings {
    pub fn from_env() -> Self {
        let (window_width, window_height) = env::var(ENV_WINDOW_SIZE)
            .ok()
            .and_then(|s| parse_dimensions(&s))
            .unwrap_or((DEFAULT_WINDOW_WIDTH, DEFAULT_WINDOW_HEIGHT));

        Self {
            app_url: env::var(ENV_APP_URL).unwrap_or_else(|_| DEFAULT_APP_URL.to_string()),
            window_width,
            window_height,
            headless: env::var(ENV_HEADLESS)
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(true),
            chrome_executable: None,
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn defaults() -> Self {
        Self {
            app_url: DEFAULT_APP_URL.to_string(),
            window_width: DEFAULT_WINDOW_WIDTH,
            window_height: DEFAULT_WINDOW_HEIGHT,
            headless: true,
            chrome_executable: None,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl AppSettings {
    pub fn from_env() -> Self {
        Self {
            command: Vec::new(),
            working_dir: None,
            display: env::var(ENV_DISPLAY).unwrap_or_else(|_| DEFAULT_DISPLAY.to_string()),
            ready_probe: None,
            startup_timeout: Duration::from_secs(env_u64(ENV_STARTUP_TIMEOUT, DEFAULT_STARTUP_TIMEOUT)),
            shutdown_grace: Duration::from_secs(env_u64(ENV_SHUTDOWN_GRACE, DEFAULT_SHUTDOWN_GRACE)),
        }
    }

    pub fn defaults() -> Self {
        Self {
            command: Vec::new(),
            working_dir: None,
            display: DEFAULT_DISPLAY.to_string(),
            ready_probe: None,
            startup_timeout: Duration::from_secs(DEFAULT_STARTUP_TIMEOUT),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE),
        }
    }

    /// Whether the orchestrator should launch the app itself
    pub fn is_managed(&self) -> bool {
        !self.command.is_empty()
    }
}

impl TimingSettings {
    pub fn from_env() -> Self {
        Self {
            settle_poll: Duration::from_millis(env_u64(ENV_SETTLE_POLL, DEFAULT_SETTLE_POLL)),
        }
    }

    pub fn defaults() -> Self {
        Self {
            settle_poll: Duration::from_millis(DEFAULT_SETTLE_POLL),
        }
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self::defaults()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Parse a `WxH` string into (width, height)
pub fn parse_dimensions(size: &str) -> Option<(u32, u32)> {
    let lower = size.trim().to_lowercase();
    let (w, h) = lower.split_once('x')?;
    let w: u32 = w.parse().ok()?;
    let h: u32 = h.parse().ok()?;
    if w == 0 || h == 0 {
        return None;
    }
    Some((w, h))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Derive a `host:port` readiness probe from an http(s) URL
pub fn probe_from_url(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let authority = rest.split('/').next()?;
    if authority.is_empty() {
        return None;
    }
    if authority.contains(':') {
        return Some(authority.to_string());
    }
    let port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };
    Some(format!("{}:{}", authority, port))
}
