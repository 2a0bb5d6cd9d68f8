//! GUI Vision - visual regression testing for 3D structure viewers.
//!
//! This crate provides:
//! - Three capture backends: direct software rendering, screen capture of a
//!   live display, and browser automation over the DevTools protocol
//! - A synchronous UI driver abstraction with settle-until-condition waits
//! - Test cases isolated from one another (errors and panics become outcomes)
//! - A session orchestrator that owns and releases the application under test
//! - Markdown and JSON reports
//!
//! # Example
//!
//! ```rust,no_run
//! use gui_vision::capture::DirectCapture;
//! use gui_vision::harness::{Orchestrator, direct_suite};
//!
//! let backend = DirectCapture::software(800, 600);
//! let mut orchestrator = Orchestrator::new("./visual-tests", Box::new(backend));
//! orchestrator.register_all(direct_suite(&[])).unwrap();
//! let summary = orchestrator.run().unwrap();
//! std::process::exit(summary.exit_code() as i32);
//! ```

pub mod capture;
pub mod config;
pub mod driver;
pub mod fixtures;
pub mod harness;
pub mod process;
pub mod report;
pub mod runner;
pub mod session;

// Re-export runner types
pub use runner::RunSummary;

// Re-export harness types
pub use harness::{
    CaseError, HarnessError, HarnessResult, Orchestrator, Pacing, SessionState, TestCase, TestContext,
    TestOutcome, TestStatus, Verdict,
};

// Re-export capture backends
pub use capture::{
    BrowserCapture, CaptureBackend, CaptureError, CaptureTarget, DirectCapture, Scene, ScreenCapture,
    ScreenshotRecord,
};

// Re-export the driver contract
pub use driver::{ChromeDriver, DriverError, MockDriver, UiDriver};

// Re-export session management
pub use session::{Session, Summary};
