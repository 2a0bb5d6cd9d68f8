//! Result aggregation for one harness run.
//!
//! A [`Session`] is created when orchestration starts and collects, in
//! order, every test outcome, screenshot and defect of the run:
//! - entries are append-only; nothing is removed or rewritten
//! - screenshot paths are allocated here, so they are unique per session
//! - outcome names are unique; recording a name twice is an error
//!
//! The session is threaded explicitly through every test case and read once
//! by the report generator.

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::{ScreenshotRecord, ShotPlan, generate_timestamp, screenshot_file_name};
use crate::config::SCREENSHOTS_DIR_NAME;
use crate::fixtures::Fixture;
use crate::harness::types::{DefectReport, TestOutcome, TestStatus};

/// Errors from session bookkeeping
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("an outcome for '{0}' was already recorded")]
    DuplicateOutcome(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Counts derived from the session's collections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub inconclusive: usize,
    pub screenshots: usize,
    pub defects: usize,
}

/// The accumulated state of one run
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session ID
    pub id: String,
    /// Test-run base directory; the report is written here
    pub base_dir: PathBuf,
    pub screenshots_dir: PathBuf,
    /// Label of the capture backend in use
    pub backend: String,
    pub host: String,
    pub started: DateTime<Utc>,
    fixtures: Vec<Fixture>,
    outcomes: Vec<TestOutcome>,
    screenshots: Vec<ScreenshotRecord>,
    defects: Vec<DefectReport>,
    sequence: usize,
}

impl Session {
    pub fn new(base_dir: impl Into<PathBuf>, backend: impl Into<String>) -> Self {
        let base_dir = base_dir.into();
        Self {
            id: generate_session_id(),
            screenshots_dir: base_dir.join(SCREENSHOTS_DIR_NAME),
            base_dir,
            backend: backend.into(),
            host: host_name(),
            started: Utc::now(),
            fixtures: Vec::new(),
            outcomes: Vec::new(),
            screenshots: Vec::new(),
            defects: Vec::new(),
            sequence: 0,
        }
    }

    /// Create the session directories and write session metadata
    pub fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.screenshots_dir)?;

        let metadata = serde_json::json!({
            "id": self.id,
            "created": self.started.to_rfc3339(),
            "backend": self.backend,
            "host": self.host,
        });
        crate::capture::utils::write_json(&self.base_dir.join(".session.json"), &metadata)
    }

    /// Allocate a unique destination for the next screenshot
    pub fn allocate_shot(&mut self, name: &str, description: &str) -> ShotPlan {
        self.sequence += 1;
        let file = screenshot_file_name(&generate_timestamp(), self.sequence, name);
        ShotPlan::new(name, description, self.screenshots_dir.join(file))
    }

    pub fn record_screenshot(&mut self, record: ScreenshotRecord) {
        self.screenshots.push(record);
    }

    pub fn record_defect(&mut self, defect: DefectReport) {
        self.defects.push(defect);
    }

    /// Append an outcome; each test name may be recorded once
    pub fn record_outcome(&mut self, outcome: TestOutcome) -> Result<(), SessionError> {
        if self.outcomes.iter().any(|o| o.name == outcome.name) {
            return Err(SessionError::DuplicateOutcome(outcome.name));
        }
        self.outcomes.push(outcome);
        Ok(())
    }

    pub fn set_fixtures(&mut self, fixtures: Vec<Fixture>) {
        self.fixtures = fixtures;
    }

    pub fn fixtures(&self) -> &[Fixture] {
        &self.fixtures
    }

    pub fn outcomes(&self) -> &[TestOutcome] {
        &self.outcomes
    }

    pub fn outcome(&self, name: &str) -> Option<&TestOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn screenshots(&self) -> &[ScreenshotRecord] {
        &self.screenshots
    }

    pub fn defects(&self) -> &[DefectReport] {
        &self.defects
    }

    pub fn count(&self, status: TestStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn summary(&self) -> Summary {
        Summary {
            total: self.outcomes.len(),
            passed: self.count(TestStatus::Pass),
            failed: self.count(TestStatus::Fail),
            errored: self.count(TestStatus::Error),
            inconclusive: self.count(TestStatus::Inconclusive),
            screenshots: self.screenshots.len(),
            defects: self.defects.len(),
        }
    }

    /// Whether any outcome makes the run unsuccessful
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| o.status.is_failure())
    }
}

/// Generate a unique session ID
fn generate_session_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let pid = std::process::id();
    format!("session_{}_{}", timestamp, pid)
}

fn host_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
