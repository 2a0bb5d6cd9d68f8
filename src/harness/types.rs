use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::capture::{CaptureError, StructureError};
use crate::driver::DriverError;
use crate::session::SessionError;

/// Outcome status of a test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    /// Ran to completion and observed the expected behaviour
    Pass,
    /// Ran to completion without observing the expected behaviour
    Fail,
    /// Could not run to completion
    Error,
    /// Ran to completion; verification is left to a human looking at the screenshots
    Inconclusive,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pass => "PASS",
            TestStatus::Fail => "FAIL",
            TestStatus::Error => "ERROR",
            TestStatus::Inconclusive => "INCONCLUSIVE",
        }
    }

    /// Whether this status makes the run unsuccessful
    pub fn is_failure(&self) -> bool {
        matches!(self, TestStatus::Fail | TestStatus::Error)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The recorded result of one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    pub status: TestStatus,

    /// Structured observations (counted elements, discovered controls, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,

    /// Error message for ERROR outcomes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Short human note
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    pub duration_ms: u64,
}

impl TestOutcome {
    pub fn from_verdict(name: impl Into<String>, verdict: Verdict, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            status: verdict.status,
            detail: verdict.detail,
            error: None,
            note: verdict.note,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn error(name: impl Into<String>, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Error,
            detail: None,
            error: Some(message.into()),
            note: None,
            duration_ms: elapsed.as_millis() as u64,
        }
    }
}

/// An environment or behaviour anomaly noticed by a test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectReport {
    /// Test that noticed it
    pub test: String,
    pub issue: String,
}

/// Non-error result of a case body.
///
/// A FAIL verdict is only obtainable through
/// [`TestContext::fail_with_defect`](super::case::TestContext::fail_with_defect),
/// so every FAIL outcome has a matching defect.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    status: TestStatus,
    note: Option<String>,
    detail: Option<serde_json::Value>,
}

impl Verdict {
    pub fn pass() -> Self {
        Self {
            status: TestStatus::Pass,
            note: None,
            detail: None,
        }
    }

    /// Completed; needs visual review
    pub fn inconclusive(note: impl Into<String>) -> Self {
        Self {
            status: TestStatus::Inconclusive,
            note: Some(note.into()),
            detail: None,
        }
    }

    pub(crate) fn fail(note: impl Into<String>) -> Self {
        Self {
            status: TestStatus::Fail,
            note: Some(note.into()),
            detail: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn status(&self) -> TestStatus {
        self.status
    }
}

/// Anything that stops a case body from running to completion
#[derive(Debug, Error)]
pub enum CaseError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Message(String),
}

impl CaseError {
    pub fn msg(message: impl Into<String>) -> Self {
        CaseError::Message(message.into())
    }
}

/// Failure to acquire the application or automation session
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("application exited during startup ({status})")]
    AppExited { status: String },

    #[error("application not ready at {probe} after {timeout:?}")]
    NotReady { probe: String, timeout: Duration },

    #[error("capture backend failed to start: {0}")]
    Backend(#[from] CaptureError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Error types for harness operations
#[derive(Debug)]
pub enum HarnessError {
    /// A case with this name is already registered
    DuplicateCase(String),

    /// The run was started twice
    AlreadyRun,

    /// Session bookkeeping error
    Session(SessionError),

    /// I/O error (directories, report)
    Io(std::io::Error),
}

impl std::fmt::Display for HarnessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HarnessError::DuplicateCase(name) => write!(f, "Duplicate test case: {}", name),
            HarnessError::AlreadyRun => write!(f, "Orchestrator has already run"),
            HarnessError::Session(err) => write!(f, "Session error: {}", err),
            HarnessError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for HarnessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HarnessError::DuplicateCase(_) | HarnessError::AlreadyRun => None,
            HarnessError::Session(err) => Some(err),
            HarnessError::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for HarnessError {
    fn from(err: std::io::Error) -> Self {
        HarnessError::Io(err)
    }
}

impl From<SessionError> for HarnessError {
    fn from(err: SessionError) -> Self {
        HarnessError::Session(err)
    }
}
