//! Types for run results.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::harness::types::TestOutcome;
use crate::session::{Session, Summary};

/// Result of a complete harness run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub session_id: String,

    /// Backend label used for the run
    pub backend: String,

    /// Counts at the moment of reporting
    pub summary: Summary,

    /// All outcomes, in execution order
    pub outcomes: Vec<TestOutcome>,

    /// Markdown report, when one was written
    pub report_path: Option<PathBuf>,

    /// Machine-readable results, when written
    pub results_path: Option<PathBuf>,

    /// Why the backend could not be started, if it could not
    pub startup_error: Option<String>,
}

impl RunSummary {
    pub fn completed(session: &Session, report_path: PathBuf, results_path: PathBuf) -> Self {
        Self {
            session_id: session.id.clone(),
            backend: session.backend.clone(),
            summary: session.summary(),
            outcomes: session.outcomes().to_vec(),
            report_path: Some(report_path),
            results_path: Some(results_path),
            startup_error: None,
        }
    }

    pub fn failed_startup(session: &Session, error: String, report_path: PathBuf) -> Self {
        Self {
            session_id: session.id.clone(),
            backend: session.backend.clone(),
            summary: session.summary(),
            outcomes: Vec::new(),
            report_path: Some(report_path),
            results_path: None,
            startup_error: Some(error),
        }
    }

    /// True when the session started and recorded no FAIL or ERROR outcome
    pub fn success(&self) -> bool {
        self.startup_error.is_none() && self.summary.failed == 0 && self.summary.errored == 0
    }

    /// Process exit signal: 0 on success, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        if self.success() { 0 } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::types::{TestOutcome, Verdict};
    use std::time::Duration;

    #[test]
    fn test_exit_code_follows_outcomes() {
        let mut session = Session::new("/tmp/visual", "direct");
        session
            .record_outcome(TestOutcome::from_verdict("a", Verdict::pass(), Duration::ZERO))
            .unwrap();
        session
            .record_outcome(TestOutcome::from_verdict("b", Verdict::inconclusive("look"), Duration::ZERO))
            .unwrap();
        let ok = RunSummary::completed(&session, "r.md".into(), "r.json".into());
        assert!(ok.success());
        assert_eq!(ok.exit_code(), 0);

        session
            .record_outcome(TestOutcome::error("c", "boom", Duration::ZERO))
            .unwrap();
        let failed = RunSummary::completed(&session, "r.md".into(), "r.json".into());
        assert_eq!(failed.exit_code(), 1);
    }

    #[test]
    fn test_startup_failure_is_non_zero() {
        let session = Session::new("/tmp/visual", "browser");
        let summary = RunSummary::failed_startup(&session, "chrome not found".to_string(), "r.md".into());
        assert_eq!(summary.summary.total, 0);
        assert_eq!(summary.exit_code(), 1);
    }
}
