//! Session orchestration.
//!
//! ```text
//! Init -> BackendStarting -> Running -> Reporting -> Done
//!               |
//!               +-> FailedStartup
//! ```
//!
//! The orchestrator owns the capture backend and, when configured, the
//! application process. Both are released exactly once by a guard, whether
//! the run finishes, fails to start, or unwinds.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::case::{Pacing, TestCase, TestContext, run_case};
use super::types::{HarnessError, HarnessResult, StartupError};
use crate::capture::CaptureBackend;
use crate::config::{APP_LOG_FILE_NAME, AppSettings, DEFAULT_SETTLE_POLL, DEFAULT_SHUTDOWN_GRACE};
use crate::fixtures::Fixture;
use crate::process::AppProcess;
use crate::report;
use crate::runner::RunSummary;
use crate::session::Session;

/// Orchestrator lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Init,
    BackendStarting,
    Running,
    Reporting,
    Done,
    FailedStartup,
}

/// Backend and application process, released exactly once
struct Resources<'a> {
    backend: &'a mut dyn CaptureBackend,
    app: Option<AppProcess>,
    shutdown_grace: Duration,
    released: bool,
}

impl Resources<'_> {
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        info!("releasing {} backend", self.backend.source_type());
        self.backend.stop();
        if let Some(mut app) = self.app.take() {
            match app.terminate(self.shutdown_grace) {
                Ok(status) => info!("application stopped ({:?})", status),
                Err(e) => warn!("failed to stop application: {}", e),
            }
        }
    }
}

impl Drop for Resources<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Runs an ordered list of test cases against one capture backend
pub struct Orchestrator {
    base_dir: PathBuf,
    backend: Box<dyn CaptureBackend>,
    app: Option<AppSettings>,
    cases: Vec<Box<dyn TestCase>>,
    fixtures: Vec<Fixture>,
    pacing: Pacing,
    /// Interval between application readiness probes
    settle_poll: Duration,
    state: SessionState,
}

impl Orchestrator {
    pub fn new(base_dir: impl Into<PathBuf>, backend: Box<dyn CaptureBackend>) -> Self {
        Self {
            base_dir: base_dir.into(),
            backend,
            app: None,
            cases: Vec::new(),
            fixtures: Vec::new(),
            pacing: Pacing::RealTime,
            settle_poll: Duration::from_millis(DEFAULT_SETTLE_POLL),
            state: SessionState::Init,
        }
    }

    /// Launch and own the application under test for the duration of the run
    pub fn with_app(mut self, settings: AppSettings) -> Self {
        self.app = settings.is_managed().then_some(settings);
        self
    }

    pub fn with_fixtures(mut self, fixtures: Vec<Fixture>) -> Self {
        self.fixtures = fixtures;
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_settle_poll(mut self, poll: Duration) -> Self {
        self.settle_poll = poll;
        self
    }

    pub fn settle_poll(&self) -> Duration {
        self.settle_poll
    }

    /// Add a case; names must be unique
    pub fn register(&mut self, case: Box<dyn TestCase>) -> HarnessResult<()> {
        if self.cases.iter().any(|c| c.name() == case.name()) {
            return Err(HarnessError::DuplicateCase(case.name().to_string()));
        }
        self.cases.push(case);
        Ok(())
    }

    pub fn register_all(&mut self, cases: impl IntoIterator<Item = Box<dyn TestCase>>) -> HarnessResult<()> {
        for case in cases {
            self.register(case)?;
        }
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn case_names(&self) -> Vec<&str> {
        self.cases.iter().map(|c| c.name()).collect()
    }

    /// Run the session to completion.
    ///
    /// A startup failure is not an `Err`: it yields a summary with a
    /// non-zero exit code and a minimal report. `Err` is reserved for the
    /// harness itself failing (directories, report writing).
    pub fn run(&mut self) -> HarnessResult<RunSummary> {
        if self.state != SessionState::Init {
            return Err(HarnessError::AlreadyRun);
        }

        let mut session = Session::new(&self.base_dir, self.backend.describe());
        session.set_fixtures(self.fixtures.clone());
        session.init()?;
        info!(
            "session {} in {} ({} cases, backend {})",
            session.id,
            self.base_dir.display(),
            self.cases.len(),
            session.backend
        );

        transition(&mut self.state, SessionState::BackendStarting);
        let mut resources = Resources {
            backend: self.backend.as_mut(),
            app: None,
            shutdown_grace: self
                .app
                .as_ref()
                .map(|a| a.shutdown_grace)
                .unwrap_or(Duration::from_secs(DEFAULT_SHUTDOWN_GRACE)),
            released: false,
        };

        if let Err(e) = start(&mut resources, self.app.as_ref(), &session, self.pacing, self.settle_poll) {
            error!("startup failed: {}", e);
            transition(&mut self.state, SessionState::FailedStartup);
            resources.release();

            let message = e.to_string();
            let report_path = report::write_startup_failure(&session, &message, Utc::now())?;
            return Ok(RunSummary::failed_startup(&session, message, report_path));
        }

        transition(&mut self.state, SessionState::Running);
        for case in &self.cases {
            let outcome = {
                let mut ctx = TestContext::new(case.name(), &mut session, &mut *resources.backend, self.pacing);
                run_case(case.as_ref(), &mut ctx)
            };
            session.record_outcome(outcome)?;
        }
        if session.has_failures() {
            warn!("session {} recorded FAIL or ERROR outcomes", session.id);
        }

        transition(&mut self.state, SessionState::Reporting);
        resources.release();
        drop(resources);

        let generated = Utc::now();
        let report_path = report::write_report(&session, generated)?;
        let results_path = report::write_results_json(&session, generated)?;
        transition(&mut self.state, SessionState::Done);

        let summary = RunSummary::completed(&session, report_path, results_path);
        info!(
            "{} passed, {} failed, {} errors, {} inconclusive",
            summary.summary.passed, summary.summary.failed, summary.summary.errored, summary.summary.inconclusive
        );
        Ok(summary)
    }
}

fn transition(state: &mut SessionState, next: SessionState) {
    info!("state {:?} -> {:?}", state, next);
    *state = next;
}

/// Launch the application (if configured), wait for it, start the backend
fn start(
    resources: &mut Resources<'_>,
    app: Option<&AppSettings>,
    session: &Session,
    pacing: Pacing,
    poll: Duration,
) -> Result<(), StartupError> {
    if let Some(settings) = app {
        let process = AppProcess::launch(settings, &session.base_dir.join(APP_LOG_FILE_NAME))?;
        let process = resources.app.insert(process);

        let probe = settings.ready_probe.as_deref();
        let ceiling = match (pacing, probe) {
            (Pacing::Immediate, None) => Duration::ZERO,
            _ => settings.startup_timeout,
        };
        let waited = process.wait_until_ready(probe, ceiling, poll)?;
        info!("application ready after {:?}", waited);
    }

    resources.backend.start()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::DirectCapture;
    use crate::harness::case::TestContext;
    use crate::harness::types::{CaseError, TestStatus, Verdict};

    struct Named(&'static str);

    impl TestCase for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn execute(&self, _ctx: &mut TestContext<'_>) -> Result<Verdict, CaseError> {
            Ok(Verdict::pass())
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut orchestrator = Orchestrator::new("/tmp/unused", Box::new(DirectCapture::software(8, 8)));
        orchestrator.register(Box::new(Named("a"))).unwrap();
        let err = orchestrator.register(Box::new(Named("a"))).unwrap_err();
        assert!(matches!(err, HarnessError::DuplicateCase(name) if name == "a"));
        assert_eq!(orchestrator.case_names(), vec!["a"]);
    }

    #[test]
    fn test_run_reaches_done() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(dir.path(), Box::new(DirectCapture::software(8, 8)))
            .with_pacing(Pacing::Immediate);
        orchestrator.register(Box::new(Named("a"))).unwrap();
        orchestrator.register(Box::new(Named("b"))).unwrap();

        let summary = orchestrator.run().unwrap();
        assert_eq!(orchestrator.state(), SessionState::Done);
        assert_eq!(summary.summary.total, 2);
        assert_eq!(summary.outcomes.iter().filter(|o| o.status == TestStatus::Pass).count(), 2);
        assert_eq!(summary.exit_code(), 0);

        assert!(matches!(orchestrator.run(), Err(HarnessError::AlreadyRun)));
    }

    #[test]
    fn test_settle_poll_defaults_and_overrides() {
        let orchestrator = Orchestrator::new("/tmp/unused", Box::new(DirectCapture::software(8, 8)));
        assert_eq!(orchestrator.settle_poll(), Duration::from_millis(DEFAULT_SETTLE_POLL));

        let orchestrator = orchestrator.with_settle_poll(Duration::from_millis(20));
        assert_eq!(orchestrator.settle_poll(), Duration::from_millis(20));
    }

    #[cfg(unix)]
    #[test]
    fn test_readiness_wait_polls_at_configured_interval() {
        let dir = tempfile::tempdir().unwrap();
        let app = AppSettings {
            command: vec!["sh".to_string(), "-c".to_string(), "sleep 0.2; exit 3".to_string()],
            startup_timeout: Duration::from_secs(30),
            ..AppSettings::defaults()
        };
        let mut orchestrator = Orchestrator::new(dir.path(), Box::new(DirectCapture::software(8, 8)))
            .with_app(app)
            .with_settle_poll(Duration::from_millis(20));
        orchestrator.register(Box::new(Named("never_runs"))).unwrap();

        // No readiness address: the wait runs to the ceiling unless the app exits first
        let started = std::time::Instant::now();
        let summary = orchestrator.run().unwrap();
        assert!(started.elapsed() < Duration::from_secs(10), "took {:?}", started.elapsed());
        assert_eq!(orchestrator.state(), SessionState::FailedStartup);
        assert!(summary.startup_error.as_deref().unwrap().contains("exited"));
    }

    #[cfg(unix)]
    #[test]
    fn test_app_exiting_early_is_startup_failure() {
        let dir = tempfile::tempdir().unwrap();
        let app = AppSettings {
            command: vec!["sh".to_string(), "-c".to_string(), "exit 1".to_string()],
            startup_timeout: Duration::from_secs(5),
            ..AppSettings::defaults()
        };
        let mut orchestrator = Orchestrator::new(dir.path(), Box::new(DirectCapture::software(8, 8))).with_app(app);
        orchestrator.register(Box::new(Named("never_runs"))).unwrap();

        let summary = orchestrator.run().unwrap();
        assert_eq!(orchestrator.state(), SessionState::FailedStartup);
        assert_eq!(summary.summary.total, 0);
        assert_ne!(summary.exit_code(), 0);
        assert!(dir.path().join(APP_LOG_FILE_NAME).exists());
    }
}
