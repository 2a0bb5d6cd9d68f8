//! The test-case contract and its failure-isolation boundary.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::types::{CaseError, DefectReport, TestOutcome, Verdict};
use crate::capture::{CaptureBackend, CaptureTarget, Scene, ScreenshotRecord};
use crate::driver::{DriverError, SettleCondition, Settled, UiDriver, wait};
use crate::fixtures::Fixture;
use crate::session::Session;

/// One self-contained scenario
pub trait TestCase {
    /// Unique name within a run
    fn name(&self) -> &str;

    /// Run the scenario. Return `Err` when it cannot run to completion.
    fn execute(&self, ctx: &mut TestContext<'_>) -> Result<Verdict, CaseError>;
}

/// How settle waits are paced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// Honour wait ceilings
    #[default]
    RealTime,
    /// Treat every ceiling as zero: conditions are probed once, sleeps are
    /// skipped. For dry runs against in-memory backends.
    Immediate,
}

/// What a running case may touch: the backend, the automation session (if
/// any), and append-only access to screenshots and defects.
pub struct TestContext<'a> {
    case: String,
    session: &'a mut Session,
    backend: &'a mut dyn CaptureBackend,
    pacing: Pacing,
}

impl<'a> TestContext<'a> {
    pub fn new(
        case: impl Into<String>,
        session: &'a mut Session,
        backend: &'a mut dyn CaptureBackend,
        pacing: Pacing,
    ) -> Self {
        Self {
            case: case.into(),
            session,
            backend,
            pacing,
        }
    }

    pub fn case_name(&self) -> &str {
        &self.case
    }

    pub fn fixtures(&self) -> &[Fixture] {
        self.session.fixtures()
    }

    /// Capture `target` under a logical name and record the screenshot
    pub fn screenshot(
        &mut self,
        name: &str,
        description: &str,
        target: CaptureTarget<'_>,
    ) -> Result<ScreenshotRecord, CaseError> {
        let shot = self.session.allocate_shot(name, description);
        let record = self.backend.capture(target, shot)?;
        info!("[{}] captured {} -> {}", self.case, name, record.file_name());
        self.session.record_screenshot(record.clone());
        Ok(record)
    }

    /// Render a scene with the direct backend
    pub fn render(&mut self, name: &str, description: &str, scene: &Scene) -> Result<ScreenshotRecord, CaseError> {
        self.screenshot(name, description, CaptureTarget::Scene(scene))
    }

    /// Capture whatever is currently displayed
    pub fn capture_display(&mut self, name: &str, description: &str) -> Result<ScreenshotRecord, CaseError> {
        self.screenshot(name, description, CaptureTarget::CurrentDisplay)
    }

    /// The automation session, or `DriverError::NotAttached`
    pub fn driver(&mut self) -> Result<&mut dyn UiDriver, CaseError> {
        self.backend
            .ui_driver()
            .ok_or(CaseError::Driver(DriverError::NotAttached))
    }

    /// Wait for the UI to settle, up to `ceiling`.
    ///
    /// Without a driver only an unconditional pause is possible.
    pub fn settle(&mut self, ceiling: Duration, condition: Option<SettleCondition>) -> Result<Settled, CaseError> {
        let ceiling = match self.pacing {
            Pacing::RealTime => ceiling,
            Pacing::Immediate => Duration::ZERO,
        };
        let case = self.case.clone();
        let settled = match self.backend.ui_driver() {
            Some(driver) => driver.wait_until_settled(ceiling, condition.as_ref())?,
            None if condition.is_some() => return Err(DriverError::NotAttached.into()),
            None => wait::sleep_for(ceiling),
        };
        debug!("[{}] settle: {:?}", case, settled);
        Ok(settled)
    }

    /// Record an anomaly without failing the case
    pub fn report_defect(&mut self, issue: impl Into<String>) {
        let issue = issue.into();
        warn!("[{}] defect: {}", self.case, issue);
        self.session.record_defect(DefectReport {
            test: self.case.clone(),
            issue,
        });
    }

    /// Record a defect and produce the matching FAIL verdict
    pub fn fail_with_defect(&mut self, issue: impl Into<String>) -> Verdict {
        let issue = issue.into();
        self.report_defect(issue.clone());
        Verdict::fail(issue)
    }
}

/// Run one case; whatever happens inside, exactly one outcome comes out.
pub fn run_case(case: &dyn TestCase, ctx: &mut TestContext<'_>) -> TestOutcome {
    let name = case.name().to_string();
    let start = Instant::now();
    info!("running {}", name);

    let result = panic::catch_unwind(AssertUnwindSafe(|| case.execute(ctx)));
    let outcome = match result {
        Ok(Ok(verdict)) => TestOutcome::from_verdict(&name, verdict, start.elapsed()),
        Ok(Err(e)) => TestOutcome::error(&name, e.to_string(), start.elapsed()),
        Err(payload) => TestOutcome::error(
            &name,
            format!("panicked: {}", panic_message(payload.as_ref())),
            start.elapsed(),
        ),
    };

    match &outcome.error {
        Some(err) => error!("{} ERROR: {}", name, err),
        None => info!("{} {} ({} ms)", name, outcome.status, outcome.duration_ms),
    }
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::DirectCapture;
    use crate::harness::types::TestStatus;

    struct Closure<F>(&'static str, F);

    impl<F> TestCase for Closure<F>
    where
        F: Fn(&mut TestContext<'_>) -> Result<Verdict, CaseError>,
    {
        fn name(&self) -> &str {
            self.0
        }

        fn execute(&self, ctx: &mut TestContext<'_>) -> Result<Verdict, CaseError> {
            (self.1)(ctx)
        }
    }

    fn scripted<F>(name: &'static str, body: F) -> Closure<F>
    where
        F: Fn(&mut TestContext<'_>) -> Result<Verdict, CaseError>,
    {
        Closure(name, body)
    }

    fn run(case: &dyn TestCase, session: &mut Session) -> TestOutcome {
        let mut backend = DirectCapture::software(32, 24);
        let mut ctx = TestContext::new(case.name(), session, &mut backend, Pacing::Immediate);
        run_case(case, &mut ctx)
    }

    #[test]
    fn test_pass_with_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(dir.path(), "direct");
        session.init().unwrap();

        let case = scripted("oxygen", |ctx| {
            let scene = Scene::new("oxygen").atom(0.0, 0.0, 0.0, 8);
            ctx.render("oxygen", "Single oxygen atom", &scene)?;
            Ok(Verdict::pass())
        });
        let outcome = run(&case, &mut session);

        assert_eq!(outcome.status, TestStatus::Pass);
        assert_eq!(session.screenshots().len(), 1);
        assert!(session.screenshots()[0].path.exists());
    }

    #[test]
    fn test_error_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(dir.path(), "direct");
        let case = scripted("broken", |_ctx| Err(CaseError::msg("fixture unreadable")));
        let outcome = run(&case, &mut session);
        assert_eq!(outcome.status, TestStatus::Error);
        assert_eq!(outcome.error.as_deref(), Some("fixture unreadable"));
    }

    #[test]
    fn test_panic_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(dir.path(), "direct");
        let case = scripted("explodes", |_ctx| panic!("kaboom"));
        let outcome = run(&case, &mut session);
        assert_eq!(outcome.status, TestStatus::Error);
        assert!(outcome.error.unwrap().contains("kaboom"));
    }

    #[test]
    fn test_fail_always_carries_defect() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(dir.path(), "direct");
        let case = scripted("probe", |ctx| Ok(ctx.fail_with_defect("No canvas element found in DOM")));
        let outcome = run(&case, &mut session);
        assert_eq!(outcome.status, TestStatus::Fail);
        assert_eq!(session.defects().len(), 1);
        assert_eq!(session.defects()[0].test, "probe");
    }

    #[test]
    fn test_driver_absent_on_direct_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(dir.path(), "direct");
        let case = scripted("needs_driver", |ctx| {
            ctx.driver()?.navigate("http://localhost:1420")?;
            Ok(Verdict::pass())
        });
        let outcome = run(&case, &mut session);
        assert_eq!(outcome.status, TestStatus::Error);
        assert!(outcome.error.unwrap().contains("no automation session"));
    }

    #[test]
    fn test_capture_error_becomes_error_outcome() {
        let dir = tempfile::tempdir().unwrap();
        // Screenshots directory never created: the capture cannot be written
        let mut session = Session::new(dir.path().join("missing"), "direct");
        let case = scripted("unwritable", |ctx| {
            ctx.render("x", "", &Scene::new("x").atom(0.0, 0.0, 0.0, 6))?;
            Ok(Verdict::pass())
        });
        let outcome = run(&case, &mut session);
        assert_eq!(outcome.status, TestStatus::Error);
        assert!(session.screenshots().is_empty());
    }
}
