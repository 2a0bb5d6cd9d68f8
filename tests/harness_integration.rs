//! End-to-end runs of the orchestrator against in-process backends

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use gui_vision::capture::{
    BrowserCapture, CaptureBackend, CaptureError, CaptureResult, CaptureTarget, DirectCapture, Scene,
    ScreenshotRecord, ShotPlan,
};
use gui_vision::config::{
    self, APP_LOG_FILE_NAME, AppSettings, BrowserSettings, REPORT_FILE_NAME, RESULTS_FILE_NAME, STRUCTURES_DIR_NAME,
};
use gui_vision::driver::{MockAction, MockDriver, MockElement, UiDriver};
use gui_vision::fixtures;
use gui_vision::harness::suites::{ControlsVisible, GuiLoads, RenderStructure};
use gui_vision::harness::{
    CaseError, Orchestrator, Pacing, SessionState, TestCase, TestContext, TestStatus, Verdict, browser_suite,
    direct_suite,
};

const WATER_XYZ: &str = "3
water
O   0.000   0.000   0.117
H   0.000   0.757  -0.467
H   0.000  -0.757  -0.467
";

/// Direct backend that counts how often it is started and stopped
struct CountingBackend {
    inner: DirectCapture,
    fail_start: bool,
    starts: Rc<Cell<usize>>,
    stops: Rc<Cell<usize>>,
}

impl CountingBackend {
    fn new(fail_start: bool) -> (Self, Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let starts = Rc::new(Cell::new(0));
        let stops = Rc::new(Cell::new(0));
        let backend = Self {
            inner: DirectCapture::software(64, 48),
            fail_start,
            starts: starts.clone(),
            stops: stops.clone(),
        };
        (backend, starts, stops)
    }
}

impl CaptureBackend for CountingBackend {
    fn capture(&mut self, target: CaptureTarget<'_>, shot: ShotPlan) -> CaptureResult<ScreenshotRecord> {
        self.inner.capture(target, shot)
    }

    fn source_type(&self) -> &str {
        "direct"
    }

    fn start(&mut self) -> CaptureResult<()> {
        self.starts.set(self.starts.get() + 1);
        if self.fail_start {
            return Err(CaptureError::ToolUnavailable("scrot".to_string()));
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.stops.set(self.stops.get() + 1);
    }
}

struct Scripted<F> {
    name: &'static str,
    body: F,
}

impl<F> TestCase for Scripted<F>
where
    F: Fn(&mut TestContext<'_>) -> Result<Verdict, CaseError>,
{
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&self, ctx: &mut TestContext<'_>) -> Result<Verdict, CaseError> {
        (self.body)(ctx)
    }
}

fn scripted<F>(name: &'static str, body: F) -> Box<dyn TestCase>
where
    F: Fn(&mut TestContext<'_>) -> Result<Verdict, CaseError> + 'static,
{
    Box::new(Scripted { name, body })
}

fn write_water_fixture(base: &Path) -> PathBuf {
    let dir = base.join(STRUCTURES_DIR_NAME);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("water.xyz");
    fs::write(&path, WATER_XYZ).unwrap();
    path
}

fn read_results(base: &Path) -> serde_json::Value {
    let text = fs::read_to_string(base.join(RESULTS_FILE_NAME)).unwrap();
    serde_json::from_str(&text).unwrap()
}

fn mock_viewer() -> MockDriver {
    MockDriver::new()
        .element(MockElement::new("canvas").attr("id", "viewer"))
        .element(MockElement::new("button").text("Rotation"))
        .element(MockElement::new("button").text("Reset Zoom"))
        .element(MockElement::new("input").attr("type", "file").attr("accept", ".xyz,.pdb"))
        .element(MockElement::new("input").attr("type", "checkbox").attr("id", "bonds"))
        .element(MockElement::new("select").attr("id", "render-mode"))
}

#[test]
fn test_zero_cases_produce_empty_report() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = Orchestrator::new(dir.path(), Box::new(DirectCapture::software(32, 32)));

    let summary = orchestrator.run().unwrap();
    assert_eq!(orchestrator.state(), SessionState::Done);
    assert_eq!(summary.summary.total, 0);
    assert_eq!(summary.exit_code(), 0);

    let report = fs::read_to_string(dir.path().join(REPORT_FILE_NAME)).unwrap();
    for row in ["| Total tests | 0 |", "| Passed | 0 |", "| Failed | 0 |", "| Screenshots | 0 |"] {
        assert!(report.contains(row), "missing {:?} in report", row);
    }
}

#[test]
fn test_direct_render_of_three_atom_structure() {
    let dir = tempfile::tempdir().unwrap();
    write_water_fixture(dir.path());
    let found = fixtures::discover(&dir.path().join(STRUCTURES_DIR_NAME)).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].declared_atoms, Some(3));

    let mut orchestrator = Orchestrator::new(dir.path(), Box::new(DirectCapture::software(160, 120)))
        .with_fixtures(found.clone())
        .with_pacing(Pacing::Immediate);
    orchestrator.register_all(direct_suite(&found)).unwrap();

    let summary = orchestrator.run().unwrap();
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.summary.total, 5);
    assert_eq!(summary.summary.passed, 5);
    // 1 water view, 4 angles, 4 distances, 3 backgrounds, 1 fixture
    assert_eq!(summary.summary.screenshots, 13);
    assert_eq!(summary.summary.defects, 0);

    let outcome = summary
        .outcomes
        .iter()
        .find(|o| o.name == "render_structure[water.xyz]")
        .unwrap();
    assert_eq!(outcome.status, TestStatus::Pass);
    assert_eq!(outcome.detail.as_ref().unwrap()["atoms"], 3);

    let results = read_results(dir.path());
    let shot = results["screenshots"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["name"] == "structure_water_xyz")
        .unwrap();
    let png = image::open(shot["path"].as_str().unwrap()).unwrap();
    assert_eq!((png.width(), png.height()), (160, 120));

    let report = fs::read_to_string(dir.path().join(REPORT_FILE_NAME)).unwrap();
    assert!(report.contains("`water.xyz` (xyz, 3 atoms)"));
}

#[test]
fn test_unwritable_destination_is_error_and_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let shots = dir.path().join(config::SCREENSHOTS_DIR_NAME);

    let mut orchestrator = Orchestrator::new(dir.path(), Box::new(DirectCapture::software(32, 32)));
    orchestrator
        .register(scripted("unwritable", move |ctx| {
            fs::remove_dir_all(&shots)?;
            ctx.render("water", "", &Scene::new("water").atom(0.0, 0.0, 0.0, 8))?;
            Ok(Verdict::pass())
        }))
        .unwrap();
    orchestrator
        .register(scripted("after", |_ctx| Ok(Verdict::pass())))
        .unwrap();

    let summary = orchestrator.run().unwrap();
    assert_eq!(summary.outcomes[0].status, TestStatus::Error);
    assert!(summary.outcomes[0].error.as_deref().unwrap().contains("not writable"));
    assert_eq!(summary.outcomes[1].status, TestStatus::Pass);
    assert_eq!(summary.summary.screenshots, 0);
    assert_eq!(summary.exit_code(), 1);
}

#[cfg(unix)]
#[test]
fn test_read_only_destination_is_error() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let shots = dir.path().join(config::SCREENSHOTS_DIR_NAME);

    let mut orchestrator = Orchestrator::new(dir.path(), Box::new(DirectCapture::software(32, 32)));
    let locked = shots.clone();
    orchestrator
        .register(scripted("read_only", move |ctx| {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o555))?;
            ctx.render("water", "", &Scene::new("water").atom(0.0, 0.0, 0.0, 8))?;
            Ok(Verdict::pass())
        }))
        .unwrap();
    let unlocked = shots.clone();
    orchestrator
        .register(scripted("after", move |_ctx| {
            fs::set_permissions(&unlocked, fs::Permissions::from_mode(0o755))?;
            Ok(Verdict::pass())
        }))
        .unwrap();

    let summary = orchestrator.run().unwrap();
    let error = summary.outcomes[0].error.as_deref().unwrap();
    assert_eq!(summary.outcomes[0].status, TestStatus::Error);
    assert!(error.contains("not writable"), "{}", error);
    assert!(error.contains("read-only"), "{}", error);
    assert_eq!(summary.outcomes[1].status, TestStatus::Pass);
    assert_eq!(summary.summary.screenshots, 0);
    assert_eq!(fs::read_dir(&shots).unwrap().count(), 0);
}

#[test]
fn test_oversized_xyz_header_passes_with_defect() {
    let dir = tempfile::tempdir().unwrap();
    let structures = dir.path().join(STRUCTURES_DIR_NAME);
    fs::create_dir_all(&structures).unwrap();
    fs::write(
        structures.join("huge.xyz"),
        "18446744073709551615\nlying header\nO 0 0 0\nH 0.757 0.586 0\n",
    )
    .unwrap();
    fs::write(structures.join("mangled.xyz"), "three\nnot a count\nO 0 0 0\n").unwrap();

    let found = fixtures::discover(&structures).unwrap();
    assert_eq!(found[0].declared_atoms, Some(usize::MAX));
    assert_eq!(found[1].declared_atoms, None);

    let mut orchestrator = Orchestrator::new(dir.path(), Box::new(DirectCapture::software(48, 32)))
        .with_fixtures(found.clone())
        .with_pacing(Pacing::Immediate);
    for fixture in found {
        orchestrator.register(Box::new(RenderStructure::new(fixture))).unwrap();
    }

    let summary = orchestrator.run().unwrap();
    let huge = &summary.outcomes[0];
    assert_eq!(huge.name, "render_structure[huge.xyz]");
    assert_eq!(huge.status, TestStatus::Pass);
    assert_eq!(huge.detail.as_ref().unwrap()["atoms"], 2);

    let mangled = &summary.outcomes[1];
    assert_eq!(mangled.status, TestStatus::Error);
    assert!(mangled.error.as_deref().unwrap().contains("invalid atom count 'three'"));

    let results = read_results(dir.path());
    assert_eq!(results["defects"].as_array().unwrap().len(), 1);
    assert_eq!(results["defects"][0]["test"], "render_structure[huge.xyz]");
    assert_eq!(
        results["defects"][0]["issue"],
        "huge.xyz declares 18446744073709551615 atoms but contains 2"
    );
    assert_eq!(summary.exit_code(), 1);
}

#[test]
fn test_fixtures_sharing_a_stem_get_distinct_screenshots() {
    let dir = tempfile::tempdir().unwrap();
    write_water_fixture(dir.path());
    fs::write(
        dir.path().join(STRUCTURES_DIR_NAME).join("water.pdb"),
        "ATOM      1  O   HOH A   1       0.000   0.000   0.117  1.00  0.00           O\nEND\n",
    )
    .unwrap();
    let found = fixtures::discover(&dir.path().join(STRUCTURES_DIR_NAME)).unwrap();

    let mut orchestrator = Orchestrator::new(dir.path(), Box::new(DirectCapture::software(48, 32)))
        .with_fixtures(found.clone())
        .with_pacing(Pacing::Immediate);
    for fixture in found {
        orchestrator.register(Box::new(RenderStructure::new(fixture))).unwrap();
    }
    let summary = orchestrator.run().unwrap();
    assert_eq!(summary.summary.passed, 2);

    let results = read_results(dir.path());
    let names: Vec<&str> = results["screenshots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["structure_water_pdb", "structure_water_xyz"]);

    let report = fs::read_to_string(dir.path().join(REPORT_FILE_NAME)).unwrap();
    assert!(report.contains("### structure_water_pdb"));
    assert!(report.contains("### structure_water_xyz"));
}

#[cfg(unix)]
#[test]
fn test_managed_app_terminated_once_after_successful_run() {
    let dir = tempfile::tempdir().unwrap();
    let script = "trap 'echo terminated; kill $child 2>/dev/null; exit 0' TERM; \
                  echo started; sleep 30 & child=$!; wait";
    let app = AppSettings {
        command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
        startup_timeout: Duration::from_millis(300),
        shutdown_grace: Duration::from_secs(5),
        ..AppSettings::defaults()
    };
    let (backend, starts, stops) = CountingBackend::new(false);

    let mut orchestrator = Orchestrator::new(dir.path(), Box::new(backend)).with_app(app);
    orchestrator
        .register(scripted("while_app_runs", |ctx| {
            ctx.render("oxygen", "Oxygen", &Scene::new("oxygen").atom(0.0, 0.0, 0.0, 8))?;
            Ok(Verdict::pass())
        }))
        .unwrap();

    let started = std::time::Instant::now();
    let summary = orchestrator.run().unwrap();
    assert_eq!(orchestrator.state(), SessionState::Done);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!((starts.get(), stops.get()), (1, 1));
    // SIGTERM was honoured within the grace period, no kill needed
    assert!(started.elapsed() < Duration::from_secs(5));

    let log = fs::read_to_string(dir.path().join(APP_LOG_FILE_NAME)).unwrap();
    assert_eq!(log.matches("started").count(), 1);
    assert_eq!(log.matches("terminated").count(), 1);
}

#[test]
fn test_missing_canvas_is_fail_with_defect() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockDriver::new().element(MockElement::new("button").text("Load"));
    let backend = BrowserCapture::new(BrowserSettings::defaults(), Duration::from_millis(1))
        .with_driver(Box::new(driver));

    let mut orchestrator = Orchestrator::new(dir.path(), Box::new(backend)).with_pacing(Pacing::Immediate);
    orchestrator
        .register(Box::new(GuiLoads::new(config::DEFAULT_APP_URL)))
        .unwrap();

    let summary = orchestrator.run().unwrap();
    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.status, TestStatus::Fail);
    assert_eq!(outcome.note.as_deref(), Some("No canvas element found in DOM"));
    assert_eq!(summary.summary.defects, 1);
    // The screenshot is still taken before the check
    assert_eq!(summary.summary.screenshots, 1);

    let results = read_results(dir.path());
    assert_eq!(results["defects"][0]["test"], "gui_loads");
    assert_eq!(results["defects"][0]["issue"], "No canvas element found in DOM");
}

#[test]
fn test_startup_failure_runs_nothing_and_releases_once() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, starts, stops) = CountingBackend::new(true);

    let mut orchestrator = Orchestrator::new(dir.path(), Box::new(backend));
    orchestrator
        .register(scripted("never_runs", |_ctx| panic!("must not run")))
        .unwrap();

    let summary = orchestrator.run().unwrap();
    assert_eq!(orchestrator.state(), SessionState::FailedStartup);
    assert_eq!(summary.summary.total, 0);
    assert!(summary.outcomes.is_empty());
    assert_ne!(summary.exit_code(), 0);
    assert!(summary.startup_error.as_deref().unwrap().contains("scrot"));
    assert_eq!(starts.get(), 1);
    assert_eq!(stops.get(), 1);

    let report = fs::read_to_string(dir.path().join(REPORT_FILE_NAME)).unwrap();
    assert!(report.contains("## Startup Failure"));
}

#[test]
fn test_panicking_case_is_contained_and_cleanup_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, _starts, stops) = CountingBackend::new(false);

    let mut orchestrator = Orchestrator::new(dir.path(), Box::new(backend));
    orchestrator
        .register(scripted("first", |ctx| {
            ctx.render("oxygen", "Oxygen", &Scene::new("oxygen").atom(0.0, 0.0, 0.0, 8))?;
            Ok(Verdict::pass())
        }))
        .unwrap();
    orchestrator
        .register(scripted("explodes", |_ctx| panic!("renderer crashed")))
        .unwrap();
    orchestrator
        .register(scripted("last", |_ctx| Ok(Verdict::inconclusive("look at it"))))
        .unwrap();

    let summary = orchestrator.run().unwrap();
    let statuses: Vec<TestStatus> = summary.outcomes.iter().map(|o| o.status).collect();
    assert_eq!(statuses, vec![TestStatus::Pass, TestStatus::Error, TestStatus::Inconclusive]);
    assert!(summary.outcomes[1].error.as_deref().unwrap().contains("renderer crashed"));
    assert_eq!(stops.get(), 1);
}

#[test]
fn test_outcomes_match_registered_cases() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = Orchestrator::new(dir.path(), Box::new(DirectCapture::software(32, 32)));
    let names = ["alpha", "beta", "gamma", "delta"];
    for name in names {
        orchestrator
            .register(scripted(name, |ctx| {
                if ctx.case_name() == "gamma" {
                    Err(CaseError::msg("boom"))
                } else {
                    Ok(Verdict::pass())
                }
            }))
            .unwrap();
    }

    let summary = orchestrator.run().unwrap();
    let recorded: Vec<&str> = summary.outcomes.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(recorded, names.to_vec());

    let results = read_results(dir.path());
    let s = &results["summary"];
    assert_eq!(s["total"], 4);
    assert_eq!(s["passed"], 3);
    assert_eq!(s["errored"], 1);
    assert_eq!(
        s["total"].as_u64().unwrap(),
        ["passed", "failed", "errored", "inconclusive"]
            .iter()
            .map(|k| s[*k].as_u64().unwrap())
            .sum::<u64>()
    );
}

#[test]
fn test_browser_suite_against_mock_viewer() {
    let dir = tempfile::tempdir().unwrap();
    write_water_fixture(dir.path());
    let found = fixtures::discover(&dir.path().join(STRUCTURES_DIR_NAME)).unwrap();

    let driver = mock_viewer();
    let log = driver.log();
    let backend = BrowserCapture::new(BrowserSettings::defaults(), Duration::from_millis(1))
        .with_driver(Box::new(driver));

    let mut orchestrator = Orchestrator::new(dir.path(), Box::new(backend))
        .with_fixtures(found.clone())
        .with_pacing(Pacing::Immediate);
    orchestrator
        .register_all(browser_suite(config::DEFAULT_APP_URL, &found))
        .unwrap();

    let summary = orchestrator.run().unwrap();
    let statuses: Vec<(&str, TestStatus)> = summary
        .outcomes
        .iter()
        .map(|o| (o.name.as_str(), o.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("gui_loads", TestStatus::Pass),
            ("ui_controls", TestStatus::Pass),
            ("load_structure[water.xyz]", TestStatus::Pass),
            ("rotation", TestStatus::Inconclusive),
            ("zoom", TestStatus::Inconclusive),
        ]
    );
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.summary.defects, 0);

    // start() and gui_loads navigate to the same URL: one page load
    assert_eq!(log.page_loads(), 1);
    assert!(log.contains(&MockAction::Drag {
        selector: "canvas".to_string(),
        dx: 200.0,
        dy: 100.0,
    }));
    assert!(log.contains(&MockAction::SendKeys {
        selector: "canvas".to_string(),
        keys: "+++++".to_string(),
    }));
    assert_eq!(log.actions().last(), Some(&MockAction::Close));

    let controls = summary.outcomes.iter().find(|o| o.name == "ui_controls").unwrap();
    let detail = controls.detail.as_ref().unwrap();
    assert_eq!(detail["buttons"], 2);
    assert_eq!(detail["checkboxes"], 1);
    assert_eq!(detail["selects"], 1);
    assert_eq!(detail["toolbar_settled"], true);

    let report = fs::read_to_string(dir.path().join(REPORT_FILE_NAME)).unwrap();
    assert!(report.contains("## Visual Review"));
    assert!(report.contains("- **rotation**:"));
    assert!(report.contains("### zoom_in"));
}

#[test]
fn test_controls_wait_for_toolbar_buttons() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockDriver::new()
        .element(MockElement::new("canvas"))
        .element(MockElement::new("button").text("Reset"))
        .element(MockElement::new("input").attr("type", "file"));
    let backend = BrowserCapture::new(BrowserSettings::defaults(), Duration::from_millis(1))
        .with_driver(Box::new(driver));

    let mut orchestrator = Orchestrator::new(dir.path(), Box::new(backend)).with_pacing(Pacing::Immediate);
    orchestrator.register(Box::new(GuiLoads::new(config::DEFAULT_APP_URL))).unwrap();
    orchestrator.register(Box::new(ControlsVisible)).unwrap();
    let summary = orchestrator.run().unwrap();

    // One toolbar button is below the settle threshold; the wait gives up, the case still inventories
    let controls = &summary.outcomes[1];
    assert_eq!(controls.status, TestStatus::Pass);
    let detail = controls.detail.as_ref().unwrap();
    assert_eq!(detail["toolbar_settled"], false);
    assert_eq!(detail["buttons"], 1);
    assert_eq!(detail["inputs"], 1);
}

#[test]
fn test_navigate_twice_loads_once() {
    let mut driver = MockDriver::new();
    let log = driver.log();
    driver.navigate(config::DEFAULT_APP_URL).unwrap();
    driver.navigate(config::DEFAULT_APP_URL).unwrap();
    assert_eq!(log.page_loads(), 1);
    assert_eq!(driver.current_url(), Some(config::DEFAULT_APP_URL));
}
