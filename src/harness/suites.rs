//! Built-in test suites for the structure viewer, one per backend.

use std::time::Duration;

use serde_json::json;

use super::case::{TestCase, TestContext};
use super::types::{CaseError, Verdict};
use crate::capture::{CameraPose, Scene, load_structure};
use crate::driver::{ElementHandle, SelectorKind, SettleCondition};
use crate::fixtures::Fixture;

/// Ceiling for the initial page load
const GUI_LOAD_CEILING: Duration = Duration::from_secs(3);
/// Ceiling for a structure file to load and render
const STRUCTURE_LOAD_CEILING: Duration = Duration::from_secs(5);
/// Ceiling after an interaction (drag, keys, click)
const INTERACTION_CEILING: Duration = Duration::from_secs(1);

/// Margin applied when framing a loaded structure
pub const FRAME_MARGIN: f32 = 1.2;

/// Keywords that suggest viewer controls in the page source
const CONTROL_KEYWORDS: &[&str] = &["rotation", "zoom", "background", "render", "load", "open", "file"];

/// Buttons expected once the viewer toolbar has rendered
const MIN_TOOLBAR_BUTTONS: usize = 2;

/// Button captions that suggest a file-loading affordance
const LOAD_BUTTON_WORDS: &[&str] = &["load", "open", "file"];

// ============================================================================
// Molecules
// ============================================================================

pub fn water() -> Scene {
    Scene::new("water")
        .atom(0.000, 0.000, 0.000, 8)
        .atom(0.757, 0.586, 0.000, 1)
        .atom(-0.757, 0.586, 0.000, 1)
}

pub fn methane() -> Scene {
    Scene::new("methane")
        .atom(0.000, 0.000, 0.000, 6)
        .atom(0.629, 0.629, 0.629, 1)
        .atom(-0.629, -0.629, 0.629, 1)
        .atom(-0.629, 0.629, -0.629, 1)
        .atom(0.629, -0.629, -0.629, 1)
}

pub fn ethanol() -> Scene {
    Scene::new("ethanol")
        .atom(-0.047, 0.666, 0.000, 6)
        .atom(-1.184, -0.350, 0.000, 6)
        .atom(1.220, 0.040, 0.000, 8)
        .atom(1.890, 0.730, 0.000, 1)
        .atom(-0.090, 1.300, 0.890, 1)
        .atom(-0.090, 1.300, -0.890, 1)
        .atom(-2.150, 0.160, 0.000, 1)
        .atom(-1.110, -0.990, 0.890, 1)
        .atom(-1.110, -0.990, -0.890, 1)
}

pub fn oxygen() -> Scene {
    Scene::new("oxygen").atom(0.0, 0.0, 0.0, 8)
}

// ============================================================================
// Direct-binding cases
// ============================================================================

/// One planned render: logical name, description, scene
pub struct View {
    pub name: String,
    pub description: String,
    pub scene: Scene,
}

impl View {
    pub fn new(name: impl Into<String>, description: impl Into<String>, scene: Scene) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            scene,
        }
    }
}

/// Renders a fixed series of views; passes once every view is captured
pub struct RenderSeries {
    name: String,
    views: Vec<View>,
}

impl RenderSeries {
    pub fn new(name: impl Into<String>, views: Vec<View>) -> Self {
        Self {
            name: name.into(),
            views,
        }
    }
}

impl TestCase for RenderSeries {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut TestContext<'_>) -> Result<Verdict, CaseError> {
        for view in &self.views {
            ctx.render(&view.name, &view.description, &view.scene)?;
        }
        Ok(Verdict::pass().with_note(format!("{} view(s) rendered", self.views.len())))
    }
}

/// Parses a fixture and renders it framed from +Z
pub struct RenderStructure {
    name: String,
    fixture: Fixture,
}

impl RenderStructure {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            name: format!("render_structure[{}]", fixture.name),
            fixture,
        }
    }
}

impl TestCase for RenderStructure {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut TestContext<'_>) -> Result<Verdict, CaseError> {
        let mut scene = load_structure(&self.fixture.path)?;
        if scene.is_empty() {
            return Ok(ctx.fail_with_defect(format!("Structure {} contains no atoms", self.fixture.name)));
        }
        if let Some(declared) = self.fixture.declared_atoms {
            if declared != scene.len() {
                ctx.report_defect(format!(
                    "{} declares {} atoms but contains {}",
                    self.fixture.name,
                    declared,
                    scene.len()
                ));
            }
        }

        scene.auto_frame(FRAME_MARGIN);
        let description = format!("{} ({} atoms)", self.fixture.name, scene.len());
        ctx.render(&self.fixture.shot_name(), &description, &scene)?;

        Ok(Verdict::pass().with_detail(json!({
            "atoms": scene.len(),
            "format": self.fixture.format.as_str(),
        })))
    }
}

/// Direct-binding suite: fixed molecules, camera angles and distances,
/// backgrounds, then one case per fixture
pub fn direct_suite(fixtures: &[Fixture]) -> Vec<Box<dyn TestCase>> {
    let angles = [
        ("front", [0.0, 0.0, 10.0], [0.0, 1.0, 0.0]),
        ("side", [10.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ("top", [0.0, 10.0, 0.0], [0.0, 0.0, -1.0]),
        ("angle", [7.0, 7.0, 7.0], [0.0, 1.0, 0.0]),
    ];
    let distances = [("far", 20.0), ("normal", 10.0), ("close", 5.0), ("very_close", 3.0)];
    let backgrounds = [
        ("black", [0.0, 0.0, 0.0]),
        ("white", [1.0, 1.0, 1.0]),
        ("gray", [0.5, 0.5, 0.5]),
    ];

    let mut cases: Vec<Box<dyn TestCase>> = vec![
        Box::new(RenderSeries::new(
            "water_default_view",
            vec![View::new(
                "water_default",
                "Water molecule: red oxygen between two white hydrogens, camera on +Z",
                water().camera(CameraPose::on_z_axis(10.0)),
            )],
        )),
        Box::new(RenderSeries::new(
            "camera_angles",
            angles
                .iter()
                .map(|(label, position, up)| {
                    View::new(
                        format!("methane_{}", label),
                        format!("Methane viewed from the {} ({:?})", label, position),
                        methane().camera(CameraPose::new(*position, [0.0, 0.0, 0.0], *up)),
                    )
                })
                .collect(),
        )),
        Box::new(RenderSeries::new(
            "camera_distances",
            distances
                .iter()
                .map(|(label, distance)| {
                    View::new(
                        format!("ethanol_{}", label),
                        format!("Ethanol with the camera at z={}", distance),
                        ethanol().camera(CameraPose::on_z_axis(*distance)),
                    )
                })
                .collect(),
        )),
        Box::new(RenderSeries::new(
            "background_colors",
            backgrounds
                .iter()
                .map(|(label, rgb)| {
                    View::new(
                        format!("background_{}", label),
                        format!("Single oxygen atom on a {} background", label),
                        oxygen().camera(CameraPose::on_z_axis(5.0)).background(*rgb),
                    )
                })
                .collect(),
        )),
    ];

    cases.extend(
        fixtures
            .iter()
            .cloned()
            .map(|f| Box::new(RenderStructure::new(f)) as Box<dyn TestCase>),
    );
    cases
}

// ============================================================================
// Screen-capture cases
// ============================================================================

/// Waits, then captures the display
pub struct TimedCapture {
    name: String,
    description: String,
    delay: Duration,
}

impl TimedCapture {
    pub fn new(name: impl Into<String>, description: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            delay,
        }
    }
}

impl TestCase for TimedCapture {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut TestContext<'_>) -> Result<Verdict, CaseError> {
        ctx.settle(self.delay, None)?;
        let record = ctx.capture_display(&self.name, &self.description)?;
        Ok(Verdict::pass().with_note(record.file_name()))
    }
}

/// Screen-capture suite: initial state, post-settle state, current state,
/// then `timed` further captures
pub fn screen_suite(timed: usize) -> Vec<Box<dyn TestCase>> {
    let mut cases: Vec<Box<dyn TestCase>> = vec![
        Box::new(TimedCapture::new(
            "01_initial_state",
            "Application window right after startup",
            Duration::from_secs(2),
        )),
        Box::new(TimedCapture::new(
            "02_after_5sec",
            "Application after initial rendering has settled",
            Duration::from_secs(5),
        )),
        Box::new(TimedCapture::new(
            "03_current_state",
            "Current application state",
            Duration::from_secs(2),
        )),
    ];
    for i in 0..timed {
        let index = i + 4;
        cases.push(Box::new(TimedCapture::new(
            format!("{:02}_timed_capture", index),
            format!("Timed capture {} of {}", i + 1, timed),
            Duration::from_secs(3),
        )));
    }
    cases
}

// ============================================================================
// Browser-automation cases
// ============================================================================

fn canvas_present() -> SettleCondition {
    SettleCondition::present("canvas", SelectorKind::Tag)
}

/// Loads the application and checks for the 3D canvas
pub struct GuiLoads {
    url: String,
}

impl GuiLoads {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl TestCase for GuiLoads {
    fn name(&self) -> &str {
        "gui_loads"
    }

    fn execute(&self, ctx: &mut TestContext<'_>) -> Result<Verdict, CaseError> {
        ctx.driver()?.navigate(&self.url)?;
        let settled = ctx.settle(GUI_LOAD_CEILING, Some(canvas_present()))?;
        ctx.capture_display("00_gui_loaded", "Application right after loading")?;

        let canvas = ctx.driver()?.find_element("canvas", SelectorKind::Tag)?;
        if !canvas.is_found() {
            return Ok(ctx.fail_with_defect("No canvas element found in DOM"));
        }
        Ok(Verdict::pass()
            .with_note("canvas element present")
            .with_detail(json!({ "url": self.url, "settled": format!("{:?}", settled) })))
    }
}

/// Inventories the interactive controls
pub struct ControlsVisible;

impl TestCase for ControlsVisible {
    fn name(&self) -> &str {
        "ui_controls"
    }

    fn execute(&self, ctx: &mut TestContext<'_>) -> Result<Verdict, CaseError> {
        // Toolbars render after the canvas on a cold start
        let settled = ctx.settle(
            INTERACTION_CEILING,
            Some(SettleCondition::min_elements("button", SelectorKind::Tag, MIN_TOOLBAR_BUTTONS)),
        )?;

        let driver = ctx.driver()?;
        let buttons = driver.find_all_elements("button", SelectorKind::Tag)?.len();
        let inputs = driver.find_all_elements("input", SelectorKind::Tag)?.len();
        let checkboxes = driver
            .find_all_elements("input[type='checkbox']", SelectorKind::Css)?
            .len();
        let selects = driver.find_all_elements("select", SelectorKind::Tag)?.len();

        let source = driver.page_source()?.to_lowercase();
        let keywords: Vec<&str> = CONTROL_KEYWORDS
            .iter()
            .copied()
            .filter(|k| source.contains(k))
            .collect();

        ctx.capture_display("01_ui_controls", "Visible UI controls")?;

        let detail = json!({
            "buttons": buttons,
            "inputs": inputs,
            "checkboxes": checkboxes,
            "selects": selects,
            "keywords": keywords,
            "toolbar_settled": settled.condition_met(),
        });
        if buttons + inputs + selects == 0 {
            return Ok(ctx.fail_with_defect("No interactive controls found").with_detail(detail));
        }
        Ok(Verdict::pass()
            .with_note(format!(
                "{} buttons, {} inputs, {} selects",
                buttons, inputs, selects
            ))
            .with_detail(detail))
    }
}

/// Loads one fixture through the file input
pub struct LoadStructure {
    name: String,
    fixture: Fixture,
}

impl LoadStructure {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            name: format!("load_structure[{}]", fixture.name),
            fixture,
        }
    }

    /// The file input, clicking a load/open button first if that is what it takes
    fn find_file_input(ctx: &mut TestContext<'_>) -> Result<Result<ElementHandle, String>, CaseError> {
        let file_input = "input[type='file']";
        if let Some(input) = ctx.driver()?.find_element(file_input, SelectorKind::Css)?.found() {
            return Ok(Ok(input));
        }

        let driver = ctx.driver()?;
        let mut load_button = None;
        for button in driver.find_all_elements("button", SelectorKind::Tag)? {
            let text = driver.element_text(&button)?.to_lowercase();
            if LOAD_BUTTON_WORDS.iter().any(|w| text.contains(w)) {
                load_button = Some((button, text));
                break;
            }
        }
        let Some((button, text)) = load_button else {
            return Ok(Err("No file input element found".to_string()));
        };

        ctx.driver()?.click(&button)?;
        ctx.settle(
            INTERACTION_CEILING,
            Some(SettleCondition::present(file_input, SelectorKind::Css)),
        )?;
        match ctx.driver()?.find_element(file_input, SelectorKind::Css)?.found() {
            Some(input) => Ok(Ok(input)),
            None => Ok(Err(format!(
                "Load button '{}' found but no file input element to drive",
                text.trim()
            ))),
        }
    }
}

impl TestCase for LoadStructure {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut TestContext<'_>) -> Result<Verdict, CaseError> {
        let input = match Self::find_file_input(ctx)? {
            Ok(input) => input,
            Err(issue) => return Ok(ctx.fail_with_defect(issue)),
        };

        ctx.driver()?.set_file_input(&input, &self.fixture.path)?;
        ctx.settle(STRUCTURE_LOAD_CEILING, Some(canvas_present()))?;
        ctx.capture_display(
            &self.fixture.shot_name(),
            &format!("{} loaded in the viewer", self.fixture.name),
        )?;
        Ok(Verdict::pass().with_note(format!("{} submitted", self.fixture.name)))
    }
}

/// Drags across the canvas; the result is judged from the screenshots
pub struct Rotation;

impl TestCase for Rotation {
    fn name(&self) -> &str {
        "rotation"
    }

    fn execute(&self, ctx: &mut TestContext<'_>) -> Result<Verdict, CaseError> {
        let Some(canvas) = ctx.driver()?.find_element("canvas", SelectorKind::Tag)?.found() else {
            return Ok(ctx.fail_with_defect("No canvas element found for rotation"));
        };

        ctx.capture_display("rotation_before", "Structure before the drag")?;
        ctx.driver()?.drag_element(&canvas, 200.0, 100.0)?;
        ctx.settle(INTERACTION_CEILING, None)?;
        ctx.capture_display("rotation_after", "Structure after dragging 200px right, 100px down")?;

        Ok(Verdict::inconclusive(
            "Compare rotation_before and rotation_after: the structure should have rotated",
        ))
    }
}

/// Zooms with the keyboard; the result is judged from the screenshots
pub struct Zoom;

impl TestCase for Zoom {
    fn name(&self) -> &str {
        "zoom"
    }

    fn execute(&self, ctx: &mut TestContext<'_>) -> Result<Verdict, CaseError> {
        let Some(canvas) = ctx.driver()?.find_element("canvas", SelectorKind::Tag)?.found() else {
            return Ok(ctx.fail_with_defect("No canvas element found for zoom"));
        };

        ctx.driver()?.click(&canvas)?;
        ctx.capture_display("zoom_initial", "Structure before zooming")?;

        ctx.driver()?.send_keys(&canvas, &"+".repeat(5))?;
        ctx.settle(INTERACTION_CEILING, None)?;
        ctx.capture_display("zoom_in", "After pressing + five times")?;

        ctx.driver()?.send_keys(&canvas, &"-".repeat(10))?;
        ctx.settle(INTERACTION_CEILING, None)?;
        ctx.capture_display("zoom_out", "After pressing - ten times")?;

        Ok(Verdict::inconclusive(
            "Compare zoom_initial, zoom_in and zoom_out: the structure should grow, then shrink",
        ))
    }
}

/// Browser suite: load, controls inventory, one load per fixture, rotation, zoom
pub fn browser_suite(app_url: &str, fixtures: &[Fixture]) -> Vec<Box<dyn TestCase>> {
    let mut cases: Vec<Box<dyn TestCase>> = vec![Box::new(GuiLoads::new(app_url)), Box::new(ControlsVisible)];
    cases.extend(
        fixtures
            .iter()
            .cloned()
            .map(|f| Box::new(LoadStructure::new(f)) as Box<dyn TestCase>),
    );
    cases.push(Box::new(Rotation));
    cases.push(Box::new(Zoom));
    cases
}
