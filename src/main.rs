use clap::{Args as ClapArgs, Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gui_vision::capture::{
    BrowserCapture, DirectCapture, SceneRenderer, ScreenCapture, SoftwareRenderer, load_structure,
};
use gui_vision::config::{self, AppSettings, STRUCTURES_DIR_NAME, probe_from_url};
use gui_vision::fixtures::{self, Fixture};
use gui_vision::harness::suites::FRAME_MARGIN;
use gui_vision::harness::{Orchestrator, Pacing, browser_suite, direct_suite, screen_suite};
use gui_vision::runner::RunSummary;

/// GUI Vision - visual regression testing for 3D structure viewers
#[derive(Parser, Debug)]
#[command(
    name = "gui-vision",
    about = "Visual regression harness with direct-render, screen-capture and browser backends",
    after_help = "ENVIRONMENT VARIABLES:\n\
        GUI_VISION_BASE_DIR          Output directory (screenshots, report)\n\
        GUI_VISION_APP_URL           URL of the application under test\n\
        GUI_VISION_DISPLAY           X display for screen capture and the app\n\
        GUI_VISION_CAPTURE_TOOL      Screen capture utility\n\
        GUI_VISION_CAPTURE_TIMEOUT   Capture utility timeout (s)\n\
        GUI_VISION_STARTUP_TIMEOUT   Application readiness ceiling (s)\n\
        GUI_VISION_SHUTDOWN_GRACE    Grace period before killing the app (s)\n\
        GUI_VISION_SETTLE_POLL       Settle polling interval (ms)\n\
        GUI_VISION_WINDOW_SIZE       Browser window size (WxH)\n\
        GUI_VISION_RENDER_SIZE       Direct render size (WxH)\n\
        GUI_VISION_HEADLESS          Run the browser headless (true/false)\n\
        RUST_LOG                     Log filter (default: info)"
)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every suite
#[derive(ClapArgs, Debug)]
struct RunOptions {
    /// Output directory for screenshots and the report [default: $GUI_VISION_BASE_DIR or ./visual-tests]
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Skip settle pauses (conditions are still probed once)
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render molecules and fixture structures in-process
    Direct {
        #[command(flatten)]
        options: RunOptions,
    },

    /// Capture the live display while the application runs
    Screen {
        #[command(flatten)]
        options: RunOptions,

        /// Number of additional timed captures
        #[arg(long, default_value = "3")]
        captures: usize,

        /// Application to launch and own for the run
        #[arg(last = true)]
        app: Vec<String>,
    },

    /// Drive the application in a browser
    Browser {
        #[command(flatten)]
        options: RunOptions,

        /// URL of the application under test
        #[arg(long, env = "GUI_VISION_APP_URL", default_value = config::DEFAULT_APP_URL)]
        url: String,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Application to launch and own for the run
        #[arg(last = true)]
        app: Vec<String>,
    },

    /// Render a single structure file to PNG
    Render {
        /// XYZ or PDB file
        #[arg(short, long)]
        input: PathBuf,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List the structure fixtures under <base-dir>/structures
    Fixtures {
        /// Directory holding `structures/` [default: $GUI_VISION_BASE_DIR or ./visual-tests]
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

fn run(args: Args) -> Result<ExitCode, Box<dyn Error>> {
    let settings = config::get();

    match args.command {
        Commands::Direct { options } => {
            let base_dir = options.base_dir.as_deref().unwrap_or(&settings.base_dir);
            let fixtures = discover_fixtures(base_dir)?;
            let backend = DirectCapture::software(settings.render_width, settings.render_height);
            let orchestrator = Orchestrator::new(base_dir, Box::new(backend))
                .with_fixtures(fixtures.clone());
            run_suite(orchestrator, direct_suite(&fixtures), &options)
        }

        Commands::Screen { options, captures, app } => {
            let base_dir = options.base_dir.as_deref().unwrap_or(&settings.base_dir);
            let fixtures = discover_fixtures(base_dir)?;
            let backend = ScreenCapture::new(settings.capture.clone());
            let orchestrator = Orchestrator::new(base_dir, Box::new(backend))
                .with_fixtures(fixtures)
                .with_app(app_settings(&settings.app, app, None));
            run_suite(orchestrator, screen_suite(captures), &options)
        }

        Commands::Browser { options, url, headed, app } => {
            let base_dir = options.base_dir.as_deref().unwrap_or(&settings.base_dir);
            let fixtures = discover_fixtures(base_dir)?;
            let mut browser = settings.browser.clone();
            browser.app_url = url;
            browser.headless = browser.headless && !headed;

            let probe = probe_from_url(&browser.app_url);
            let cases = browser_suite(&browser.app_url, &fixtures);
            let backend = BrowserCapture::new(browser, settings.timing.settle_poll);
            let orchestrator = Orchestrator::new(base_dir, Box::new(backend))
                .with_fixtures(fixtures)
                .with_app(app_settings(&settings.app, app, probe));
            run_suite(orchestrator, cases, &options)
        }

        Commands::Render { input, output } => {
            let mut scene = load_structure(&input)?;
            if scene.is_empty() {
                return Err(format!("{} contains no atoms", input.display()).into());
            }
            scene.auto_frame(FRAME_MARGIN);

            let mut renderer = SoftwareRenderer::new(settings.render_width, settings.render_height);
            renderer.configure_camera(&scene.camera);
            renderer.render_to_file(&scene, &output)?;

            println!("Rendered {} ({} atoms): {}", scene.name, scene.len(), output.display());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Fixtures { base_dir, json } => {
            let base_dir = base_dir.as_deref().unwrap_or(&settings.base_dir);
            let fixtures = discover_fixtures(base_dir)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&fixtures)?);
            } else if fixtures.is_empty() {
                println!("No fixtures in {}", base_dir.join(STRUCTURES_DIR_NAME).display());
            } else {
                for fixture in &fixtures {
                    let atoms = fixture
                        .declared_atoms
                        .map(|n| format!(", {} atoms", n))
                        .unwrap_or_default();
                    println!("  {} ({}{})", fixture.name, fixture.format.as_str(), atoms);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn discover_fixtures(base_dir: &Path) -> Result<Vec<Fixture>, Box<dyn Error>> {
    let fixtures = fixtures::discover(&base_dir.join(STRUCTURES_DIR_NAME))?;
    info!("{} fixture(s) discovered", fixtures.len());
    Ok(fixtures)
}

fn app_settings(base: &AppSettings, command: Vec<String>, ready_probe: Option<String>) -> AppSettings {
    AppSettings {
        command,
        ready_probe,
        ..base.clone()
    }
}

fn run_suite(
    mut orchestrator: Orchestrator,
    cases: Vec<Box<dyn gui_vision::harness::TestCase>>,
    options: &RunOptions,
) -> Result<ExitCode, Box<dyn Error>> {
    orchestrator = orchestrator.with_settle_poll(config::get().timing.settle_poll);
    if options.dry_run {
        orchestrator = orchestrator.with_pacing(Pacing::Immediate);
    }
    orchestrator.register_all(cases)?;
    let summary = orchestrator.run()?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(ExitCode::from(summary.exit_code()))
}

fn print_summary(summary: &RunSummary) {
    if let Some(error) = &summary.startup_error {
        println!("Startup failed ({}): {}", summary.backend, error);
    } else {
        println!(
            "Session {} ({}): {} tests, {} passed, {} failed, {} errors, {} inconclusive",
            summary.session_id,
            summary.backend,
            summary.summary.total,
            summary.summary.passed,
            summary.summary.failed,
            summary.summary.errored,
            summary.summary.inconclusive
        );
        for outcome in &summary.outcomes {
            let note = outcome
                .error
                .as_deref()
                .or(outcome.note.as_deref())
                .map(|n| format!(": {}", n))
                .unwrap_or_default();
            println!("  [{}] {}{}", outcome.status, outcome.name, note);
        }
    }
    if let Some(path) = &summary.report_path {
        println!("\nReport: {}", path.display());
    }
}
