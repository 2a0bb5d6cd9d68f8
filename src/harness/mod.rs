pub mod case;
pub mod orchestrator;
pub mod suites;
pub mod types;

pub use case::{Pacing, TestCase, TestContext, run_case};
pub use orchestrator::{Orchestrator, SessionState};
pub use suites::{browser_suite, direct_suite, screen_suite};
pub use types::{
    CaseError, DefectReport, HarnessError, HarnessResult, StartupError, TestOutcome, TestStatus, Verdict,
};
