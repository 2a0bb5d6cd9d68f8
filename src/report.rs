//! Report generation.
//!
//! [`render_markdown`] is a pure function of a finished [`Session`]: the same
//! session always renders the same document apart from the generation
//! timestamp. The `write_*` functions put the artifacts in the base directory.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::capture::ScreenshotRecord;
use crate::capture::utils::write_json;
use crate::config::{REPORT_FILE_NAME, RESULTS_FILE_NAME, SCREENSHOTS_DIR_NAME};
use crate::fixtures::Fixture;
use crate::harness::types::{DefectReport, TestOutcome, TestStatus};
use crate::session::{Session, Summary};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

fn start_section(out: &mut String, heading: &str) {
    if !out.is_empty() && !out.ends_with("\n\n") {
        out.push('\n');
    }
    out.push_str(heading);
    out.push_str("\n\n");
}

/// Make text safe inside a Markdown table cell
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

fn header(out: &mut String, title: &str, session: &Session, generated_at: DateTime<Utc>) {
    out.push_str(&format!("# {}\n\n", title));
    out.push_str(&format!("**Generated:** {}  \n", generated_at.format(TIMESTAMP_FORMAT)));
    out.push_str(&format!("**Session:** {}  \n", session.id));
    out.push_str(&format!("**Host:** {}  \n", session.host));
    out.push_str(&format!("**Backend:** {}\n", session.backend));
}

fn summary_table(out: &mut String, summary: &Summary) {
    start_section(out, "## Summary");
    out.push_str("| Metric | Count |\n|--------|-------|\n");
    for (label, value) in [
        ("Total tests", summary.total),
        ("Passed", summary.passed),
        ("Failed", summary.failed),
        ("Errors", summary.errored),
        ("Inconclusive", summary.inconclusive),
        ("Screenshots", summary.screenshots),
        ("Defects", summary.defects),
    ] {
        out.push_str(&format!("| {} | {} |\n", label, value));
    }
}

fn fixtures_section(out: &mut String, fixtures: &[Fixture]) {
    start_section(out, "## Test Structures");
    if fixtures.is_empty() {
        out.push_str("_No structure fixtures discovered._\n");
        return;
    }
    for fixture in fixtures {
        match fixture.declared_atoms {
            Some(atoms) => out.push_str(&format!(
                "- `{}` ({}, {} atoms)\n",
                fixture.name,
                fixture.format.as_str(),
                atoms
            )),
            None => out.push_str(&format!("- `{}` ({})\n", fixture.name, fixture.format.as_str())),
        }
    }
}

fn results_section(out: &mut String, outcomes: &[TestOutcome]) {
    start_section(out, "## Test Results");
    if outcomes.is_empty() {
        out.push_str("_No tests were run._\n");
        return;
    }

    out.push_str("| Test | Status | Duration | Notes |\n|------|--------|----------|-------|\n");
    for outcome in outcomes {
        let notes = outcome
            .error
            .as_deref()
            .or(outcome.note.as_deref())
            .unwrap_or("");
        out.push_str(&format!(
            "| {} | {} | {} ms | {} |\n",
            cell(&outcome.name),
            outcome.status,
            outcome.duration_ms,
            cell(notes)
        ));
    }

    for outcome in outcomes.iter().filter(|o| o.detail.is_some() || o.error.is_some()) {
        out.push_str(&format!("\n### {} ({})\n\n", outcome.name, outcome.status));
        if let Some(error) = &outcome.error {
            out.push_str(&format!("Error: `{}`\n", error.replace('`', "'")));
        }
        if let Some(detail) = &outcome.detail {
            let pretty = serde_json::to_string_pretty(detail).unwrap_or_else(|_| detail.to_string());
            out.push_str(&format!("```json\n{}\n```\n", pretty));
        }
    }
}

fn review_section(out: &mut String, outcomes: &[TestOutcome]) {
    start_section(out, "## Visual Review");
    let pending: Vec<&TestOutcome> = outcomes
        .iter()
        .filter(|o| o.status == TestStatus::Inconclusive)
        .collect();
    if pending.is_empty() {
        out.push_str("_Nothing requires visual review._\n");
        return;
    }
    out.push_str("These tests ran to completion; compare their screenshots to judge the result.\n\n");
    for outcome in pending {
        out.push_str(&format!(
            "- **{}**: {}\n",
            outcome.name,
            outcome.note.as_deref().unwrap_or("review screenshots")
        ));
    }
}

fn defects_section(out: &mut String, defects: &[DefectReport]) {
    start_section(out, "## Defects / Issues Found");
    if defects.is_empty() {
        out.push_str("_No defects recorded._\n");
        return;
    }
    for defect in defects {
        out.push_str(&format!("- **{}**: {}\n", defect.test, defect.issue));
    }
}

/// Screenshots grouped by logical name, in order of first capture
fn screenshots_section(out: &mut String, screenshots: &[ScreenshotRecord]) {
    start_section(out, "## Screenshots");
    if screenshots.is_empty() {
        out.push_str("_No screenshots captured._\n");
        return;
    }

    let mut groups: Vec<(&str, Vec<&ScreenshotRecord>)> = Vec::new();
    for record in screenshots {
        match groups.iter_mut().find(|(name, _)| *name == record.name) {
            Some((_, records)) => records.push(record),
            None => groups.push((&record.name, vec![record])),
        }
    }

    for (name, records) in groups {
        out.push_str(&format!("### {}\n\n", name));
        if let Some(first) = records.first() {
            if !first.description.is_empty() {
                out.push_str(&format!("{}\n\n", first.description));
            }
        }
        for record in records {
            let file = record.file_name();
            out.push_str(&format!(
                "![{name}]({dir}/{file})  \n`{dir}/{file}` ({source}, {time})\n\n",
                name = name,
                dir = SCREENSHOTS_DIR_NAME,
                file = file,
                source = record.source,
                time = record.timestamp.format(TIMESTAMP_FORMAT)
            ));
        }
    }
}

/// Render the full Markdown report for a finished session
pub fn render_markdown(session: &Session, generated_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    header(&mut out, "Visual Validation Report", session, generated_at);
    summary_table(&mut out, &session.summary());
    fixtures_section(&mut out, session.fixtures());
    results_section(&mut out, session.outcomes());
    review_section(&mut out, session.outcomes());
    defects_section(&mut out, session.defects());
    screenshots_section(&mut out, session.screenshots());
    out
}

/// Minimal report for a session whose backend never started
pub fn render_startup_failure(session: &Session, error: &str, generated_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    header(&mut out, "Visual Validation Report: startup failed", session, generated_at);
    start_section(&mut out, "## Startup Failure");
    out.push_str("The capture backend could not be started. No tests were run.\n\n");
    out.push_str(&format!("```\n{}\n```\n", error));
    summary_table(&mut out, &session.summary());
    out
}

/// Write the Markdown report to `<base>/VISUAL_VALIDATION_REPORT.md`
pub fn write_report(session: &Session, generated_at: DateTime<Utc>) -> std::io::Result<PathBuf> {
    let path = session.base_dir.join(REPORT_FILE_NAME);
    fs::write(&path, render_markdown(session, generated_at))?;
    Ok(path)
}

pub fn write_startup_failure(session: &Session, error: &str, generated_at: DateTime<Utc>) -> std::io::Result<PathBuf> {
    let path = session.base_dir.join(REPORT_FILE_NAME);
    fs::write(&path, render_startup_failure(session, error, generated_at))?;
    Ok(path)
}

/// Machine-readable companion of the Markdown report
#[derive(Serialize)]
struct ResultsDocument<'a> {
    session: &'a str,
    backend: &'a str,
    host: &'a str,
    started: DateTime<Utc>,
    generated: DateTime<Utc>,
    summary: Summary,
    fixtures: &'a [Fixture],
    outcomes: &'a [TestOutcome],
    screenshots: &'a [ScreenshotRecord],
    defects: &'a [DefectReport],
}

/// Write `<base>/results.json`
pub fn write_results_json(session: &Session, generated_at: DateTime<Utc>) -> std::io::Result<PathBuf> {
    let path = session.base_dir.join(RESULTS_FILE_NAME);
    let document = ResultsDocument {
        session: &session.id,
        backend: &session.backend,
        host: &session.host,
        started: session.started,
        generated: generated_at,
        summary: session.summary(),
        fixtures: session.fixtures(),
        outcomes: session.outcomes(),
        screenshots: session.screenshots(),
        defects: session.defects(),
    };
    write_json(&path, &document)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ScreenshotRecord, ShotPlan};
    use crate::harness::types::Verdict;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn generated() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn populated() -> Session {
        let mut session = Session::new("/tmp/visual", "browser (mock at http://localhost:1420)");
        session.host = "testhost".to_string();
        for name in ["rotation_before", "rotation_after", "rotation_before"] {
            let shot = session.allocate_shot(name, "Structure before the drag");
            session.record_screenshot(ScreenshotRecord::new(shot, "browser"));
        }
        session
            .record_outcome(TestOutcome::from_verdict("gui_loads", Verdict::pass(), Duration::from_millis(12)))
            .unwrap();
        session
            .record_outcome(TestOutcome::from_verdict(
                "rotation",
                Verdict::inconclusive("compare the rotation screenshots"),
                Duration::ZERO,
            ))
            .unwrap();
        session
            .record_outcome(TestOutcome::from_verdict(
                "load_structure[water.xyz]",
                Verdict::fail("No file input element found"),
                Duration::ZERO,
            ))
            .unwrap();
        session.record_defect(DefectReport {
            test: "load_structure[water.xyz]".to_string(),
            issue: "No file input element found".to_string(),
        });
        session
    }

    #[test]
    fn test_render_is_deterministic() {
        let session = populated();
        assert_eq!(render_markdown(&session, generated()), render_markdown(&session, generated()));
    }

    #[test]
    fn test_summary_table_matches_session() {
        let report = render_markdown(&populated(), generated());
        assert!(report.contains("**Generated:** 2024-05-01 12:00:00 UTC"));
        assert!(report.contains("| Total tests | 3 |"));
        assert!(report.contains("| Passed | 1 |"));
        assert!(report.contains("| Failed | 1 |"));
        assert!(report.contains("| Inconclusive | 1 |"));
        assert!(report.contains("| Screenshots | 3 |"));
        assert!(report.contains("- **load_structure[water.xyz]**: No file input element found"));
        assert!(report.contains("- **rotation**: compare the rotation screenshots"));
    }

    #[test]
    fn test_screenshots_grouped_by_name() {
        let session = populated();
        let report = render_markdown(&session, generated());
        assert_eq!(report.matches("### rotation_before").count(), 1);
        assert_eq!(report.matches("### rotation_after").count(), 1);
        for record in session.screenshots() {
            assert!(report.contains(&format!("](screenshots/{})", record.file_name())));
        }
    }

    #[test]
    fn test_empty_session_report() {
        let session = Session::new("/tmp/visual", "direct");
        let report = render_markdown(&session, generated());
        assert!(report.contains("| Total tests | 0 |"));
        assert!(report.contains("| Passed | 0 |"));
        assert!(report.contains("| Failed | 0 |"));
        assert!(report.contains("_No tests were run._"));
        assert!(report.contains("_No screenshots captured._"));
    }

    #[test]
    fn test_table_cells_are_escaped() {
        assert_eq!(cell("a|b\nc"), "a\\|b c");
    }

    #[test]
    fn test_write_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(dir.path(), "direct");
        session.init().unwrap();
        let shot: ShotPlan = session.allocate_shot("water", "Water");
        session.record_screenshot(ScreenshotRecord::new(shot, "direct"));

        let report = write_report(&session, generated()).unwrap();
        let results = write_results_json(&session, generated()).unwrap();
        assert!(fs::read_to_string(report).unwrap().contains("### water"));

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(results).unwrap()).unwrap();
        assert_eq!(json["summary"]["screenshots"], 1);
        assert_eq!(json["backend"], "direct");
    }

    #[test]
    fn test_startup_failure_report() {
        let session = Session::new("/tmp/visual", "screen (scrot on :99)");
        let report = render_startup_failure(&session, "capture utility `scrot` is not available", generated());
        assert!(report.contains("## Startup Failure"));
        assert!(report.contains("No tests were run."));
        assert!(report.contains("| Total tests | 0 |"));
    }
}
