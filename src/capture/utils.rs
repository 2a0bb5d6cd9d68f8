use chrono::Utc;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Generate a timestamp string in YYYYMMDD_HHMMSS format
pub fn generate_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Reduce a logical screenshot name to a safe file name component.
///
/// Anything outside `[A-Za-z0-9_-]` becomes `_`; an empty result becomes
/// `screenshot`.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "screenshot".to_string()
    } else {
        cleaned
    }
}

/// Generate a filename for a screenshot: `<timestamp>_<seq>_<name>.png`.
///
/// The sequence number keeps names unique within a session even when the
/// same logical name is captured twice in one second.
pub fn screenshot_file_name(timestamp: &str, sequence: usize, name: &str) -> String {
    format!("{}_{:03}_{}.png", timestamp, sequence, sanitize_name(name))
}

/// Write any serializable value as pretty JSON
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let body = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    fs::write(path, body)
}

/// Resolve an executable the way a shell would.
///
/// Anything that looks like a path is checked directly; bare names are
/// searched for on `PATH`.
pub fn resolve_program(command: &str) -> Option<PathBuf> {
    let path = Path::new(command);
    let looks_like_path = path.is_absolute()
        || command.contains(std::path::MAIN_SEPARATOR)
        || command.starts_with("./");

    if looks_like_path {
        return path.is_file().then(|| path.to_path_buf());
    }

    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths)
            .map(|dir| dir.join(command))
            .find(|candidate| candidate.is_file())
    })
}
