//! Architectural Enforcement Integration Tests
//!
//! Source-scanning tests that hold the orchestrator to its async-only rule:
//! production code waits on I/O, it never sleeps in a polling loop and never
//! performs blocking I/O inside the runtime.
//!
//! The scans are line-based heuristics, not a parser. They skip comments and
//! everything below a `#[cfg(test)]` boundary, and they exempt the one
//! legitimate sleep in the codebase: the reconnect backoff delay.

use std::fs;
use std::path::{Path, PathBuf};

/// Root of the workspace, resolved from this crate's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// All `.rs` files under the given workspace-relative directory
#[must_use]
pub fn rust_sources(relative_dir: &str) -> Vec<PathBuf> {
    let dir = workspace_root().join(relative_dir);
    let mut sources = Vec::new();
    for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(Result::ok) {
        if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
            sources.push(entry.path().to_path_buf());
        }
    }
    sources
}

/// Read a source file, returning only the lines above its `#[cfg(test)]`
/// boundary. Test modules sit at the bottom of each file in this codebase,
/// so everything after the marker is test code.
#[must_use]
pub fn production_lines(path: &Path) -> Vec<String> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };

    let mut lines = Vec::new();
    for line in content.lines() {
        if line.trim_start().starts_with("#[cfg(test)]") {
            break;
        }
        lines.push(line.to_string());
    }
    lines
}

/// The code portion of a line, with any trailing `//` comment removed
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Whether a sleep at `idx` sits inside reconnect backoff logic
///
/// The reconnect loop computes an exponential delay and sleeps on it between
/// attempts. A sleep is exempt when nearby lines mention both the retry
/// vocabulary and a delay computation.
#[must_use]
pub fn is_backoff_context(lines: &[String], idx: usize) -> bool {
    let start = idx.saturating_sub(15);
    let end = std::cmp::min(idx + 5, lines.len());

    let mut has_delay = false;
    let mut has_retry = false;
    for line in &lines[start..end] {
        let lower = line.to_lowercase();
        if lower.contains("delay") || lower.contains("pow") || lower.contains("* 2") {
            has_delay = true;
        }
        if lower.contains("retry")
            || lower.contains("reconnect")
            || lower.contains("backoff")
            || lower.contains("attempt")
        {
            has_retry = true;
        }
    }
    has_delay && has_retry
}

/// Whether the call at `idx` is inside a function declared without `async`
///
/// Blocking I/O is fine before the runtime starts (config load, pid files,
/// CLI parsing), and those call sites live in plain `fn` items. Scans
/// backwards to the nearest function header.
#[must_use]
pub fn is_in_sync_function(lines: &[String], idx: usize) -> bool {
    for line in lines[..idx].iter().rev() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("async fn ")
            || trimmed.starts_with("pub async fn ")
            || trimmed.starts_with("pub(crate) async fn ")
        {
            return false;
        }
        if trimmed.starts_with("fn ")
            || trimmed.starts_with("pub fn ")
            || trimmed.starts_with("pub(crate) fn ")
        {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &[&str]) -> Vec<String> {
        src.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_backoff_context_detected() {
        let code = lines(&[
            "let delay = self.policy.delay_before(attempt);",
            "warn!(attempt, \"retrying connect\");",
            "tokio::time::sleep(delay).await;",
        ]);
        assert!(is_backoff_context(&code, 2));
    }

    #[test]
    fn test_bare_sleep_not_exempt() {
        let code = lines(&[
            "loop {",
            "    tokio::time::sleep(Duration::from_millis(10)).await;",
            "}",
        ]);
        assert!(!is_backoff_context(&code, 1));
    }

    #[test]
    fn test_sync_function_detection() {
        let code = lines(&[
            "fn load_from_disk(path: &Path) -> Result<String, Error> {",
            "    std::fs::read_to_string(path)",
            "}",
            "async fn serve() {",
            "    let body = fetch().await;",
            "}",
        ]);
        assert!(is_in_sync_function(&code, 1));
        assert!(!is_in_sync_function(&code, 4));
    }

    #[test]
    fn test_comments_stripped() {
        assert_eq!(code_part("let x = 1; // std::fs::read"), "let x = 1; ");
    }
}
