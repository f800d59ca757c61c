//! Integration Test: Blocking I/O Prohibition
//!
//! All I/O inside the runtime is async: `tokio::fs`, `tokio::net`, and
//! async reqwest. Blocking equivalents are only acceptable in plain `fn`
//! items that run before the runtime starts (config load, pid files, CLI
//! parsing).

use architectural_enforcement::{code_part, is_in_sync_function, production_lines, rust_sources};

const SCANNED_DIRS: &[&str] = &["orchestrator/core/src", "orchestrator/daemon/src"];

const BLOCKING_PATTERNS: &[&str] = &[
    "std::fs::",
    "std::net::TcpStream",
    "std::net::TcpListener",
    "std::process::Command",
    "reqwest::blocking",
];

#[test]
fn test_no_blocking_io_in_async_code() {
    let mut violations = Vec::new();

    for dir in SCANNED_DIRS {
        for path in rust_sources(dir) {
            let lines = production_lines(&path);
            for (idx, line) in lines.iter().enumerate() {
                let code = code_part(line);
                if code.trim_start().starts_with("use ") {
                    continue;
                }
                if !BLOCKING_PATTERNS.iter().any(|p| code.contains(p)) {
                    continue;
                }
                if is_in_sync_function(&lines, idx) {
                    continue;
                }
                violations.push(format!("{}:{} - {}", path.display(), idx + 1, line.trim()));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "blocking I/O found in async production code:\n{}",
        violations.join("\n")
    );
}

#[test]
fn test_no_blocking_reqwest_anywhere() {
    // The blocking client would pull in a second runtime; it is banned
    // outright, including in sync helpers.
    let mut violations = Vec::new();

    for dir in SCANNED_DIRS {
        for path in rust_sources(dir) {
            for (idx, line) in production_lines(&path).iter().enumerate() {
                if code_part(line).contains("reqwest::blocking") {
                    violations.push(format!("{}:{} - {}", path.display(), idx + 1, line.trim()));
                }
            }
        }
    }

    assert!(
        violations.is_empty(),
        "reqwest::blocking found in production code:\n{}",
        violations.join("\n")
    );
}
