//! Integration Test: Sleep Prohibition
//!
//! Production code in the orchestrator waits on I/O; it does not sleep.
//! Polling loops, sleep-as-synchronization, and sleep-to-wait-for-events are
//! all forbidden. The single sanctioned use is the exponential backoff delay
//! between reconnect attempts.

use architectural_enforcement::{code_part, is_backoff_context, production_lines, rust_sources};

const SCANNED_DIRS: &[&str] = &["orchestrator/core/src", "orchestrator/daemon/src"];

#[test]
fn test_no_sleep_in_production_code() {
    let mut violations = Vec::new();

    for dir in SCANNED_DIRS {
        for path in rust_sources(dir) {
            let lines = production_lines(&path);
            for (idx, line) in lines.iter().enumerate() {
                let code = code_part(line);
                if !code.contains("::sleep(") && !code.contains(".sleep(") {
                    continue;
                }
                if is_backoff_context(&lines, idx) {
                    continue;
                }
                violations.push(format!("{}:{} - {}", path.display(), idx + 1, line.trim()));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "sleep calls found outside reconnect backoff:\n{}",
        violations.join("\n")
    );
}

#[test]
fn test_no_thread_sleep_anywhere() {
    // std::thread::sleep blocks a runtime worker even inside backoff logic
    let mut violations = Vec::new();

    for dir in SCANNED_DIRS {
        for path in rust_sources(dir) {
            for (idx, line) in production_lines(&path).iter().enumerate() {
                if code_part(line).contains("thread::sleep") {
                    violations.push(format!("{}:{} - {}", path.display(), idx + 1, line.trim()));
                }
            }
        }
    }

    assert!(
        violations.is_empty(),
        "std::thread::sleep found in production code:\n{}",
        violations.join("\n")
    );
}
