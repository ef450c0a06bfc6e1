//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT sleep. Replies are driven by I/O
//! readiness and cancellation tokens, never by polling on a timer.
//! **Exceptions**: test code.

use architectural_enforcement::{code_part, production_sources, scan};

#[test]
fn test_no_sleep_in_production_code() {
    let sources = production_sources();
    let violations = scan(&sources, |lines, idx| {
        let code = code_part(lines[idx]);
        if code.contains("thread::sleep") {
            Some("Thread sleep")
        } else if code.contains("time::sleep") || code.contains("sleep_until") {
            Some("Timer sleep")
        } else {
            None
        }
    });

    if !violations.is_empty() {
        eprintln!("\n❌ Sleep calls found in production code:\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Wait on the operation channel or the cancellation token instead");

        panic!(
            "\nFound {} sleep violation(s) in production code.",
            violations.len()
        );
    }
}
