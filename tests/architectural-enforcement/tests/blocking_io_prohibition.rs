//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async code in the mentor crates MUST NOT block the runtime.
//! **Required**: `tokio::fs`, `tokio::io`, async `reqwest`.
//!
//! Synchronous functions (config loading before the first submit, logging
//! setup) may use `std` I/O.

use architectural_enforcement::{code_part, in_async_context, production_sources, scan};

/// Patterns that block the calling thread
const BLOCKING: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("std::net::", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    ("reqwest::blocking", "Blocking HTTP client"),
    ("std::io::stdin()", "Blocking stdin"),
    ("std::io::stdout()", "Blocking stdout"),
    ("blocking_recv()", "Blocking channel receive"),
    ("block_on(", "Nested runtime"),
];

#[test]
fn test_no_blocking_io_in_async_code() {
    let sources = production_sources();
    let violations = scan(&sources, |lines, idx| {
        let code = code_part(lines[idx]);
        let rule = BLOCKING
            .iter()
            .find(|(pattern, _)| code.contains(pattern))
            .map(|(_, rule)| *rule)?;
        in_async_context(lines, idx).then_some(rule)
    });

    if !violations.is_empty() {
        eprintln!("\n❌ Blocking I/O found in async code:\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Use tokio::fs, tokio::io or move the call out of async code");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.",
            violations.len()
        );
    }
}

#[test]
fn test_reqwest_blocking_is_never_used() {
    let sources = production_sources();
    let violations = scan(&sources, |lines, idx| {
        code_part(lines[idx])
            .contains("reqwest::blocking")
            .then_some("Blocking HTTP client")
    });

    assert!(
        violations.is_empty(),
        "reqwest::blocking found:\n{}",
        violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    );
}
