//! Integration Test: Layering
//!
//! - `tutor-core` must not know about the HTTP framework; the daemon adapts
//!   core sinks into response bodies.
//! - Production code propagates errors instead of panicking on them.

use architectural_enforcement::{assert_clean, scan, PRODUCTION_DIRS};

const HTTP_FRAMEWORKS: &[&str] = &["axum", "hyper", "tower", "tower_http", "http::"];

#[test]
fn test_core_has_no_http_framework_imports() {
    let violations = scan(&["tutor/core/src"], |line| {
        let code = line.code.trim_start();
        let mentions_framework = HTTP_FRAMEWORKS.iter().any(|name| {
            code.starts_with(&format!("use {name}"))
                || code.contains(&format!("{name}::"))
                || code.contains(&format!("::{name}"))
        });
        mentions_framework.then_some("HTTP framework in core")
    });

    assert_clean("tutor-core stays transport-agnostic", &violations);
}

#[test]
fn test_no_unwrap_or_expect_in_production_code() {
    let violations = scan(PRODUCTION_DIRS, |line| {
        if line.code.contains(".unwrap()") {
            Some("unwrap() in production code")
        } else if line.code.contains(".expect(") {
            Some("expect() in production code")
        } else {
            None
        }
    });

    assert_clean("Propagate errors with ? instead of panicking", &violations);
}
