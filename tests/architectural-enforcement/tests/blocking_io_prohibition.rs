//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async code in the tutor crates MUST NOT block the runtime.
//! **Required**: `tokio::fs`, `tokio::net`, `tokio::process`, not their `std`
//! counterparts. Blocking calls in plain `fn`s (config loading before the
//! runtime serves requests) are acceptable.

use architectural_enforcement::{assert_clean, scan, CodeLine, PRODUCTION_DIRS};

fn blocking_call(line: &CodeLine<'_>) -> Option<&'static str> {
    let code = line.code;

    if code.contains("reqwest::blocking") {
        return Some("Blocking HTTP client");
    }
    if code.contains("std::net::TcpListener") || code.contains("std::net::TcpStream") {
        return Some("Blocking network I/O");
    }
    if code.contains("std::process::Command") {
        return Some("Blocking process I/O");
    }
    if !line.in_async_fn {
        return None;
    }
    if code.contains("std::fs::") {
        return Some("Blocking file I/O in async fn");
    }
    if code.contains("std::io::stdin()") || code.contains("std::io::stdout()") {
        return Some("Blocking stdin/stdout in async fn");
    }
    if code.contains(".blocking_recv()") || code.contains(".blocking_send(") {
        return Some("Blocking channel operation in async fn");
    }
    None
}

#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = scan(PRODUCTION_DIRS, blocking_call);
    assert_clean("All I/O in async code must be async", &violations);
}
