//! Scraping the sclang console stream for the scsynth server pid.
//!
//! sclang announces the booted server with a free-form line containing
//! `pid: <digits>` (wording varies across SuperCollider versions). Matching
//! is kept as a pure function so it can be tested against captured boot
//! output, independent of any live process.

use std::sync::LazyLock;

use regex::Regex;

static RE_SERVER_PID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pid:\s*(\d+)").unwrap());

/// Extract the server pid from one console line, if this line announces it.
pub fn scan_server_pid(line: &str) -> Option<u32> {
    RE_SERVER_PID
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
