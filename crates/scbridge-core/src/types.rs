//! Shared types for the scbridge ecosystem.
//!
//! Used across scbridge-lib, scbridge-cli, and downstream consumers. Keeping
//! them here means consumers can depend on types without pulling in tokio or
//! the process-control machinery.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Engine launch configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Explicit sclang binary, overriding the per-platform default.
    pub sclang_path: Option<PathBuf>,
    /// The .scd script handed to sclang as its only argument.
    pub script_path: PathBuf,
    /// UDP port the engine's language side listens on for requests.
    pub feedback_port: u16,
    /// UDP port we listen on for confirmation events.
    pub listen_port: u16,
    /// How long `stop` waits for a graceful exit before killing.
    pub stop_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sclang_path: None,
            script_path: PathBuf::from("supercollider/scbridge.scd"),
            feedback_port: 57120,
            listen_port: 57121,
            stop_grace: Duration::from_secs(2),
        }
    }
}

/// Supervisor status snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub running: bool,
    pub server_pid: Option<u32>,
}
