//! scbridge-lib — SuperCollider bridge engine.
//!
//! Supervises the sclang/scsynth process pair, keeps a voice table in sync
//! with the engine's confirmation stream, and exposes an HTTP control API.
//! Depends on scbridge-core for pure types and the wire protocol.

pub mod bus;
pub mod registry;
pub mod server;
pub mod supervisor;

// Re-export scbridge-core for convenience
pub use scbridge_core;
