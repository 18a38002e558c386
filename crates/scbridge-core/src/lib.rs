//! scbridge-core — Pure types for the SuperCollider bridge.
//!
//! No async runtime, no I/O, no platform dependencies.

pub mod console;
pub mod protocol;
pub mod table;
pub mod types;
