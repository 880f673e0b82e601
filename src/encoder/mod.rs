//! Capture process ownership
//!
//! Command construction for the platform capture source and supervision of
//! the spawned process: spawn, diagnostics pump, idempotent termination.

pub mod command;
pub mod supervisor;

pub use command::{capture_command, CaptureParams};
pub use supervisor::{start, stop};
