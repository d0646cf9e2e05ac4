//! Tunesort Daemon Library
//!
//! Configuration, logging and wiring for the `tunesortd` binary.
//!
//! This library exposes the daemon components for testing purposes.

pub mod config;
pub mod error;
pub mod logging;

pub use config::DaemonConfig;
pub use error::{DaemonError, Result};
