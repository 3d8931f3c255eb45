//! pgAdmin 4 desktop runtime
//!
//! Spawns the Python application server, waits for it to answer its health
//! endpoint, and coordinates downloads and auto-update state with whatever
//! presentation layer hosts the runtime.
//!
//! ## Module Organization
//!
//! - `server_log` - per-run backend log file
//! - `config` - persisted runtime configuration (`runtime_config.json`)
//! - `port` - loopback port allocation
//! - `supervisor` - backend process spawn, output forwarding and teardown
//! - `health` - health endpoint polling with a wall-clock deadline
//! - `download` - download queue with aggregate progress
//! - `update` - auto-update state machine and feed handling
//! - `presentation` - presenter trait, menu model and terminal presenter
//! - `platform` - host platform detection
//! - `context` - shared handles passed to every component
//! - `launcher` - launch orchestration tying the pieces together

pub mod config;
pub mod context;
pub mod download;
pub mod error;
pub mod health;
pub mod launcher;
pub mod platform;
pub mod port;
pub mod presentation;
pub mod server_log;
pub mod supervisor;
pub mod update;

pub use context::RuntimeContext;
pub use launcher::{LaunchOutcome, Launcher};
