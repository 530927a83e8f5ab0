//! Process bootstrap shared by the control-plane binaries.
//!
//! Loads [`AppConfig`] from defaults, an optional YAML file and
//! `NOMAD_SERVICE__*` environment variables, installs the tracing subscriber
//! and turns Unix signals into shutdown and reload events.

pub mod config;
pub mod logging;
pub mod signals;

pub use config::{AppConfig, LoggingConfig, Section, SectionFile, ServerConfig};
