//! # Configuration
//!
//! Client configuration: endpoints, session identity, logging and chat tuning.

pub mod client;

pub use client::{ChatSettings, Config, ConfigError, LogFormat, LoggingConfig, SessionConfig};
