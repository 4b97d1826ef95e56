//! # ca-core
//!
//! Core types and configuration for Chat Attachments RS.
//!
//! This crate provides the building blocks shared by the other crates:
//! - Transfer methods and attachment identities
//! - Per-feature upload settings (the capability descriptor)
//! - Application configuration loading

pub mod config;
pub mod types;

pub use config::{AppConfig, ConfigError, LoggingConfig, TransportConfig, UploadSettings};
pub use types::*;
