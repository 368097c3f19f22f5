//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the file-vault core:
//! - Logging and tracing infrastructure
//! - Configuration management (bridges + upload policy)
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that other modules depend on.
//! It establishes the logging conventions, the validated configuration that
//! carries injected bridges, and the event broadcasting mechanism used by
//! auth, upload and listing code.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
