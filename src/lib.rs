//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-service` and the bridge/provider adapters it can
//! pull in). Host applications can depend on `file-vault-workspace` and enable
//! the documented features without needing to wire each crate individually.

#[cfg(any(feature = "desktop-shims", feature = "firebase"))]
pub use core_service::*;
