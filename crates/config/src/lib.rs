//! caddystate-config: Configuration for the caddystate admin adapter
//!
//! This crate provides configuration parsing, environment overrides and
//! validation. The admin API base URL lives here and is handed explicitly
//! to the admin client; nothing in the core reads it from global state.

pub mod config;

pub use config::*;
