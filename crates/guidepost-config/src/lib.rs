//! # guidepost-config
//!
//! Configuration system for Guidepost. Reads from `guidepost.toml`,
//! environment variables, and CLI overrides — in that precedence order.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{ConfigWarning, GuidepostConfig, WarningSeverity};
