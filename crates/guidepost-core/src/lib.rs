//! # guidepost-core
//!
//! Core types, traits, and primitives for the Guidepost workflow router.
//! This crate defines the shared vocabulary used by every other crate in
//! the workspace.

pub mod error;
pub mod types;

pub use error::{GuidepostError, Result};
pub use types::*;
