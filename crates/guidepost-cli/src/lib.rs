//! # guidepost-cli
//!
//! Command-line interface for the Guidepost workflow router.
//!
//! ## Commands
//!
//! - `guidepost validate` — Lint the corpus graph
//! - `guidepost chat` — Interactive guidance in the terminal
//! - `guidepost turn` — Run one conversational turn
//! - `guidepost session` — Manage sessions and profiles
//! - `guidepost diary` — Show a session's investigation diary
//! - `guidepost config` — Show/edit configuration

pub mod commands;

pub use commands::Cli;
