//! # guidepost-engine
//!
//! The runtime loop: matches an utterance, dispatches to a corpus node,
//! and drives the session's workflow stack to a halting state (success,
//! explicit choice, or error). One turn per session at a time; the
//! per-session run lock is held for the whole turn.

pub mod executor;
pub mod provider;

pub use executor::{EngineConfig, Executor, TurnOutcome};
pub use provider::{FactProvider, ProfileFactProvider, StaticFactProvider};
