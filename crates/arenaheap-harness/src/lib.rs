//! Replay and stress tooling for arenaheap.
//!
//! This crate provides:
//! - Trace replay: run a JSON allocation trace against a `HeapState`
//! - Storm: seeded random churn with invariant checks after every step
//! - Structured logs: lifecycle records as JSONL

#![forbid(unsafe_code)]

pub mod replay;
pub mod storm;
pub mod structured_log;
pub mod trace;

pub use replay::{ReplayOptions, ReplayOutcome, replay};
pub use storm::{StormConfig, StormError, StormReport, run_storm};
pub use structured_log::{LifecycleLogEntry, LogEmitter};
pub use trace::{Trace, TraceError, TraceOp};
