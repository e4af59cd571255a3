#![forbid(unsafe_code)]

//! Core domain model and execution engine for Setpace.
//!
//! This crate provides:
//! - Domain types (blocks, exercises, set entries, results)
//! - A drift-free session clock and per-protocol state machines
//! - Set ledger, rest and work timers
//! - History lookups and weight recommendations
//! - Persistence (results JSONL, CSV export, plan loading)

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod sanitize;
pub mod clock;
pub mod cues;
pub mod ledger;
pub mod rest;
pub mod protocol;
pub mod history;
pub mod store;
pub mod sink;
pub mod csv_export;
pub mod plan;
pub mod catalog;
pub mod session;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use clock::{ManualTimeSource, SharedTime, SystemTimeSource, TimeSource};
pub use cues::{Cue, CuePlayer, SilentCues};
pub use protocol::SessionEvent;
pub use history::{HistoryResolver, HistoryStore, Recommendation};
pub use store::FileHistoryStore;
pub use sink::{JsonlSink, ResultSink};
pub use csv_export::export_sets_csv;
pub use plan::load_block;
pub use catalog::{demo_block, demo_blocks};
pub use session::{BlockSession, FinishOutcome};
