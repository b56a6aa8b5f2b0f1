//! Database log tailing.
//!
//! ```text
//! postgres/logs collector (every scrape)
//!   └── notify(current logfile) ──► LogTailer control loop (long-lived)
//!                                     └── follow() worker, at most one
//!                                           └── LineParser ──► LogTailState
//! postgres/logs collector ◄── read locks ──────────────────────┘
//! ```
//!
//! The first file is tailed from its end; every later file from its start.
//! A switch cancels the running worker and waits for it before the next one
//! starts. Lines written to the old file between the rotation being noticed
//! and the worker observing cancellation may or may not be counted.

pub mod classify;
pub mod state;
pub mod tailer;

pub use classify::{LineParser, LogEntry, Severity};
pub use state::LogTailState;
pub use tailer::LogTailer;
