//! Command implementations for the CLI
//!
//! - run: scrape on an interval until interrupted
//! - once: single scrape printed to stdout
//! - check: test configuration validity

pub mod check;
pub mod once;
pub mod run;
