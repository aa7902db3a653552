//! # Arena Development Tools
//!
//! Command-line tools for development:
//! - Scenario runner with NDJSON event output
//! - Event log and combat record verification
//! - Data validators
//! - Batch win-rate statistics

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod error;
pub mod run;
pub mod validate;
