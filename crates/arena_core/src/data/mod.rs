//! Data structures for unit templates and scenarios.
//!
//! All structs are designed to be deserialized from RON.
//!
//! **Note:** This module contains no IO - it only defines data types and
//! parses strings. File loading is handled by `arena_tools`.

mod scenario;
mod unit_data;

pub use scenario::{BoardSlot, Scenario};
pub use unit_data::{TemplateRegistry, UnitTemplate};
