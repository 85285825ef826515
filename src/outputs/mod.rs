//! Persistence of the documents the front-end reads.
//!
//! # Submodules
//!
//! - [`json`]: Forgiving reads and temp-then-rename writes of JSON files
//! - [`aggregate`]: Replace-by-topic merge and date ordering for the aggregate document

pub mod aggregate;
pub mod json;
