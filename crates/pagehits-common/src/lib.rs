//! pagehits Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging setup, and error handling for the pagehits workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`PagehitsError`] and the [`Result`] alias
//! - **Types**: the page-count [`Record`](types::Record) loaded by the pipeline
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use pagehits_common::{Result, types::Record};
//!
//! fn first_record(line: &str) -> Result<Record> {
//!     Record::parse_line(line, 1)
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{PagehitsError, Result};
