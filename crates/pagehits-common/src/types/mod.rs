//! Common types used across pagehits

use serde::Serialize;

use crate::error::{PagehitsError, Result};

/// One line of a Wikipedia page-count dump.
///
/// Records are produced once by a record source and are read-only for the
/// rest of a load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    /// Wiki project code, e.g. `en` or `de.b`
    pub project: String,
    /// URL-encoded page title
    pub page: String,
    /// Number of requests in the hour covered by the dump
    pub hits: i64,
    /// Total bytes served for those requests
    pub size: i64,
}

impl Record {
    pub fn new(project: impl Into<String>, page: impl Into<String>, hits: i64, size: i64) -> Self {
        Self {
            project: project.into(),
            page: page.into(),
            hits,
            size,
        }
    }

    /// Parse a `project page hits size` line.
    ///
    /// `line_number` is 1-based and only used for error reporting.
    pub fn parse_line(line: &str, line_number: usize) -> Result<Self> {
        let mut fields = line.split_ascii_whitespace();

        let (Some(project), Some(page), Some(hits), Some(size), None) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            return Err(PagehitsError::parse(
                line_number,
                format!("expected 4 whitespace-separated fields, got {:?}", line),
            ));
        };

        let hits = hits
            .parse::<i64>()
            .map_err(|e| PagehitsError::parse(line_number, format!("invalid hits {:?}: {}", hits, e)))?;
        let size = size
            .parse::<i64>()
            .map_err(|e| PagehitsError::parse(line_number, format!("invalid size {:?}: {}", size, e)))?;

        Ok(Self::new(project, page, hits, size))
    }
}
