//! Record sources
//!
//! A source produces the complete, ordered record set before any worker
//! starts. Any source failure aborts the load.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use pagehits_common::types::Record;
use pagehits_common::{PagehitsError, Result};
use tracing::{debug, info, warn};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Supplies the record set for one load.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn load(&self, source_id: &str) -> Result<Vec<Record>>;
}

/// Wikipedia page-count dump files, plain text or gzip.
///
/// `source_id` is a path, resolved against `base_dir` when relative and a
/// base directory is set.
#[derive(Debug, Clone, Default)]
pub struct PagecountsFile {
    base_dir: Option<PathBuf>,
}

impl PagecountsFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    fn resolve(&self, source_id: &str) -> PathBuf {
        match &self.base_dir {
            Some(dir) => dir.join(source_id),
            None => PathBuf::from(source_id),
        }
    }
}

#[async_trait]
impl RecordSource for PagecountsFile {
    async fn load(&self, source_id: &str) -> Result<Vec<Record>> {
        let path = self.resolve(source_id);
        if !path.is_file() {
            return Err(PagehitsError::SourceNotFound(path.display().to_string()));
        }

        info!(path = %path.display(), "Reading page-count file");

        let records = tokio::task::spawn_blocking(move || read_file(path))
            .await
            .map_err(|e| PagehitsError::Io(std::io::Error::other(e)))??;

        info!(records = records.len(), "Page-count file loaded");
        Ok(records)
    }
}

fn read_file(path: PathBuf) -> Result<Vec<Record>> {
    debug!(path = %path.display(), "Opening page-count file");
    parse_reader(File::open(&path)?)
}

/// Parse `project page hits size` lines, skipping blank lines.
///
/// Dumps carry raw page titles, so bytes that are not valid UTF-8 are replaced
/// rather than rejected. The first malformed line fails the whole parse.
pub fn parse<R: BufRead>(mut reader: R) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut buf = Vec::new();
    let mut line_number = 0usize;
    let mut lossy_lines = 0usize;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_number += 1;

        let line = String::from_utf8_lossy(&buf);
        if matches!(line, Cow::Owned(_)) {
            lossy_lines += 1;
        }
        if line.trim().is_empty() {
            continue;
        }
        records.push(Record::parse_line(&line, line_number)?);
    }

    if lossy_lines > 0 {
        warn!(
            lines = lossy_lines,
            "Replaced invalid UTF-8 in page-count lines"
        );
    }

    Ok(records)
}

/// Parse from any reader, transparently decompressing gzip input.
pub fn parse_reader<R: Read>(reader: R) -> Result<Vec<Record>> {
    let mut reader = BufReader::new(reader);
    if reader.fill_buf()?.starts_with(&GZIP_MAGIC) {
        parse(BufReader::new(GzDecoder::new(reader)))
    } else {
        parse(reader)
    }
}
