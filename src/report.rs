//! Failure report written incrementally as failures are discovered

use crate::error::Result;
use crate::models::FailureRecord;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// CSV header of the failure report
pub const REPORT_HEADER: [&str; 3] = ["filename", "task_id", "error_msg"];

/// Append-only failure CSV
///
/// Opening an existing report keeps its rows, so a resumed run adds to what
/// earlier runs found. A new or empty file gets the header flushed right
/// away. Each row is flushed as soon as it is written.
pub struct FailureReport {
    path: PathBuf,
    writer: csv::Writer<Box<dyn Write + Send>>,
    rows: usize,
}

impl FailureReport {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let fresh = file.metadata()?.len() == 0;

        let mut report = Self::with_sink(path, Box::new(file));
        if fresh {
            report.writer.write_record(REPORT_HEADER)?;
            report.writer.flush()?;
        }
        debug!(
            "Failure report opened at {} ({})",
            report.path.display(),
            if fresh { "new" } else { "appending" }
        );
        Ok(report)
    }

    fn with_sink(path: PathBuf, sink: Box<dyn Write + Send>) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(sink);
        Self {
            path,
            writer,
            rows: 0,
        }
    }

    /// Report whose every write fails
    #[cfg(test)]
    pub(crate) fn unwritable(path: impl Into<PathBuf>) -> Self {
        struct Unwritable;

        impl Write for Unwritable {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk full"))
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Err(std::io::Error::other("disk full"))
            }
        }

        Self::with_sink(path.into(), Box::new(Unwritable))
    }

    pub fn record(&mut self, record: &FailureRecord) -> Result<()> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Number of failure rows written so far
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        Ok(self.rows)
    }
}
