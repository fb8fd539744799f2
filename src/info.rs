//! Size and sharing report over the caller's asset roots

use crate::error::Result;
use crate::models::{AssetKind, AssetNode};
use crate::remote::AssetApi;
use chrono::DateTime;
use std::fs::File;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tracing::debug;

pub const REPORT_COLUMNS: [&str; 7] = [
    "Asset id",
    "Type",
    "Size [MB]",
    "Time",
    "Owners",
    "Readers",
    "Writers",
];

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AssetReportRow {
    pub id: String,
    pub kind: AssetKind,
    pub size_mb: f64,
    pub time: String,
    pub owners: Vec<String>,
    pub readers: Vec<String>,
    pub writers: Vec<String>,
}

impl AssetReportRow {
    fn record(&self) -> [String; 7] {
        [
            self.id.clone(),
            self.kind.as_str().to_string(),
            format!("{:.2}", self.size_mb),
            self.time.clone(),
            self.owners.join(" "),
            self.readers.join(" "),
            self.writers.join(" "),
        ]
    }
}

/// Formats an asset version (microseconds since the epoch) as UTC time
pub fn format_version_time(version_micros: i64) -> String {
    DateTime::from_timestamp_micros(version_micros)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

fn bytes_to_mb(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0
}

/// Writes report rows to stdout and optionally to a CSV file
pub struct ReportWriter {
    writers: Vec<csv::Writer<Box<dyn Write>>>,
    total_mb: f64,
}

impl ReportWriter {
    /// `filename` gets a `.csv` suffix, as in `report --filename usage`
    pub fn new(filename: Option<&Path>) -> Result<Self> {
        let mut sinks: Vec<Box<dyn Write>> = vec![Box::new(io::stdout())];
        if let Some(name) = filename {
            sinks.push(Box::new(File::create(csv_path(name))?));
        }
        Self::from_sinks(sinks)
    }

    pub fn from_sinks(sinks: Vec<Box<dyn Write>>) -> Result<Self> {
        let mut writers: Vec<_> = sinks
            .into_iter()
            .map(|sink| csv::WriterBuilder::new().has_headers(false).from_writer(sink))
            .collect();
        for writer in &mut writers {
            writer.write_record(REPORT_COLUMNS)?;
        }
        Ok(Self {
            writers,
            total_mb: 0.0,
        })
    }

    pub fn write_row(&mut self, row: &AssetReportRow) -> Result<()> {
        let record = row.record();
        for writer in &mut self.writers {
            writer.write_record(&record)?;
        }
        self.total_mb += row.size_mb;
        Ok(())
    }

    pub fn total_mb(&self) -> f64 {
        self.total_mb
    }

    pub fn finish(mut self) -> Result<f64> {
        for writer in &mut self.writers {
            writer.flush()?;
        }
        Ok(self.total_mb)
    }
}

/// `NAME` becomes `NAME.csv`
pub fn csv_path(name: &Path) -> PathBuf {
    let mut path = name.as_os_str().to_os_string();
    path.push(".csv");
    PathBuf::from(path)
}

type SizeFuture<'s> = Pin<Box<dyn Future<Output = Result<u64>> + Send + 's>>;

pub struct AssetReporter<'a> {
    api: &'a dyn AssetApi,
}

impl<'a> AssetReporter<'a> {
    pub fn new(api: &'a dyn AssetApi) -> Self {
        Self { api }
    }

    /// One row per asset root; folder roots are expanded one level
    pub async fn rows(&self) -> Result<Vec<AssetReportRow>> {
        let mut rows = Vec::new();
        for root in self.api.asset_roots().await? {
            if root.kind == AssetKind::Folder {
                for child in self.api.list_children(&root.id).await? {
                    rows.push(self.row_for(&child).await?);
                }
            } else {
                rows.push(self.row_for(&root).await?);
            }
        }
        Ok(rows)
    }

    /// Writes every row and returns the total size in MB
    pub async fn write_report(&self, writer: &mut ReportWriter) -> Result<f64> {
        for row in self.rows().await? {
            writer.write_row(&row)?;
        }
        Ok(writer.total_mb())
    }

    async fn row_for(&self, node: &AssetNode) -> Result<AssetReportRow> {
        let info = self.api.asset_info(&node.id).await?;
        let (kind, size, version) = match &info {
            Some(info) => (info.kind, info.size_bytes(), info.version),
            None => (node.kind, None, None),
        };
        let size = match size {
            Some(size) => size,
            None => self.size_of(node.clone()).await?,
        };
        let acl = self.api.asset_acl(&node.id).await?;
        debug!("{}: {} bytes", node.id, size);

        Ok(AssetReportRow {
            id: node.id.clone(),
            kind,
            size_mb: bytes_to_mb(size),
            time: version.map(format_version_time).unwrap_or_default(),
            owners: acl.owners,
            readers: acl.readers,
            writers: acl.writers,
        })
    }

    /// Recursive byte size of a node
    fn size_of(&self, node: AssetNode) -> SizeFuture<'_> {
        Box::pin(async move {
            if !node.kind.is_container() {
                let info = self.api.asset_info(&node.id).await?;
                return Ok(info.and_then(|i| i.size_bytes()).unwrap_or(0));
            }
            let mut total = 0;
            for child in self.api.list_children(&node.id).await? {
                total += self.size_of(child).await?;
            }
            Ok(total)
        })
    }
}
