//! Per-asset properties loaded from a CSV file
//!
//! The first column holds the asset name (the file name without its
//! extension); every column, the first included, becomes a property:
//!
//! ```text
//! id_no,class,category,binomial
//! my_file_1,GASTROPODA,EN,Aaadonta constricta
//! my_file_2,GASTROPODA,CR,Aaadonta irregularis
//! ```

use crate::error::{Error, Result};
use crate::models::Properties;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Properties keyed by asset name
pub type MetadataTable = HashMap<String, Properties>;

/// Loads a metadata CSV, warning about blank values
///
/// Blank values are kept; the platform rejects them at ingestion time, so the
/// warning gives the user a chance to fix the file first.
pub fn load_metadata_from_csv(path: impl AsRef<Path>) -> Result<MetadataTable> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::file_not_found(path));
    }

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let header: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    if header.is_empty() {
        return Err(Error::invalid_argument(format!(
            "metadata file {} has no header row",
            path.display()
        )));
    }

    let mut table = MetadataTable::new();
    for row in reader.records() {
        let row = row?;
        let Some(name) = row.get(0).map(str::trim).filter(|n| !n.is_empty()) else {
            continue;
        };
        let properties: Properties = header
            .iter()
            .zip(row.iter())
            .map(|(key, value)| (key.clone(), value.trim().to_string()))
            .collect();
        table.insert(name.to_string(), properties);
    }

    for (name, field) in blank_fields(&table) {
        warn!("Found an empty value for item {} - field {}", name, field);
    }
    Ok(table)
}

/// `(asset name, field)` pairs whose value is blank, sorted
pub fn blank_fields(table: &MetadataTable) -> Vec<(String, String)> {
    let mut blanks: Vec<(String, String)> = table
        .iter()
        .flat_map(|(name, properties)| {
            properties
                .iter()
                .filter(|(_, value)| value.is_empty())
                .map(move |(field, _)| (name.clone(), field.clone()))
        })
        .collect();
    blanks.sort();
    blanks
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_csv(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("metadata.csv");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_rows_keyed_by_first_column() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            &dir,
            "id_no,class,category,binomial\n\
             my_file_1,GASTROPODA,EN,Aaadonta constricta\n\
             my_file_2,GASTROPODA,CR,Aaadonta irregularis\n",
        );

        let table = load_metadata_from_csv(&path).unwrap();
        assert_eq!(table.len(), 2);
        let first = &table["my_file_1"];
        assert_eq!(first["id_no"], "my_file_1");
        assert_eq!(first["binomial"], "Aaadonta constricta");
        assert_eq!(table["my_file_2"]["category"], "CR");
    }

    #[test]
    fn test_blank_values_are_detected() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "id_no,class\nsnail,\nslug,GASTROPODA\n");

        let table = load_metadata_from_csv(&path).unwrap();
        assert_eq!(
            blank_fields(&table),
            vec![("snail".to_string(), "class".to_string())]
        );
    }

    #[test]
    fn test_short_rows_are_tolerated() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "id_no,class,category\nsnail,GASTROPODA\n");

        let table = load_metadata_from_csv(&path).unwrap();
        assert_eq!(table["snail"].len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let result = load_metadata_from_csv("/nonexistent/metadata.csv");
        assert!(matches!(result, Err(Error::FileNotFound { .. })));
    }
}
