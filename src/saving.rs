use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::model::FileDataset;

/// Write a parsed dataset as gzip-compressed bincode.
pub fn write_dataset(dataset: &FileDataset, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut writer = BufWriter::new(encoder);

    serialize_into(&mut writer, dataset)?;

    let encoder = writer.into_inner().map_err(|e| e.into_error())?;
    encoder.finish()?.flush()?;
    Ok(())
}

/// Read back a dataset written by [`write_dataset`].
///
/// # Errors
/// * `AppError::Io` if the file cannot be opened
/// * `AppError::Bincode` if the decompressed contents do not decode as a
///   dataset, including a damaged gzip stream
pub fn read_dataset(path: &Path) -> Result<FileDataset> {
    let file = File::open(path)?;
    let decoder = GzDecoder::new(file);
    let mut reader = BufReader::new(decoder);

    let dataset: FileDataset = deserialize_from(&mut reader)?;
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RawRow, RawSheet, SummaryRow};
    use std::collections::BTreeMap;

    #[test]
    fn dataset_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("7.bin.gz");

        let mut cells = BTreeMap::new();
        cells.insert("Route".to_string(), "HCM-HNI".to_string());
        let dataset = FileDataset {
            summary_rows: vec![SummaryRow {
                row_label: "Fuel".into(),
                cth: Some(1.5),
                hcm: None,
                hni: Some(3.0),
                grand_total: Some(4.5),
            }],
            raw_rows: vec![RawRow {
                sheet_name: "Sheet1".into(),
                row_index: 0,
                cells,
            }],
            raw_sheets: vec![RawSheet {
                name: "Sheet1".into(),
                headers: vec!["Route".into(), "Unnamed: 1".into()],
            }],
            ..FileDataset::default()
        };

        write_dataset(&dataset, &path).unwrap();
        assert_eq!(read_dataset(&path).unwrap(), dataset);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_dataset(&dir.path().join("absent.bin.gz")).is_err());
    }
}
