use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use polars::prelude::{CsvWriter, DataFrame, NamedFrom, SerWriter, Series};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::column::{ColumnKind, FeatureTable};
use crate::config::{InputSchema, OverwritePolicy};

const OUTPUT_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Written,
    /// An identical file already existed and was left in place.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub status: WriteStatus,
    pub sha256: String,
}

/// Convert a feature table into a DataFrame with the date index first.
///
/// The date and base columns are headed with the names in `headers`, so the
/// output reads back with the same schema as the input.
pub fn table_to_frame(table: &FeatureTable, headers: &InputSchema) -> Result<DataFrame> {
    let mut series = Vec::with_capacity(table.width() + 1);
    let dates: Vec<String> = table
        .dates()
        .iter()
        .map(|date| date.format(OUTPUT_DATE_FORMAT).to_string())
        .collect();
    series.push(Series::new(headers.date.as_str(), dates));
    for column in table.columns() {
        let header = headers.output_header(&column.name);
        let s = match column.kind {
            ColumnKind::Float => Series::new(header, column.values.clone()),
            ColumnKind::Integer => {
                let values: Vec<Option<i64>> = column
                    .values
                    .iter()
                    .map(|value| value.map(|v| v.round() as i64))
                    .collect();
                Series::new(header, values)
            }
        };
        series.push(s);
    }
    DataFrame::new(series).with_context(|| "Failed to assemble feature table frame")
}

/// SHA-256 of the table serialized exactly as [`write_feature_table`] would
/// write it.
pub fn fingerprint_table(table: &FeatureTable, headers: &InputSchema) -> Result<String> {
    let mut df = table_to_frame(table, headers)?;
    let mut writer = HashingWriter::new(io::sink());
    CsvWriter::new(&mut writer)
        .include_header(true)
        .finish(&mut df)
        .with_context(|| "Failed to hash feature table")?;
    Ok(writer.finalize_hex())
}

/// Write the table as CSV, guarding an existing file with a content hash.
///
/// An identical existing file is reused; a differing one is only replaced
/// under [`OverwritePolicy::Overwrite`].
pub fn write_feature_table(
    table: &FeatureTable,
    path: &Path,
    headers: &InputSchema,
    policy: OverwritePolicy,
) -> Result<WriteOutcome> {
    let new_hash = fingerprint_table(table, headers)?;

    if path.exists() {
        let old_hash = sha256_file(path)?;
        if old_hash == new_hash {
            info!(
                rows = table.height(),
                path = %path.display(),
                "Feature table unchanged; reusing existing output"
            );
            return Ok(WriteOutcome {
                status: WriteStatus::Unchanged,
                sha256: new_hash,
            });
        }
        if policy == OverwritePolicy::Refuse {
            return Err(anyhow!(
                "Existing output differs from the newly engineered feature table.\n\
                 path: {}\n\
                 existing sha256: {}\n\
                 new sha256: {}\n\
                 Rerun with --overwrite to replace it, or choose a different --output path.",
                path.display(),
                old_hash,
                new_hash
            ));
        }
        warn!(
            existing_hash = %old_hash,
            new_hash = %new_hash,
            path = %path.display(),
            "Feature table hash mismatch; overwriting because overwrite was requested"
        );
    }

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Unable to create {}", parent.display()))?;
    }
    let mut df = table_to_frame(table, headers)?;
    let mut file =
        File::create(path).with_context(|| format!("Unable to create {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)
        .with_context(|| "Failed to persist feature table")?;
    info!(
        rows = table.height(),
        columns = table.width() + 1,
        path = %path.display(),
        "Feature table written"
    );
    Ok(WriteOutcome {
        status: WriteStatus::Written,
        sha256: new_hash,
    })
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("Unable to open {} for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn small_table() -> FeatureTable {
        let dates = vec![
            NaiveDate::from_ymd_opt(2021, 1, 5).unwrap(),
            NaiveDate::from_ymd_opt(2021, 1, 6).unwrap(),
        ];
        let mut table = FeatureTable::new(dates);
        table
            .push_column(Column::base("close", ColumnKind::Float, vec![Some(1.5), None]))
            .unwrap();
        table
            .push_column(Column::base(
                "volume",
                ColumnKind::Integer,
                vec![Some(100.0), Some(120.0)],
            ))
            .unwrap();
        table
    }

    #[test]
    fn written_csv_has_iso_dates_empty_undefined_and_integer_volume() -> Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("out.csv");
        let outcome = write_feature_table(
            &small_table(),
            &path,
            &InputSchema::default(),
            OverwritePolicy::Refuse,
        )?;
        assert_eq!(outcome.status, WriteStatus::Written);

        let text = fs::read_to_string(&path)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Date,close,volume");
        assert_eq!(lines[1], "2021-01-05,1.5,100");
        assert_eq!(lines[2], "2021-01-06,,120");
        assert_eq!(outcome.sha256, sha256_file(&path)?);
        Ok(())
    }

    #[test]
    fn identical_rewrite_is_reused_and_differing_rewrite_is_refused() -> Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("out.csv");
        let table = small_table();
        let headers = InputSchema::default();
        write_feature_table(&table, &path, &headers, OverwritePolicy::Refuse)?;

        let again = write_feature_table(&table, &path, &headers, OverwritePolicy::Refuse)?;
        assert_eq!(again.status, WriteStatus::Unchanged);

        let shorter = table.filter_rows(&[true, false])?;
        let err = write_feature_table(&shorter, &path, &headers, OverwritePolicy::Refuse)
            .expect_err("differing table must not overwrite silently");
        assert!(err.to_string().contains("--overwrite"));

        let replaced = write_feature_table(&shorter, &path, &headers, OverwritePolicy::Overwrite)?;
        assert_eq!(replaced.status, WriteStatus::Written);
        Ok(())
    }

    #[test]
    fn base_columns_are_written_under_input_headers() -> Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("out.csv");
        let headers = InputSchema {
            date: "Day".to_string(),
            close: "Close".to_string(),
            ..InputSchema::default()
        };
        write_feature_table(&small_table(), &path, &headers, OverwritePolicy::Refuse)?;

        let text = fs::read_to_string(&path)?;
        assert_eq!(text.lines().next(), Some("Day,Close,volume"));
        assert_ne!(
            fingerprint_table(&small_table(), &headers)?,
            fingerprint_table(&small_table(), &InputSchema::default())?
        );
        Ok(())
    }
}
