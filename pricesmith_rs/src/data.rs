use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::{AnyValue, CsvReader, DataFrame, SerReader};

use crate::normalize::RawFrame;

/// Read a delimited file with a header row into text cells.
///
/// Schema inference is disabled so every column arrives as text and the
/// normalizer alone decides what parses; empty fields become missing cells.
pub fn load_raw_csv(path: &Path) -> Result<RawFrame> {
    let df = CsvReader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?
        .has_header(true)
        .infer_schema(Some(0))
        .finish()
        .with_context(|| format!("Unable to read {} into a DataFrame", path.display()))?;
    frame_to_raw(&df)
        .with_context(|| format!("Failed to collect text cells from {}", path.display()))
}

/// Convert every column of a DataFrame into optional text cells.
pub fn frame_to_raw(df: &DataFrame) -> Result<RawFrame> {
    let mut columns = Vec::with_capacity(df.width());
    for series in df.get_columns() {
        let mut cells = Vec::with_capacity(series.len());
        for value in series.iter() {
            let cell = match value {
                AnyValue::Null => None,
                AnyValue::String(s) => Some(s.trim().to_string()),
                AnyValue::StringOwned(ref s) => Some(s.as_str().trim().to_string()),
                other => Some(other.to_string()),
            };
            cells.push(cell.filter(|text| !text.is_empty()));
        }
        columns.push((series.name().to_string(), cells));
    }
    Ok(RawFrame::from_columns(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_raw_csv_keeps_text_and_marks_empty_cells() -> Result<()> {
        let temp_dir = tempdir()?;
        let csv_path = temp_dir.path().join("sample.csv");
        std::fs::write(
            &csv_path,
            "Date,open,high,low,close,volume,BuySignal\n\
             05-Jan-21,1.5,2,1,1.75,100,\n\
             06-Jan-21,1.75,2.5,1.5,2.25,120,1\n",
        )?;

        let frame = load_raw_csv(&csv_path)?;
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.headers().len(), 7);
        let dates = frame.cells("Date").expect("date column");
        assert_eq!(dates[0].as_deref(), Some("05-Jan-21"));
        let label = frame.cells("BuySignal").expect("label column");
        assert_eq!(label[0], None);
        assert_eq!(label[1].as_deref(), Some("1"));
        Ok(())
    }
}
