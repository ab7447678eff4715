use std::fs;

use anyhow::Result;
use chrono::NaiveDate;
use pricesmith_rs::{
    CsvSeriesProvider, EngineError, InputSchema, SeriesProvider, load_raw_csv, normalize_raw,
};
use tempfile::tempdir;

const UNORDERED_DAILY: &str = "\
Date,open,high,low,close,volume,BuySignal
07-Jan-21,3.0,3.5,2.5,3.25,300,0
05-Jan-21,1.0,1.5,0.5,1.25,100,1
06-Jan-21,2.0,2.5,1.5,2.25,200.0,
";

#[test]
fn csv_provider_sorts_rows_and_keeps_empty_labels_undefined() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("daily.csv");
    fs::write(&path, UNORDERED_DAILY)?;

    let provider = CsvSeriesProvider::new(&path, InputSchema::default());
    assert!(provider.describe().starts_with("csv:"));
    let series = provider.load()?;

    assert_eq!(series.len(), 3);
    assert_eq!(series.first_date(), NaiveDate::from_ymd_opt(2021, 1, 5));
    assert_eq!(series.close(), vec![1.25, 2.25, 3.25]);
    assert_eq!(series.volume(), vec![100.0, 200.0, 300.0]);
    assert_eq!(series.buy_signal(), Some(vec![Some(1.0), None, Some(0.0)]));
    Ok(())
}

#[test]
fn duplicate_dates_report_input_rows() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("daily.csv");
    fs::write(
        &path,
        "Date,open,high,low,close,volume\n\
         05-Jan-21,1,1,1,1,10\n\
         06-Jan-21,1,1,1,1,10\n\
         05-Jan-21,2,2,2,2,20\n",
    )?;

    let raw = load_raw_csv(&path)?;
    let err = normalize_raw(&raw, &InputSchema::default()).unwrap_err();
    assert_eq!(
        err,
        EngineError::DuplicateDate {
            date: NaiveDate::from_ymd_opt(2021, 1, 5).unwrap(),
            first_row: 0,
            second_row: 2,
        }
    );
    Ok(())
}

#[test]
fn malformed_cells_name_row_and_column() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("daily.csv");
    fs::write(
        &path,
        "Date,open,high,low,close,volume\n\
         05-Jan-21,1,1,1,1,10\n\
         06-Jan-21,1,1,1,abc,10\n",
    )?;

    let err = CsvSeriesProvider::new(&path, InputSchema::default())
        .load()
        .expect_err("non-numeric close must fail");
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::Parse {
            row, column, value, ..
        }) => {
            assert_eq!(*row, 1);
            assert_eq!(column, "close");
            assert_eq!(value, "abc");
        }
        other => panic!("expected parse error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn custom_headers_are_honoured() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("daily.csv");
    fs::write(
        &path,
        "Day,Open,High,Low,Close,Volume\n05-Jan-21,1,2,0.5,1.5,10\n",
    )?;
    let schema = InputSchema {
        date: "Day".to_string(),
        open: "Open".to_string(),
        high: "High".to_string(),
        low: "Low".to_string(),
        close: "Close".to_string(),
        volume: "Volume".to_string(),
        ..InputSchema::default()
    };
    let series = CsvSeriesProvider::new(&path, schema).load()?;
    assert_eq!(series.high(), vec![2.0]);
    assert!(!series.has_label());
    Ok(())
}
