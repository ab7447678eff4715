use anyhow::Result;
use chrono::{Duration, NaiveDate};
use features_rs::{EmaAdjust, EngineConfig, FeatureEngine};
use pricesmith_rs::{InputSchema, TradingDay, fingerprint_table, normalize_records};

fn records(rows: usize) -> Vec<TradingDay> {
    let start = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
    (0..rows)
        .map(|i| {
            let x = i as f64;
            let close = 50.0 + 0.2 * x + 3.0 * (0.9 * x).sin();
            TradingDay {
                date: start + Duration::days(i as i64),
                open: close + 0.4 * (0.5 * x).cos(),
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 5_000 + (i as u64 * 53) % 700,
                buy_signal: Some(f64::from(u8::from(i % 5 == 0))),
            }
        })
        .collect()
}

#[test]
fn shuffled_input_produces_identical_output() -> Result<()> {
    let ordered = records(75);
    let mut shuffled = ordered.clone();
    shuffled.reverse();
    shuffled.rotate_left(17);

    let engine = FeatureEngine::new(EngineConfig::default())?;
    let a = engine.run(&normalize_records(ordered, true)?)?;
    let b = engine.run(&normalize_records(shuffled, true)?)?;
    assert_eq!(a, b);
    let headers = InputSchema::default();
    assert_eq!(
        fingerprint_table(&a.table, &headers)?,
        fingerprint_table(&b.table, &headers)?
    );
    Ok(())
}

#[test]
fn repeated_runs_are_idempotent() -> Result<()> {
    let series = normalize_records(records(60), true)?;
    let engine = FeatureEngine::new(EngineConfig::default())?;
    let headers = InputSchema::default();
    let first = fingerprint_table(&engine.run(&series)?.table, &headers)?;
    let second = fingerprint_table(&engine.run(&series)?.table, &headers)?;
    assert_eq!(first, second);
    assert_eq!(first.len(), 64);
    Ok(())
}

#[test]
fn parallel_and_sequential_evaluation_agree() -> Result<()> {
    let series = normalize_records(records(90), true)?;
    for prune in [true, false] {
        let sequential = FeatureEngine::new(EngineConfig {
            prune,
            ..EngineConfig::default()
        })?
        .run(&series)?;
        let parallel = FeatureEngine::new(EngineConfig {
            prune,
            parallel: true,
            ..EngineConfig::default()
        })?
        .run(&series)?;
        assert_eq!(sequential.table, parallel.table);
        assert_eq!(
            sequential.table.column_names(),
            parallel.table.column_names()
        );
    }
    Ok(())
}

#[test]
fn ema_mode_changes_only_ema_chains() -> Result<()> {
    let series = normalize_records(records(60), true)?;
    let adjusted = FeatureEngine::new(EngineConfig {
        prune: false,
        ..EngineConfig::default()
    })?
    .run(&series)?
    .table;
    let mut config = EngineConfig {
        prune: false,
        ..EngineConfig::default()
    };
    config.features.ema_adjust = EmaAdjust::Recursive;
    let recursive = FeatureEngine::new(config)?.run(&series)?.table;

    assert_eq!(adjusted.values("sma_20")?, recursive.values("sma_20")?);
    assert_eq!(adjusted.value("ema_12", 0), recursive.value("ema_12", 0));
    assert_ne!(adjusted.value("ema_12", 5), recursive.value("ema_12", 5));
    Ok(())
}
