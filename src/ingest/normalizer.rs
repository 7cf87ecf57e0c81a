//! Raw row → price point normalization
//!
//! Pure and total: every raw row either becomes exactly one `PricePoint` or
//! is dropped because it has no usable timestamp. Missing or non-finite
//! numeric values become nulls on an otherwise kept row.

use crate::model::{PricePoint, Symbol};
use crate::provider::{ExchangeZone, RawRow, RawSeries};
use chrono::{DateTime, Utc};

/// Normalize a raw series for `symbol`
///
/// Order is preserved and duplicate timestamps are passed through; the
/// store collapses them by key.
pub fn normalize(series: &RawSeries, symbol: &Symbol) -> Vec<PricePoint> {
    normalize_with_stats(series, symbol).0
}

/// Like [`normalize`], also returning how many rows were dropped
pub fn normalize_with_stats(series: &RawSeries, symbol: &Symbol) -> (Vec<PricePoint>, usize) {
    let mut points = Vec::with_capacity(series.rows.len());
    let mut dropped = 0;

    for row in &series.rows {
        let Some(timestamp) = resolve_timestamp(row, &series.zone) else {
            dropped += 1;
            continue;
        };

        points.push(PricePoint {
            symbol: symbol.clone(),
            timestamp,
            open: price(row.open),
            high: price(row.high),
            low: price(row.low),
            close: price(row.close),
            volume: volume(row.volume),
        });
    }

    (points, dropped)
}

/// `datetime` takes precedence; a bare `date` is the start of that day in
/// the exchange zone
fn resolve_timestamp(row: &RawRow, zone: &ExchangeZone) -> Option<DateTime<Utc>> {
    if let Some(dt) = row.datetime {
        return Some(dt);
    }

    zone.start_of_day(row.date?)
}

fn price(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Volume is a non-negative integer; fractional values are truncated
fn volume(value: Option<f64>) -> Option<i64> {
    value
        .filter(|v| v.is_finite() && *v >= 0.0 && *v < i64::MAX as f64)
        .map(|v| v.trunc() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, TimeZone};

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, hour, 30, 0).unwrap()
    }

    fn full_row(hour: u32) -> RawRow {
        RawRow {
            datetime: Some(ts(hour)),
            date: None,
            open: Some(250.0),
            high: Some(251.0),
            low: Some(249.5),
            close: Some(250.5),
            volume: Some(1_200_000.0),
        }
    }

    fn series(rows: Vec<RawRow>) -> RawSeries {
        RawSeries::new(Symbol::new("AAPL"), rows)
    }

    fn aapl() -> Symbol {
        Symbol::new("AAPL")
    }

    #[test]
    fn test_full_row() {
        let points = normalize(&series(vec![full_row(14)]), &aapl());

        assert_eq!(points.len(), 1);
        let p = &points[0];
        assert_eq!(p.symbol, aapl());
        assert_eq!(p.timestamp, ts(14));
        assert_eq!(p.open, Some(250.0));
        assert_eq!(p.high, Some(251.0));
        assert_eq!(p.low, Some(249.5));
        assert_eq!(p.close, Some(250.5));
        assert_eq!(p.volume, Some(1_200_000));
    }

    #[test]
    fn test_missing_volume_kept_as_null() {
        let mut row = full_row(14);
        row.volume = None;

        let points = normalize(&series(vec![row]), &aapl());

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].volume, None);
        assert_eq!(points[0].open, Some(250.0));
        assert_eq!(points[0].close, Some(250.5));
    }

    #[test]
    fn test_row_without_timestamp_dropped() {
        let mut orphan = full_row(15);
        orphan.datetime = None;
        orphan.date = None;

        let (points, dropped) =
            normalize_with_stats(&series(vec![full_row(14), orphan, full_row(16)]), &aapl());

        assert_eq!(dropped, 1);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].timestamp, ts(14));
        assert_eq!(points[1].timestamp, ts(16));
    }

    #[test]
    fn test_datetime_takes_precedence_over_date() {
        let mut row = full_row(14);
        row.date = Some(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());

        let points = normalize(&series(vec![row]), &aapl());
        assert_eq!(points[0].timestamp, ts(14));
    }

    #[test]
    fn test_date_only_anchored_at_exchange_midnight() {
        let mut row = full_row(0);
        row.datetime = None;
        row.date = Some(NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());

        let new_york = ExchangeZone::Fixed(FixedOffset::west_opt(5 * 3600).unwrap());
        let series = series(vec![row]).with_zone(new_york);
        let points = normalize(&series, &aapl());

        assert_eq!(
            points[0].timestamp,
            Utc.with_ymd_and_hms(2025, 1, 2, 5, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_date_only_named_zone_ignores_current_offset() {
        let mut winter = full_row(0);
        winter.datetime = None;
        winter.date = Some(NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        let mut summer = winter.clone();
        summer.date = Some(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap());

        let zone = ExchangeZone::Named(chrono_tz::America::New_York);
        let points = normalize(&series(vec![winter, summer]).with_zone(zone), &aapl());

        assert_eq!(
            points[0].timestamp,
            Utc.with_ymd_and_hms(2025, 1, 2, 5, 0, 0).unwrap()
        );
        assert_eq!(
            points[1].timestamp,
            Utc.with_ymd_and_hms(2025, 7, 1, 4, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_date_only_defaults_to_utc_midnight() {
        let mut row = full_row(0);
        row.datetime = None;
        row.date = Some(NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());

        let points = normalize(&series(vec![row]), &aapl());
        assert_eq!(
            points[0].timestamp,
            Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_nan_and_infinite_become_null() {
        let mut row = full_row(14);
        row.open = Some(f64::NAN);
        row.high = Some(f64::INFINITY);
        row.volume = Some(f64::NAN);

        let points = normalize(&series(vec![row]), &aapl());

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].open, None);
        assert_eq!(points[0].high, None);
        assert_eq!(points[0].low, Some(249.5));
        assert_eq!(points[0].volume, None);
    }

    #[test]
    fn test_volume_coercion() {
        assert_eq!(volume(Some(1234.9)), Some(1234));
        assert_eq!(volume(Some(0.0)), Some(0));
        assert_eq!(volume(Some(-5.0)), None);
        assert_eq!(volume(Some(1e30)), None);
        assert_eq!(volume(None), None);
    }

    #[test]
    fn test_all_numeric_missing_still_kept() {
        let row = RawRow {
            datetime: Some(ts(14)),
            ..Default::default()
        };

        let points = normalize(&series(vec![row]), &aapl());
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].open, None);
        assert_eq!(points[0].volume, None);
    }

    #[test]
    fn test_duplicates_passed_through() {
        let mut second = full_row(14);
        second.close = Some(260.0);

        let points = normalize(&series(vec![full_row(14), second]), &aapl());

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].timestamp, points[1].timestamp);
        assert_eq!(points[1].close, Some(260.0));
    }

    #[test]
    fn test_uses_requested_symbol() {
        let raw = RawSeries::new(Symbol::new("aapl"), vec![full_row(14)]);
        let points = normalize(&raw, &aapl());
        assert_eq!(points[0].symbol.as_str(), "AAPL");
    }

    #[test]
    fn test_empty_series() {
        let (points, dropped) = normalize_with_stats(&series(vec![]), &aapl());
        assert!(points.is_empty());
        assert_eq!(dropped, 0);
    }
}
