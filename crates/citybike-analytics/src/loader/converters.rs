//! Cell converters used while loading raw CSV text.
//!
//! Every converter returns the converted series together with the number of
//! cells that held text but could not be parsed. Those cells become nulls;
//! the load never fails because of a malformed value.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;

use crate::error::Result;

/// Cell contents that mean "no value" in the raw exports.
///
/// Matched exactly and case-sensitively, the same token set pandas'
/// `read_csv` treats as NA by default.
pub const MISSING_MARKERS: [&str; 18] = [
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Timestamp layouts accepted in raw and cached files, tried in order.
const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Check if a raw cell is empty or a missing-value marker.
pub fn is_missing_marker(value: &str) -> bool {
    value.is_empty() || MISSING_MARKERS.contains(&value)
}

/// Parse a timestamp cell into epoch milliseconds (UTC).
pub fn parse_timestamp(value: &str) -> Option<i64> {
    let trimmed = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.timestamp_millis());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp_millis());
        }
    }

    None
}

/// Parse a numeric cell. Non-finite values count as unparseable.
pub fn parse_float(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse an integer cell, accepting integral floats such as `"12.0"`.
pub fn parse_integer(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Some(v);
    }
    parse_float(trimmed)
        .filter(|v| v.fract() == 0.0 && v.abs() < i64::MAX as f64)
        .map(|v| v as i64)
}

/// Apply a cell parser over a text series, counting coerced cells.
fn convert_text<T, F>(series: &Series, parse: F) -> Result<(Vec<Option<T>>, usize)>
where
    F: Fn(&str) -> Option<T>,
{
    let str_series = series.str()?;
    let mut values = Vec::with_capacity(str_series.len());
    let mut coerced = 0usize;

    for opt_val in str_series.into_iter() {
        match opt_val {
            Some(val) if !is_missing_marker(val) => {
                let parsed = parse(val);
                if parsed.is_none() {
                    coerced += 1;
                }
                values.push(parsed);
            }
            _ => values.push(None),
        }
    }

    Ok((values, coerced))
}

/// Turn empty cells and missing markers into nulls. Other text is kept
/// verbatim, surrounding whitespace included.
pub(crate) fn normalize_text(series: &Series) -> Result<Series> {
    let (values, _) = convert_text(series, |v| Some(v.to_string()))?;
    Ok(Series::new(series.name().clone(), values))
}

/// Convert a text series to Float64.
pub(crate) fn text_to_float(series: &Series) -> Result<(Series, usize)> {
    let (values, coerced) = convert_text(series, parse_float)?;
    Ok((Series::new(series.name().clone(), values), coerced))
}

/// Convert a text series to Int64.
pub(crate) fn text_to_integer(series: &Series) -> Result<(Series, usize)> {
    let (values, coerced) = convert_text(series, parse_integer)?;
    Ok((Series::new(series.name().clone(), values), coerced))
}

/// Convert a text series to a millisecond Datetime.
pub(crate) fn text_to_timestamp(series: &Series) -> Result<(Series, usize)> {
    let (values, coerced) = convert_text(series, parse_timestamp)?;
    let timestamps = Series::new(series.name().clone(), values)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
    Ok((timestamps, coerced))
}
