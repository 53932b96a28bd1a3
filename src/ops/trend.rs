//! Time-trend bucketing: datetime columns grouped by calendar period,
//! anything else coerced to integer buckets (typically years).

use polars::prelude::*;
use std::collections::BTreeMap;

/// Bucketed counts, keys already ascending and stringified for the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeTrend {
    /// `"datetime"` or `"year-int"`.
    pub kind: &'static str,
    pub buckets: Vec<(String, u64)>,
}

pub fn time_trend(df: &DataFrame, column: &str, freq: &str) -> PolarsResult<TimeTrend> {
    let s = df.column(column)?.as_materialized_series();
    match s.dtype() {
        DataType::Date => {
            let fmt = period_format(freq)?;
            let mut counts: BTreeMap<String, u64> = BTreeMap::new();
            for date in s.date()?.as_date_iter().flatten() {
                *counts.entry(date.format(fmt).to_string()).or_insert(0) += 1;
            }
            Ok(TimeTrend { kind: "datetime", buckets: counts.into_iter().collect() })
        }
        DataType::Datetime(_, _) => {
            let fmt = period_format(freq)?;
            let mut counts: BTreeMap<String, u64> = BTreeMap::new();
            for ts in s.datetime()?.as_datetime_iter().flatten() {
                *counts.entry(ts.format(fmt).to_string()).or_insert(0) += 1;
            }
            Ok(TimeTrend { kind: "datetime", buckets: counts.into_iter().collect() })
        }
        _ => {
            // Not temporal: coerce to integers, dropping what will not parse.
            let casted = s.cast(&DataType::Int64)?;
            let mut counts: BTreeMap<i64, u64> = BTreeMap::new();
            for year in casted.i64()?.into_iter().flatten() {
                *counts.entry(year).or_insert(0) += 1;
            }
            let buckets = counts
                .into_iter()
                .map(|(year, count)| (year.to_string(), count))
                .collect();
            Ok(TimeTrend { kind: "year-int", buckets })
        }
    }
}

fn period_format(freq: &str) -> PolarsResult<&'static str> {
    match freq.to_ascii_uppercase().as_str() {
        "D" => Ok("%Y-%m-%d"),
        "M" => Ok("%Y-%m"),
        "Y" => Ok("%Y"),
        other => Err(PolarsError::ComputeError(
            format!("unsupported freq '{other}', expected D, M, or Y").into(),
        )),
    }
}
