//! Summaries, categorical counts, correlations, outliers, missing-value
//! scans, and the series extraction behind the chart operations.

use polars::prelude::*;
use serde_json::{Map, Value, json};
use std::collections::HashMap;

use super::{
    anyvalue_to_json, display_string, f64_to_json, float_values, is_numeric_dtype, opt_f64_to_json,
};

/// Dataset size plus a describe-style breakdown keyed by column. Numeric
/// columns report count/mean/std/min/quartiles/max; with `numeric_only`
/// unset (or when no numeric column exists at all) the remaining columns get
/// count/unique/top/freq.
pub fn summary(df: &DataFrame, numeric_only: bool) -> PolarsResult<Map<String, Value>> {
    let has_numeric = df
        .get_columns()
        .iter()
        .any(|c| is_numeric_dtype(c.dtype()));
    let include_all = !numeric_only || !has_numeric;

    let mut describe = Map::new();
    for col in df.get_columns() {
        let s = col.as_materialized_series();
        if is_numeric_dtype(s.dtype()) {
            describe.insert(s.name().to_string(), Value::Object(numeric_describe(s)?));
        } else if include_all {
            describe.insert(s.name().to_string(), Value::Object(categorical_describe(s)?));
        }
    }

    let mut payload = Map::new();
    payload.insert("rows".into(), json!(df.height()));
    payload.insert("cols".into(), json!(df.width()));
    payload.insert("describe".into(), Value::Object(describe));
    Ok(payload)
}

fn numeric_describe(s: &Series) -> PolarsResult<Map<String, Value>> {
    let casted = s.cast(&DataType::Float64)?;
    let ca = casted.f64()?;
    let count = (s.len() - s.null_count()) as u64;

    let mut out = Map::new();
    out.insert("count".into(), json!(count));
    out.insert("mean".into(), opt_f64_to_json(ca.mean()));
    out.insert("std".into(), opt_f64_to_json(ca.std(1)));
    out.insert("min".into(), opt_f64_to_json(ca.min()));
    out.insert("25%".into(), opt_f64_to_json(ca.quantile(0.25, QuantileMethod::Linear)?));
    out.insert("50%".into(), opt_f64_to_json(ca.quantile(0.50, QuantileMethod::Linear)?));
    out.insert("75%".into(), opt_f64_to_json(ca.quantile(0.75, QuantileMethod::Linear)?));
    out.insert("max".into(), opt_f64_to_json(ca.max()));
    Ok(out)
}

fn categorical_describe(s: &Series) -> PolarsResult<Map<String, Value>> {
    let count = (s.len() - s.null_count()) as u64;
    let nulls_seen = usize::from(s.null_count() > 0);
    let unique = s.n_unique()?.saturating_sub(nulls_seen) as u64;
    let top = value_counts(s, 1)?;

    let mut out = Map::new();
    out.insert("count".into(), json!(count));
    out.insert("unique".into(), json!(unique));
    match top.first() {
        Some((value, freq)) => {
            out.insert("top".into(), json!(value));
            out.insert("freq".into(), json!(freq));
        }
        None => {
            out.insert("top".into(), Value::Null);
            out.insert("freq".into(), Value::Null);
        }
    }
    Ok(out)
}

/// First `n` rows as an ordered sequence of row mappings.
pub fn head(df: &DataFrame, n: usize) -> PolarsResult<Map<String, Value>> {
    let take = n.min(df.height());
    let mut rows = Vec::with_capacity(take);
    for i in 0..take {
        let mut row = Map::new();
        for col in df.get_columns() {
            row.insert(col.name().to_string(), anyvalue_to_json(&col.get(i)?));
        }
        rows.push(Value::Object(row));
    }

    let mut payload = Map::new();
    payload.insert("rows".into(), Value::Array(rows));
    Ok(payload)
}

/// Top-N counts of the stringified non-null values of one column, most
/// frequent first (ties broken by value for determinism).
pub fn category_counts(
    df: &DataFrame,
    column: &str,
    top_n: usize,
) -> PolarsResult<Vec<(String, u64)>> {
    let s = df.column(column)?.as_materialized_series();
    value_counts(s, top_n)
}

fn value_counts(s: &Series, top_n: usize) -> PolarsResult<Vec<(String, u64)>> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for av in s.iter() {
        if matches!(av, AnyValue::Null) {
            continue;
        }
        *counts.entry(display_string(&av)).or_insert(0) += 1;
    }
    let mut items: Vec<(String, u64)> = counts.into_iter().collect();
    items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    items.truncate(top_n);
    Ok(items)
}

/// Correlation matrix as mapping-of-mapping keyed by column name. With no
/// explicit column list, all numeric columns participate. Cells with fewer
/// than two paired observations or zero variance come back null.
pub fn correlations(
    df: &DataFrame,
    columns: Option<&[String]>,
    method: &str,
) -> PolarsResult<Map<String, Value>> {
    let method = method.to_ascii_lowercase();
    if method != "pearson" && method != "spearman" {
        return Err(PolarsError::ComputeError(
            format!("unsupported method '{method}'").into(),
        ));
    }

    let mut cols: Vec<(String, Vec<Option<f64>>)> = Vec::new();
    match columns {
        Some(names) => {
            for name in names {
                let s = df.column(name)?.as_materialized_series();
                if !is_numeric_dtype(s.dtype()) {
                    return Err(PolarsError::ComputeError(
                        format!("column '{name}' is not numeric").into(),
                    ));
                }
                cols.push((name.clone(), float_values(s)?));
            }
        }
        None => {
            for col in df.get_columns() {
                if is_numeric_dtype(col.dtype()) {
                    let s = col.as_materialized_series();
                    cols.push((s.name().to_string(), float_values(s)?));
                }
            }
        }
    }

    if method == "spearman" {
        for (_, values) in cols.iter_mut() {
            *values = ranks(values);
        }
    }

    let mut corr = Map::new();
    for (i, (name_i, xs)) in cols.iter().enumerate() {
        let mut row = Map::new();
        for (j, (name_j, ys)) in cols.iter().enumerate() {
            let r = if i == j { Some(1.0) } else { pearson(xs, ys) };
            row.insert(name_j.clone(), opt_f64_to_json(r));
        }
        corr.insert(name_i.clone(), Value::Object(row));
    }

    let mut payload = Map::new();
    payload.insert("method".into(), json!(method));
    payload.insert("corr".into(), Value::Object(corr));
    Ok(payload)
}

/// Pearson r over pairwise-complete observations.
fn pearson(xs: &[Option<f64>], ys: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys.iter())
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        return None;
    }
    Some(cov / denom)
}

/// Average ranks over the non-null values, nulls staying null.
fn ranks(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut order: Vec<usize> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|_| i))
        .collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut out = vec![None; values.len()];
    let mut pos = 0;
    while pos < order.len() {
        let mut end = pos + 1;
        while end < order.len() && values[order[end]] == values[order[pos]] {
            end += 1;
        }
        // 1-based ranks, ties share the average
        let rank = (pos + 1..=end).map(|r| r as f64).sum::<f64>() / (end - pos) as f64;
        for &idx in &order[pos..end] {
            out[idx] = Some(rank);
        }
        pos = end;
    }
    out
}

/// Row indices where any requested numeric column exceeds the z-score
/// threshold. Population std with a small floor keeps constant columns from
/// dividing by zero.
pub fn outliers(df: &DataFrame, columns: &[String], z: f64) -> PolarsResult<Map<String, Value>> {
    let mut flagged = vec![false; df.height()];
    for name in columns {
        let s = df.column(name)?.as_materialized_series();
        if !is_numeric_dtype(s.dtype()) {
            continue;
        }
        let values = float_values(s)?;
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() {
            continue;
        }
        let n = present.len() as f64;
        let mean = present.iter().sum::<f64>() / n;
        let var = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let denom = var.sqrt() + 1e-9;
        for (idx, value) in values.iter().enumerate() {
            if let Some(v) = value
                && ((v - mean) / denom).abs() > z
            {
                flagged[idx] = true;
            }
        }
    }

    let indices: Vec<Value> = flagged
        .iter()
        .enumerate()
        .filter_map(|(i, hit)| hit.then(|| json!(i)))
        .collect();

    let mut payload = Map::new();
    payload.insert("count".into(), json!(indices.len()));
    payload.insert("indices".into(), Value::Array(indices));
    Ok(payload)
}

/// Columns whose null fraction exceeds the threshold, worst first.
pub fn missing(df: &DataFrame, threshold: f64) -> Map<String, Value> {
    let height = df.height();
    let mut fractions: Vec<(String, f64)> = df
        .get_columns()
        .iter()
        .map(|c| {
            let frac = if height == 0 {
                0.0
            } else {
                c.null_count() as f64 / height as f64
            };
            (c.name().to_string(), frac)
        })
        .filter(|(_, frac)| *frac > threshold)
        .collect();
    fractions.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut flagged = Map::new();
    for (name, frac) in fractions {
        flagged.insert(name, f64_to_json(frac));
    }

    let mut payload = Map::new();
    payload.insert("threshold".into(), f64_to_json(threshold));
    payload.insert("missing".into(), Value::Object(flagged));
    payload
}

/// Equal-width histogram of one column's finite values.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<u64>,
}

pub fn histogram(df: &DataFrame, column: &str, nbins: usize) -> PolarsResult<Histogram> {
    let s = df.column(column)?.as_materialized_series();
    let values: Vec<f64> = float_values(s)?
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .collect();
    if values.is_empty() {
        return Ok(Histogram { edges: vec![], counts: vec![] });
    }

    let nbins = nbins.max(1);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max <= min {
        return Ok(Histogram { edges: vec![min, max], counts: vec![values.len() as u64] });
    }

    let width = (max - min) / nbins as f64;
    let mut counts = vec![0u64; nbins];
    for v in &values {
        let idx = (((v - min) / width) as usize).min(nbins - 1);
        counts[idx] += 1;
    }
    let edges = (0..=nbins).map(|i| min + width * i as f64).collect();
    Ok(Histogram { edges, counts })
}

/// Pairwise-complete (x, y) points for scatter rendering.
pub fn xy_points(df: &DataFrame, x: &str, y: &str) -> PolarsResult<Vec<(f64, f64)>> {
    let xs = float_values(df.column(x)?.as_materialized_series())?;
    let ys = float_values(df.column(y)?.as_materialized_series())?;
    Ok(xs
        .into_iter()
        .zip(ys)
        .filter_map(|(x, y)| Some((x?, y?)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_df() -> DataFrame {
        df!(
            "amount" => [10.0, 20.0, 30.0],
            "city" => ["Oslo", "Lima", "Oslo"],
        )
        .unwrap()
    }

    #[test]
    fn summary_reports_shape_and_numeric_describe() {
        let df = sample_df();
        let payload = summary(&df, true).unwrap();
        assert_eq!(payload["rows"], json!(3));
        assert_eq!(payload["cols"], json!(2));

        let describe = payload["describe"].as_object().unwrap();
        assert!(describe.contains_key("amount"));
        assert!(!describe.contains_key("city"));
        assert_eq!(describe["amount"]["count"], json!(3));
        assert_eq!(describe["amount"]["mean"], json!(20.0));
        assert_eq!(describe["amount"]["min"], json!(10.0));
        assert_eq!(describe["amount"]["50%"], json!(20.0));
        assert_eq!(describe["amount"]["max"], json!(30.0));
    }

    #[test]
    fn summary_include_all_describes_categoricals() {
        let df = sample_df();
        let payload = summary(&df, false).unwrap();
        let describe = payload["describe"].as_object().unwrap();
        assert_eq!(describe["city"]["count"], json!(3));
        assert_eq!(describe["city"]["unique"], json!(2));
        assert_eq!(describe["city"]["top"], json!("Oslo"));
        assert_eq!(describe["city"]["freq"], json!(2));
    }

    #[test]
    fn head_returns_row_records_in_order() {
        let df = sample_df();
        let payload = head(&df, 2).unwrap();
        let rows = payload["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["amount"], json!(10.0));
        assert_eq!(rows[0]["city"], json!("Oslo"));
        assert_eq!(rows[1]["city"], json!("Lima"));
    }

    #[test]
    fn head_clamps_to_height() {
        let df = sample_df();
        let payload = head(&df, 50).unwrap();
        assert_eq!(payload["rows"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn category_counts_order_and_truncation() {
        let df = df!("c" => ["a", "b", "a", "c", "a", "b"]).unwrap();
        let counts = category_counts(&df, "c", 2).unwrap();
        assert_eq!(counts, vec![("a".to_string(), 3), ("b".to_string(), 2)]);
    }

    #[test]
    fn correlations_perfectly_linear() {
        let df = df!(
            "x" => [1.0, 2.0, 3.0, 4.0],
            "y" => [2.0, 4.0, 6.0, 8.0],
        )
        .unwrap();
        let payload = correlations(&df, None, "pearson").unwrap();
        let r = payload["corr"]["x"]["y"].as_f64().unwrap();
        assert!((r - 1.0).abs() < 1e-12);
        assert_eq!(payload["corr"]["x"]["x"], json!(1.0));
    }

    #[test]
    fn correlations_constant_column_is_null() {
        let df = df!(
            "x" => [1.0, 2.0, 3.0],
            "flat" => [5.0, 5.0, 5.0],
        )
        .unwrap();
        let payload = correlations(&df, None, "pearson").unwrap();
        assert_eq!(payload["corr"]["x"]["flat"], Value::Null);
    }

    #[test]
    fn correlations_rejects_unknown_method() {
        let df = sample_df();
        let err = correlations(&df, None, "kendall").unwrap_err();
        assert!(err.to_string().contains("unsupported method"));
    }

    #[test]
    fn correlations_rejects_non_numeric_selection() {
        let df = sample_df();
        let cols = vec!["city".to_string()];
        assert!(correlations(&df, Some(&cols), "pearson").is_err());
    }

    #[test]
    fn spearman_is_rank_based() {
        // Monotone but non-linear: spearman 1.0, pearson below it.
        let df = df!(
            "x" => [1.0, 2.0, 3.0, 4.0],
            "y" => [1.0, 10.0, 100.0, 1000.0],
        )
        .unwrap();
        let payload = correlations(&df, None, "spearman").unwrap();
        let r = payload["corr"]["x"]["y"].as_f64().unwrap();
        assert!((r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn outliers_flags_extreme_rows() {
        let df = df!("v" => [1.0, 1.1, 0.9, 1.0, 50.0]).unwrap();
        let payload = outliers(&df, &["v".to_string()], 2.0).unwrap();
        assert_eq!(payload["count"], json!(1));
        assert_eq!(payload["indices"], json!([4]));
    }

    #[test]
    fn outliers_zero_variance_returns_empty() {
        let df = df!("v" => [7.0, 7.0, 7.0, 7.0]).unwrap();
        let payload = outliers(&df, &["v".to_string()], 3.0).unwrap();
        assert_eq!(payload["count"], json!(0));
        assert_eq!(payload["indices"], json!([]));
    }

    #[test]
    fn missing_flags_columns_over_threshold() {
        let df = df!(
            "full" => [Some(1), Some(2), Some(3), Some(4)],
            "holes" => [Some(1), None, None, Some(4)],
        )
        .unwrap();
        let payload = missing(&df, 0.20);
        let flagged = payload["missing"].as_object().unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged["holes"], json!(0.5));
    }

    #[test]
    fn histogram_counts_cover_all_values() {
        let df = df!("v" => [0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let hist = histogram(&df, "v", 5).unwrap();
        assert_eq!(hist.counts.iter().sum::<u64>(), 6);
        assert_eq!(hist.edges.len(), 6);
    }

    #[test]
    fn histogram_constant_column_single_bin() {
        let df = df!("v" => [3.0, 3.0, 3.0]).unwrap();
        let hist = histogram(&df, "v", 30).unwrap();
        assert_eq!(hist.counts, vec![3]);
    }

    #[test]
    fn xy_points_skip_incomplete_pairs() {
        let df = df!(
            "x" => [Some(1.0), None, Some(3.0)],
            "y" => [Some(2.0), Some(9.0), Some(6.0)],
        )
        .unwrap();
        let points = xy_points(&df, "x", "y").unwrap();
        assert_eq!(points, vec![(1.0, 2.0), (3.0, 6.0)]);
    }
}
