//! The dispatcher runs exactly one validated invocation per turn against the
//! dataset context, converts every capability failure into a tagged result,
//! and shapes successful outputs into transport-safe JSON. Chart rendering
//! happens here as a fire-and-forget side effect of the pure computations.

use polars::prelude::PolarsError;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::context::DatasetContext;
use crate::errors::AnalystError;
use crate::ops::{stats, trend};
use crate::plan::Invocation;
use crate::registry::{OperationName, OperationSpec, Registry};
use crate::render::{ChartSpec, Renderer};

/// Outcome of one invocation. Exactly one of payload/error exists,
/// discriminated by the constructor; `to_value` flattens it into the wire
/// form `{ "ok": bool, ... }`.
#[derive(Debug)]
pub enum OperationResult {
    Success(Map<String, Value>),
    Failure(AnalystError),
}

impl OperationResult {
    pub fn ok(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn error_tag(&self) -> Option<String> {
        match self {
            Self::Success(_) => None,
            Self::Failure(err) => Some(err.to_string()),
        }
    }

    /// Flat JSON object: `{ok: true, ...payload}` or `{ok: false, error}`.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        match self {
            Self::Success(payload) => {
                obj.insert("ok".into(), json!(true));
                for (key, value) in payload {
                    obj.insert(key.clone(), value.clone());
                }
            }
            Self::Failure(err) => {
                obj.insert("ok".into(), json!(false));
                obj.insert("error".into(), json!(err.to_string()));
            }
        }
        Value::Object(obj)
    }
}

pub struct Dispatcher {
    registry: Registry,
    renderer: Box<dyn Renderer>,
}

impl Dispatcher {
    pub fn new(renderer: Box<dyn Renderer>) -> Self {
        Self { registry: Registry::new(), renderer }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Execute one invocation. Never panics and never returns a raw error:
    /// every failure ends up inside the result.
    pub fn execute(&self, invocation: &Invocation, ctx: &mut DatasetContext) -> OperationResult {
        let Some(spec) = self.registry.spec(invocation.operation) else {
            return OperationResult::Failure(AnalystError::UnknownOperation {
                name: invocation.operation.to_string(),
            });
        };
        if spec.requires_dataset && !ctx.is_loaded() {
            return OperationResult::Failure(AnalystError::NoDatasetLoaded);
        }

        debug!(operation = %invocation.operation, "dispatching");
        match self.run(spec, invocation, ctx) {
            Ok(payload) => OperationResult::Success(payload),
            Err(err) => {
                warn!(operation = %invocation.operation, error = %err, "operation failed");
                OperationResult::Failure(err)
            }
        }
    }

    fn run(
        &self,
        spec: &OperationSpec,
        invocation: &Invocation,
        ctx: &mut DatasetContext,
    ) -> Result<Map<String, Value>, AnalystError> {
        use OperationName::*;

        let args = &invocation.arguments;
        let op = invocation.operation;
        let wrap = |e: PolarsError| AnalystError::operation_failed(&op.to_string(), &e);

        match op {
            LoadData => ctx.load(str_arg(args, spec, "path").as_deref()),
            SetSchema => {
                let value = arg(args, spec, "schema")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new()));
                let schema: BTreeMap<String, Vec<String>> = serde_json::from_value(value)
                    .map_err(|e| AnalystError::OperationFailed {
                        operation: op.to_string(),
                        class: "SchemaMismatch".to_string(),
                        message: e.to_string(),
                    })?;
                Ok(ctx.set_schema(schema))
            }
            GetSchema => Ok(ctx.schema_payload()),
            Summary => {
                let numeric_only = bool_arg(args, spec, "numeric_only").unwrap_or(true);
                stats::summary(ctx.table()?, numeric_only).map_err(wrap)
            }
            Head => {
                let n = usize_arg(args, spec, "n").unwrap_or(5);
                stats::head(ctx.table()?, n).map_err(wrap)
            }
            TopCategories => {
                let columns = str_list(args, spec, "columns");
                let top_n = usize_arg(args, spec, "top_n").unwrap_or(10);
                Ok(self.top_categories(ctx.table()?, &columns, top_n))
            }
            Correlations => {
                let columns = opt_str_list(args, spec, "columns");
                let method =
                    str_arg(args, spec, "method").unwrap_or_else(|| "pearson".to_string());
                stats::correlations(ctx.table()?, columns.as_deref(), &method).map_err(wrap)
            }
            ScatterPairs => {
                let pairs = pair_list(args, spec, "pairs");
                Ok(self.scatter_pairs(ctx.table()?, &pairs))
            }
            Outliers => {
                let columns = str_list(args, spec, "columns");
                let z = f64_arg(args, spec, "z").unwrap_or(3.0);
                stats::outliers(ctx.table()?, &columns, z).map_err(wrap)
            }
            Missing => {
                let threshold = f64_arg(args, spec, "threshold").unwrap_or(0.20);
                Ok(stats::missing(ctx.table()?, threshold))
            }
            PlotHist => {
                let column = str_arg(args, spec, "column").unwrap_or_default();
                let nbins = usize_arg(args, spec, "nbins").unwrap_or(30);
                let hist = stats::histogram(ctx.table()?, &column, nbins).map_err(wrap)?;
                self.render_quietly(&ChartSpec::Histogram {
                    title: format!("Distribution: {column}"),
                    edges: hist.edges,
                    counts: hist.counts,
                });
                let mut payload = Map::new();
                payload.insert("column".into(), json!(column));
                payload.insert("nbins".into(), json!(nbins));
                Ok(payload)
            }
            PlotXy => {
                let x = str_arg(args, spec, "x").unwrap_or_default();
                let y = str_arg(args, spec, "y").unwrap_or_default();
                let points = stats::xy_points(ctx.table()?, &x, &y).map_err(wrap)?;
                self.render_quietly(&ChartSpec::Scatter {
                    title: format!("{x} vs {y}"),
                    points,
                });
                let mut payload = Map::new();
                payload.insert("x".into(), json!(x));
                payload.insert("y".into(), json!(y));
                Ok(payload)
            }
            TimeTrend => {
                let column = str_arg(args, spec, "column").unwrap_or_default();
                let freq = str_arg(args, spec, "freq").unwrap_or_else(|| "M".to_string());
                let trend = trend::time_trend(ctx.table()?, &column, &freq).map_err(wrap)?;
                self.render_quietly(&ChartSpec::Line {
                    title: format!("Count by {freq}: {column}"),
                    points: trend
                        .buckets
                        .iter()
                        .map(|(key, count)| (key.clone(), *count as f64))
                        .collect(),
                });
                let mut buckets = Map::new();
                for (key, count) in trend.buckets {
                    buckets.insert(key, json!(count));
                }
                let mut payload = Map::new();
                payload.insert("type".into(), json!(trend.kind));
                payload.insert("trend".into(), Value::Object(buckets));
                Ok(payload)
            }
        }
    }

    /// Per-column counts plus a bar chart each; a failure in either step is
    /// reported inline for that column only.
    fn top_categories(
        &self,
        df: &polars::prelude::DataFrame,
        columns: &[String],
        top_n: usize,
    ) -> Map<String, Value> {
        let mut out = Map::new();
        for column in columns {
            match stats::category_counts(df, column, top_n) {
                Ok(counts) => {
                    let chart = ChartSpec::Bar {
                        title: format!("Top {top_n}: {column}"),
                        labels: counts.iter().map(|(v, _)| v.clone()).collect(),
                        values: counts.iter().map(|(_, c)| *c as f64).collect(),
                    };
                    match self.renderer.render(&chart) {
                        Ok(()) => {
                            let mut col_counts = Map::new();
                            for (value, count) in counts {
                                col_counts.insert(value, json!(count));
                            }
                            out.insert(column.clone(), Value::Object(col_counts));
                        }
                        Err(e) => {
                            out.insert(column.clone(), json!(format!("error:{e}")));
                        }
                    }
                }
                Err(e) => {
                    out.insert(column.clone(), json!(format!("error:{e}")));
                }
            }
        }
        let mut payload = Map::new();
        payload.insert("top_categories".into(), Value::Object(out));
        payload
    }

    fn scatter_pairs(
        &self,
        df: &polars::prelude::DataFrame,
        pairs: &[(String, String)],
    ) -> Map<String, Value> {
        let mut rendered = Vec::new();
        for (x, y) in pairs {
            let tag = format!("{x}_vs_{y}");
            let outcome = stats::xy_points(df, x, y).map_err(anyhow::Error::from).and_then(
                |points| {
                    self.renderer
                        .render(&ChartSpec::Scatter { title: format!("{x} vs {y}"), points })
                },
            );
            match outcome {
                Ok(()) => rendered.push(json!(tag)),
                Err(e) => rendered.push(json!(format!("{tag}_error:{e}"))),
            }
        }
        let mut payload = Map::new();
        payload.insert("pairs_rendered".into(), Value::Array(rendered));
        payload
    }

    fn render_quietly(&self, chart: &ChartSpec) {
        if let Err(e) = self.renderer.render(chart) {
            warn!(error = %e, "chart rendering failed");
        }
    }
}

/// Provided argument, falling back to the registry default.
fn arg<'a>(args: &'a Map<String, Value>, spec: &'a OperationSpec, key: &str) -> Option<&'a Value> {
    args.get(key).or_else(|| spec.default_for(key))
}

fn str_arg(args: &Map<String, Value>, spec: &OperationSpec, key: &str) -> Option<String> {
    arg(args, spec, key).and_then(Value::as_str).map(str::to_string)
}

fn bool_arg(args: &Map<String, Value>, spec: &OperationSpec, key: &str) -> Option<bool> {
    arg(args, spec, key).and_then(Value::as_bool)
}

fn usize_arg(args: &Map<String, Value>, spec: &OperationSpec, key: &str) -> Option<usize> {
    arg(args, spec, key)
        .and_then(Value::as_i64)
        .map(|n| n.max(0) as usize)
}

fn f64_arg(args: &Map<String, Value>, spec: &OperationSpec, key: &str) -> Option<f64> {
    arg(args, spec, key).and_then(Value::as_f64)
}

fn str_list(args: &Map<String, Value>, spec: &OperationSpec, key: &str) -> Vec<String> {
    opt_str_list(args, spec, key).unwrap_or_default()
}

fn opt_str_list(
    args: &Map<String, Value>,
    spec: &OperationSpec,
    key: &str,
) -> Option<Vec<String>> {
    arg(args, spec, key).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

fn pair_list(
    args: &Map<String, Value>,
    spec: &OperationSpec,
    key: &str,
) -> Vec<(String, String)> {
    arg(args, spec, key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|pair| {
                    let xy = pair.as_array()?;
                    Some((xy.first()?.as_str()?.to_string(), xy.get(1)?.as_str()?.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan;
    use crate::render::NullRenderer;
    use chrono::NaiveDate;
    use polars::prelude::*;
    use pretty_assertions::assert_eq;

    struct FailingRenderer;

    impl Renderer for FailingRenderer {
        fn render(&self, _chart: &ChartSpec) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("no display attached"))
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Box::new(NullRenderer))
    }

    fn loaded_ctx() -> DatasetContext {
        let df = df!(
            "amount" => [10.0, 20.0, 30.0],
            "city" => ["Oslo", "Lima", "Oslo"],
        )
        .unwrap();
        DatasetContext::with_table(df, "sample.csv")
    }

    fn run(dispatcher: &Dispatcher, ctx: &mut DatasetContext, candidate: &str) -> OperationResult {
        let invocation = plan::validate(candidate, dispatcher.registry()).unwrap();
        dispatcher.execute(&invocation, ctx)
    }

    #[test]
    fn every_dataset_operation_short_circuits_uniformly() {
        let d = dispatcher();
        let mut ctx = DatasetContext::new();
        for spec in d.registry().list() {
            if !spec.requires_dataset {
                continue;
            }
            // Arguments are irrelevant: the precondition fires first.
            let invocation = Invocation {
                operation: spec.name,
                arguments: Map::new(),
                rationale: None,
                follow_up: None,
            };
            let result = d.execute(&invocation, &mut ctx);
            assert_eq!(
                result.error_tag().as_deref(),
                Some("no_dataset_loaded"),
                "operation {} broke the shared precondition",
                spec.name
            );
        }
    }

    #[test]
    fn summary_on_small_table() {
        let d = dispatcher();
        let mut ctx = loaded_ctx();
        let result = run(&d, &mut ctx, r#"{"tool":"summary","args":{}}"#);
        let value = result.to_value();
        assert_eq!(value["ok"], json!(true));
        assert_eq!(value["rows"], json!(3));
        assert_eq!(value["cols"], json!(2));
        assert!(value["describe"]["amount"].is_object());
    }

    #[test]
    fn outliers_zero_variance_is_ok_and_empty() {
        let d = dispatcher();
        let df = df!("flat" => [4.0, 4.0, 4.0, 4.0]).unwrap();
        let mut ctx = DatasetContext::with_table(df, "flat.csv");
        let result = run(&d, &mut ctx, r#"{"tool":"outliers","args":{"columns":["flat"]}}"#);
        let value = result.to_value();
        assert_eq!(value["ok"], json!(true));
        assert_eq!(value["count"], json!(0));
    }

    #[test]
    fn failures_carry_the_operation_tag() {
        let d = dispatcher();
        let mut ctx = loaded_ctx();
        let result = run(
            &d,
            &mut ctx,
            r#"{"tool":"correlations","args":{"method":"kendall"}}"#,
        );
        let tag = result.error_tag().unwrap();
        assert!(tag.starts_with("correlations_failed:ComputeError:"), "{tag}");

        let result = run(&d, &mut ctx, r#"{"tool":"plot_hist","args":{"column":"nope"}}"#);
        let tag = result.error_tag().unwrap();
        assert!(tag.starts_with("plot_hist_failed:ColumnNotFound:"), "{tag}");
    }

    #[test]
    fn set_schema_rejects_non_string_buckets() {
        let d = dispatcher();
        let mut ctx = DatasetContext::new();
        let result = run(&d, &mut ctx, r#"{"tool":"set_schema","args":{"schema":{"ids":[1,2]}}}"#);
        let tag = result.error_tag().unwrap();
        assert!(tag.starts_with("set_schema_failed:SchemaMismatch:"), "{tag}");
    }

    #[test]
    fn get_schema_is_idempotent_through_dispatch() {
        let d = dispatcher();
        let mut ctx = DatasetContext::new();
        let first = run(&d, &mut ctx, r#"{"tool":"get_schema"}"#).to_value();
        let second = run(&d, &mut ctx, r#"{"tool":"get_schema"}"#).to_value();
        assert_eq!(first, second);
        assert_eq!(first["ok"], json!(true));
        assert_eq!(first["schema"], Value::Null);

        run(&d, &mut ctx, r#"{"tool":"set_schema","args":{"schema":{"ids":["city"]}}}"#);
        let third = run(&d, &mut ctx, r#"{"tool":"get_schema"}"#).to_value();
        assert_eq!(third["schema"]["ids"], json!(["city"]));
    }

    #[test]
    fn render_failure_never_flips_ok() {
        let d = Dispatcher::new(Box::new(FailingRenderer));
        let mut ctx = loaded_ctx();
        let result = run(&d, &mut ctx, r#"{"tool":"plot_hist","args":{"column":"amount"}}"#);
        assert!(result.ok());

        // Itemized operation: the failure lands inline, the call stays ok.
        let result = run(&d, &mut ctx, r#"{"tool":"top_categories","args":{"columns":["city"]}}"#);
        let value = result.to_value();
        assert_eq!(value["ok"], json!(true));
        let inline = value["top_categories"]["city"].as_str().unwrap();
        assert!(inline.starts_with("error:"), "{inline}");
    }

    #[test]
    fn top_categories_counts_descending() {
        let d = dispatcher();
        let mut ctx = loaded_ctx();
        let result = run(
            &d,
            &mut ctx,
            r#"{"tool":"top_categories","args":{"columns":["city"],"top_n":10}}"#,
        );
        let value = result.to_value();
        let city = value["top_categories"]["city"].as_object().unwrap();
        let entries: Vec<(&String, u64)> =
            city.iter().map(|(k, v)| (k, v.as_u64().unwrap())).collect();
        assert_eq!(entries[0], (&"Oslo".to_string(), 2));
        assert_eq!(entries[1], (&"Lima".to_string(), 1));
    }

    #[test]
    fn scatter_pairs_reports_each_pair_inline() {
        let d = dispatcher();
        let df = df!(
            "a" => [1.0, 2.0],
            "b" => [3.0, 4.0],
        )
        .unwrap();
        let mut ctx = DatasetContext::with_table(df, "ab.csv");
        let result = run(
            &d,
            &mut ctx,
            r#"{"tool":"scatter_pairs","args":{"pairs":[["a","b"],["a","ghost"]]}}"#,
        );
        let value = result.to_value();
        assert_eq!(value["ok"], json!(true));
        let rendered = value["pairs_rendered"].as_array().unwrap();
        assert_eq!(rendered[0], json!("a_vs_b"));
        assert!(rendered[1].as_str().unwrap().starts_with("a_vs_ghost_error:"));
    }

    #[test]
    fn time_trend_shapes_match_across_branches() {
        let d = dispatcher();

        let dates = DateChunked::from_naive_date(
            "seen".into(),
            vec![
                NaiveDate::from_ymd_opt(2021, 1, 3).unwrap(),
                NaiveDate::from_ymd_opt(2021, 2, 9).unwrap(),
            ],
        )
        .into_series();
        let mut ctx =
            DatasetContext::with_table(DataFrame::new(vec![dates.into()]).unwrap(), "d.csv");
        let datetime = run(&d, &mut ctx, r#"{"tool":"time_trend","args":{"column":"seen"}}"#)
            .to_value();

        let mut ctx = DatasetContext::with_table(
            df!("seen" => [2021i64, 2021, 2022]).unwrap(),
            "y.csv",
        );
        let yearly =
            run(&d, &mut ctx, r#"{"tool":"time_trend","args":{"column":"seen"}}"#).to_value();

        for value in [&datetime, &yearly] {
            assert_eq!(value["ok"], json!(true));
            assert!(value["type"].is_string());
            assert!(value["trend"].is_object());
        }
        assert_eq!(datetime["type"], json!("datetime"));
        assert_eq!(yearly["type"], json!("year-int"));

        let keys: Vec<&String> = yearly["trend"].as_object().unwrap().keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn head_reflects_current_table() {
        let d = dispatcher();
        let mut ctx = loaded_ctx();
        let value = run(&d, &mut ctx, r#"{"tool":"head","args":{"n":2}}"#).to_value();
        assert_eq!(value["rows"].as_array().unwrap().len(), 2);
        assert_eq!(value["rows"][0]["city"], json!("Oslo"));
    }
}
