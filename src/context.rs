use polars::prelude::*;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::AnalystError;

/// Conventional fallback when `load_data` is called without a path.
pub const DEFAULT_DATASET: &str = "dataset.csv";

/// The single mutable dataset slot for one session: the loaded table, its
/// name, and an advisory schema supplied by the planner. Owned by the session
/// and passed explicitly into every dispatch; there is no process-global
/// state.
#[derive(Debug, Default, Clone)]
pub struct DatasetContext {
    table: Option<DataFrame>,
    name: Option<String>,
    schema: Option<BTreeMap<String, Vec<String>>>,
}

impl DatasetContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the slot from an existing DataFrame, for embeddings that already
    /// hold one (and for tests that should not touch the filesystem).
    pub fn with_table(df: DataFrame, name: impl Into<String>) -> Self {
        Self { table: Some(df), name: Some(name.into()), schema: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.table.is_some()
    }

    /// The shared precondition of every table-reading operation.
    pub fn table(&self) -> Result<&DataFrame, AnalystError> {
        self.table.as_ref().ok_or(AnalystError::NoDatasetLoaded)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Load a CSV file into the slot. A missing path falls back to
    /// [`DEFAULT_DATASET`] in the working directory. On any failure the
    /// previous table and name are left untouched; on success both are
    /// replaced together.
    pub fn load(&mut self, path: Option<&str>) -> Result<Map<String, Value>, AnalystError> {
        let path = match path {
            Some(p) => Path::new(p).to_path_buf(),
            None => {
                let fallback = Path::new(DEFAULT_DATASET).to_path_buf();
                if !fallback.exists() {
                    return Err(AnalystError::NoPathProvided {
                        default: DEFAULT_DATASET.to_string(),
                    });
                }
                fallback
            }
        };

        if !path.exists() {
            return Err(AnalystError::LoadFailed {
                class: "FileNotFound".to_string(),
                message: format!("{} does not exist", path.display()),
            });
        }

        let df = read_csv(&path).map_err(|e| AnalystError::load_failed(&e))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed")
            .to_string();

        let mut payload = Map::new();
        payload.insert("dataset".into(), json!(name));
        payload.insert("rows".into(), json!(df.height()));
        payload.insert("cols".into(), json!(df.width()));
        payload.insert(
            "columns".into(),
            Value::Array(
                df.get_column_names()
                    .iter()
                    .map(|c| json!(c.as_str()))
                    .collect(),
            ),
        );

        self.table = Some(df);
        self.name = Some(name);
        Ok(payload)
    }

    pub fn set_schema(&mut self, schema: BTreeMap<String, Vec<String>>) -> Map<String, Value> {
        let keys: Vec<Value> = schema.keys().map(|k| json!(k)).collect();
        self.schema = Some(schema);
        let mut payload = Map::new();
        payload.insert("keys".into(), Value::Array(keys));
        payload
    }

    pub fn schema(&self) -> Option<&BTreeMap<String, Vec<String>>> {
        self.schema.as_ref()
    }

    pub fn schema_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        let schema = match &self.schema {
            Some(s) => json!(s),
            None => Value::Null,
        };
        payload.insert("schema".into(), schema);
        payload
    }
}

fn read_csv(path: &Path) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .map_parse_options(|opts| opts.with_try_parse_dates(true))
        .try_into_reader_with_file_path(Some(path.into()))?
        .finish()
}
