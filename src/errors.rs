use polars::prelude::PolarsError;
use thiserror::Error;

/// Failure taxonomy for a single turn. The `Display` form of each variant is
/// the machine-parsable tag carried in the `error` key of a failed result.
#[derive(Debug, Clone, Error)]
pub enum AnalystError {
    /// An operation that reads the table was invoked before a successful load.
    #[error("no_dataset_loaded")]
    NoDatasetLoaded,

    /// No path was given and the conventional default file does not exist.
    #[error("no_path_provided_and_{default}_not_found")]
    NoPathProvided { default: String },

    /// The file at the given path could not be parsed as tabular data.
    #[error("load_failed:{class}:{message}")]
    LoadFailed { class: String, message: String },

    /// The planner's candidate was not a usable JSON invocation. The raw
    /// completion text is kept for diagnostics and never partially trusted.
    #[error("invalid_plan_syntax:{detail}")]
    InvalidPlanSyntax { detail: String, raw: String },

    /// Syntactically valid candidate naming an operation outside the menu.
    #[error("unknown_operation:{name}")]
    UnknownOperation { name: String },

    /// A capability raised during execution; wrapped, never propagated.
    #[error("{operation}_failed:{class}:{message}")]
    OperationFailed {
        operation: String,
        class: String,
        message: String,
    },
}

impl AnalystError {
    /// Wrap a capability error under the given operation name.
    pub fn operation_failed(operation: &str, err: &PolarsError) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            class: polars_error_class(err).to_string(),
            message: flatten_message(&err.to_string()),
        }
    }

    pub fn load_failed(err: &PolarsError) -> Self {
        Self::LoadFailed {
            class: polars_error_class(err).to_string(),
            message: flatten_message(&err.to_string()),
        }
    }
}

/// Stable class name for a polars error, mirroring the variant names.
pub fn polars_error_class(err: &PolarsError) -> &'static str {
    match err {
        PolarsError::ColumnNotFound(_) => "ColumnNotFound",
        PolarsError::ComputeError(_) => "ComputeError",
        PolarsError::Duplicate(_) => "Duplicate",
        PolarsError::InvalidOperation(_) => "InvalidOperation",
        PolarsError::NoData(_) => "NoData",
        PolarsError::OutOfBounds(_) => "OutOfBounds",
        PolarsError::SchemaFieldNotFound(_) => "SchemaFieldNotFound",
        PolarsError::SchemaMismatch(_) => "SchemaMismatch",
        PolarsError::ShapeMismatch(_) => "ShapeMismatch",
        _ => "PolarsError",
    }
}

/// Error tags are single-line; polars messages can span several.
fn flatten_message(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
