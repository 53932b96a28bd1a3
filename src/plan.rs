//! Plan validation: one raw planner completion in, one typed [`Invocation`]
//! out. The validator never retries or repairs a bad candidate; a rejected
//! turn is reported and the user gets a fresh one.

use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::AnalystError;
use crate::registry::{OperationName, Registry};

/// One concrete (operation, arguments) pair proposed for the current turn.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub operation: OperationName,
    pub arguments: Map<String, Value>,
    pub rationale: Option<String>,
    pub follow_up: Option<String>,
}

/// Parse and check a raw planner completion. The raw text rides along inside
/// the error for diagnostics; it is never partially trusted.
pub fn validate(raw: &str, registry: &Registry) -> Result<Invocation, AnalystError> {
    let candidate: Value = serde_json::from_str(raw.trim())
        .map_err(|e| invalid(format!("not valid JSON ({e})"), raw))?;
    validate_value(&candidate, raw, registry)
}

/// Check an already-parsed candidate, used by `validate` and by the direct
/// `<operation> <json-args>` REPL path.
pub fn validate_value(
    candidate: &Value,
    raw: &str,
    registry: &Registry,
) -> Result<Invocation, AnalystError> {
    let obj = candidate
        .as_object()
        .ok_or_else(|| invalid("top-level value is not an object".to_string(), raw))?;

    let tool = match obj.get("tool") {
        Some(Value::String(name)) => name.as_str(),
        Some(_) => return Err(invalid("\"tool\" is not a string".to_string(), raw)),
        None => return Err(invalid("missing \"tool\" key".to_string(), raw)),
    };
    let spec = registry
        .resolve(tool)
        .ok_or_else(|| AnalystError::UnknownOperation { name: tool.to_string() })?;

    let provided = match obj.get("args") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(args)) => args.clone(),
        Some(_) => return Err(invalid("\"args\" is not an object".to_string(), raw)),
    };

    let mut arguments = Map::new();
    for param in &spec.params {
        // An explicit null means "not supplied".
        match provided.get(param.name).filter(|v| !v.is_null()) {
            Some(value) => {
                if !param.kind.matches(value) {
                    return Err(invalid(
                        format!(
                            "argument '{}' of {} expects {}",
                            param.name,
                            spec.name,
                            param.kind.expects()
                        ),
                        raw,
                    ));
                }
                arguments.insert(param.name.to_string(), value.clone());
            }
            None => {
                if let Some(default) = &param.default {
                    arguments.insert(param.name.to_string(), default.clone());
                } else if param.required {
                    return Err(invalid(
                        format!("missing required argument '{}' for {}", param.name, spec.name),
                        raw,
                    ));
                }
            }
        }
    }

    for key in provided.keys() {
        if spec.param(key).is_none() {
            debug!(operation = %spec.name, argument = key, "ignoring undeclared argument");
        }
    }

    Ok(Invocation {
        operation: spec.name,
        arguments,
        rationale: string_field(obj, "reason"),
        follow_up: string_field(obj, "next"),
    })
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn invalid(detail: String, raw: &str) -> AnalystError {
    AnalystError::InvalidPlanSyntax { detail, raw: raw.to_string() }
}
