use serde_json::{Value, json};
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString};

/// Stable names of the operation menu. The string form is the wire name the
/// planner must use; it never changes across the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum OperationName {
    LoadData,
    SetSchema,
    GetSchema,
    Summary,
    Head,
    TopCategories,
    Correlations,
    ScatterPairs,
    Outliers,
    Missing,
    PlotHist,
    PlotXy,
    TimeTrend,
}

/// Shape of one argument. Kinds are checked at the plan-validation boundary;
/// `Float` accepts integral JSON numbers, `PairList` is a sequence of
/// two-string sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Str,
    Int,
    Float,
    Bool,
    StrList,
    PairList,
    Map,
}

impl ParamKind {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Str => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::StrList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            Self::PairList => value.as_array().is_some_and(|items| {
                items.iter().all(|pair| {
                    pair.as_array()
                        .is_some_and(|xy| xy.len() == 2 && xy.iter().all(Value::is_string))
                })
            }),
            Self::Map => value.is_object(),
        }
    }

    pub fn expects(&self) -> &'static str {
        match self {
            Self::Str => "a string",
            Self::Int => "an integer",
            Self::Float => "a number",
            Self::Bool => "a boolean",
            Self::StrList => "a list of strings",
            Self::PairList => "a list of [x, y] string pairs",
            Self::Map => "an object",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
}

impl ParamSpec {
    fn required(name: &'static str, kind: ParamKind) -> Self {
        Self { name, kind, required: true, default: None }
    }

    fn optional(name: &'static str, kind: ParamKind, default: Value) -> Self {
        Self { name, kind, required: false, default: Some(default) }
    }

    /// Optional with no fallback: absent means "not supplied".
    fn nullable(name: &'static str, kind: ParamKind) -> Self {
        Self { name, kind, required: false, default: None }
    }
}

#[derive(Debug, Clone)]
pub struct OperationSpec {
    pub name: OperationName,
    pub params: Vec<ParamSpec>,
    pub requires_dataset: bool,
}

impl OperationSpec {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn default_for(&self, name: &str) -> Option<&Value> {
        self.param(name).and_then(|p| p.default.as_ref())
    }
}

/// The fixed operation menu. Built once at startup, immutable afterwards.
#[derive(Debug)]
pub struct Registry {
    specs: Vec<OperationSpec>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        use OperationName::*;
        use ParamKind::*;

        let spec = |name: OperationName, params: Vec<ParamSpec>, requires_dataset: bool| {
            OperationSpec { name, params, requires_dataset }
        };

        let specs = vec![
            spec(LoadData, vec![ParamSpec::nullable("path", Str)], false),
            spec(SetSchema, vec![ParamSpec::required("schema", Map)], false),
            spec(GetSchema, vec![], false),
            spec(
                Summary,
                vec![ParamSpec::optional("numeric_only", Bool, json!(true))],
                true,
            ),
            spec(Head, vec![ParamSpec::optional("n", Int, json!(5))], true),
            spec(
                TopCategories,
                vec![
                    ParamSpec::required("columns", StrList),
                    ParamSpec::optional("top_n", Int, json!(10)),
                ],
                true,
            ),
            spec(
                Correlations,
                vec![
                    ParamSpec::nullable("columns", StrList),
                    ParamSpec::optional("method", Str, json!("pearson")),
                ],
                true,
            ),
            spec(ScatterPairs, vec![ParamSpec::required("pairs", PairList)], true),
            spec(
                Outliers,
                vec![
                    ParamSpec::required("columns", StrList),
                    ParamSpec::optional("z", Float, json!(3.0)),
                ],
                true,
            ),
            spec(
                Missing,
                vec![ParamSpec::optional("threshold", Float, json!(0.20))],
                true,
            ),
            spec(
                PlotHist,
                vec![
                    ParamSpec::required("column", Str),
                    ParamSpec::optional("nbins", Int, json!(30)),
                ],
                true,
            ),
            spec(
                PlotXy,
                vec![ParamSpec::required("x", Str), ParamSpec::required("y", Str)],
                true,
            ),
            spec(
                TimeTrend,
                vec![
                    ParamSpec::required("column", Str),
                    ParamSpec::optional("freq", Str, json!("M")),
                ],
                true,
            ),
        ];
        Self { specs }
    }

    /// Menu in stable order.
    pub fn list(&self) -> &[OperationSpec] {
        &self.specs
    }

    pub fn resolve(&self, name: &str) -> Option<&OperationSpec> {
        let op = OperationName::from_str(name).ok()?;
        self.spec(op)
    }

    pub fn spec(&self, op: OperationName) -> Option<&OperationSpec> {
        self.specs.iter().find(|s| s.name == op)
    }

    /// Operation names in menu order, for the planner prompt.
    pub fn names(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.name.to_string()).collect()
    }
}
