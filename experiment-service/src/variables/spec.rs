// Variable Specification
// Closed representation of a variables tree, normalised once from YAML

use crate::variables::error::ExpandError;
use crate::variables::range::{Dtype, RangeArgs};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fmt;

/// A terminal value bound to a variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Scalar::Int(_) | Scalar::Float(_))
    }

    /// Convert a YAML scalar, returning `None` for null and collections
    pub fn from_yaml(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Scalar::Int(i))
                } else {
                    n.as_f64().map(Scalar::Float)
                }
            }
            Value::String(s) => Some(Scalar::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(true) => write!(f, "True"),
            Scalar::Bool(false) => write!(f, "False"),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", format_float(*x)),
            Scalar::String(s) => write!(f, "{}", s),
        }
    }
}

/// Shortest round-trip form, keeping a trailing `.0` on integral values and
/// switching to exponent notation outside `[1e-4, 1e16)`.
fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let magnitude = x.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{:e}", x);
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) => {
                let (sign, digits) = match exponent.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exponent),
                };
                format!("{}e{}{:0>2}", mantissa, sign, digits)
            }
            None => formatted,
        };
    }

    if x.fract() == 0.0 {
        format!("{:.1}", x)
    } else {
        x.to_string()
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<i32> for Scalar {
    fn from(i: i32) -> Self {
        Scalar::Int(i as i64)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Scalar::Float(f)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

/// Combination operators that may appear as reserved mapping keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Zip,
    Product,
    Arange,
    Chain,
    Cycle,
}

/// Reserved keys in resolution order
const RESERVED_KEYS: [(&str, OperatorKind); 7] = [
    ("zip", OperatorKind::Zip),
    ("product", OperatorKind::Product),
    ("arange", OperatorKind::Arange),
    ("chain", OperatorKind::Chain),
    ("append", OperatorKind::Chain),
    ("cycle", OperatorKind::Cycle),
    ("repeat", OperatorKind::Cycle),
];

impl OperatorKind {
    /// Look up a reserved key, returning its kind and resolution priority
    pub fn from_key(key: &str) -> Option<(usize, Self)> {
        RESERVED_KEYS
            .iter()
            .position(|(name, _)| *name == key)
            .map(|priority| (priority, RESERVED_KEYS[priority].1))
    }

    pub fn name(&self) -> &'static str {
        match self {
            OperatorKind::Zip => "zip",
            OperatorKind::Product => "product",
            OperatorKind::Arange => "arange",
            OperatorKind::Chain => "chain",
            OperatorKind::Cycle => "cycle",
        }
    }
}

/// Arguments of a `zip` operator
#[derive(Debug, Clone, PartialEq)]
pub enum ZipArgs {
    /// A single mapping zipped into one slot
    Single(SpecMapping),
    /// A list of mappings, each zipped into its own slot
    Each(Vec<SpecMapping>),
}

/// A reserved-key operator with validated arguments
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Zip(ZipArgs),
    Product(SpecMapping),
    Arange(RangeArgs),
    Chain(Vec<VariableSpec>),
    Cycle { times: usize, body: SpecMapping },
}

impl Operator {
    pub fn kind(&self) -> OperatorKind {
        match self {
            Operator::Zip(_) => OperatorKind::Zip,
            Operator::Product(_) => OperatorKind::Product,
            Operator::Arange(_) => OperatorKind::Arange,
            Operator::Chain(_) => OperatorKind::Chain,
            Operator::Cycle { .. } => OperatorKind::Cycle,
        }
    }

    fn from_yaml(kind: OperatorKind, value: &Value) -> Result<Self, ExpandError> {
        let operator = kind.name();
        match kind {
            OperatorKind::Zip => match value {
                Value::Mapping(map) => Ok(Operator::Zip(ZipArgs::Single(SpecMapping::from_yaml(
                    map,
                )?))),
                Value::Sequence(items) => {
                    let mut mappings = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::Mapping(map) => mappings.push(SpecMapping::from_yaml(map)?),
                            other => {
                                return Err(ExpandError::invalid(
                                    operator,
                                    format!(
                                        "a list passed to zip may only hold mappings, got {}",
                                        describe(other)
                                    ),
                                ))
                            }
                        }
                    }
                    Ok(Operator::Zip(ZipArgs::Each(mappings)))
                }
                other => Err(ExpandError::invalid(
                    operator,
                    format!("expected a mapping or a list of mappings, got {}", describe(other)),
                )),
            },

            OperatorKind::Product => match value {
                Value::Mapping(map) => Ok(Operator::Product(SpecMapping::from_yaml(map)?)),
                other => Err(ExpandError::invalid(
                    operator,
                    format!("product only takes a mapping of values, got {}", describe(other)),
                )),
            },

            OperatorKind::Chain => match value {
                Value::Sequence(items) => Ok(Operator::Chain(
                    items
                        .iter()
                        .map(VariableSpec::from_yaml)
                        .collect::<Result<_, _>>()?,
                )),
                other => Err(ExpandError::invalid(
                    operator,
                    format!("append only takes a list of values, got {}", describe(other)),
                )),
            },

            OperatorKind::Arange => RangeArgs::from_yaml(value).map(Operator::Arange),

            OperatorKind::Cycle => match value {
                Value::Mapping(map) => {
                    let times = map
                        .get("times")
                        .ok_or(ExpandError::MissingArgument {
                            operator,
                            argument: "times",
                        })
                        .and_then(parse_times)?;

                    let body: Mapping = map
                        .iter()
                        .filter(|(key, _)| key.as_str() != Some("times"))
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect();

                    Ok(Operator::Cycle {
                        times,
                        body: SpecMapping::from_yaml(&body)?,
                    })
                }
                other => Err(ExpandError::invalid(
                    operator,
                    format!("repeat only takes a mapping, got {}", describe(other)),
                )),
            },
        }
    }
}

fn parse_times(value: &Value) -> Result<usize, ExpandError> {
    let invalid = || {
        ExpandError::invalid(
            "cycle",
            format!("times must be a positive integer, got {}", describe(value)),
        )
    };

    let times = match value {
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i,
            (None, Some(f)) if f.fract() == 0.0 => f as i64,
            _ => return Err(invalid()),
        },
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };

    usize::try_from(times)
        .ok()
        .filter(|t| *t > 0)
        .ok_or_else(invalid)
}

/// A mapping node: operators first, then ordinary variables
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecMapping {
    /// Operators in resolution order
    pub operators: Vec<Operator>,
    /// Ordinary variables in source order
    pub variables: Vec<(String, VariableSpec)>,
}

impl SpecMapping {
    pub fn from_yaml(map: &Mapping) -> Result<Self, ExpandError> {
        let mut operators = Vec::new();
        let mut variables = Vec::new();

        for (key, value) in map {
            let key = mapping_key(key)?;
            match OperatorKind::from_key(&key) {
                Some((priority, kind)) => {
                    operators.push((priority, Operator::from_yaml(kind, value)?));
                }
                None => variables.push((key, VariableSpec::from_yaml(value)?)),
            }
        }

        operators.sort_by_key(|(priority, _)| *priority);

        Ok(Self {
            operators: operators.into_iter().map(|(_, op)| op).collect(),
            variables,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty() && self.variables.is_empty()
    }
}

fn mapping_key(key: &Value) -> Result<String, ExpandError> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(_) | Value::Number(_) => Scalar::from_yaml(key)
            .map(|s| s.to_string())
            .ok_or_else(|| ExpandError::InvalidKey(describe(key))),
        other => Err(ExpandError::InvalidKey(describe(other))),
    }
}

/// A node of the variables tree
#[derive(Debug, Clone, PartialEq)]
pub enum VariableSpec {
    /// A terminal value
    Scalar(Scalar),
    /// Alternative values for the enclosing variable
    Sequence(Vec<VariableSpec>),
    /// Independent variables combined by the ambient combinator
    Mapping(SpecMapping),
}

impl VariableSpec {
    /// Normalise a YAML tree, validating every operator's arguments
    pub fn from_yaml(value: &Value) -> Result<Self, ExpandError> {
        match value {
            Value::Null => Err(ExpandError::UnsupportedValue(
                "null is not a valid variable value".to_string(),
            )),
            Value::Bool(_) | Value::Number(_) | Value::String(_) => Scalar::from_yaml(value)
                .map(VariableSpec::Scalar)
                .ok_or_else(|| ExpandError::UnsupportedValue(describe(value))),
            Value::Sequence(items) => Ok(VariableSpec::Sequence(
                items
                    .iter()
                    .map(VariableSpec::from_yaml)
                    .collect::<Result<_, _>>()?,
            )),
            Value::Mapping(map) => SpecMapping::from_yaml(map).map(VariableSpec::Mapping),
            // `!arange {stop: 10}` is shorthand for `{arange: {stop: 10}}`
            Value::Tagged(tagged) if tagged.tag == "arange" => {
                Ok(VariableSpec::Mapping(SpecMapping {
                    operators: vec![Operator::Arange(RangeArgs::from_yaml(&tagged.value)?)],
                    variables: Vec::new(),
                }))
            }
            Value::Tagged(tagged) => Err(ExpandError::UnsupportedValue(format!(
                "unknown tag {}",
                tagged.tag
            ))),
        }
    }

    /// Parse a YAML document into a specification
    pub fn from_yaml_str(content: &str) -> Result<Self, ExpandError> {
        let value: Value = serde_yaml::from_str(content)
            .map_err(|e| ExpandError::UnsupportedValue(e.to_string()))?;
        Self::from_yaml(&value)
    }
}

impl From<Scalar> for VariableSpec {
    fn from(scalar: Scalar) -> Self {
        VariableSpec::Scalar(scalar)
    }
}

/// Short description of a YAML node for error messages
pub(crate) fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) => format!("string '{}'", s),
        Value::Sequence(items) => format!("a list of {} items", items.len()),
        Value::Mapping(map) => format!("a mapping with {} keys", map.len()),
        Value::Tagged(tagged) => format!("tagged value {}", tagged.tag),
    }
}

/// Parse the `dtype` argument of `arange`
pub(crate) fn parse_dtype(value: &Value) -> Result<Dtype, ExpandError> {
    match value.as_str().map(str::trim) {
        Some("int") | Some("int64") | Some("int32") => Ok(Dtype::Int),
        Some("float") | Some("float64") | Some("float32") => Ok(Dtype::Float),
        _ => Err(ExpandError::invalid(
            "arange",
            format!("dtype must be 'int' or 'float', got {}", describe(value)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(yaml: &str) -> Result<VariableSpec, ExpandError> {
        VariableSpec::from_yaml_str(yaml)
    }

    #[test]
    fn test_scalar_display() {
        assert_eq!(Scalar::Int(3).to_string(), "3");
        assert_eq!(Scalar::Float(1.0).to_string(), "1.0");
        assert_eq!(Scalar::Float(0.25).to_string(), "0.25");
        assert_eq!(Scalar::Float(-2.0).to_string(), "-2.0");
        assert_eq!(Scalar::Float(1e20).to_string(), "1e+20");
        assert_eq!(Scalar::Float(1.5e-7).to_string(), "1.5e-07");
        assert_eq!(Scalar::Bool(true).to_string(), "True");
        assert_eq!(Scalar::from("text").to_string(), "text");
    }

    #[test]
    fn test_scalar_from_yaml() {
        let value: Value = serde_yaml::from_str("[1, 2.5, true, name]").unwrap();
        let scalars: Vec<_> = value
            .as_sequence()
            .unwrap()
            .iter()
            .map(|v| Scalar::from_yaml(v).unwrap())
            .collect();

        assert_eq!(
            scalars,
            vec![
                Scalar::Int(1),
                Scalar::Float(2.5),
                Scalar::Bool(true),
                Scalar::from("name")
            ]
        );
        assert_eq!(Scalar::from_yaml(&Value::Null), None);
    }

    #[test]
    fn test_operators_sorted_by_priority() {
        let parsed = spec(
            r#"
repeat: {times: 2, a: 1}
append: [{b: 1}]
zip: {c: [1, 2]}
plain: 3
"#,
        )
        .unwrap();

        let VariableSpec::Mapping(mapping) = parsed else {
            panic!("expected a mapping");
        };
        let kinds: Vec<_> = mapping.operators.iter().map(Operator::kind).collect();
        assert_eq!(
            kinds,
            vec![OperatorKind::Zip, OperatorKind::Chain, OperatorKind::Cycle]
        );
        assert_eq!(mapping.variables.len(), 1);
        assert_eq!(mapping.variables[0].0, "plain");
    }

    #[test]
    fn test_chain_sorted_before_append() {
        let parsed = spec("append: [{a: 1}]\nchain: [{a: 2}]").unwrap();
        let VariableSpec::Mapping(mapping) = parsed else {
            panic!("expected a mapping");
        };
        assert_eq!(
            mapping.operators[0],
            Operator::Chain(vec![spec("{a: 2}").unwrap()])
        );
    }

    #[test]
    fn test_product_rejects_list() {
        let err = spec("product: [1, 2]").unwrap_err();
        assert!(matches!(
            err,
            ExpandError::InvalidOperator {
                operator: "product",
                ..
            }
        ));
    }

    #[test]
    fn test_chain_rejects_mapping() {
        let err = spec("chain: {a: 1}").unwrap_err();
        assert!(matches!(
            err,
            ExpandError::InvalidOperator {
                operator: "chain",
                ..
            }
        ));
    }

    #[test]
    fn test_zip_rejects_list_of_scalars() {
        assert!(spec("zip: [1, 2]").is_err());
        assert!(spec("zip: [{a: 1}, {b: 2}]").is_ok());
    }

    #[test]
    fn test_cycle_requires_times() {
        assert_eq!(
            spec("cycle: {a: [1, 2]}").unwrap_err(),
            ExpandError::MissingArgument {
                operator: "cycle",
                argument: "times"
            }
        );
    }

    #[test]
    fn test_cycle_times_forms() {
        for yaml in [
            "repeat: {times: 3, a: 1}",
            "repeat: {times: '3', a: 1}",
            "repeat: {times: 3.0, a: 1}",
        ] {
            let VariableSpec::Mapping(mapping) = spec(yaml).unwrap() else {
                panic!("expected a mapping");
            };
            assert!(matches!(mapping.operators[0], Operator::Cycle { times: 3, .. }));
        }

        assert!(spec("repeat: {times: 0, a: 1}").is_err());
        assert!(spec("repeat: {times: -1, a: 1}").is_err());
        assert!(spec("repeat: {times: many, a: 1}").is_err());
    }

    #[test]
    fn test_cycle_body_excludes_times() {
        let VariableSpec::Mapping(mapping) = spec("cycle: {times: 2, a: 1}").unwrap() else {
            panic!("expected a mapping");
        };
        let Operator::Cycle { body, .. } = &mapping.operators[0] else {
            panic!("expected cycle");
        };
        assert_eq!(body.variables.len(), 1);
        assert_eq!(body.variables[0].0, "a");
    }

    #[test]
    fn test_null_value_rejected() {
        assert!(matches!(
            spec("a: ~").unwrap_err(),
            ExpandError::UnsupportedValue(_)
        ));
    }

    #[test]
    fn test_numeric_keys_become_names() {
        let VariableSpec::Mapping(mapping) = spec("1: a").unwrap() else {
            panic!("expected a mapping");
        };
        assert_eq!(mapping.variables[0].0, "1");
    }

    #[test]
    fn test_complex_key_rejected() {
        assert!(matches!(
            spec("? [a, b]\n: 1").unwrap_err(),
            ExpandError::InvalidKey(_)
        ));
    }

    #[test]
    fn test_arange_tag() {
        let VariableSpec::Mapping(mapping) = spec("!arange {stop: 3}").unwrap() else {
            panic!("expected a mapping");
        };
        assert_eq!(mapping.operators[0].kind(), OperatorKind::Arange);
        assert!(spec("!linspace {stop: 3}").is_err());
    }
}
