// Variable Matrix Expansion
// Expands a variables tree into the ordered list of bindings it describes

use crate::variables::error::ExpandError;
use crate::variables::range::check_generated;
use crate::variables::spec::{Operator, Scalar, SpecMapping, VariableSpec, ZipArgs};

use std::collections::BTreeMap;
use tracing::debug;

/// One concrete assignment of values to variable names
pub type Binding = BTreeMap<String, Scalar>;

/// The full ordered list of bindings produced by an expansion
pub type VariableMatrix = Vec<Binding>;

/// Rule for merging the sibling slots of a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combinator {
    /// Cartesian product, first slot varying slowest
    #[default]
    Product,
    /// Positional alignment, stopping at the shortest slot
    Zip,
}

impl Combinator {
    /// Merge slots into bindings according to this combinator
    pub fn combine(self, slots: Vec<Vec<Binding>>) -> Vec<Binding> {
        match self {
            Combinator::Product => {
                slots.iter().fold(vec![Binding::new()], |acc, slot| {
                    acc.iter()
                        .flat_map(|prefix| slot.iter().map(move |item| merge(prefix, item)))
                        .collect()
                })
            }
            Combinator::Zip => {
                if slots.is_empty() {
                    return Vec::new();
                }
                let shortest = slots.iter().map(Vec::len).min().unwrap_or(0);
                (0..shortest)
                    .map(|i| {
                        slots
                            .iter()
                            .fold(Binding::new(), |acc, slot| merge(&acc, &slot[i]))
                    })
                    .collect()
            }
        }
    }
}

/// Merge two fragments; keys already in `first` win
fn merge(first: &Binding, second: &Binding) -> Binding {
    let mut merged = first.clone();
    for (key, value) in second {
        merged
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    merged
}

/// Matrix expander for variable specifications
pub struct MatrixExpander;

impl MatrixExpander {
    /// Expand a whole specification with the default product combinator
    pub fn expand(spec: &VariableSpec) -> Result<VariableMatrix, ExpandError> {
        let matrix = Self::expand_node(spec, None, Combinator::default())?;
        debug!(bindings = matrix.len(), "expanded variable matrix");
        Ok(matrix)
    }

    /// Normalise a YAML tree and expand it
    pub fn expand_yaml(value: &serde_yaml::Value) -> Result<VariableMatrix, ExpandError> {
        Self::expand(&VariableSpec::from_yaml(value)?)
    }

    /// Expand one node under the variable name `parent`
    pub fn expand_node(
        spec: &VariableSpec,
        parent: Option<&str>,
        combinator: Combinator,
    ) -> Result<Vec<Binding>, ExpandError> {
        match spec {
            VariableSpec::Mapping(mapping) => Self::expand_mapping(mapping, parent, combinator),
            VariableSpec::Sequence(items) => {
                let mut bindings = Vec::new();
                for item in items {
                    bindings.extend(Self::expand_node(item, parent, combinator)?);
                }
                Ok(bindings)
            }
            VariableSpec::Scalar(value) => {
                let parent = parent.ok_or_else(|| ExpandError::MissingParent {
                    value: format!("'{}'", value),
                })?;
                Ok(vec![Binding::from([(parent.to_string(), value.clone())])])
            }
        }
    }

    fn expand_mapping(
        mapping: &SpecMapping,
        parent: Option<&str>,
        combinator: Combinator,
    ) -> Result<Vec<Binding>, ExpandError> {
        let mut slots = Vec::new();

        for operator in &mapping.operators {
            slots.extend(Self::operator_slots(operator, parent)?);
        }

        for (key, value) in &mapping.variables {
            slots.push(Self::expand_node(value, Some(key), combinator)?);
        }

        debug!(?combinator, slots = ?slot_sizes(&slots), "combining slots");
        Ok(combinator.combine(slots))
    }

    /// Each operator contributes one or more slots to its enclosing mapping
    fn operator_slots(
        operator: &Operator,
        parent: Option<&str>,
    ) -> Result<Vec<Vec<Binding>>, ExpandError> {
        match operator {
            Operator::Zip(ZipArgs::Single(mapping)) => Ok(vec![Self::expand_mapping(
                mapping,
                parent,
                Combinator::Zip,
            )?]),
            Operator::Zip(ZipArgs::Each(mappings)) => mappings
                .iter()
                .map(|mapping| Self::expand_mapping(mapping, parent, Combinator::Zip))
                .collect(),
            Operator::Product(mapping) => Ok(vec![Self::expand_mapping(
                mapping,
                parent,
                Combinator::Product,
            )?]),
            Operator::Chain(items) => {
                let mut chained = Vec::new();
                for item in items {
                    chained.extend(Self::expand_node(item, parent, Combinator::Product)?);
                }
                Ok(vec![chained])
            }
            Operator::Arange(args) => {
                let parent = parent.ok_or_else(|| ExpandError::MissingParent {
                    value: "generated by arange".to_string(),
                })?;
                Ok(vec![args
                    .values()?
                    .into_iter()
                    .map(|value| Binding::from([(parent.to_string(), value)]))
                    .collect()])
            }
            Operator::Cycle { times, body } => {
                let once = Self::expand_mapping(body, parent, Combinator::Product)?;
                if once.is_empty() {
                    return Ok(vec![once]);
                }
                let total = check_generated("cycle", once.len().checked_mul(*times))?;
                let mut repeated = Vec::with_capacity(total);
                for _ in 0..*times {
                    repeated.extend(once.iter().cloned());
                }
                Ok(vec![repeated])
            }
        }
    }
}

fn slot_sizes(slots: &[Vec<Binding>]) -> Vec<usize> {
    slots.iter().map(Vec::len).collect()
}
