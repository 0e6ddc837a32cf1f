// Numeric Ranges
// Half-open progressions generated by the `arange` operator

use crate::variables::error::ExpandError;
use crate::variables::spec::{describe, parse_dtype, Scalar};

use serde_yaml::Value;

/// Most bindings a single `arange` or `cycle` may generate
pub const MAX_GENERATED: usize = 10_000_000;

/// Check a generated length against `MAX_GENERATED`
pub(crate) fn check_generated(
    operator: &'static str,
    count: Option<usize>,
) -> Result<usize, ExpandError> {
    count.filter(|count| *count <= MAX_GENERATED).ok_or_else(|| {
        ExpandError::invalid(
            operator,
            format!("would generate more than {} values", MAX_GENERATED),
        )
    })
}

/// Element type of a generated range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    Int,
    Float,
}

/// Arguments of `arange`: `[start, stop)` in increments of `step`
#[derive(Debug, Clone, PartialEq)]
pub struct RangeArgs {
    pub start: Option<Scalar>,
    pub stop: Scalar,
    pub step: Option<Scalar>,
    pub dtype: Option<Dtype>,
}

impl RangeArgs {
    /// A range counting from zero up to `stop`
    pub fn up_to(stop: impl Into<Scalar>) -> Self {
        Self {
            start: None,
            stop: stop.into(),
            step: None,
            dtype: None,
        }
    }

    pub fn with_start(mut self, start: impl Into<Scalar>) -> Self {
        self.start = Some(start.into());
        self
    }

    pub fn with_step(mut self, step: impl Into<Scalar>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn with_dtype(mut self, dtype: Dtype) -> Self {
        self.dtype = Some(dtype);
        self
    }

    /// Accepts a bare number (`arange: 5`) or a mapping with a required `stop`
    pub fn from_yaml(value: &Value) -> Result<Self, ExpandError> {
        match value {
            Value::Number(_) => Ok(Self::up_to(number("stop", value)?)),
            Value::Mapping(map) => {
                let mut args = Self::up_to(Scalar::Int(0));
                let mut has_stop = false;

                for (key, value) in map {
                    match key.as_str() {
                        Some("start") => args.start = Some(number("start", value)?),
                        Some("stop") => {
                            args.stop = number("stop", value)?;
                            has_stop = true;
                        }
                        Some("step") => args.step = Some(number("step", value)?),
                        Some("dtype") => args.dtype = Some(parse_dtype(value)?),
                        _ => {
                            return Err(ExpandError::invalid(
                                "arange",
                                format!("unknown argument {}", describe(key)),
                            ))
                        }
                    }
                }

                if !has_stop {
                    return Err(ExpandError::MissingArgument {
                        operator: "arange",
                        argument: "stop",
                    });
                }
                Ok(args)
            }
            other => Err(ExpandError::invalid(
                "arange",
                format!(
                    "expected a number or a mapping with 'stop', got {}",
                    describe(other)
                ),
            )),
        }
    }

    /// Generate the progression
    pub fn values(&self) -> Result<Vec<Scalar>, ExpandError> {
        let start = self.start.clone().unwrap_or(Scalar::Int(0));
        let step = self.step.clone().unwrap_or(Scalar::Int(1));

        if step.as_f64() == Some(0.0) {
            return Err(ExpandError::invalid("arange", "step must not be zero"));
        }

        match (&start, &self.stop, &step) {
            (Scalar::Int(start), Scalar::Int(stop), Scalar::Int(step))
                if self.dtype != Some(Dtype::Float) =>
            {
                int_range(*start, *stop, *step)
            }
            _ => {
                let (start, stop, step) = (
                    start.as_f64().unwrap_or_default(),
                    self.stop.as_f64().unwrap_or_default(),
                    step.as_f64().unwrap_or_default(),
                );
                let count = ((stop - start) / step).ceil();
                if !count.is_finite() {
                    return Err(ExpandError::invalid(
                        "arange",
                        "range bounds must be finite numbers",
                    ));
                }

                let count = count.max(0.0);
                let count = check_generated(
                    "arange",
                    (count <= MAX_GENERATED as f64).then_some(count as usize),
                )?;
                let values = (0..count).map(|i| start + i as f64 * step);
                Ok(match self.dtype {
                    Some(Dtype::Int) => values.map(|v| Scalar::Int(v as i64)).collect(),
                    _ => values.map(Scalar::Float).collect(),
                })
            }
        }
    }
}

fn int_range(start: i64, stop: i64, step: i64) -> Result<Vec<Scalar>, ExpandError> {
    let span = stop.saturating_sub(start);
    // ceiling division that also holds for negative steps
    let count = if (span > 0) == (step > 0) && span != 0 {
        (span.unsigned_abs() + step.unsigned_abs() - 1) / step.unsigned_abs()
    } else {
        0
    };

    let count = check_generated("arange", usize::try_from(count).ok())?;
    Ok((0..count as i64)
        .map(|i| Scalar::Int(start + i * step))
        .collect())
}

fn number(argument: &'static str, value: &Value) -> Result<Scalar, ExpandError> {
    Scalar::from_yaml(value)
        .filter(Scalar::is_number)
        .ok_or_else(|| {
            ExpandError::invalid(
                "arange",
                format!("{} must be a number, got {}", argument, describe(value)),
            )
        })
}
