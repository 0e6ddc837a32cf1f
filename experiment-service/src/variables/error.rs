// Expansion Errors
// Failures raised while normalising or expanding a variables tree

use thiserror::Error;

/// Errors that abort a matrix expansion
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpandError {
    /// An operator was given arguments of the wrong shape
    #[error("invalid arguments for '{operator}': {message}")]
    InvalidOperator {
        operator: &'static str,
        message: String,
    },

    /// An operator is missing one of its required arguments
    #[error("'{argument}' is a required argument of the '{operator}' operator")]
    MissingArgument {
        operator: &'static str,
        argument: &'static str,
    },

    /// A value was reached with no enclosing variable name
    #[error("value {value} is not attached to a variable name")]
    MissingParent { value: String },

    /// The tree contains a node kind that has no meaning as a variable
    #[error("unsupported value in variables: {0}")]
    UnsupportedValue(String),

    /// Mapping keys must be strings or scalars
    #[error("invalid variable name: {0}")]
    InvalidKey(String),
}

impl ExpandError {
    pub(crate) fn invalid(operator: &'static str, message: impl Into<String>) -> Self {
        ExpandError::InvalidOperator {
            operator,
            message: message.into(),
        }
    }
}
