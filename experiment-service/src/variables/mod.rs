// Variables Module
// Normalisation and matrix expansion of experiment variables

pub mod error;
pub mod matrix;
pub mod range;
pub mod spec;

pub use error::ExpandError;
pub use matrix::{Binding, Combinator, MatrixExpander, VariableMatrix};
pub use range::{Dtype, RangeArgs};
pub use spec::{Operator, OperatorKind, Scalar, SpecMapping, VariableSpec, ZipArgs};
