//! Errors raised while building or solving a normal-equation system
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The joint or reduced equation system has no unique solution for its
    /// unknowns. Not recoverable: the built-in families never trigger it, so
    /// hitting this means the model spec itself is wrong.
    #[error("the equation system has no unique solution for its unknowns")]
    UnsolvableSystem,
    /// The number of equations does not match the number of parameters
    #[error("{parameters} parameters declared for {equations} equations, the system must be square")]
    ParameterCountMismatch { parameters: usize, equations: usize },
    /// A normal equation mentions a data term with no declared aggregate sum
    #[error("no aggregate sum declared for the data term {0}")]
    UnknownAggregate(String),
    /// A reported coefficient refers to a parameter the spec never declared
    #[error("reported coefficient refers to undeclared parameter {0}")]
    UnknownParameter(String),
}
