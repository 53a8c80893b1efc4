use crate::id::{ConstraintId, HandleId, VarId};

/// Errors from building, mutating, persisting or solving a sketch.
#[derive(thiserror::Error, Debug)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub enum SolverError {
    /// Variable ID was not found.
    /// Either the variable was removed, or persisted state is corrupt.
    #[error("Variable {0} not found")]
    VariableNotFound(VarId),
    /// Handle ID was not found.
    #[error("Handle {0} not found")]
    HandleNotFound(HandleId),
    /// Constraint ID was not found.
    #[error("Constraint {0} not found")]
    ConstraintNotFound(ConstraintId),
    /// The same ID was used twice in persisted state.
    #[error("ID {0} appears more than once in the persisted sketch")]
    DuplicateId(u32),
    /// The minimizer gave up on one cluster.
    /// Other clusters in the same frame were still solved.
    #[error("Minimizer failed on cluster {cluster}: {source}")]
    Minimizer {
        /// Index of the cluster that failed, in creation order.
        cluster: usize,
        /// Underlying error.
        source: MinimizerError,
    },
    /// Could not encode or decode the persisted format.
    #[error("Could not read or write the persisted sketch: {0}")]
    Persistence(#[from] serde_json::Error),
}

/// Errors the numeric minimizer can raise.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub enum MinimizerError {
    /// The error function evaluated to NaN or infinity at the starting point.
    #[error("The error function is not finite at the initial guess")]
    NonFiniteStart,
    /// The finite-difference gradient contained NaN or infinity.
    #[error("Gradient has Infinity or NaN")]
    NonFiniteGradient,
    /// The quasi-Newton step contained NaN or infinity.
    #[error("Search direction has Infinity or NaN")]
    NonFiniteStep,
}

/// Errors from parsing and executing the textual sketch format.
#[derive(thiserror::Error, Debug)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub enum TextualError {
    /// A line could not be parsed.
    #[error("Line {line}: could not parse `{text}`")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// The offending line.
        text: String,
    },
    /// You referred to a label that was never defined.
    #[error("You referred to {label} but it was never defined")]
    UndefinedLabel {
        /// The undefined label.
        label: String,
    },
    /// The same label was defined twice.
    #[error("{label} was defined more than once")]
    DuplicateLabel {
        /// The repeated label.
        label: String,
    },
    /// Building the sketch failed.
    #[error(transparent)]
    Solver(#[from] SolverError),
}
