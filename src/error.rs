//! Error types for the trainer.

use crate::objective::ObjectiveKind;
use thiserror::Error;

/// Trainer errors.
///
/// All of these indicate a misconfiguration or a model/data mismatch, not a
/// transient condition; the driving control loop is expected to abort on any
/// of them rather than retry.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("bad objective-scales string '{0}': expected alternating name:scale tokens")]
    BadObjectiveScales(String),

    #[error("could not parse objective scale '{value}' for output '{name}' as a float")]
    BadObjectiveScale { name: String, value: String },

    #[error("invalid trainer configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "network versus example output dimension (num-classes) mismatch for '{name}': \
         {output} (network) vs. {supervision} (example)"
    )]
    DimensionMismatch {
        name: String,
        output: usize,
        supervision: usize,
    },

    #[error(
        "deriv-weights length mismatch for '{name}': {weights} weights vs. {rows} derivative rows"
    )]
    DerivWeightsMismatch {
        name: String,
        weights: usize,
        rows: usize,
    },

    #[error("regularizer objective kind {kind:?} not handled for output '{name}'")]
    UnhandledRegularizer { name: String, kind: ObjectiveKind },

    #[error("no node named '{0}' in the network")]
    UnknownNode(String),

    #[error("node '{0}' exists but is not an output node")]
    NotAnOutput(String),

    #[error("executor produced no output named '{0}'")]
    MissingOutput(String),
}

/// Result type for trainer operations
pub type Result<T> = std::result::Result<T, TrainError>;
