//! Per-minibatch neural network trainer.
//!
//! This crate drives one optimization step over an externally compiled
//! computation graph: it computes named objective functions (and optional
//! auxiliary regularizer terms) against supplied targets, seeds the backward
//! pass with their derivatives, applies a momentum-and-clipping parameter
//! update, and reports phase-windowed statistics per output.
//!
//! Graph construction, plan compilation, and the tensor executor are external
//! collaborators reached through the traits in [`graph`]; the driving control
//! loop constructs a [`Trainer`] and invokes [`Trainer::train`] once per
//! minibatch.
//!
//! # Example
//!
//! ```
//! use adiestrar::TrainerConfig;
//!
//! let config = TrainerConfig::default()
//!     .with_momentum(0.9)
//!     .with_max_param_change(2.0)
//!     .with_objective_scales("output:1.0");
//! ```

pub mod error;
pub mod example;
pub mod graph;
pub mod objective;
pub mod supervision;
pub mod train;

pub use error::{Result, TrainError};
pub use example::{Example, IoEntry};
pub use graph::{
    build_request, ComputationRequest, ComputeBackend, Executor, Network, REGULARIZER_SUFFIX,
};
pub use objective::{compute_objective, compute_regularizer, ObjectiveKind, ObjectiveValue};
pub use supervision::{CompressedMatrix, SparseMatrix, Supervision};
pub use train::{ObjectiveStats, Trainer, TrainerConfig};
