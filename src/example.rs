//! Minibatch example data model.

use crate::supervision::Supervision;
use ndarray::Array1;

/// One named input or supervision entry of a minibatch.
///
/// The name resolves the corresponding node in the network graph: entries
/// whose name resolves to an output node carry supervision targets, all
/// other entries carry input features.
#[derive(Debug, Clone)]
pub struct IoEntry {
    /// Graph node name this entry binds to.
    pub name: String,
    /// Data payload (dense, sparse, or compressed).
    pub features: Supervision,
    /// Optional per-row weighting applied to output derivatives.
    pub deriv_weights: Option<Array1<f32>>,
}

impl IoEntry {
    pub fn new(name: impl Into<String>, features: Supervision) -> Self {
        Self {
            name: name.into(),
            features,
            deriv_weights: None,
        }
    }

    /// Attach a per-row derivative weight vector.
    pub fn with_deriv_weights(mut self, weights: Array1<f32>) -> Self {
        self.deriv_weights = Some(weights);
        self
    }
}

/// One minibatch: an ordered collection of named I/O entries.
#[derive(Debug, Clone)]
pub struct Example {
    pub io: Vec<IoEntry>,
}

impl Example {
    pub fn new(io: Vec<IoEntry>) -> Self {
        Self { io }
    }
}
