//! Collaborator seams: network graph queries, plan compilation, execution.
//!
//! The trainer consumes a compiled, executable plan; it builds neither. These
//! traits are the contract with the external graph/executor machinery, and
//! tests drive the trainer through stub implementations of them.

use crate::error::{Result, TrainError};
use crate::example::Example;
use crate::objective::ObjectiveKind;
use ndarray::{ArrayView1, ArrayView2};

/// Suffix naming an output's companion regularizer node.
pub const REGULARIZER_SUFFIX: &str = "-reg";

/// Query and parameter-update interface to the externally owned network.
pub trait Network {
    /// Resolve a node name to its index, if present.
    fn node_index(&self, name: &str) -> Option<usize>;

    /// Whether the node at `index` is an output node.
    fn is_output(&self, index: usize) -> bool;

    /// The objective kind declared for the output node at `index`.
    fn objective_kind(&self, index: usize) -> ObjectiveKind;

    /// Total number of trainable parameters.
    fn num_params(&self) -> usize;

    /// params += scale * delta, over the flattened parameter vector.
    fn apply_delta(&mut self, delta: ArrayView1<'_, f32>, scale: f32);

    /// Clear accumulated per-component activation statistics.
    fn zero_component_stats(&mut self) {}
}

/// A request for one compiled forward/backward computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputationRequest {
    /// Names of input nodes to bind.
    pub inputs: Vec<String>,
    /// Names of output nodes whose values (and derivative seeds) are needed.
    pub outputs: Vec<String>,
    /// Whether the backward pass must produce parameter gradients.
    pub need_model_derivative: bool,
    /// Whether components should accumulate activation statistics.
    pub store_component_stats: bool,
}

/// Build the computation request for one example.
///
/// Entries resolving to output nodes become requested outputs; all other
/// entries become inputs. When `add_regularizer` is set, each output's
/// `-reg` companion node is requested too if the network has one.
pub fn build_request<N: Network>(
    network: &N,
    example: &Example,
    need_model_derivative: bool,
    store_component_stats: bool,
    add_regularizer: bool,
) -> Result<ComputationRequest> {
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    for io in &example.io {
        let index = network
            .node_index(&io.name)
            .ok_or_else(|| TrainError::UnknownNode(io.name.clone()))?;
        if network.is_output(index) {
            outputs.push(io.name.clone());
            if add_regularizer {
                let reg_name = format!("{}{}", io.name, REGULARIZER_SUFFIX);
                if network.node_index(&reg_name).is_some() {
                    outputs.push(reg_name);
                }
            }
        } else {
            inputs.push(io.name.clone());
        }
    }
    Ok(ComputationRequest {
        inputs,
        outputs,
        need_model_derivative,
        store_component_stats,
    })
}

/// One bound execution of a compiled plan.
///
/// Every operation is synchronous and blocking from the trainer's point of
/// view; any accelerator offload is the implementor's concern.
pub trait Executor {
    /// Bind the example's input entries to the plan.
    fn accept_inputs(&mut self, example: &Example);

    /// Run the forward pass.
    fn forward(&mut self);

    /// The computed value of a requested output node.
    fn output(&self, name: &str) -> Option<ArrayView2<'_, f32>>;

    /// Seed the backward pass with a derivative at the named output.
    fn accept_output_deriv(&mut self, name: &str, deriv: ndarray::Array2<f32>);

    /// Run the backward pass through all seeded output derivatives.
    fn backward(&mut self);

    /// Flattened parameter gradient, valid after [`Executor::backward`].
    fn gradient(&self) -> ArrayView1<'_, f32>;
}

/// Compiles computation requests into bound executors.
///
/// Plan memoization (reusing a compiled plan for a repeated request shape)
/// is the implementor's responsibility; the trainer compiles every minibatch.
pub trait ComputeBackend {
    type Executor: Executor;

    fn compile(&mut self, request: &ComputationRequest) -> Result<Self::Executor>;
}
