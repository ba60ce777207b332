//! The per-minibatch trainer.

use crate::error::{Result, TrainError};
use crate::example::Example;
use crate::graph::{build_request, ComputeBackend, Executor, Network, REGULARIZER_SUFFIX};
use crate::objective::{compute_objective, compute_regularizer};
use crate::train::{parse_objective_scales, ObjectiveStats, TrainerConfig, UpdatePolicy};
use std::collections::HashMap;

/// Drives one optimization step per minibatch over a compiled computation
/// plan: forward pass, objective computation per output, derivative seeding,
/// backward pass, parameter update, and phase statistics.
///
/// A trainer instance is strictly sequential: one [`Trainer::train`] call
/// fully completes before the next begins, and a single instance must not be
/// driven by more than one caller at a time.
pub struct Trainer<'a, N: Network, B: ComputeBackend> {
    config: TrainerConfig,
    network: &'a mut N,
    backend: B,
    update: UpdatePolicy,
    objective_scales: HashMap<String, f32>,
    stats: HashMap<String, ObjectiveStats>,
    num_minibatches_processed: usize,
}

impl<'a, N: Network, B: ComputeBackend> Trainer<'a, N, B> {
    /// Create a trainer over an externally owned network.
    ///
    /// Fails on a malformed objective-scales string or invalid momentum,
    /// max-param-change, or print-interval settings.
    pub fn new(config: TrainerConfig, network: &'a mut N, backend: B) -> Result<Self> {
        config.validate()?;
        let objective_scales = parse_objective_scales(&config.objective_scales_str)?;
        if config.zero_component_stats {
            network.zero_component_stats();
        }
        let update = UpdatePolicy::new(
            config.momentum,
            config.max_param_change,
            network.num_params(),
        );
        Ok(Self {
            config,
            network,
            backend,
            update,
            objective_scales,
            stats: HashMap::new(),
            num_minibatches_processed: 0,
        })
    }

    /// Process one minibatch: forward, objectives, backward, update, stats.
    pub fn train(&mut self, example: &Example) -> Result<()> {
        let need_model_derivative = true;
        let request = build_request(
            &*self.network,
            example,
            need_model_derivative,
            self.config.store_component_stats,
            self.config.add_regularizer,
        )?;
        let mut computer = self.backend.compile(&request)?;

        computer.accept_inputs(example);
        computer.forward();
        self.process_outputs(example, &mut computer)?;
        computer.backward();

        self.update.apply(computer.gradient(), self.network);
        self.num_minibatches_processed += 1;
        Ok(())
    }

    fn process_outputs(&mut self, example: &Example, computer: &mut B::Executor) -> Result<()> {
        for io in &example.io {
            let node_index = self
                .network
                .node_index(&io.name)
                .ok_or_else(|| TrainError::UnknownNode(io.name.clone()))?;
            if !self.network.is_output(node_index) {
                continue;
            }
            let kind = self.network.objective_kind(node_index);
            let scale = self.objective_scales.get(&io.name).copied().unwrap_or(1.0);

            let output = computer
                .output(&io.name)
                .ok_or_else(|| TrainError::MissingOutput(io.name.clone()))?;
            let value = compute_objective(&io.features, kind, &io.name, output, true)?;
            let tot_objf = value.objf * scale;

            if let Some(mut deriv) = value.deriv {
                if self.config.apply_deriv_weights {
                    if let Some(weights) = &io.deriv_weights {
                        apply_row_weights(&io.name, &mut deriv, weights)?;
                    }
                }
                if scale != 1.0 {
                    deriv *= scale;
                }
                computer.accept_output_deriv(&io.name, deriv);
            }

            self.stats.entry(io.name.clone()).or_default().update(
                &io.name,
                self.config.print_interval,
                self.num_minibatches_processed,
                f64::from(value.weight),
                f64::from(tot_objf),
                0.0,
            );

            if self.config.add_regularizer {
                self.process_regularizer(io, kind, computer)?;
            }
        }
        Ok(())
    }

    /// Compute the auxiliary objective on an output's `-reg` companion node.
    ///
    /// Regularization is opportunistic per output: a missing companion node
    /// is not an error. The companion's derivative is an independent backward
    /// seed, never merged with the primary one; the primary entry's per-row
    /// derivative weights apply to it under the same switch.
    fn process_regularizer(
        &mut self,
        io: &crate::example::IoEntry,
        kind: crate::objective::ObjectiveKind,
        computer: &mut B::Executor,
    ) -> Result<()> {
        let reg_name = format!("{}{}", io.name, REGULARIZER_SUFFIX);
        let Some(reg_index) = self.network.node_index(&reg_name) else {
            return Ok(());
        };
        if !self.network.is_output(reg_index) {
            return Err(TrainError::NotAnOutput(reg_name));
        }
        let reg_scale = self.objective_scales.get(&reg_name).copied().unwrap_or(1.0);

        let reg_output = computer
            .output(&reg_name)
            .ok_or_else(|| TrainError::MissingOutput(reg_name.clone()))?;
        let value = compute_regularizer(kind, &reg_name, reg_output, true)?;
        let tot_objf = value.objf * reg_scale;

        if let Some(mut deriv) = value.deriv {
            if self.config.apply_deriv_weights {
                if let Some(weights) = &io.deriv_weights {
                    apply_row_weights(&reg_name, &mut deriv, weights)?;
                }
            }
            if reg_scale != 1.0 {
                deriv *= reg_scale;
            }
            computer.accept_output_deriv(&reg_name, deriv);
        }

        self.stats.entry(reg_name.clone()).or_default().update(
            &reg_name,
            self.config.print_interval,
            self.num_minibatches_processed,
            f64::from(value.weight),
            f64::from(tot_objf),
            0.0,
        );
        Ok(())
    }

    /// Emit lifetime summaries for every output seen so far.
    ///
    /// Returns true iff at least one output accumulated nonzero weight;
    /// false means no training data was ever seen.
    pub fn print_total_stats(&self) -> bool {
        let mut ans = false;
        for (name, stats) in &self.stats {
            ans = stats.print_total_stats(name) || ans;
        }
        ans
    }

    /// Statistics recorded per output name.
    pub fn stats(&self) -> &HashMap<String, ObjectiveStats> {
        &self.stats
    }

    /// Number of completed [`Trainer::train`] calls.
    pub fn num_minibatches_processed(&self) -> usize {
        self.num_minibatches_processed
    }
}

/// Multiply each derivative row by its weight. The weight vector must have
/// exactly one entry per row.
fn apply_row_weights(
    name: &str,
    deriv: &mut ndarray::Array2<f32>,
    weights: &ndarray::Array1<f32>,
) -> Result<()> {
    if weights.len() != deriv.nrows() {
        return Err(TrainError::DerivWeightsMismatch {
            name: name.to_string(),
            weights: weights.len(),
            rows: deriv.nrows(),
        });
    }
    for (mut row, &w) in deriv.outer_iter_mut().zip(weights.iter()) {
        row *= w;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ComputationRequest;
    use crate::objective::ObjectiveKind;
    use crate::supervision::Supervision;
    use crate::{Example, IoEntry};
    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2, Array1, Array2, ArrayView1, ArrayView2};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    struct StubNetwork {
        nodes: Vec<(String, bool, ObjectiveKind)>,
        params: Array1<f32>,
        stats_zeroed: bool,
    }

    impl StubNetwork {
        fn new(nodes: Vec<(&str, bool, ObjectiveKind)>, params: Array1<f32>) -> Self {
            Self {
                nodes: nodes
                    .into_iter()
                    .map(|(n, o, k)| (n.to_string(), o, k))
                    .collect(),
                params,
                stats_zeroed: false,
            }
        }
    }

    impl Network for StubNetwork {
        fn node_index(&self, name: &str) -> Option<usize> {
            self.nodes.iter().position(|(n, _, _)| n == name)
        }
        fn is_output(&self, index: usize) -> bool {
            self.nodes[index].1
        }
        fn objective_kind(&self, index: usize) -> ObjectiveKind {
            self.nodes[index].2
        }
        fn num_params(&self) -> usize {
            self.params.len()
        }
        fn apply_delta(&mut self, delta: ArrayView1<'_, f32>, scale: f32) {
            self.params.scaled_add(scale, &delta);
        }
        fn zero_component_stats(&mut self) {
            self.stats_zeroed = true;
        }
    }

    #[derive(Clone)]
    struct StubBackend {
        outputs: HashMap<String, Array2<f32>>,
        gradient: Array1<f32>,
        accepted_derivs: Rc<RefCell<HashMap<String, Array2<f32>>>>,
        requests: Rc<RefCell<Vec<ComputationRequest>>>,
    }

    impl StubBackend {
        fn new(outputs: Vec<(&str, Array2<f32>)>, gradient: Array1<f32>) -> Self {
            Self {
                outputs: outputs
                    .into_iter()
                    .map(|(n, m)| (n.to_string(), m))
                    .collect(),
                gradient,
                accepted_derivs: Rc::new(RefCell::new(HashMap::new())),
                requests: Rc::new(RefCell::new(Vec::new())),
            }
        }
    }

    struct StubExecutor {
        outputs: HashMap<String, Array2<f32>>,
        gradient: Array1<f32>,
        accepted_derivs: Rc<RefCell<HashMap<String, Array2<f32>>>>,
    }

    impl Executor for StubExecutor {
        fn accept_inputs(&mut self, _example: &Example) {}
        fn forward(&mut self) {}
        fn output(&self, name: &str) -> Option<ArrayView2<'_, f32>> {
            self.outputs.get(name).map(Array2::view)
        }
        fn accept_output_deriv(&mut self, name: &str, deriv: Array2<f32>) {
            self.accepted_derivs
                .borrow_mut()
                .insert(name.to_string(), deriv);
        }
        fn backward(&mut self) {}
        fn gradient(&self) -> ArrayView1<'_, f32> {
            self.gradient.view()
        }
    }

    impl ComputeBackend for StubBackend {
        type Executor = StubExecutor;

        fn compile(&mut self, request: &ComputationRequest) -> crate::Result<StubExecutor> {
            self.requests.borrow_mut().push(request.clone());
            Ok(StubExecutor {
                outputs: self.outputs.clone(),
                gradient: self.gradient.clone(),
                accepted_derivs: Rc::clone(&self.accepted_derivs),
            })
        }
    }

    fn linear_example() -> Example {
        Example::new(vec![IoEntry::new(
            "output",
            Supervision::Dense(arr2(&[[1.0, 0.0], [0.0, 1.0]])),
        )])
    }

    fn direct_config() -> TrainerConfig {
        TrainerConfig::default()
            .with_momentum(0.0)
            .with_max_param_change(0.0)
    }

    #[test]
    fn test_direct_mode_param_change_equals_raw_gradient() {
        let mut net = StubNetwork::new(
            vec![("output", true, ObjectiveKind::Linear)],
            arr1(&[1.0, 2.0, 3.0]),
        );
        let backend = StubBackend::new(
            vec![("output", arr2(&[[-0.5, -1.5], [-2.0, -0.2]]))],
            arr1(&[0.1, 0.2, 0.3]),
        );
        let mut trainer = Trainer::new(direct_config(), &mut net, backend).unwrap();

        trainer.train(&linear_example()).unwrap();
        trainer.train(&linear_example()).unwrap();
        assert_eq!(trainer.num_minibatches_processed(), 2);
        drop(trainer);

        // Each call applies exactly the raw gradient, independent of history.
        assert_relative_eq!(net.params[0], 1.2, epsilon = 1e-6);
        assert_relative_eq!(net.params[1], 2.4, epsilon = 1e-6);
        assert_relative_eq!(net.params[2], 3.6, epsilon = 1e-6);
        assert!(net.stats_zeroed);
    }

    #[test]
    fn test_infinite_gradient_leaves_params_unchanged() {
        let mut net = StubNetwork::new(
            vec![("output", true, ObjectiveKind::Linear)],
            arr1(&[1.0, 2.0]),
        );
        let backend = StubBackend::new(
            vec![("output", arr2(&[[-0.5, -1.5], [-2.0, -0.2]]))],
            arr1(&[f32::INFINITY, 0.0]),
        );
        let config = TrainerConfig::default()
            .with_momentum(0.5)
            .with_max_param_change(2.0);
        let mut trainer = Trainer::new(config, &mut net, backend).unwrap();

        trainer.train(&linear_example()).unwrap();
        drop(trainer);

        assert_eq!(net.params, arr1(&[1.0, 2.0]));
    }

    #[test]
    fn test_derivative_seeded_with_scale_and_weights() {
        let mut net = StubNetwork::new(
            vec![("output", true, ObjectiveKind::Linear)],
            arr1(&[0.0]),
        );
        let backend = StubBackend::new(
            vec![("output", arr2(&[[-0.5, -1.5], [-2.0, -0.2]]))],
            arr1(&[0.0]),
        );
        let derivs = Rc::clone(&backend.accepted_derivs);
        let config = direct_config().with_objective_scales("output:2.0");
        let mut trainer = Trainer::new(config, &mut net, backend).unwrap();

        let example = Example::new(vec![IoEntry::new(
            "output",
            Supervision::Dense(arr2(&[[1.0, 0.0], [0.0, 1.0]])),
        )
        .with_deriv_weights(arr1(&[1.0, 0.5]))]);
        trainer.train(&example).unwrap();

        // Linear deriv is the supervision, rows weighted then scaled by 2.
        let derivs = derivs.borrow();
        let seeded = derivs.get("output").unwrap();
        assert_eq!(seeded, &arr2(&[[2.0, 0.0], [0.0, 1.0]]));

        // The reported objective is scaled too.
        let stats = &trainer.stats()["output"];
        assert_relative_eq!(stats.tot_objf(), 2.0 * (-0.5 + -0.2), epsilon = 1e-5);
    }

    #[test]
    fn test_deriv_weights_ignored_when_disabled() {
        let mut net = StubNetwork::new(
            vec![("output", true, ObjectiveKind::Linear)],
            arr1(&[0.0]),
        );
        let backend = StubBackend::new(
            vec![("output", arr2(&[[-0.5, -1.5], [-2.0, -0.2]]))],
            arr1(&[0.0]),
        );
        let derivs = Rc::clone(&backend.accepted_derivs);
        let config = direct_config().with_apply_deriv_weights(false);
        let mut trainer = Trainer::new(config, &mut net, backend).unwrap();

        let example = Example::new(vec![IoEntry::new(
            "output",
            Supervision::Dense(arr2(&[[1.0, 0.0], [0.0, 1.0]])),
        )
        .with_deriv_weights(arr1(&[0.0, 0.0]))]);
        trainer.train(&example).unwrap();

        let derivs = derivs.borrow();
        assert_eq!(derivs.get("output").unwrap(), &arr2(&[[1.0, 0.0], [0.0, 1.0]]));
    }

    #[test]
    fn test_regularizer_is_opportunistic() {
        let mut net = StubNetwork::new(
            vec![
                ("output", true, ObjectiveKind::Linear),
                ("output-reg", true, ObjectiveKind::Linear),
            ],
            arr1(&[0.0]),
        );
        let backend = StubBackend::new(
            vec![
                ("output", arr2(&[[-0.5, -1.5], [-2.0, -0.2]])),
                ("output-reg", arr2(&[[0.25, 0.25], [0.5, 0.5]])),
            ],
            arr1(&[0.0]),
        );
        let derivs = Rc::clone(&backend.accepted_derivs);
        let config = direct_config()
            .with_add_regularizer(true)
            .with_objective_scales("output-reg:0.1");
        let mut trainer = Trainer::new(config, &mut net, backend).unwrap();

        trainer.train(&linear_example()).unwrap();

        // The companion node got its own independent derivative seed.
        let derivs = derivs.borrow();
        assert!(derivs.get("output-reg").unwrap().iter().all(|&d| d == 0.1));

        // And its own statistics record, scaled by its own multiplier.
        let reg_stats = &trainer.stats()["output-reg"];
        assert_relative_eq!(reg_stats.tot_objf(), 0.1 * 1.5, epsilon = 1e-6);
        assert_relative_eq!(reg_stats.tot_weight(), 2.0);
    }

    #[test]
    fn test_missing_regularizer_node_is_not_an_error() {
        let mut net = StubNetwork::new(
            vec![("output", true, ObjectiveKind::Linear)],
            arr1(&[0.0]),
        );
        let backend = StubBackend::new(
            vec![("output", arr2(&[[-0.5, -1.5], [-2.0, -0.2]]))],
            arr1(&[0.0]),
        );
        let config = direct_config().with_add_regularizer(true);
        let mut trainer = Trainer::new(config, &mut net, backend).unwrap();

        assert!(trainer.train(&linear_example()).is_ok());
        assert!(!trainer.stats().contains_key("output-reg"));
    }

    #[test]
    fn test_output_first_seen_after_phase_zero() {
        // A second task's output may not appear until several phases in; its
        // lazily created statistics record must pick up training there.
        let mut net = StubNetwork::new(
            vec![
                ("a", true, ObjectiveKind::Linear),
                ("b", true, ObjectiveKind::Linear),
            ],
            arr1(&[0.0]),
        );
        let backend = StubBackend::new(
            vec![
                ("a", arr2(&[[-0.5, -1.5], [-2.0, -0.2]])),
                ("b", arr2(&[[-0.5, -1.5], [-2.0, -0.2]])),
            ],
            arr1(&[0.0]),
        );
        let config = direct_config().with_print_interval(4);
        let mut trainer = Trainer::new(config, &mut net, backend).unwrap();

        let supervision = || Supervision::Dense(arr2(&[[1.0, 0.0], [0.0, 1.0]]));
        let only_a = Example::new(vec![IoEntry::new("a", supervision())]);
        let both = Example::new(vec![
            IoEntry::new("a", supervision()),
            IoEntry::new("b", supervision()),
        ]);

        for _ in 0..5 {
            trainer.train(&only_a).unwrap();
        }
        for _ in 0..3 {
            trainer.train(&both).unwrap();
        }

        // "b" was first seen at minibatch 5 (phase 1) and accumulated three
        // updates of weight 2; "a" saw all eight.
        assert_relative_eq!(trainer.stats()["b"].tot_weight(), 6.0);
        assert_eq!(trainer.stats()["b"].current_phase(), 2);
        assert_relative_eq!(trainer.stats()["a"].tot_weight(), 16.0);
        assert_eq!(trainer.stats()["a"].current_phase(), 2);
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let mut net = StubNetwork::new(
            vec![("output", true, ObjectiveKind::Linear)],
            arr1(&[0.0]),
        );
        let backend = StubBackend::new(vec![("output", arr2(&[[-0.5], [-2.0]]))], arr1(&[0.0]));
        let mut trainer = Trainer::new(direct_config(), &mut net, backend).unwrap();

        let err = trainer.train(&linear_example()).unwrap_err();
        assert!(matches!(err, TrainError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_short_deriv_weights_vector_is_fatal() {
        let mut net = StubNetwork::new(
            vec![("output", true, ObjectiveKind::Linear)],
            arr1(&[0.0]),
        );
        let backend = StubBackend::new(
            vec![("output", arr2(&[[-0.5, -1.5], [-2.0, -0.2]]))],
            arr1(&[0.0]),
        );
        let mut trainer = Trainer::new(direct_config(), &mut net, backend).unwrap();

        // Two derivative rows but only one weight.
        let example = Example::new(vec![IoEntry::new(
            "output",
            Supervision::Dense(arr2(&[[1.0, 0.0], [0.0, 1.0]])),
        )
        .with_deriv_weights(arr1(&[0.5]))]);

        let err = trainer.train(&example).unwrap_err();
        assert!(matches!(
            err,
            TrainError::DerivWeightsMismatch { weights: 1, rows: 2, .. }
        ));
    }

    #[test]
    fn test_print_total_stats_reflects_training() {
        let mut net = StubNetwork::new(
            vec![("output", true, ObjectiveKind::Linear)],
            arr1(&[0.0]),
        );
        let backend = StubBackend::new(
            vec![("output", arr2(&[[-0.5, -1.5], [-2.0, -0.2]]))],
            arr1(&[0.0]),
        );
        let mut trainer = Trainer::new(direct_config(), &mut net, backend).unwrap();

        assert!(!trainer.print_total_stats());
        trainer.train(&linear_example()).unwrap();
        assert!(trainer.print_total_stats());
    }

    #[test]
    fn test_malformed_scales_fail_construction() {
        let mut net = StubNetwork::new(vec![], arr1(&[0.0]));
        let backend = StubBackend::new(vec![], arr1(&[0.0]));
        let config = TrainerConfig::default().with_objective_scales("a:2.0:b");

        assert!(matches!(
            Trainer::new(config, &mut net, backend),
            Err(TrainError::BadObjectiveScales(_))
        ));
    }

    #[test]
    fn test_request_carries_regularizer_output() {
        let mut net = StubNetwork::new(
            vec![
                ("input", false, ObjectiveKind::Linear),
                ("output", true, ObjectiveKind::Linear),
                ("output-reg", true, ObjectiveKind::Linear),
            ],
            arr1(&[0.0]),
        );
        let backend = StubBackend::new(
            vec![
                ("output", arr2(&[[-0.5, -1.5]])),
                ("output-reg", arr2(&[[0.1, 0.1]])),
            ],
            arr1(&[0.0]),
        );
        let requests = Rc::clone(&backend.requests);
        let config = direct_config().with_add_regularizer(true);
        let mut trainer = Trainer::new(config, &mut net, backend).unwrap();

        let example = Example::new(vec![
            IoEntry::new("input", Supervision::Dense(arr2(&[[0.0, 0.0]]))),
            IoEntry::new("output", Supervision::Dense(arr2(&[[1.0, 0.0]]))),
        ]);
        trainer.train(&example).unwrap();

        let requests = requests.borrow();
        assert_eq!(requests[0].inputs, vec!["input"]);
        assert_eq!(requests[0].outputs, vec!["output", "output-reg"]);
    }
}
