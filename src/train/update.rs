//! Parameter update policy: momentum accumulation and global-norm clipping.

use crate::graph::Network;
use ndarray::{Array1, ArrayView1};
use tracing::{info, warn};

/// How freshly computed gradients reach the parameters.
///
/// The mode is fixed at construction: direct application when neither
/// momentum nor clipping is configured, otherwise a delta buffer realizing
/// momentum-SGD with global L2-norm clipping applied once per minibatch
/// across the entire parameter set.
#[derive(Debug)]
pub(crate) enum UpdatePolicy {
    Direct,
    Buffered(DeltaBuffer),
}

#[derive(Debug)]
pub(crate) struct DeltaBuffer {
    momentum: f32,
    max_param_change: f32,
    delta: Array1<f32>,
}

impl UpdatePolicy {
    pub fn new(momentum: f32, max_param_change: f32, num_params: usize) -> Self {
        if momentum == 0.0 && max_param_change == 0.0 {
            UpdatePolicy::Direct
        } else {
            UpdatePolicy::Buffered(DeltaBuffer {
                momentum,
                max_param_change,
                delta: Array1::zeros(num_params),
            })
        }
    }

    /// Apply one minibatch's gradient to the network parameters.
    pub fn apply(&mut self, gradient: ArrayView1<'_, f32>, network: &mut dyn Network) {
        match self {
            UpdatePolicy::Direct => network.apply_delta(gradient, 1.0),
            UpdatePolicy::Buffered(buffer) => buffer.apply(gradient, network),
        }
    }

    #[cfg(test)]
    pub(crate) fn delta(&self) -> Option<&Array1<f32>> {
        match self {
            UpdatePolicy::Direct => None,
            UpdatePolicy::Buffered(buffer) => Some(&buffer.delta),
        }
    }
}

impl DeltaBuffer {
    fn apply(&mut self, gradient: ArrayView1<'_, f32>, network: &mut dyn Network) {
        self.delta.scaled_add(1.0, &gradient);

        let mut scale = 1.0 - self.momentum;
        let param_delta = self.delta.dot(&self.delta).sqrt() * scale;
        if !param_delta.is_finite() {
            warn!("Non-finite parameter change, will not apply.");
            self.delta.fill(0.0);
            return;
        }
        if self.max_param_change != 0.0 && param_delta > self.max_param_change {
            let factor = self.max_param_change / param_delta;
            info!(
                "Parameter change too big: {param_delta} > \
                 --max-param-change={}, scaling by {factor}",
                self.max_param_change
            );
            scale *= factor;
        }

        network.apply_delta(self.delta.view(), scale);
        self.delta *= self.momentum;
    }
}
