//! Trainer configuration.

use crate::error::{Result, TrainError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Options governing one trainer instance.
///
/// # Example
///
/// ```
/// use adiestrar::TrainerConfig;
///
/// let config = TrainerConfig::default()
///     .with_momentum(0.9)
///     .with_max_param_change(2.0)
///     .with_print_interval(500);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Fraction of the previous parameter delta retained each step.
    pub momentum: f32,
    /// Global L2-norm cap on one step's effective parameter change.
    /// Zero disables clipping.
    pub max_param_change: f32,
    /// Per-output objective/derivative multipliers, as
    /// `"name:scale[:name:scale...]"`. Empty means no scaling.
    pub objective_scales_str: String,
    /// Multiply derivative rows by an entry's per-row weight vector.
    pub apply_deriv_weights: bool,
    /// Compute regularizer objectives on `-reg` companion nodes when present.
    pub add_regularizer: bool,
    /// Passed through to the compiled plan; not interpreted here.
    pub store_component_stats: bool,
    /// Clear the network's component stats at construction.
    pub zero_component_stats: bool,
    /// Minibatches per statistics reporting phase.
    pub print_interval: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            momentum: 0.0,
            max_param_change: 2.0,
            objective_scales_str: String::new(),
            apply_deriv_weights: true,
            add_regularizer: false,
            store_component_stats: true,
            zero_component_stats: true,
            print_interval: 100,
        }
    }
}

impl TrainerConfig {
    pub fn with_momentum(mut self, momentum: f32) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn with_max_param_change(mut self, max_param_change: f32) -> Self {
        self.max_param_change = max_param_change;
        self
    }

    pub fn with_objective_scales(mut self, scales: impl Into<String>) -> Self {
        self.objective_scales_str = scales.into();
        self
    }

    pub fn with_apply_deriv_weights(mut self, apply: bool) -> Self {
        self.apply_deriv_weights = apply;
        self
    }

    pub fn with_add_regularizer(mut self, add: bool) -> Self {
        self.add_regularizer = add;
        self
    }

    pub fn with_print_interval(mut self, interval: usize) -> Self {
        self.print_interval = interval;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.momentum < 0.0 {
            return Err(TrainError::InvalidConfig(format!(
                "momentum must be >= 0, got {}",
                self.momentum
            )));
        }
        if self.max_param_change < 0.0 {
            return Err(TrainError::InvalidConfig(format!(
                "max-param-change must be >= 0, got {}",
                self.max_param_change
            )));
        }
        if self.print_interval == 0 {
            return Err(TrainError::InvalidConfig(
                "print-interval must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse a colon-delimited `"name:scale[:name:scale...]"` string.
pub(crate) fn parse_objective_scales(raw: &str) -> Result<HashMap<String, f32>> {
    let mut scales = HashMap::new();
    if raw.is_empty() {
        return Ok(scales);
    }
    let tokens: Vec<&str> = raw.split(':').collect();
    if tokens.len() % 2 != 0 {
        return Err(TrainError::BadObjectiveScales(raw.to_string()));
    }
    for pair in tokens.chunks_exact(2) {
        let scale: f32 = pair[1].parse().map_err(|_| TrainError::BadObjectiveScale {
            name: pair[0].to_string(),
            value: pair[1].to_string(),
        })?;
        scales.insert(pair[0].to_string(), scale);
    }
    Ok(scales)
}
