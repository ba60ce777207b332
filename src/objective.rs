//! Objective engine: loss values, weights, and output derivatives.
//!
//! Objectives here are formulated as quantities to *maximize* (log-probability
//! style), so derivatives are ascent directions and the quadratic objective
//! carries a negative sign.

use crate::error::{Result, TrainError};
use crate::supervision::Supervision;
use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

/// The loss family declared for an output node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectiveKind {
    /// Per-element binary cross-entropy against soft targets in [0, 1].
    CrossEntropy,
    /// Inner product of supervision and output; the standard choice when the
    /// output layer already produces normalized log-probabilities.
    Linear,
    /// Negative half squared error.
    Quadratic,
}

/// Total weight, total objective, and optional derivative for one output.
#[derive(Debug, Clone)]
pub struct ObjectiveValue {
    /// Denominator for averaging (frames, elements, or supervision mass).
    pub weight: f32,
    /// Total (unaveraged) objective value.
    pub objf: f32,
    /// d(objf)/d(output), present iff requested.
    pub deriv: Option<Array2<f32>>,
}

/// Compute weight, objective, and (optionally) the output derivative for one
/// supervision/output pair.
///
/// The supervision and output must agree on column count; a mismatch means
/// the example was generated against a different model and is fatal.
pub fn compute_objective(
    supervision: &Supervision,
    kind: ObjectiveKind,
    output_name: &str,
    output: ArrayView2<'_, f32>,
    want_deriv: bool,
) -> Result<ObjectiveValue> {
    if output.ncols() != supervision.num_cols() {
        return Err(TrainError::DimensionMismatch {
            name: output_name.to_string(),
            output: output.ncols(),
            supervision: supervision.num_cols(),
        });
    }

    match kind {
        ObjectiveKind::CrossEntropy => {
            // objf = sum x*log(y) + (1-x)*log(1-y); outputs must be in (0, 1).
            let post = supervision.to_dense();
            let mut objf = 0.0f32;
            Zip::from(&post).and(output).for_each(|&x, &y| {
                objf += x * y.ln() + (1.0 - x) * (1.0 - y).ln();
            });
            let weight = (post.nrows() * post.ncols()) as f32;
            let deriv = want_deriv.then(|| {
                let mut deriv = Array2::zeros(post.raw_dim());
                Zip::from(&mut deriv).and(&post).and(output).for_each(|d, &x, &y| {
                    *d = x / y - (1.0 - x) / (1.0 - y);
                });
                deriv
            });
            Ok(ObjectiveValue { weight, objf, deriv })
        }
        ObjectiveKind::Linear => {
            // objf = sum x*y, deriv = x; all three encodings must agree.
            match supervision {
                Supervision::Dense(post) => Ok(linear_dense(post, output, want_deriv)),
                Supervision::Sparse(post) => {
                    let mut weight = 0.0f32;
                    let mut objf = 0.0f32;
                    for (r, row) in post.iter_rows().enumerate() {
                        for &(c, v) in row {
                            weight += v;
                            objf += v * output[[r, c]];
                        }
                    }
                    let deriv = want_deriv.then(|| post.to_dense());
                    Ok(ObjectiveValue { weight, objf, deriv })
                }
                Supervision::Compressed(post) => {
                    Ok(linear_dense(&post.to_dense(), output, want_deriv))
                }
            }
        }
        ObjectiveKind::Quadratic => {
            // objf = -0.5 * sum (x - y)^2
            let diff = supervision.to_dense() - &output;
            let weight = diff.nrows() as f32;
            let objf = -0.5 * diff.iter().map(|d| d * d).sum::<f32>();
            let deriv = want_deriv.then(|| diff);
            Ok(ObjectiveValue { weight, objf, deriv })
        }
    }
}

fn linear_dense(
    post: &Array2<f32>,
    output: ArrayView2<'_, f32>,
    want_deriv: bool,
) -> ObjectiveValue {
    let weight = post.sum();
    let objf = Zip::from(post).and(output).fold(0.0, |acc, &x, &y| acc + x * y);
    let deriv = want_deriv.then(|| post.clone());
    ObjectiveValue { weight, objf, deriv }
}

/// Compute an auxiliary regularizer objective on an output's companion node.
///
/// No supervision is involved: the objective is a property of the output
/// distribution itself. Only the linear and quadratic kinds are meaningful
/// here; anything else is fatal.
pub fn compute_regularizer(
    kind: ObjectiveKind,
    output_name: &str,
    output: ArrayView2<'_, f32>,
    want_deriv: bool,
) -> Result<ObjectiveValue> {
    match kind {
        ObjectiveKind::Linear => {
            // objf = sum y
            let weight = output.nrows() as f32;
            let objf = output.sum();
            let deriv = want_deriv.then(|| Array2::ones(output.raw_dim()));
            Ok(ObjectiveValue { weight, objf, deriv })
        }
        ObjectiveKind::Quadratic => {
            // objf = -0.5 * sum y^2
            let weight = output.nrows() as f32;
            let objf = -0.5 * output.iter().map(|y| y * y).sum::<f32>();
            let deriv = want_deriv.then(|| output.to_owned());
            Ok(ObjectiveValue { weight, objf, deriv })
        }
        other => Err(TrainError::UnhandledRegularizer {
            name: output_name.to_string(),
            kind: other,
        }),
    }
}
