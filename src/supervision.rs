//! Supervision storage encodings.
//!
//! Supervision (target) matrices arrive in one of three encodings: dense,
//! row-wise sparse, or a 16-bit quantized compressed form. The objective
//! engine must produce numerically equivalent results for all three, so each
//! variant carries exactly one densification path.

use ndarray::Array2;

/// A supervision matrix in one of the supported storage encodings.
#[derive(Debug, Clone)]
pub enum Supervision {
    /// Fully materialized targets.
    Dense(Array2<f32>),
    /// Row-wise sparse targets (e.g. one-hot or few-hot posteriors).
    Sparse(SparseMatrix),
    /// Quantized targets, traded precision for storage.
    Compressed(CompressedMatrix),
}

impl Supervision {
    pub fn num_rows(&self) -> usize {
        match self {
            Supervision::Dense(m) => m.nrows(),
            Supervision::Sparse(m) => m.num_rows(),
            Supervision::Compressed(m) => m.num_rows(),
        }
    }

    pub fn num_cols(&self) -> usize {
        match self {
            Supervision::Dense(m) => m.ncols(),
            Supervision::Sparse(m) => m.num_cols(),
            Supervision::Compressed(m) => m.num_cols(),
        }
    }

    /// Materialize the targets as a dense matrix.
    pub fn to_dense(&self) -> Array2<f32> {
        match self {
            Supervision::Dense(m) => m.clone(),
            Supervision::Sparse(m) => m.to_dense(),
            Supervision::Compressed(m) => m.to_dense(),
        }
    }

    /// Sum of all stored values.
    pub fn sum(&self) -> f32 {
        match self {
            Supervision::Dense(m) => m.sum(),
            Supervision::Sparse(m) => m.sum(),
            Supervision::Compressed(m) => m.sum(),
        }
    }
}

/// Row-wise sparse matrix: each row holds (column, value) pairs.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    num_cols: usize,
    rows: Vec<Vec<(usize, f32)>>,
}

impl SparseMatrix {
    /// Create from per-row (column, value) entries.
    ///
    /// Panics if any column index is out of range.
    pub fn new(num_cols: usize, rows: Vec<Vec<(usize, f32)>>) -> Self {
        for row in &rows {
            for &(col, _) in row {
                assert!(col < num_cols, "sparse column index {col} >= {num_cols}");
            }
        }
        Self { num_cols, rows }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// Iterate rows as slices of (column, value) pairs.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[(usize, f32)]> {
        self.rows.iter().map(Vec::as_slice)
    }

    pub fn to_dense(&self) -> Array2<f32> {
        let mut dense = Array2::zeros((self.rows.len(), self.num_cols));
        for (r, row) in self.rows.iter().enumerate() {
            for &(c, v) in row {
                dense[[r, c]] += v;
            }
        }
        dense
    }

    pub fn sum(&self) -> f32 {
        self.rows.iter().flatten().map(|&(_, v)| v).sum()
    }
}

/// Quantized matrix: values mapped linearly onto u16 codes.
///
/// Quantization error is bounded by half a step, i.e. (max - min) / 65535 / 2.
#[derive(Debug, Clone)]
pub struct CompressedMatrix {
    num_rows: usize,
    num_cols: usize,
    min: f32,
    step: f32,
    codes: Vec<u16>,
}

impl CompressedMatrix {
    pub fn from_dense(dense: &Array2<f32>) -> Self {
        let min = dense.iter().copied().fold(f32::INFINITY, f32::min);
        let max = dense.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let (min, step) = if dense.is_empty() || min > max {
            (0.0, 0.0)
        } else {
            (min, (max - min) / f32::from(u16::MAX))
        };
        let codes = dense
            .iter()
            .map(|&v| {
                if step == 0.0 {
                    0
                } else {
                    ((v - min) / step).round() as u16
                }
            })
            .collect();
        Self {
            num_rows: dense.nrows(),
            num_cols: dense.ncols(),
            min,
            step,
            codes,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn to_dense(&self) -> Array2<f32> {
        let values: Vec<f32> = self
            .codes
            .iter()
            .map(|&c| self.min + f32::from(c) * self.step)
            .collect();
        Array2::from_shape_vec((self.num_rows, self.num_cols), values)
            .expect("code vector length matches stored shape")
    }

    pub fn sum(&self) -> f32 {
        self.codes
            .iter()
            .map(|&c| self.min + f32::from(c) * self.step)
            .sum()
    }
}
