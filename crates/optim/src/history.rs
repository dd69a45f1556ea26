//! Append-only record of every evaluated model.
use crate::bootstrap::{BootstrapWeights, MisfitNorm};
use crate::errors::{HsoError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// One evaluated model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Sequence index in the history, starting at 0
    pub index: usize,
    /// Parameter vector
    pub x: Array1<f64>,
    /// Per-observation misfits as returned by the problem evaluation
    pub misfits: Array1<f64>,
    /// Global misfit of each bootstrap realization
    pub bootstrap_misfits: Array1<f64>,
}

impl HistoryEntry {
    /// Global misfit of the reference (unweighted) realization
    pub fn reference_misfit(&self) -> f64 {
        self.bootstrap_misfits[0]
    }
}

/// Models evaluated so far, in insertion order.
///
/// Entries are never removed nor modified once appended: chains and harvests
/// refer to them by sequence index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelHistory {
    weights: BootstrapWeights,
    norm: MisfitNorm,
    entries: Vec<HistoryEntry>,
}

impl ModelHistory {
    /// An empty history combining misfits with the given weights and norm
    pub fn new(weights: BootstrapWeights, norm: MisfitNorm) -> Self {
        ModelHistory {
            weights,
            norm,
            entries: Vec::new(),
        }
    }

    /// Appends an evaluated model, computing its bootstrap misfits
    pub fn append(&mut self, x: Array1<f64>, misfits: Array1<f64>) -> Result<&HistoryEntry> {
        if let Some(first) = self.entries.first() {
            if first.x.len() != x.len() {
                return Err(HsoError::InvalidValue(format!(
                    "model dimension changed from {} to {}",
                    first.x.len(),
                    x.len()
                )));
            }
        }
        let bootstrap_misfits = self.weights.combine(&misfits, self.norm)?;
        let index = self.entries.len();
        self.entries.push(HistoryEntry {
            index,
            x,
            misfits,
            bootstrap_misfits,
        });
        Ok(&self.entries[index])
    }

    /// Iterates over all entries in insertion order
    pub fn all(&self) -> std::slice::Iter<'_, HistoryEntry> {
        self.entries.iter()
    }

    /// Entry at the given sequence index
    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    /// Entries with sequence index `start..`
    pub fn since(&self, start: usize) -> &[HistoryEntry] {
        &self.entries[start.min(self.entries.len())..]
    }

    /// Number of entries
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Whether no model was appended yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bootstrap weights used to combine misfits
    pub fn weights(&self) -> &BootstrapWeights {
        &self.weights
    }

    /// Norm used to combine misfits
    pub fn norm(&self) -> MisfitNorm {
        self.norm
    }

    /// Parameter vectors as a (n_models, nx) matrix
    pub fn xs(&self) -> Array2<f64> {
        stack_rows(self.entries.iter().map(|e| e.x.view()))
    }

    /// Bootstrap misfits as a (n_models, n_bootstrap) matrix
    pub fn bootstrap_misfits(&self) -> Array2<f64> {
        stack_rows(self.entries.iter().map(|e| e.bootstrap_misfits.view()))
    }
}

pub(crate) fn stack_rows<'a>(rows: impl Iterator<Item = ArrayView1<'a, f64>>) -> Array2<f64> {
    let rows: Vec<_> = rows.map(|r| r.insert_axis(Axis(0))).collect();
    if rows.is_empty() {
        Array2::zeros((0, 0))
    } else {
        // rows share the same length as checked on append
        ndarray::concatenate(Axis(0), &rows).unwrap_or_else(|_| Array2::zeros((0, 0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn history() -> ModelHistory {
        let weights = BootstrapWeights::new(&array![[1., 1.], [0., 2.]]).unwrap();
        ModelHistory::new(weights, MisfitNorm::L2)
    }

    #[test]
    fn test_append_assigns_indices() {
        let mut history = history();
        let entry = history.append(array![0.5], array![3., 4.]).unwrap();
        assert_eq!(entry.index, 0);
        assert_abs_diff_eq!(entry.reference_misfit(), 5., epsilon = 1e-12);
        assert_abs_diff_eq!(
            entry.bootstrap_misfits[1],
            32.0_f64.sqrt(),
            epsilon = 1e-12
        );
        let entry = history.append(array![0.1], array![0., 1.]).unwrap();
        assert_eq!(entry.index, 1);
        assert_eq!(history.count(), 2);
        assert_eq!(history.since(1).len(), 1);
        assert_eq!(history.since(5).len(), 0);
    }

    #[test]
    fn test_append_rejects_bad_misfits() {
        let mut history = history();
        assert!(history.append(array![0.5], array![1., 2., 3.]).is_err());
        assert!(history.is_empty());
        history.append(array![0.5], array![1., 2.]).unwrap();
        assert!(history.append(array![0.5, 1.], array![1., 2.]).is_err());
        assert_eq!(history.count(), 1);
    }

    #[test]
    fn test_all_is_restartable() {
        let mut history = history();
        for i in 0..5 {
            history.append(array![i as f64], array![i as f64, 1.]).unwrap();
        }
        let first: Vec<usize> = history.all().map(|e| e.index).collect();
        let second: Vec<usize> = history.all().map(|e| e.index).collect();
        assert_eq!(first, vec![0, 1, 2, 3, 4]);
        assert_eq!(first, second);
        assert_eq!(history.xs(), array![[0.], [1.], [2.], [3.], [4.]]);
        assert_eq!(history.bootstrap_misfits().dim(), (5, 2));
    }
}
