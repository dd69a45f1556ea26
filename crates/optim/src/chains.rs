//! Ranked lists of the best models, one per bootstrap realization.
use crate::errors::{HsoError, Result};
use crate::history::{stack_rows, HistoryEntry, ModelHistory};
use ndarray::{Array1, Array2, Axis};
use ndarray_stats::CorrelationExt;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A reference to a history entry together with its misfit for a given realization
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainLink {
    /// Misfit of the model for the chain realization
    pub misfit: f64,
    /// Sequence index of the model in the history
    pub index: usize,
}

impl ChainLink {
    /// Ordering by misfit then by sequence index
    fn rank(&self, other: &ChainLink) -> Ordering {
        self.misfit
            .total_cmp(&other.misfit)
            .then(self.index.cmp(&other.index))
    }
}

/// One bounded chain of size K per bootstrap realization, each sorted
/// by ascending misfit (ties broken by ascending sequence index).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HighScoreChains {
    chain_length: usize,
    chains: Vec<Vec<ChainLink>>,
}

impl HighScoreChains {
    /// Empty chains for `n_bootstrap` realizations, each keeping at most `chain_length` models
    pub fn new(n_bootstrap: usize, chain_length: usize) -> Result<Self> {
        if chain_length == 0 {
            return Err(HsoError::InvalidConfigError(
                "chain length should be strictly positive".to_string(),
            ));
        }
        if n_bootstrap == 0 {
            return Err(HsoError::InvalidConfigError(
                "at least one bootstrap realization is required".to_string(),
            ));
        }
        Ok(HighScoreChains {
            chain_length,
            chains: vec![Vec::new(); n_bootstrap],
        })
    }

    /// Rebuilds chains by replaying the given entries in order
    pub fn replay<'a>(
        n_bootstrap: usize,
        chain_length: usize,
        entries: impl IntoIterator<Item = &'a HistoryEntry>,
    ) -> Result<Self> {
        let mut chains = Self::new(n_bootstrap, chain_length)?;
        for entry in entries {
            chains.update(entry)?;
        }
        Ok(chains)
    }

    /// Offers a new entry to every chain.
    ///
    /// The entry enters a chain when it is not full, or takes the place of the
    /// worst member when strictly better. Returns the number of chains it entered.
    pub fn update(&mut self, entry: &HistoryEntry) -> Result<usize> {
        if entry.bootstrap_misfits.len() != self.chains.len() {
            return Err(HsoError::InvalidValue(format!(
                "expected {} bootstrap misfits, got {}",
                self.chains.len(),
                entry.bootstrap_misfits.len()
            )));
        }
        let mut entered = 0;
        for (chain, &misfit) in self.chains.iter_mut().zip(entry.bootstrap_misfits.iter()) {
            let link = ChainLink {
                misfit,
                index: entry.index,
            };
            let pos = chain.partition_point(|l| l.rank(&link) == Ordering::Less);
            if pos < self.chain_length {
                chain.insert(pos, link);
                chain.truncate(self.chain_length);
                entered += 1;
            }
        }
        Ok(entered)
    }

    /// Maximum number of models per chain
    pub fn chain_length(&self) -> usize {
        self.chain_length
    }

    /// Number of chains (bootstrap realizations)
    pub fn n_chains(&self) -> usize {
        self.chains.len()
    }

    /// Members of chain `b`, best first, `None` when `b` is not a realization
    pub fn chain(&self, b: usize) -> Option<&[ChainLink]> {
        self.chains.get(b).map(|c| c.as_slice())
    }

    /// Number of members of chain `b`, 0 when `b` is not a realization
    pub fn len(&self, b: usize) -> usize {
        self.chains.get(b).map_or(0, |c| c.len())
    }

    /// Whether all chains are empty
    pub fn is_empty(&self) -> bool {
        self.chains.iter().all(|c| c.is_empty())
    }

    /// Best member of chain `b`
    pub fn best(&self, b: usize) -> Option<ChainLink> {
        self.chains.get(b)?.first().copied()
    }

    /// Worst member of chain `b`
    pub fn worst(&self, b: usize) -> Option<ChainLink> {
        self.chains.get(b)?.last().copied()
    }

    /// History entry of the best member of chain `b`
    pub fn best_entry<'a>(&self, b: usize, history: &'a ModelHistory) -> Option<&'a HistoryEntry> {
        self.best(b).and_then(|l| history.get(l.index))
    }

    /// Parameter vectors of chain `b` members as a (len, nx) matrix
    pub fn models(&self, b: usize, history: &ModelHistory) -> Array2<f64> {
        stack_rows(
            self.chain(b)
                .unwrap_or_default()
                .iter()
                .filter_map(|l| history.get(l.index))
                .map(|e| e.x.view()),
        )
    }

    /// Mean and covariance of the parameter vectors of chain `b`.
    ///
    /// Returns `None` when the chain holds fewer than 2 models.
    pub fn mean_and_covariance(
        &self,
        b: usize,
        history: &ModelHistory,
    ) -> Option<(Array1<f64>, Array2<f64>)> {
        if self.len(b) < 2 {
            return None;
        }
        let xs = self.models(b, history);
        let mean = xs.mean_axis(Axis(0))?;
        let cov = xs.t().cov(1.).ok()?;
        Some((mean, cov))
    }
}
