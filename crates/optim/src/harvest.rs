//! Collection of the best models of all realizations at the end of a run.
//!
//! The ensemble of models harvested from the chains of every bootstrap
//! realization gives an estimate of the parameter uncertainties.
use crate::chains::HighScoreChains;
use crate::errors::HsoError;
use crate::history::ModelHistory;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How chains and models with poor reference misfits are discarded from a harvest
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weeding {
    /// Keep everything
    #[default]
    None,
    /// Keep only chains whose harvested models all have a reference misfit
    /// below mean + std of all harvested models
    OutlierChains,
    /// Drop outlier chains then models whose reference misfit exceeds the mean
    OutlierChainsAndModels,
    /// Keep the reference chain only
    ReferenceOnly,
}

impl TryFrom<u8> for Weeding {
    type Error = HsoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Weeding::None),
            1 => Ok(Weeding::OutlierChains),
            2 => Ok(Weeding::OutlierChainsAndModels),
            3 => Ok(Weeding::ReferenceOnly),
            _ => Err(HsoError::InvalidConfigError(format!(
                "weeding mode should be in 0..=3, got {value}"
            ))),
        }
    }
}

/// Sequence indices of the `n_best` best models of each chain after weeding.
///
/// Models appearing in several chains are returned once, in order of first
/// appearance (chain 0 first).
pub fn harvest(
    history: &ModelHistory,
    chains: &HighScoreChains,
    n_best: usize,
    weeding: Weeding,
) -> Vec<usize> {
    let n_chains = match weeding {
        Weeding::ReferenceOnly => 1.min(chains.n_chains()),
        _ => chains.n_chains(),
    };
    let picks: Vec<Vec<usize>> = (0..n_chains)
        .map(|b| {
            chains
                .chain(b)
                .unwrap_or_default()
                .iter()
                .take(n_best)
                .map(|l| l.index)
                .filter(|&i| history.get(i).is_some())
                .collect()
        })
        .collect();
    let reference = |i: &usize| {
        history
            .get(*i)
            .map(|e| e.reference_misfit())
            .unwrap_or(f64::NAN)
    };

    match weeding {
        Weeding::None | Weeding::ReferenceOnly => dedup(picks.iter().flatten().copied()),
        Weeding::OutlierChains | Weeding::OutlierChainsAndModels => {
            let all = dedup(picks.iter().flatten().copied());
            if all.is_empty() {
                return all;
            }
            let misfits: Array1<f64> = all.iter().map(reference).collect();
            let mean = misfits.mean().unwrap_or(f64::NAN);
            let threshold = mean + misfits.std(0.);
            let kept = dedup(
                picks
                    .iter()
                    .filter(|p| p.iter().all(|i| reference(i) < threshold))
                    .flatten()
                    .copied(),
            );
            if weeding == Weeding::OutlierChainsAndModels {
                kept.into_iter().filter(|i| reference(i) <= mean).collect()
            } else {
                kept
            }
        }
    }
}

fn dedup(indices: impl Iterator<Item = usize>) -> Vec<usize> {
    let mut seen = HashSet::new();
    indices.filter(|i| seen.insert(*i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BootstrapWeights, MisfitNorm};
    use ndarray::array;

    // 3 realizations over 3 observations, L1 norm
    fn run() -> (ModelHistory, HighScoreChains) {
        let weights =
            BootstrapWeights::new(&array![[1., 1., 1.], [3., 0., 0.], [0., 0., 3.]]).unwrap();
        let mut history = ModelHistory::new(weights, MisfitNorm::L1);
        let mut chains = HighScoreChains::new(3, 2).unwrap();
        for (x, m) in [
            (0., array![1., 1., 1.]),
            (1., array![0., 2., 2.]),
            (2., array![2., 2., 0.]),
            (3., array![4., 4., 4.]),
        ] {
            let entry = history.append(array![x], m).unwrap();
            chains.update(entry).unwrap();
        }
        (history, chains)
    }

    #[test]
    fn test_weeding_modes() {
        assert_eq!(Weeding::try_from(2).unwrap(), Weeding::OutlierChainsAndModels);
        assert!(Weeding::try_from(4).is_err());
    }

    #[test]
    fn test_harvest_dedup() {
        let (history, chains) = run();
        // chain 0: [0 (3), 1 (4)], chain 1: [1 (0), 0 (3)], chain 2: [2 (0), 0 (3)]
        assert_eq!(harvest(&history, &chains, 2, Weeding::None), vec![0, 1, 2]);
        assert_eq!(harvest(&history, &chains, 1, Weeding::None), vec![0, 1, 2]);
        assert_eq!(harvest(&history, &chains, 2, Weeding::ReferenceOnly), vec![0, 1]);
        assert!(harvest(&history, &chains, 0, Weeding::None).is_empty());
    }

    #[test]
    fn test_harvest_weeding() {
        let (history, chains) = run();
        // reference misfits of harvested models: 3, 4, 4 -> mean 11/3, std ~0.47
        // every model is below 4.14, all chains kept
        assert_eq!(
            harvest(&history, &chains, 2, Weeding::OutlierChains),
            vec![0, 1, 2]
        );
        // models above the mean are dropped
        assert_eq!(
            harvest(&history, &chains, 2, Weeding::OutlierChainsAndModels),
            vec![0]
        );
    }

    #[test]
    fn test_harvest_drops_outlier_chain() {
        let weights =
            BootstrapWeights::new(&array![[1., 1., 1.], [3., 0., 0.], [0., 0., 3.]]).unwrap();
        let mut history = ModelHistory::new(weights, MisfitNorm::L1);
        let mut chains = HighScoreChains::new(3, 1).unwrap();
        for (x, m) in [
            (0., array![0.5, 0.25, 0.25]),
            (1., array![0., 0.5, 0.5]),
            (2., array![0., 10., 0.]),
        ] {
            let entry = history.append(array![x], m).unwrap();
            chains.update(entry).unwrap();
        }
        // realization 2 prefers model 2 whose reference misfit is 10
        // harvested: 1, 1, 10 -> mean 4, std ~4.24
        assert_eq!(harvest(&history, &chains, 1, Weeding::None), vec![0, 1, 2]);
        assert_eq!(harvest(&history, &chains, 1, Weeding::OutlierChains), vec![0, 1]);
        assert_eq!(
            harvest(&history, &chains, 1, Weeding::OutlierChainsAndModels),
            vec![0, 1]
        );
    }

    #[test]
    fn test_harvest_drops_chain_holding_one_outlier() {
        let weights = BootstrapWeights::new(&array![[1., 1., 1.], [0., 0., 3.]]).unwrap();
        let mut history = ModelHistory::new(weights, MisfitNorm::L1);
        let mut chains = HighScoreChains::new(2, 2).unwrap();
        for m in [
            array![0.5, 0.25, 0.25],
            array![0.5, 0., 0.5],
            array![0., 0.5, 0.5],
            array![0.25, 0.25, 0.5],
            array![4.5, 4.5, 0.],
        ] {
            let entry = history.append(array![0.], m).unwrap();
            chains.update(entry).unwrap();
        }
        // chain 0: [0, 1], chain 1: [4 (ref 9), 0 (ref 1)]
        // harvested: 1, 1, 9 -> threshold ~7.44, chain 1 mean of 5 is below it
        assert_eq!(harvest(&history, &chains, 2, Weeding::None), vec![0, 1, 4]);
        assert_eq!(harvest(&history, &chains, 2, Weeding::OutlierChains), vec![0, 1]);
        assert_eq!(
            harvest(&history, &chains, 2, Weeding::OutlierChainsAndModels),
            vec![0, 1]
        );
    }
}
