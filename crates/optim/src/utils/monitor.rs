use crate::chains::ChainLink;
use crate::history::HistoryEntry;
use crate::HighScoreState;

use argmin::core::observers::Observe;
use argmin::core::{Error, State, KV};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Contents of one high-score chain at a given iteration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    /// Best model of the chain
    pub best: Option<HistoryEntry>,
    /// Misfit of the worst model kept by the chain
    pub worst_misfit: Option<f64>,
    /// Chain members, best first
    pub links: Vec<ChainLink>,
}

/// Progress of a run as published after each iteration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// Number of completed iterations
    pub iter: u64,
    /// Number of recorded models
    pub n_models: usize,
    /// Index of the current sampler phase
    pub phase_index: usize,
    /// One snapshot per bootstrap realization
    pub chains: Vec<ChainSnapshot>,
}

impl RunSnapshot {
    fn from_state(state: &HighScoreState) -> Self {
        let chains = match (state.chains(), state.history()) {
            (Some(chains), Some(history)) => (0..chains.n_chains())
                .map(|b| ChainSnapshot {
                    best: chains.best_entry(b, history).cloned(),
                    worst_misfit: chains.worst(b).map(|l| l.misfit),
                    links: chains.chain(b).map(<[ChainLink]>::to_vec).unwrap_or_default(),
                })
                .collect(),
            _ => vec![],
        };
        RunSnapshot {
            iter: state.get_iter(),
            n_models: state.n_models,
            phase_index: state.phase.phase_index,
            chains,
        }
    }
}

/// An observer publishing a [`RunSnapshot`] after initialization and after
/// every iteration.
///
/// The monitor is cheap to clone: clones share the published snapshot and can
/// be read from other threads while the optimization is running.
#[derive(Clone, Debug, Default)]
pub struct ChainMonitor {
    snapshot: Arc<RwLock<Option<RunSnapshot>>>,
}

impl ChainMonitor {
    /// A monitor with nothing published yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Last published snapshot
    pub fn snapshot(&self) -> Option<RunSnapshot> {
        self.snapshot.read().ok().and_then(|s| s.clone())
    }

    /// Best model of realization `b` in the last published snapshot
    pub fn current_best(&self, b: usize) -> Option<HistoryEntry> {
        let snapshot = self.snapshot.read().ok()?;
        snapshot.as_ref()?.chains.get(b)?.best.clone()
    }

    fn publish(&self, state: &HighScoreState) {
        let snapshot = RunSnapshot::from_state(state);
        match self.snapshot.write() {
            Ok(mut guard) => *guard = Some(snapshot),
            Err(poisoned) => *poisoned.into_inner() = Some(snapshot),
        }
    }
}

impl Observe<HighScoreState> for ChainMonitor {
    fn observe_init(&mut self, _name: &str, state: &HighScoreState, _kv: &KV) -> Result<(), Error> {
        self.publish(state);
        Ok(())
    }

    fn observe_iter(&mut self, state: &HighScoreState, _kv: &KV) -> Result<(), Error> {
        self.publish(state);
        Ok(())
    }
}
