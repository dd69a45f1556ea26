/// Implementation of `argmin::IterState` for the high-score optimizer
use crate::chains::HighScoreChains;
use crate::errors::{HsoError, Result};
use crate::history::{HistoryEntry, ModelHistory};
use crate::phases::PhaseState;

use argmin::core::{Problem, State, TerminationReason, TerminationStatus};
use ndarray::Array1;
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maintains the state from iteration to iteration of the [crate::HighScoreSolver].
///
/// The model history and the chains are not serialized with the state: they are
/// persisted incrementally and rebuilt on resumption (see [crate::RunCheckpoint]).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HighScoreState {
    /// Last recorded model
    pub param: Option<Array1<f64>>,
    /// Reference misfit of the last recorded model
    pub cost: Option<f64>,
    /// Best model of the reference realization
    pub best_param: Option<Array1<f64>>,
    /// Best reference misfit
    pub best_cost: Option<f64>,
    /// Target reference misfit
    #[serde(with = "crate::utils::neg_inf_as_null")]
    pub target_cost: f64,

    /// Current iteration
    pub iter: u64,
    /// Iteration number of last best cost
    pub last_best_iter: u64,
    /// Maximum number of iterations
    pub max_iters: u64,
    /// Evaluation counts
    pub counts: HashMap<String, u64>,
    /// Time required so far
    pub time: Option<web_time::Duration>,
    /// Optimization status
    pub termination_status: TerminationStatus,

    /// Sampler phase state
    pub phase: PhaseState,
    /// Number of recorded models
    pub n_models: usize,
    /// Current number of consecutive failed evaluations
    pub failures: usize,

    /// Evaluated models
    #[serde(skip)]
    pub history: Option<ModelHistory>,
    /// High-score chains, one per bootstrap realization
    #[serde(skip)]
    pub chains: Option<HighScoreChains>,

    /// Random number generator for reproducibility
    pub rng: Option<Xoshiro256Plus>,
}

impl HighScoreState {
    /// Set the model history and the high-score chains
    pub fn records(mut self, history: ModelHistory, chains: HighScoreChains) -> Self {
        self.n_models = history.count();
        self.history = Some(history);
        self.chains = Some(chains);
        self
    }

    /// Set the random number generator used to draw candidates
    pub fn rng(mut self, rng: Xoshiro256Plus) -> Self {
        self.rng = Some(rng);
        self
    }

    /// Moves the current random number generator out and replaces it internally with `None`.
    pub fn take_rng(&mut self) -> Option<Xoshiro256Plus> {
        self.rng.take()
    }

    /// Model history
    pub fn history(&self) -> Option<&ModelHistory> {
        self.history.as_ref()
    }

    /// High-score chains
    pub fn chains(&self) -> Option<&HighScoreChains> {
        self.chains.as_ref()
    }

    /// Best model of realization `b`
    pub fn best_entry(&self, b: usize) -> Option<&HistoryEntry> {
        let chains = self.chains.as_ref()?;
        let history = self.history.as_ref()?;
        if b < chains.n_chains() {
            chains.best_entry(b, history)
        } else {
            None
        }
    }

    /// Appends an evaluated model to the history and offers it to the chains.
    ///
    /// Nothing is recorded when the misfits are inconsistent with the bootstrap weights.
    pub fn record(&mut self, x: Array1<f64>, misfits: Array1<f64>) -> Result<&HistoryEntry> {
        let (Some(history), Some(chains)) = (self.history.as_mut(), self.chains.as_mut()) else {
            return Err(HsoError::InvalidValue(
                "state history not initialized".to_string(),
            ));
        };
        let entry = history.append(x, misfits)?;
        chains.update(entry)?;
        self.n_models = entry.index + 1;
        self.cost = Some(entry.reference_misfit());
        self.param = Some(entry.x.clone());
        Ok(entry)
    }
}

impl State for HighScoreState {
    /// Type of parameter vector
    type Param = Array1<f64>;
    /// Floating point precision
    type Float = f64;

    /// Create new `HighScoreState` instance
    ///
    /// # Example
    ///
    /// ```
    /// # use argmin::core::{State, TerminationStatus};
    /// use hiscore::HighScoreState;
    /// let state = HighScoreState::new();
    ///
    /// # assert!(state.param.is_none());
    /// # assert!(state.best_param.is_none());
    /// # assert_eq!(state.target_cost, f64::NEG_INFINITY);
    /// # assert_eq!(state.iter, 0);
    /// # assert_eq!(state.max_iters, u64::MAX);
    /// # assert_eq!(state.termination_status, TerminationStatus::NotTerminated);
    /// ```
    fn new() -> Self {
        HighScoreState {
            param: None,
            cost: None,
            best_param: None,
            best_cost: None,
            target_cost: f64::NEG_INFINITY,

            iter: 0,
            last_best_iter: 0,
            max_iters: u64::MAX,
            counts: HashMap::new(),
            time: Some(web_time::Duration::new(0, 0)),
            termination_status: TerminationStatus::NotTerminated,

            phase: PhaseState::default(),
            n_models: 0,
            failures: 0,

            history: None,
            chains: None,
            rng: Some(Xoshiro256Plus::from_entropy()),
        }
    }

    /// Picks up the best model of the reference realization. When it changed
    /// the last best iteration is set to the current one.
    fn update(&mut self) {
        let Some(best) = self.best_entry(0) else {
            return;
        };
        if self.best_cost != Some(best.reference_misfit()) {
            let (param, cost) = (best.x.clone(), best.reference_misfit());
            self.best_param = Some(param);
            self.best_cost = Some(cost);
            self.last_best_iter = self.iter;
        }
    }

    fn get_param(&self) -> Option<&Array1<f64>> {
        self.param.as_ref()
    }

    fn get_best_param(&self) -> Option<&Array1<f64>> {
        self.best_param.as_ref()
    }

    fn terminate_with(mut self, reason: TerminationReason) -> Self {
        self.termination_status = TerminationStatus::Terminated(reason);
        self
    }

    fn time(&mut self, time: Option<web_time::Duration>) -> &mut Self {
        self.time = time;
        self
    }

    fn get_cost(&self) -> f64 {
        self.cost.unwrap_or(f64::INFINITY)
    }

    fn get_best_cost(&self) -> f64 {
        self.best_cost.unwrap_or(f64::INFINITY)
    }

    fn get_target_cost(&self) -> f64 {
        self.target_cost
    }

    fn get_iter(&self) -> u64 {
        self.iter
    }

    fn get_last_best_iter(&self) -> u64 {
        self.last_best_iter
    }

    fn get_max_iters(&self) -> u64 {
        self.max_iters
    }

    fn get_termination_status(&self) -> &TerminationStatus {
        &self.termination_status
    }

    fn get_termination_reason(&self) -> Option<&TerminationReason> {
        match &self.termination_status {
            TerminationStatus::Terminated(reason) => Some(reason),
            TerminationStatus::NotTerminated => None,
        }
    }

    fn get_time(&self) -> Option<web_time::Duration> {
        self.time
    }

    fn increment_iter(&mut self) {
        self.iter += 1;
    }

    /// Set all function evaluation counts to the evaluation counts of another `Problem`.
    fn func_counts<O>(&mut self, problem: &Problem<O>) {
        for (k, &v) in problem.counts.iter() {
            let count = self.counts.entry(k.to_string()).or_insert(0);
            *count = v
        }
    }

    fn get_func_counts(&self) -> &HashMap<String, u64> {
        &self.counts
    }

    fn is_best(&self) -> bool {
        self.last_best_iter == self.iter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BootstrapWeights, MisfitNorm};
    use ndarray::array;

    fn state() -> HighScoreState {
        let weights = BootstrapWeights::new(&array![[1., 1.], [2., 0.]]).unwrap();
        let history = ModelHistory::new(weights, MisfitNorm::L1);
        let chains = HighScoreChains::new(2, 3).unwrap();
        HighScoreState::new().records(history, chains)
    }

    #[test]
    fn test_record_and_update_best() {
        let mut state = state();
        state.update();
        assert!(state.best_param.is_none());
        assert_eq!(state.get_best_cost(), f64::INFINITY);

        state.record(array![1.], array![2., 3.]).unwrap();
        state.update();
        assert_eq!(state.get_best_cost(), 5.);
        assert_eq!(state.n_models, 1);
        state.increment_iter();

        state.record(array![2.], array![1., 1.]).unwrap();
        state.update();
        assert_eq!(state.get_best_cost(), 2.);
        assert_eq!(state.best_param, Some(array![2.]));
        assert_eq!(state.last_best_iter, 1);
        assert!(state.is_best());
        state.increment_iter();

        // worse model, best unchanged
        state.record(array![3.], array![10., 0.]).unwrap();
        state.update();
        assert_eq!(state.get_best_cost(), 2.);
        assert_eq!(state.get_cost(), 10.);
        assert_eq!(state.last_best_iter, 1);
        // realization 1 only weights the first observation
        assert_eq!(state.best_entry(1).unwrap().x, array![2.]);
        assert!(state.best_entry(2).is_none());
    }

    #[test]
    fn test_record_rejects_inconsistent_misfits() {
        let mut state = state();
        assert!(state.record(array![1.], array![1., 2., 3.]).is_err());
        assert_eq!(state.n_models, 0);
        assert!(HighScoreState::new().record(array![1.], array![1.]).is_err());
    }

    #[test]
    fn test_state_serde_skips_records() {
        let mut state = state();
        state.record(array![1.], array![2., 3.]).unwrap();
        let json = serde_json::to_string(&state).unwrap();
        let back: HighScoreState = serde_json::from_str(&json).unwrap();
        assert!(back.history.is_none());
        assert_eq!(back.n_models, 1);
        assert_eq!(back.target_cost, f64::NEG_INFINITY);
        assert_eq!(back.param, Some(array![1.]));
    }
}
