//! The high-score bootstrap algorithm as an `argmin::Solver`.
//!
//! One solver iteration evaluates a batch of at most `n_parallel` candidates
//! proposed by the current sampler phase. Batches never straddle two phases.
//! Candidates are evaluated concurrently but their results are recorded in
//! submission order so that a seeded run is reproducible whatever the thread
//! scheduling.
use crate::chains::HighScoreChains;
use crate::errors::{HsoError, Result};
use crate::history::ModelHistory;
use crate::phases::{propose, PhaseState};
use crate::solver::{HighScoreState, ValidHighScoreConfig};
use crate::types::MisfitProblem;
use crate::utils::HISCORE_LOG;

use argmin::core::{Problem, Solver, State, TerminationReason, TerminationStatus, KV};
use env_logger::{Builder, Env};
use hiscore_space::BoundedParameterSpace;
use log::{debug, info, warn};
use ndarray::{Array1, Array2};
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use web_time::Instant;

/// Key of the evaluation counter in the argmin problem counts
pub const EVAL_COUNT: &str = "misfit_count";

/// A cooperative stop request shared with a running optimization.
///
/// The request is checked between iterations: the iteration in progress
/// completes and its results are recorded (and checkpointed) before the run ends.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Requests the run to stop
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// High-score bootstrap solver
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HighScoreSolver {
    /// Validated configuration
    pub(crate) config: ValidHighScoreConfig,
    /// Matrix (nx, 2) of [lower bound, upper bound] of the nx components of x
    pub(crate) xlimits: Array2<f64>,
    /// Number of models kept by each high-score chain
    pub(crate) chain_length: usize,
    /// Stop request, not persisted
    #[serde(skip)]
    pub(crate) stop: StopSignal,
}

impl HighScoreSolver {
    /// Constructor of the solver exploring the given parameter space.
    ///
    /// Logging is initialized here, its level is read from the `HISCORE_LOG`
    /// environment variable (default to info).
    pub fn new(config: ValidHighScoreConfig, space: &BoundedParameterSpace) -> Self {
        let env = Env::new().filter_or(HISCORE_LOG, "info");
        let mut builder = Builder::from_env(env);
        let builder = builder.target(env_logger::Target::Stdout);
        builder.try_init().ok();
        let chain_length = config.chain_length(space.ndim());
        HighScoreSolver {
            config,
            xlimits: space.xlimits().to_owned(),
            chain_length,
            stop: StopSignal::default(),
        }
    }

    /// Validated configuration
    pub fn config(&self) -> &ValidHighScoreConfig {
        &self.config
    }

    /// Number of models kept by each high-score chain
    pub fn chain_length(&self) -> usize {
        self.chain_length
    }

    /// Handle to request the solver to stop
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Checks the problem is consistent with the solver configuration
    pub fn check_problem<P: MisfitProblem>(&self, problem: &P) -> Result<()> {
        let xlimits = problem.bounds().xlimits();
        if xlimits != self.xlimits {
            return Err(HsoError::InvalidConfigError(format!(
                "problem bounds {xlimits} differ from solver bounds {}",
                self.xlimits
            )));
        }
        let weights = problem.bootstrap_weights();
        if weights.n_bootstrap() != self.config.n_bootstrap() {
            return Err(HsoError::InvalidConfigError(format!(
                "expected {} bootstrap realizations, problem weights have {}",
                self.config.n_bootstrap(),
                weights.n_bootstrap()
            )));
        }
        let nx = self.xlimits.nrows();
        for phase in self.config.phases() {
            phase.check(nx)?;
        }
        Ok(())
    }

    /// Evaluates a batch of candidates proposed for the current phase and
    /// records them in submission order.
    fn batch_iteration<P: MisfitProblem>(
        &self,
        problem: &mut Problem<P>,
        mut state: HighScoreState,
    ) -> Result<HighScoreState> {
        let phases = self.config.phases();
        let Some(phase) = state.phase.current(phases) else {
            return Ok(state);
        };
        let pb = problem
            .problem
            .as_ref()
            .ok_or_else(|| HsoError::InvalidValue("problem is not available".to_string()))?;
        let mut rng = state
            .take_rng()
            .ok_or_else(|| HsoError::InvalidValue("random generator is not available".to_string()))?;
        let (Some(history), Some(chains)) = (state.history.as_ref(), state.chains.as_ref()) else {
            return Err(HsoError::InvalidValue(
                "state history not initialized".to_string(),
            ));
        };

        let first = state.phase.iter_in_phase;
        let n_batch = state.phase.remaining(phases).min(self.config.n_parallel());
        let mut next_bootstrap = state.phase.next_bootstrap;
        let mut attempts = vec![0; n_batch];
        let mut pending: Vec<(usize, Array1<f64>)> = (0..n_batch)
            .map(|slot| {
                let x = propose(
                    phase,
                    first + slot,
                    0,
                    &mut next_bootstrap,
                    pb,
                    history,
                    chains,
                    &mut rng,
                );
                (slot, x)
            })
            .collect();

        let mut results: Vec<Option<(Array1<f64>, Array1<f64>)>> = vec![None; n_batch];
        let mut failures = state.failures;
        let mut n_evals = 0;
        while !pending.is_empty() {
            let outcomes: Vec<_> = pending
                .par_iter()
                .map(|(_, x)| pb.evaluate(&x.view()))
                .collect();
            n_evals += pending.len();

            let mut retries = vec![];
            for ((slot, x), outcome) in pending.into_iter().zip(outcomes) {
                let reason = match outcome {
                    Ok(misfits) if misfits.iter().all(|m| m.is_finite()) => {
                        failures = 0;
                        results[slot] = Some((x, misfits));
                        continue;
                    }
                    Ok(misfits) => format!("non finite misfits {misfits}"),
                    Err(err) => err.message,
                };
                failures += 1;
                warn!("Evaluation failed at x={x}: {reason}");
                if failures > self.config.max_failures() {
                    return Err(HsoError::EvaluationError(format!(
                        "{failures} consecutive evaluation failures, last one: {reason}"
                    )));
                }
                attempts[slot] += 1;
                let x = propose(
                    phase,
                    first + slot,
                    attempts[slot],
                    &mut next_bootstrap,
                    pb,
                    history,
                    chains,
                    &mut rng,
                );
                retries.push((slot, x));
            }
            pending = retries;
        }
        *problem.counts.entry(EVAL_COUNT).or_insert(0) += n_evals as u64;

        state.failures = failures;
        state.phase.next_bootstrap = next_bootstrap;
        for (x, misfits) in results.into_iter().flatten() {
            let entry = state.record(x, misfits)?;
            debug!(
                "Model #{} misfits {} at x={}",
                entry.index, entry.bootstrap_misfits, entry.x
            );
            let from = state.phase.phase_index;
            if state.phase.advance(phases) {
                match state.phase.current(phases) {
                    Some(next) => info!(
                        "Phase {} ({}) completed, entering phase {} ({})",
                        from,
                        phases[from].name(),
                        state.phase.phase_index,
                        next.name()
                    ),
                    None => info!("Phase {} ({}) completed, last phase", from, phases[from].name()),
                }
            }
        }
        Ok(state.rng(rng))
    }
}

impl<O: MisfitProblem> Solver<O, HighScoreState> for HighScoreSolver {
    const NAME: &'static str = "HighScore";

    fn init(
        &mut self,
        problem: &mut Problem<O>,
        state: HighScoreState,
    ) -> std::result::Result<(HighScoreState, Option<KV>), argmin::core::Error> {
        let pb = problem
            .problem
            .as_ref()
            .ok_or_else(|| HsoError::InvalidValue("problem is not available".to_string()))?;
        self.check_problem(pb)?;

        let rng = if let Some(seed) = self.config.seed() {
            Xoshiro256Plus::seed_from_u64(seed)
        } else {
            Xoshiro256Plus::from_entropy()
        };
        let weights = pb.bootstrap_weights().clone();
        let chains = HighScoreChains::new(weights.n_bootstrap(), self.chain_length)?;
        let history = ModelHistory::new(weights, pb.norm_exponent());

        let mut initial_state = state.records(history, chains).rng(rng);
        initial_state.max_iters = self.config.max_iters();
        initial_state.target_cost = self.config.target();
        initial_state.phase = PhaseState::begin(self.config.phases());
        initial_state.last_best_iter = 0;

        debug!("Initial State = {initial_state:?}");
        info!(
            "{} setting: {}",
            HISCORE_LOG,
            std::env::var(HISCORE_LOG).is_ok()
        );
        info!(
            "********* Initialization: {} phase(s), {} proposals, {} realization(s), chain length {}",
            self.config.phases().len(),
            self.config.n_iterations(),
            self.config.n_bootstrap(),
            self.chain_length
        );
        Ok((initial_state, None))
    }

    fn next_iter(
        &mut self,
        problem: &mut Problem<O>,
        state: HighScoreState,
    ) -> std::result::Result<(HighScoreState, Option<KV>), argmin::core::Error> {
        debug!(
            "********* Start iteration {}/{}",
            state.get_iter() + 1,
            state.get_max_iters()
        );
        let now = Instant::now();
        let new_state = self.batch_iteration(problem, state)?;
        match new_state.best_entry(0) {
            Some(best) => info!(
                "********* End iteration {}/{} in {:.3}s: {} models, best misfit(x[{}])={} at x={}",
                new_state.get_iter() + 1,
                new_state.get_max_iters(),
                now.elapsed().as_secs_f64(),
                new_state.n_models,
                best.index,
                best.reference_misfit(),
                best.x
            ),
            None => info!(
                "********* End iteration {}/{} in {:.3}s: no model",
                new_state.get_iter() + 1,
                new_state.get_max_iters(),
                now.elapsed().as_secs_f64(),
            ),
        }
        Ok((new_state, None))
    }

    fn terminate(&mut self, state: &HighScoreState) -> TerminationStatus {
        debug!(">>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>> end iteration");
        debug!("Current Cost {:?}", state.get_cost());
        debug!("Best cost {:?}", state.get_best_cost());
        debug!("Phase {:?}", state.phase);

        if self.stop.is_stopped() {
            info!("Stop requested after {} models", state.n_models);
            return TerminationStatus::Terminated(TerminationReason::SolverExit(
                "stop requested".to_string(),
            ));
        }
        if state.phase.is_terminal(self.config.phases()) {
            return TerminationStatus::Terminated(TerminationReason::MaxItersReached);
        }
        if state.get_best_cost() <= state.get_target_cost() {
            return TerminationStatus::Terminated(TerminationReason::TargetCostReached);
        }
        TerminationStatus::NotTerminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BootstrapWeights, EvaluationError, HighScoreConfig, MisfitFunc, PhaseSpec};
    use ndarray::{array, ArrayView1};

    type AbsFn = fn(&ArrayView1<f64>) -> std::result::Result<Array1<f64>, EvaluationError>;
    type AbsProblem = MisfitFunc<AbsFn>;

    fn abs(x: &ArrayView1<f64>) -> std::result::Result<Array1<f64>, EvaluationError> {
        Ok(x.mapv(f64::abs))
    }

    fn space() -> BoundedParameterSpace {
        BoundedParameterSpace::new(&array![[-1., 1.], [-1., 1.]]).unwrap()
    }

    fn problem(space: BoundedParameterSpace) -> AbsProblem {
        MisfitFunc::new(space, BootstrapWeights::unweighted(2).unwrap(), abs as AbsFn)
    }

    fn solver(n_bootstrap: usize) -> HighScoreSolver {
        let config = HighScoreConfig::default()
            .phases(vec![PhaseSpec::uniform(5), PhaseSpec::directed(5, 1., 0.1)])
            .n_bootstrap(n_bootstrap)
            .n_parallel(2)
            .seed(0)
            .check()
            .unwrap();
        HighScoreSolver::new(config, &space())
    }

    fn terminate(solver: &mut HighScoreSolver, state: &HighScoreState) -> TerminationStatus {
        <HighScoreSolver as Solver<AbsProblem, HighScoreState>>::terminate(solver, state)
    }

    #[test]
    fn test_check_problem() {
        assert!(solver(1).check_problem(&problem(space())).is_ok());
        assert!(matches!(
            solver(3).check_problem(&problem(space())),
            Err(HsoError::InvalidConfigError(_))
        ));
        let other = BoundedParameterSpace::new(&array![[-2., 1.], [-1., 1.]]).unwrap();
        assert!(solver(1).check_problem(&problem(other)).is_err());
    }

    #[test]
    fn test_iterations_follow_phases() {
        let mut solver = solver(1);
        let mut problem = Problem::new(problem(space()));
        let (mut state, _) = solver.init(&mut problem, HighScoreState::new()).unwrap();
        assert_eq!(state.max_iters, 6);

        let mut n_models = vec![];
        while terminate(&mut solver, &state) == TerminationStatus::NotTerminated {
            state = solver.next_iter(&mut problem, state).unwrap().0;
            state.update();
            state.increment_iter();
            n_models.push(state.n_models);
        }
        // batches of 2 never straddle the uniform/directed boundary
        assert_eq!(n_models, vec![2, 4, 5, 7, 9, 10]);
        assert_eq!(problem.counts[EVAL_COUNT], 10);
        assert_eq!(state.get_iter(), state.get_max_iters());
        let history = state.history().unwrap();
        assert!(history.all().all(|e| space().contains(&e.x)));
        assert_eq!(
            terminate(&mut solver, &state),
            TerminationStatus::Terminated(TerminationReason::MaxItersReached)
        );
    }

    fn abs_or_nan(x: &ArrayView1<f64>) -> std::result::Result<Array1<f64>, EvaluationError> {
        if x[0] < 0. {
            Ok(array![f64::NAN, x[1].abs()])
        } else {
            Ok(x.mapv(f64::abs))
        }
    }

    #[test]
    fn test_non_finite_misfits_redrawn() {
        let mut solver = solver(1);
        let mut problem = Problem::new(MisfitFunc::new(
            space(),
            BootstrapWeights::unweighted(2).unwrap(),
            abs_or_nan as AbsFn,
        ));
        let (mut state, _) = solver.init(&mut problem, HighScoreState::new()).unwrap();
        while terminate(&mut solver, &state) == TerminationStatus::NotTerminated {
            state = solver.next_iter(&mut problem, state).unwrap().0;
            state.update();
            state.increment_iter();
        }
        let history = state.history().unwrap();
        assert_eq!(history.count(), 10);
        assert!(history.all().all(|e| e.x[0] >= 0.));
        assert!(history.all().all(|e| e.misfits.iter().all(|m| m.is_finite())));
        assert!(problem.counts[EVAL_COUNT] > 10);
    }

    #[test]
    fn test_stop_signal() {
        let mut solver = solver(1);
        let state = HighScoreState::new();
        let stop = solver.stop_signal();
        assert_eq!(terminate(&mut solver, &state), TerminationStatus::NotTerminated);
        stop.stop();
        assert!(solver.stop_signal().is_stopped());
        assert!(matches!(
            terminate(&mut solver, &state),
            TerminationStatus::Terminated(TerminationReason::SolverExit(_))
        ));
    }
}
