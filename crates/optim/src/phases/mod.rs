//! Sampler phases driving the exploration towards exploitation.
//!
//! A run goes through its configured phases in order, each one for a fixed
//! number of iterations:
//! * [`PhaseSpec::Uniform`]: candidates are drawn uniformly within the bounds,
//! * [`PhaseSpec::Directed`]: candidates are drawn around the high-score chain of a
//!   bootstrap realization, with a scatter shrinking along the phase,
//! * [`PhaseSpec::Injection`]: given candidates are proposed as is.
//!
//! Transitions only go forward, a phase is never skipped nor repeated.
mod directed;
mod injection;
mod uniform;

pub use directed::{
    BootstrapChoice, DirectedParams, SamplerDistribution, ScatterSchedule, StartingPoint,
};

use crate::chains::HighScoreChains;
use crate::errors::{HsoError, Result};
use crate::history::ModelHistory;
use crate::types::MisfitProblem;
use directed::{choose_bootstrap, propose_directed};
use injection::propose_injected;
use uniform::propose_uniform;

use log::debug;
use ndarray::{Array1, Array2};
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};

/// A configured sampler phase
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PhaseSpec {
    /// Uniform exploration of the parameter space
    Uniform {
        /// Number of proposals made in the phase
        n_iterations: usize,
    },
    /// Sampling directed by the high-score chains
    Directed(DirectedParams),
    /// Proposal of the given (n_points, nx) models, one per iteration
    Injection {
        /// Models to propose, in order
        points: Array2<f64>,
    },
}

impl PhaseSpec {
    /// Uniform phase of `n_iterations` proposals
    pub fn uniform(n_iterations: usize) -> Self {
        PhaseSpec::Uniform { n_iterations }
    }

    /// Directed phase of `n_iterations` proposals with scatter going from `begin` to `end`
    pub fn directed(n_iterations: usize, begin: f64, end: f64) -> Self {
        PhaseSpec::Directed(DirectedParams::new(n_iterations).scatter_scale(begin, end))
    }

    /// Injection phase of the given models
    pub fn injection(points: Array2<f64>) -> Self {
        PhaseSpec::Injection { points }
    }

    /// Phase name
    pub fn name(&self) -> &'static str {
        match self {
            PhaseSpec::Uniform { .. } => "uniform",
            PhaseSpec::Directed(_) => "directed",
            PhaseSpec::Injection { .. } => "injection",
        }
    }

    /// Number of iterations of the phase
    pub fn n_iterations(&self) -> usize {
        match self {
            PhaseSpec::Uniform { n_iterations } => *n_iterations,
            PhaseSpec::Directed(params) => params.n_iterations,
            PhaseSpec::Injection { points } => points.nrows(),
        }
    }

    /// Scatter scale at iteration `iter`, for directed phases only
    pub fn scatter_at(&self, iter: usize) -> Option<f64> {
        match self {
            PhaseSpec::Directed(params) => Some(params.scatter_at(iter)),
            _ => None,
        }
    }

    /// Checks phase parameters against the parameter space dimension `nx`
    pub(crate) fn check(&self, nx: usize) -> Result<()> {
        if self.n_iterations() == 0 {
            return Err(HsoError::InvalidConfigError(format!(
                "{} phase should have at least one iteration",
                self.name()
            )));
        }
        match self {
            PhaseSpec::Uniform { .. } => Ok(()),
            PhaseSpec::Directed(params) => {
                let (begin, end) = (params.scatter_scale_begin, params.scatter_scale_end);
                let valid = match params.scatter_schedule {
                    ScatterSchedule::Linear => begin >= 0. && end >= 0.,
                    ScatterSchedule::Geometric => begin > 0. && end > 0.,
                };
                if valid && begin.is_finite() && end.is_finite() {
                    Ok(())
                } else {
                    Err(HsoError::InvalidConfigError(format!(
                        "invalid scatter scales ({begin}, {end}) for {:?} schedule",
                        params.scatter_schedule
                    )))
                }
            }
            PhaseSpec::Injection { points } => {
                if points.ncols() != nx {
                    Err(HsoError::InvalidConfigError(format!(
                        "injected points should have {nx} columns, got {}",
                        points.ncols()
                    )))
                } else if points.iter().any(|v| !v.is_finite()) {
                    Err(HsoError::InvalidConfigError(
                        "injected points should be finite".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Position of the sampler in the configured phases
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseState {
    /// Index of the current phase, equal to the number of phases once terminated
    pub phase_index: usize,
    /// Iteration within the current phase
    pub iter_in_phase: usize,
    /// Current scatter scale of a directed phase
    pub scatter_scale: Option<f64>,
    /// Next realization used by round-robin bootstrap choice
    pub next_bootstrap: usize,
}

impl PhaseState {
    /// State at the start of the first phase
    pub fn begin(phases: &[PhaseSpec]) -> Self {
        Self::enter(phases, 0)
    }

    fn enter(phases: &[PhaseSpec], phase_index: usize) -> Self {
        PhaseState {
            phase_index,
            iter_in_phase: 0,
            scatter_scale: phases.get(phase_index).and_then(|p| p.scatter_at(0)),
            next_bootstrap: 0,
        }
    }

    /// Whether all phases are completed
    pub fn is_terminal(&self, phases: &[PhaseSpec]) -> bool {
        self.phase_index >= phases.len()
    }

    /// Current phase, `None` once terminated
    pub fn current<'a>(&self, phases: &'a [PhaseSpec]) -> Option<&'a PhaseSpec> {
        phases.get(self.phase_index)
    }

    /// Iterations left in the current phase
    pub fn remaining(&self, phases: &[PhaseSpec]) -> usize {
        self.current(phases)
            .map(|p| p.n_iterations().saturating_sub(self.iter_in_phase))
            .unwrap_or(0)
    }

    /// Moves one iteration forward, entering the next phase when the current one
    /// is exhausted. Returns whether a transition happened.
    pub fn advance(&mut self, phases: &[PhaseSpec]) -> bool {
        let Some(phase) = self.current(phases) else {
            return false;
        };
        self.iter_in_phase += 1;
        if self.iter_in_phase >= phase.n_iterations() {
            *self = Self::enter(phases, self.phase_index + 1);
            true
        } else {
            self.scatter_scale = phase.scatter_at(self.iter_in_phase);
            false
        }
    }
}

/// Proposes a candidate for iteration `iter` of `phase`.
///
/// `attempt` counts the proposals already discarded for this iteration: an
/// injected point which failed is replaced by a uniform draw. A directed
/// proposal whose chain holds fewer than 2 models is drawn uniformly.
#[allow(clippy::too_many_arguments)]
pub(crate) fn propose<P: MisfitProblem>(
    phase: &PhaseSpec,
    iter: usize,
    attempt: usize,
    next_bootstrap: &mut usize,
    problem: &P,
    history: &ModelHistory,
    chains: &HighScoreChains,
    rng: &mut Xoshiro256Plus,
) -> Array1<f64> {
    match phase {
        PhaseSpec::Uniform { .. } => propose_uniform(problem, rng),
        PhaseSpec::Injection { points } => match propose_injected(points, iter, problem.bounds()) {
            Some(x) if attempt == 0 => x,
            _ => propose_uniform(problem, rng),
        },
        PhaseSpec::Directed(params) => {
            let b = choose_bootstrap(params, chains.n_chains(), next_bootstrap, rng);
            let scatter = params.scatter_at(iter);
            propose_directed(params, scatter, b, problem.bounds(), history, chains, rng)
                .unwrap_or_else(|| {
                    debug!("Chain {b} holds fewer than 2 models, drawing uniformly");
                    propose_uniform(problem, rng)
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BootstrapWeights, EvaluationError, MisfitFunc, MisfitNorm};
    use hiscore_space::BoundedParameterSpace;
    use ndarray::{arr2, array, ArrayView1};
    use ndarray_rand::rand::SeedableRng;

    #[test]
    fn test_phase_transitions() {
        let phases = vec![PhaseSpec::uniform(1000), PhaseSpec::directed(10000, 2.0, 0.5)];
        let mut state = PhaseState::begin(&phases);
        assert_eq!(state.scatter_scale, None);
        let mut seen = vec![];
        let mut transitions = 0;
        while !state.is_terminal(&phases) {
            seen.push(state.phase_index);
            if state.advance(&phases) {
                transitions += 1;
            }
            if seen.len() == 1000 {
                assert_eq!(state.phase_index, 1);
                assert_eq!(state.scatter_scale, Some(2.0));
            }
        }
        assert_eq!(transitions, 2);
        assert_eq!(seen.len(), 11000);
        assert!(seen[..1000].iter().all(|&i| i == 0));
        assert!(seen[1000..].iter().all(|&i| i == 1));
        assert!(!state.advance(&phases));
        assert_eq!(state.remaining(&phases), 0);
    }

    #[test]
    fn test_scatter_follows_phase() {
        let phases = vec![PhaseSpec::directed(3, 2.0, 1.0)];
        let mut state = PhaseState::begin(&phases);
        let mut scales = vec![];
        while let Some(scale) = state.scatter_scale {
            scales.push(scale);
            state.advance(&phases);
        }
        assert_eq!(scales, vec![2.0, 1.5, 1.0]);
    }

    #[test]
    fn test_invalid_phases() {
        assert!(PhaseSpec::uniform(0).check(2).is_err());
        assert!(PhaseSpec::directed(10, -1., 0.5).check(2).is_err());
        assert!(PhaseSpec::Directed(
            DirectedParams::new(10)
                .scatter_scale(1., 0.)
                .scatter_schedule(ScatterSchedule::Geometric)
        )
        .check(2)
        .is_err());
        assert!(PhaseSpec::directed(10, 1., 0.).check(2).is_ok());
        assert!(PhaseSpec::injection(arr2(&[[1., 2., 3.]])).check(2).is_err());
        assert!(PhaseSpec::injection(Array2::zeros((0, 2))).check(2).is_err());
        assert!(PhaseSpec::injection(arr2(&[[1., 2.]])).check(2).is_ok());
    }

    fn norm(x: &ArrayView1<f64>) -> std::result::Result<Array1<f64>, EvaluationError> {
        Ok(x.mapv(f64::abs))
    }

    #[test]
    fn test_directed_falls_back_to_uniform() {
        let space = BoundedParameterSpace::new(&arr2(&[[-1., 1.], [-1., 1.]])).unwrap();
        let problem = MisfitFunc::new(space.clone(), BootstrapWeights::unweighted(2).unwrap(), norm);
        let history = ModelHistory::new(BootstrapWeights::unweighted(2).unwrap(), MisfitNorm::L2);
        let chains = HighScoreChains::new(1, 4).unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let mut next = 0;
        let phase = PhaseSpec::directed(10, 1., 0.1);
        for iter in 0..10 {
            let x = propose(&phase, iter, 0, &mut next, &problem, &history, &chains, &mut rng);
            assert!(space.contains(&x));
        }

        let phase = PhaseSpec::injection(array![[0.25, -0.25]]);
        let x = propose(&phase, 0, 0, &mut next, &problem, &history, &chains, &mut rng);
        assert_eq!(x, array![0.25, -0.25]);
        let x = propose(&phase, 0, 1, &mut next, &problem, &history, &chains, &mut rng);
        assert!(space.contains(&x));
    }
}
