use crate::chains::HighScoreChains;
use crate::history::ModelHistory;
use hiscore_space::BoundedParameterSpace;
use linfa_linalg::cholesky::*;
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::{Distribution, StandardNormal};
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};

/// Relative jitter added to the covariance diagonal before factorization
const COVARIANCE_JITTER: f64 = 1e-10;

/// How the scatter scale goes from its begin value to its end value
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScatterSchedule {
    /// Linear interpolation
    #[default]
    Linear,
    /// Geometric interpolation, scale values must be positive
    Geometric,
}

/// How the bootstrap realization guiding a proposal is chosen
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootstrapChoice {
    /// Realizations are used one after the other
    #[default]
    RoundRobin,
    /// Realizations are drawn uniformly at random
    Random,
}

/// Shape of the proposal distribution around the chain models
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplerDistribution {
    /// Multivariate normal with the chain covariance
    #[default]
    MultivariateNormal,
    /// Independent normal per dimension with the chain standard deviations
    Normal,
}

/// Center of the proposal distribution
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartingPoint {
    /// Mean of the chain models
    #[default]
    Mean,
    /// Best model of the chain
    Best,
    /// A chain model picked at random
    Random,
}

/// Parameters of a directed phase
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectedParams {
    /// Number of proposals made in the phase
    pub n_iterations: usize,
    /// Scatter scale at the first iteration
    pub scatter_scale_begin: f64,
    /// Scatter scale at the last iteration
    pub scatter_scale_end: f64,
    /// Interpolation between begin and end scales
    pub scatter_schedule: ScatterSchedule,
    /// Policy choosing the guiding realization
    pub bootstrap_choice: BootstrapChoice,
    /// Proposal distribution
    pub distribution: SamplerDistribution,
    /// Proposal distribution center
    pub starting_point: StartingPoint,
}

impl Default for DirectedParams {
    fn default() -> Self {
        DirectedParams {
            n_iterations: 1000,
            scatter_scale_begin: 2.0,
            scatter_scale_end: 0.5,
            scatter_schedule: ScatterSchedule::default(),
            bootstrap_choice: BootstrapChoice::default(),
            distribution: SamplerDistribution::default(),
            starting_point: StartingPoint::default(),
        }
    }
}

impl DirectedParams {
    /// Directed phase of `n_iterations` proposals with default settings
    pub fn new(n_iterations: usize) -> Self {
        DirectedParams {
            n_iterations,
            ..Default::default()
        }
    }

    /// Sets scatter scales at the first and last iterations
    pub fn scatter_scale(mut self, begin: f64, end: f64) -> Self {
        self.scatter_scale_begin = begin;
        self.scatter_scale_end = end;
        self
    }

    /// Sets the scatter schedule
    pub fn scatter_schedule(mut self, schedule: ScatterSchedule) -> Self {
        self.scatter_schedule = schedule;
        self
    }

    /// Sets the bootstrap choice policy
    pub fn bootstrap_choice(mut self, choice: BootstrapChoice) -> Self {
        self.bootstrap_choice = choice;
        self
    }

    /// Sets the proposal distribution
    pub fn distribution(mut self, distribution: SamplerDistribution) -> Self {
        self.distribution = distribution;
        self
    }

    /// Sets the proposal distribution center
    pub fn starting_point(mut self, starting_point: StartingPoint) -> Self {
        self.starting_point = starting_point;
        self
    }

    /// Scatter scale at iteration `iter` of the phase
    ///
    /// Equals `scatter_scale_begin` at iteration 0 and `scatter_scale_end`
    /// at the last iteration, monotonic in between.
    pub fn scatter_at(&self, iter: usize) -> f64 {
        let t = if self.n_iterations > 1 {
            (iter.min(self.n_iterations - 1) as f64) / ((self.n_iterations - 1) as f64)
        } else {
            0.
        };
        let (begin, end) = (self.scatter_scale_begin, self.scatter_scale_end);
        match self.scatter_schedule {
            ScatterSchedule::Linear => begin + (end - begin) * t,
            ScatterSchedule::Geometric => begin * (end / begin).powf(t),
        }
    }
}

/// Multivariate normal distribution given its mean and the lower Cholesky
/// factor of its covariance
pub(crate) struct MultivariateNormal {
    mean: Array1<f64>,
    covariance_chol: Array2<f64>,
}

impl MultivariateNormal {
    pub fn new(mean: &ArrayView1<f64>, covariance: &ArrayView2<f64>) -> Option<Self> {
        let scale = covariance.diag().iter().fold(0., |acc: f64, v| acc.max(*v));
        let jitter = COVARIANCE_JITTER * scale.max(f64::MIN_POSITIVE);
        let mut cov = covariance.to_owned();
        cov.diag_mut().mapv_inplace(|v| v + jitter);
        let covariance_chol = cov.cholesky().ok()?;
        if covariance_chol.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(MultivariateNormal {
            mean: mean.to_owned(),
            covariance_chol,
        })
    }

    /// Independent normal components with the given standard deviations
    pub fn diagonal(mean: &ArrayView1<f64>, std: &Array1<f64>) -> Self {
        MultivariateNormal {
            mean: mean.to_owned(),
            covariance_chol: Array2::from_diag(std),
        }
    }
}

impl Distribution<Array1<f64>> for MultivariateNormal {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Array1<f64> {
        let z: Array1<f64> = Array1::random_using(self.mean.len(), StandardNormal, rng);
        &self.mean + &self.covariance_chol.dot(&z)
    }
}

/// Picks the realization guiding the next proposal
pub(crate) fn choose_bootstrap(
    params: &DirectedParams,
    n_bootstrap: usize,
    next_bootstrap: &mut usize,
    rng: &mut Xoshiro256Plus,
) -> usize {
    match params.bootstrap_choice {
        BootstrapChoice::RoundRobin => {
            let b = *next_bootstrap % n_bootstrap;
            *next_bootstrap = (b + 1) % n_bootstrap;
            b
        }
        BootstrapChoice::Random => rng.gen_range(0..n_bootstrap),
    }
}

/// Draws a candidate around the models of chain `b`, scattered by `scatter` and
/// projected onto the bounds.
///
/// Returns `None` when the chain holds fewer than 2 models.
pub(crate) fn propose_directed(
    params: &DirectedParams,
    scatter: f64,
    b: usize,
    space: &BoundedParameterSpace,
    history: &ModelHistory,
    chains: &HighScoreChains,
    rng: &mut Xoshiro256Plus,
) -> Option<Array1<f64>> {
    let (mean, cov) = chains.mean_and_covariance(b, history)?;
    let center = match params.starting_point {
        StartingPoint::Mean => mean,
        StartingPoint::Best => chains.best_entry(b, history)?.x.clone(),
        StartingPoint::Random => {
            let links = chains.chain(b)?;
            let link = links[rng.gen_range(0..links.len())];
            history.get(link.index)?.x.clone()
        }
    };

    let std = cov.diag().mapv(|v| v.max(0.).sqrt() * scatter);
    let sampler = match params.distribution {
        SamplerDistribution::MultivariateNormal => {
            let scaled = cov * (scatter * scatter);
            MultivariateNormal::new(&center.view(), &scaled.view()).unwrap_or_else(|| {
                warn!("Chain {b} covariance not positive definite, using per-dimension scatter");
                MultivariateNormal::diagonal(&center.view(), &std)
            })
        }
        SamplerDistribution::Normal => MultivariateNormal::diagonal(&center.view(), &std),
    };
    let x = sampler.sample(rng);
    debug!("Directed proposal from chain {b} with scatter {scatter:.3}: {x}");
    Some(space.clamp(&x))
}
