use crate::bootstrap::{BootstrapWeights, MisfitNorm};
use crate::HighScoreState;
use hiscore_space::BoundedParameterSpace;
use ndarray::{Array1, ArrayView1};
use rand_xoshiro::Xoshiro256Plus;
use thiserror::Error;

/// An error returned by a problem when a candidate model cannot be evaluated.
///
/// The candidate is discarded and another one is drawn in its place.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EvaluationError {
    /// Description of the failure
    pub message: String,
}

impl EvaluationError {
    /// Constructor given a failure description
    pub fn new(message: impl Into<String>) -> Self {
        EvaluationError {
            message: message.into(),
        }
    }
}

/// The problem explored by the optimizer.
///
/// The optimizer knows nothing about the physics behind the misfit: it only
/// needs the parameter space bounds, a way to evaluate per-observation misfits
/// of a candidate and the bootstrap weights used to combine them.
/// Evaluation may run concurrently on several candidates, hence `Sync`.
pub trait MisfitProblem: Sync {
    /// Bounded parameter space
    fn bounds(&self) -> &BoundedParameterSpace;

    /// Draws a random model within the bounds, uniformly by default
    fn sample_uniform(&self, rng: &mut Xoshiro256Plus) -> Array1<f64> {
        self.bounds().sample_uniform(rng)
    }

    /// Per-observation misfits of the candidate `x`
    fn evaluate(&self, x: &ArrayView1<f64>) -> Result<Array1<f64>, EvaluationError>;

    /// Bootstrap weights, one row per realization, row 0 being the reference
    fn bootstrap_weights(&self) -> &BootstrapWeights;

    /// Norm used to combine per-observation misfits
    fn norm_exponent(&self) -> MisfitNorm {
        MisfitNorm::L2
    }
}

impl<P: MisfitProblem> MisfitProblem for &P {
    fn bounds(&self) -> &BoundedParameterSpace {
        (**self).bounds()
    }

    fn sample_uniform(&self, rng: &mut Xoshiro256Plus) -> Array1<f64> {
        (**self).sample_uniform(rng)
    }

    fn evaluate(&self, x: &ArrayView1<f64>) -> Result<Array1<f64>, EvaluationError> {
        (**self).evaluate(x)
    }

    fn bootstrap_weights(&self) -> &BootstrapWeights {
        (**self).bootstrap_weights()
    }

    fn norm_exponent(&self) -> MisfitNorm {
        (**self).norm_exponent()
    }
}

/// A trait for functions computing per-observation misfits
pub trait MisfitFn: Fn(&ArrayView1<f64>) -> Result<Array1<f64>, EvaluationError> + Sync {}
impl<T> MisfitFn for T where T: Fn(&ArrayView1<f64>) -> Result<Array1<f64>, EvaluationError> + Sync {}

/// A [`MisfitProblem`] built from bounds, weights and a misfit function
#[derive(Clone)]
pub struct MisfitFunc<F: MisfitFn> {
    space: BoundedParameterSpace,
    weights: BootstrapWeights,
    norm: MisfitNorm,
    fmisfit: F,
}

impl<F: MisfitFn> MisfitFunc<F> {
    /// Constructor given the parameter space, the bootstrap weights and the misfit function
    pub fn new(space: BoundedParameterSpace, weights: BootstrapWeights, fmisfit: F) -> Self {
        MisfitFunc {
            space,
            weights,
            norm: MisfitNorm::default(),
            fmisfit,
        }
    }

    /// Sets the norm used to combine misfits
    pub fn norm(mut self, norm: MisfitNorm) -> Self {
        self.norm = norm;
        self
    }
}

impl<F: MisfitFn> MisfitProblem for MisfitFunc<F> {
    fn bounds(&self) -> &BoundedParameterSpace {
        &self.space
    }

    fn evaluate(&self, x: &ArrayView1<f64>) -> Result<Array1<f64>, EvaluationError> {
        (self.fmisfit)(x)
    }

    fn bootstrap_weights(&self) -> &BootstrapWeights {
        &self.weights
    }

    fn norm_exponent(&self) -> MisfitNorm {
        self.norm
    }
}

/// Optimization result
#[derive(Clone, Debug)]
pub struct OptimResult {
    /// Best model of the reference realization
    pub x_opt: Array1<f64>,
    /// Reference misfit of the best model
    pub y_opt: f64,
    /// Final solver state holding the model history and the high-score chains
    pub state: HighScoreState,
}
