//! This library implements the high-score bootstrap optimization used to
//! estimate earthquake source parameters from seismic observations.
//!
//! Each candidate source model is evaluated once against every observation.
//! The per-observation misfits are then combined under several bootstrap
//! realizations (resampled weights of the observations), and every realization
//! keeps its own ranked chain of the best models found so far. The spread of
//! the chain best models gives an estimate of the parameter uncertainties.
//!
//! The search goes through configured sampler phases:
//! * uniform exploration of the bounded parameter space,
//! * sampling directed by the high-score chains, with a scatter shrinking
//!   along the phase,
//! * injection of given models.
//!
//! The optimizer comes with a set of options to:
//! * generate bootstrap weights (classic or bayesian bootstrap),
//! * evaluate candidates concurrently,
//! * save intermediate results and allow hot restart,
//! * follow a run from another thread and stop it cooperatively,
//! * harvest the best models of all realizations at the end of the run.
//!
//! # Example
//!
//! ```
//! use ndarray::{array, Array1, ArrayView1};
//! use hiscore::{BootstrapWeights, EvaluationError, HighScoreBuilder, MisfitFunc, PhaseSpec};
//! use hiscore::{harvest, Weeding};
//! use hiscore_space::BoundedParameterSpace;
//! use ndarray_rand::rand::SeedableRng;
//! use rand_xoshiro::Xoshiro256Plus;
//!
//! // Misfits of a candidate epicenter against 4 stations for a source located at (1, 2)
//! fn misfits(x: &ArrayView1<f64>) -> Result<Array1<f64>, EvaluationError> {
//!     let stations = array![[0., 0.], [4., 0.], [0., 4.], [4., 4.]];
//!     Ok(Array1::from_shape_fn(4, |i| {
//!         let dist = |px: f64, py: f64| (px - stations[[i, 0]]).hypot(py - stations[[i, 1]]);
//!         dist(x[0], x[1]) - dist(1., 2.)
//!     }))
//! }
//!
//! let space = BoundedParameterSpace::new(&array![[-5., 5.], [-5., 5.]]).unwrap();
//! let mut rng = Xoshiro256Plus::seed_from_u64(0);
//! let weights = BootstrapWeights::classic(5, 4, &mut rng).unwrap();
//!
//! let res = HighScoreBuilder::optimize(MisfitFunc::new(space, weights, misfits))
//!     .configure(|config| {
//!         config
//!             .phases(vec![PhaseSpec::uniform(100), PhaseSpec::directed(200, 1.5, 0.1)])
//!             .n_bootstrap(5)
//!             .seed(42)
//!     })
//!     .build()
//!     .expect("optimizer configured")
//!     .run()
//!     .expect("misfits minimized");
//! println!("Best model {} with misfit {}", res.x_opt, res.y_opt);
//!
//! let history = res.state.history().unwrap();
//! let ensemble = harvest(history, res.state.chains().unwrap(), 3, Weeding::None);
//! assert!(!ensemble.is_empty());
//! ```
//!
//! # Logging
//!
//! The log level is set with the `HISCORE_LOG` environment variable
//! (default to `info`), using the `env_logger` syntax.
//!
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

mod bootstrap;
mod chains;
mod errors;
mod harvest;
mod history;
mod optimizer;
mod phases;
mod solver;
mod types;
mod utils;

pub use crate::bootstrap::*;
pub use crate::chains::*;
pub use crate::errors::*;
pub use crate::harvest::*;
pub use crate::history::{HistoryEntry, ModelHistory};
pub use crate::optimizer::*;
pub use crate::phases::*;
pub use crate::solver::*;
pub use crate::types::*;
pub use crate::utils::{
    export_models, BestTraceObserver, ChainMonitor, ChainSnapshot, Checkpoint,
    CheckpointingFrequency, HotStartMode, RunCheckpoint, RunFingerprint, RunSnapshot,
    HISCORE_LOG, HISTORY_FILE, MODELS_CHECKPOINT_FILE, MODELS_FILE, SAMPLER_CHECKPOINT_FILE,
};
