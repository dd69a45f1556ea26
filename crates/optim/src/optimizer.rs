//! High-score optimizer facade driving the [`HighScoreSolver`] with `argmin::Executor`.
//!
//! ```no_run
//! use ndarray::{array, Array1, ArrayView1};
//! use hiscore::{BootstrapWeights, EvaluationError, HighScoreBuilder, MisfitFunc, PhaseSpec};
//! use hiscore_space::BoundedParameterSpace;
//!
//! // one observation: the distance to (3, -4)
//! fn distance(x: &ArrayView1<f64>) -> Result<Array1<f64>, EvaluationError> {
//!     Ok(array![((x[0] - 3.).powi(2) + (x[1] + 4.).powi(2)).sqrt()])
//! }
//!
//! let space = BoundedParameterSpace::new(&array![[-10., 10.], [-10., 10.]]).unwrap();
//! let problem = MisfitFunc::new(space, BootstrapWeights::unweighted(1).unwrap(), distance);
//! let res = HighScoreBuilder::optimize(problem)
//!     .configure(|config| {
//!         config
//!             .phases(vec![PhaseSpec::uniform(200), PhaseSpec::directed(800, 2.0, 0.1)])
//!             .seed(42)
//!     })
//!     .build()
//!     .expect("optimizer configured")
//!     .run()
//!     .expect("distance minimized");
//! println!("Minimum misfit {} at x = {}", res.y_opt, res.x_opt);
//! ```
use crate::errors::{HsoError, Result};
use crate::history::HistoryEntry;
use crate::types::{MisfitProblem, OptimResult};
use crate::utils::{
    export_models, BestTraceObserver, ChainMonitor, HotStartMode, RunCheckpoint, MODELS_FILE,
};
use crate::{HighScoreConfig, HighScoreSolver, StopSignal, ValidHighScoreConfig};

use argmin::core::observers::ObserverMode;
use argmin::core::Executor;
use log::info;
use std::path::Path;

/// Json filename for configuration
pub const CONFIG_FILE: &str = "hiscore_config.json";

/// High-score optimizer builder allowing to specify the problem to be explored
pub struct HighScoreBuilder<P: MisfitProblem> {
    problem: P,
    config: HighScoreConfig,
}

impl<P: MisfitProblem> HighScoreBuilder<P> {
    /// The problem gives the parameter space, the misfit evaluation and the
    /// bootstrap weights.
    pub fn optimize(problem: P) -> Self {
        HighScoreBuilder {
            problem,
            config: HighScoreConfig::default(),
        }
    }

    /// Set configuration of the optimizer
    pub fn configure<F: FnOnce(HighScoreConfig) -> HighScoreConfig>(mut self, init: F) -> Self {
        self.config = init(self.config);
        self
    }

    /// Build the optimizer once the configuration is checked against the problem
    pub fn build(self) -> Result<Optimizer<P>> {
        let config = self.config.check()?;
        Optimizer::new(self.problem, config)
    }
}

/// High-score optimizer structure used to parameterize the underlying `argmin::Solver`
/// and trigger the optimization using `argmin::Executor`.
pub struct Optimizer<P: MisfitProblem> {
    problem: P,
    solver: HighScoreSolver,
    monitor: ChainMonitor,
}

impl<P: MisfitProblem> Optimizer<P> {
    /// Optimizer of `problem` with an already validated configuration
    pub fn new(problem: P, config: ValidHighScoreConfig) -> Result<Self> {
        let solver = HighScoreSolver::new(config, problem.bounds());
        solver.check_problem(&problem)?;
        Ok(Optimizer {
            problem,
            solver,
            monitor: ChainMonitor::new(),
        })
    }

    /// Validated configuration
    pub fn config(&self) -> &ValidHighScoreConfig {
        self.solver.config()
    }

    /// Handle to stop the optimization from another thread.
    ///
    /// The iteration in progress is completed and recorded before the run ends.
    pub fn stop_signal(&self) -> StopSignal {
        self.solver.stop_signal()
    }

    /// Handle to follow the optimization from another thread
    pub fn monitor(&self) -> ChainMonitor {
        self.monitor.clone()
    }

    /// Best model found so far for the realization `b`
    pub fn current_best(&self, b: usize) -> Option<HistoryEntry> {
        self.monitor.current_best(b)
    }

    /// Runs the optimization through all the configured phases.
    ///
    /// When hot start is enabled the run resumes from the checkpoint found in
    /// the output directory, if any.
    pub fn run(self) -> Result<OptimResult> {
        let config = self.solver.config();
        info!("{:?}", config);
        let outdir = config.outdir().map(String::from);
        if let Some(outdir) = outdir.as_ref() {
            std::fs::create_dir_all(outdir)?;
            let filepath = Path::new(outdir).join(CONFIG_FILE);
            let json = serde_json::to_string(config)?;
            std::fs::write(filepath, json)?;
        }

        let checkpoint = match (config.hot_start(), outdir.as_ref()) {
            (HotStartMode::Enabled, Some(outdir)) => Some(RunCheckpoint::new(
                outdir,
                &self.solver,
                self.problem.bootstrap_weights(),
                self.problem.norm_exponent(),
            )),
            _ => None,
        };

        let exec = Executor::new(self.problem, self.solver)
            .add_observer(self.monitor.clone(), ObserverMode::Always);
        let exec = if let Some(checkpoint) = checkpoint {
            exec.checkpointing(checkpoint)
        } else {
            exec
        };
        let result = if let Some(outdir) = outdir.as_ref() {
            let trace = BestTraceObserver::new(outdir.clone());
            exec.add_observer(trace, ObserverMode::Always).run()
        } else {
            exec.run()
        }
        .map_err(HsoError::from_argmin)?;
        info!("{}", result);

        let state = result.state;
        if let (Some(outdir), Some(history)) = (outdir.as_ref(), state.history()) {
            export_models(Path::new(outdir).join(MODELS_FILE), history)?;
        }
        let (x_opt, y_opt) = state
            .best_entry(0)
            .map(|best| (best.x.clone(), best.reference_misfit()))
            .ok_or_else(|| HsoError::InvalidValue("no model was evaluated".to_string()))?;
        info!("Optim Result: min misfit={} at x={}", y_opt, x_opt);

        Ok(OptimResult {
            x_opt,
            y_opt,
            state,
        })
    }
}
