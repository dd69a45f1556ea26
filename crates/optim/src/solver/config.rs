//! High-score optimizer configuration.
use crate::errors::{HsoError, Result};
use crate::phases::PhaseSpec;
use crate::utils::HotStartMode;
use serde::{Deserialize, Serialize};

/// Default ratio between chain length and parameter space dimension
pub const DEFAULT_CHAIN_LENGTH_FACTOR: f64 = 8.0;
/// Default number of consecutive failed evaluations before giving up
pub const DEFAULT_MAX_FAILURES: usize = 50;

/// High-score optimizer configuration once validated
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidHighScoreConfig {
    /// Ordered sampler phases
    pub(crate) phases: Vec<PhaseSpec>,
    /// Expected number of bootstrap realizations, checked against problem weights
    pub(crate) n_bootstrap: usize,
    /// Chain length, computed from the space dimension when not set
    pub(crate) chain_length: Option<usize>,
    /// Chain length per dimension used when `chain_length` is not set
    pub(crate) chain_length_factor: f64,
    /// Maximum number of candidates evaluated concurrently
    pub(crate) n_parallel: usize,
    /// Maximum number of consecutive failed evaluations
    pub(crate) max_failures: usize,
    /// Seed of the random generator, entropy when not set
    pub(crate) seed: Option<u64>,
    /// Reference misfit below which the run stops
    #[serde(with = "crate::utils::neg_inf_as_null")]
    pub(crate) target: f64,
    /// Directory where run results are written
    pub(crate) outdir: Option<String>,
    /// Checkpointing and resumption mode
    pub(crate) hot_start: HotStartMode,
}

impl Default for ValidHighScoreConfig {
    fn default() -> Self {
        ValidHighScoreConfig {
            phases: vec![],
            n_bootstrap: 1,
            chain_length: None,
            chain_length_factor: DEFAULT_CHAIN_LENGTH_FACTOR,
            n_parallel: 1,
            max_failures: DEFAULT_MAX_FAILURES,
            seed: None,
            target: f64::NEG_INFINITY,
            outdir: None,
            hot_start: HotStartMode::Disabled,
        }
    }
}

impl ValidHighScoreConfig {
    /// Ordered sampler phases
    pub fn phases(&self) -> &[PhaseSpec] {
        &self.phases
    }

    /// Number of bootstrap realizations
    pub fn n_bootstrap(&self) -> usize {
        self.n_bootstrap
    }

    /// Chain length for a parameter space of dimension `nx`
    pub fn chain_length(&self, nx: usize) -> usize {
        self.chain_length
            .unwrap_or_else(|| ((self.chain_length_factor * nx as f64).round() as usize).max(2))
    }

    /// Maximum number of candidates evaluated concurrently
    pub fn n_parallel(&self) -> usize {
        self.n_parallel
    }

    /// Maximum number of consecutive failed evaluations
    pub fn max_failures(&self) -> usize {
        self.max_failures
    }

    /// Random generator seed
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Target reference misfit
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Output directory
    pub fn outdir(&self) -> Option<&str> {
        self.outdir.as_deref()
    }

    /// Hot start mode
    pub fn hot_start(&self) -> &HotStartMode {
        &self.hot_start
    }

    /// Total number of proposals over all phases
    pub fn n_iterations(&self) -> usize {
        self.phases.iter().map(|p| p.n_iterations()).sum()
    }

    /// Number of solver iterations: batches of at most `n_parallel` proposals
    /// never straddling two phases
    pub fn max_iters(&self) -> u64 {
        self.phases
            .iter()
            .map(|p| p.n_iterations().div_ceil(self.n_parallel) as u64)
            .sum()
    }
}

/// High-score optimizer configuration builder
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HighScoreConfig(ValidHighScoreConfig);

impl HighScoreConfig {
    /// Sets the ordered sampler phases
    pub fn phases(mut self, phases: Vec<PhaseSpec>) -> Self {
        self.0.phases = phases;
        self
    }

    /// Sets the expected number of bootstrap realizations
    pub fn n_bootstrap(mut self, n_bootstrap: usize) -> Self {
        self.0.n_bootstrap = n_bootstrap;
        self
    }

    /// Sets the number of models kept in each high-score chain
    pub fn chain_length(mut self, chain_length: usize) -> Self {
        self.0.chain_length = Some(chain_length);
        self
    }

    /// Sets the chain length per parameter space dimension used when
    /// chain length is not explicitly set
    pub fn chain_length_factor(mut self, factor: f64) -> Self {
        self.0.chain_length_factor = factor;
        self
    }

    /// Sets the maximum number of candidates evaluated concurrently
    pub fn n_parallel(mut self, n_parallel: usize) -> Self {
        self.0.n_parallel = n_parallel;
        self
    }

    /// Sets the maximum number of consecutive failed evaluations before the run aborts
    pub fn max_failures(mut self, max_failures: usize) -> Self {
        self.0.max_failures = max_failures;
        self
    }

    /// Allow to specify a seed for random number generator to allow
    /// reproducible runs.
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = Some(seed);
        self
    }

    /// Sets a reference misfit value used as a stopping criterion.
    pub fn target(mut self, target: f64) -> Self {
        self.0.target = target;
        self
    }

    /// Sets a directory to write run results and checkpoints
    pub fn outdir(mut self, outdir: impl Into<String>) -> Self {
        self.0.outdir = Some(outdir.into());
        self
    }

    /// Whether checkpointing is enabled allowing hot start from previous checkpointed iteration if any
    pub fn hot_start(mut self, hot_start: HotStartMode) -> Self {
        self.0.hot_start = hot_start;
        self
    }

    /// Checks configuration consistency
    pub fn check_ref(&self) -> Result<&ValidHighScoreConfig> {
        let config = &self.0;
        if config.phases.is_empty() {
            return Err(HsoError::InvalidConfigError(
                "at least one sampler phase is required".to_string(),
            ));
        }
        for (i, phase) in config.phases.iter().enumerate() {
            if phase.n_iterations() == 0 {
                return Err(HsoError::InvalidConfigError(format!(
                    "phase {i} ({}) has no iteration",
                    phase.name()
                )));
            }
        }
        if config.n_bootstrap == 0 {
            return Err(HsoError::InvalidConfigError(
                "at least one bootstrap realization is required".to_string(),
            ));
        }
        if config.chain_length == Some(0) {
            return Err(HsoError::InvalidConfigError(
                "chain length should be strictly positive".to_string(),
            ));
        }
        if !(config.chain_length_factor.is_finite() && config.chain_length_factor > 0.) {
            return Err(HsoError::InvalidConfigError(format!(
                "chain length factor should be strictly positive, got {}",
                config.chain_length_factor
            )));
        }
        if config.n_parallel == 0 {
            return Err(HsoError::InvalidConfigError(
                "n_parallel should be strictly positive".to_string(),
            ));
        }
        if config.hot_start == HotStartMode::Enabled && config.outdir.is_none() {
            return Err(HsoError::InvalidConfigError(
                "hot start requires an output directory".to_string(),
            ));
        }
        Ok(config)
    }

    /// Checks configuration consistency and returns the validated configuration
    pub fn check(self) -> Result<ValidHighScoreConfig> {
        self.check_ref()?;
        Ok(self.0)
    }
}

impl From<ValidHighScoreConfig> for HighScoreConfig {
    fn from(item: ValidHighScoreConfig) -> Self {
        HighScoreConfig(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phases() -> Vec<PhaseSpec> {
        vec![PhaseSpec::uniform(10), PhaseSpec::directed(25, 2., 0.5)]
    }

    #[test]
    fn test_default_config() {
        let config = HighScoreConfig::default().phases(phases()).check().unwrap();
        assert_eq!(config.n_bootstrap(), 1);
        assert_eq!(config.n_parallel(), 1);
        assert_eq!(config.max_failures(), DEFAULT_MAX_FAILURES);
        assert_eq!(config.chain_length(2), 16);
        assert_eq!(config.chain_length(0), 2);
        assert_eq!(config.n_iterations(), 35);
        assert_eq!(config.max_iters(), 35);
    }

    #[test]
    fn test_batched_iterations() {
        let config = HighScoreConfig::default()
            .phases(phases())
            .n_parallel(4)
            .chain_length(5)
            .check()
            .unwrap();
        // 10 -> 3 batches, 25 -> 7 batches
        assert_eq!(config.max_iters(), 10);
        assert_eq!(config.chain_length(10), 5);
    }

    #[test]
    fn test_invalid_configs() {
        let invalid = [
            HighScoreConfig::default(),
            HighScoreConfig::default().phases(vec![PhaseSpec::uniform(0)]),
            HighScoreConfig::default().phases(phases()).chain_length(0),
            HighScoreConfig::default().phases(phases()).n_bootstrap(0),
            HighScoreConfig::default().phases(phases()).n_parallel(0),
            HighScoreConfig::default()
                .phases(phases())
                .chain_length_factor(f64::NAN),
            HighScoreConfig::default()
                .phases(phases())
                .hot_start(HotStartMode::Enabled),
        ];
        for config in invalid {
            assert!(matches!(
                config.check(),
                Err(HsoError::InvalidConfigError(_))
            ));
        }
    }

    #[test]
    fn test_config_serde() {
        let config = HighScoreConfig::default()
            .phases(phases())
            .seed(42)
            .outdir("target/hiscore")
            .check()
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: ValidHighScoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
