use crate::bootstrap::{BootstrapWeights, MisfitNorm};
use crate::chains::HighScoreChains;
use crate::errors::HsoError;
use crate::history::{HistoryEntry, ModelHistory};
use crate::{HighScoreSolver, HighScoreState, StopSignal};

use argmin::core::Error;
pub use argmin::core::checkpointing::{Checkpoint, CheckpointingFrequency};
use log::{info, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Json lines file of the evaluated models, one entry per line
pub const MODELS_CHECKPOINT_FILE: &str = "hiscore_models.jsonl";
/// Json file of the solver and sampler state
pub const SAMPLER_CHECKPOINT_FILE: &str = "hiscore_sampler.json";

/// An enum to specify hot start mode
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash, Default, Serialize, Deserialize)]
pub enum HotStartMode {
    /// Hot start checkpoints are not saved
    #[default]
    Disabled,
    /// Hot start checkpoints are saved after every iteration and used to
    /// resume the run if they already exist
    Enabled,
}

impl std::convert::From<bool> for HotStartMode {
    fn from(value: bool) -> Self {
        if value {
            HotStartMode::Enabled
        } else {
            HotStartMode::Disabled
        }
    }
}

/// What a persisted run has to share with the current one to be resumed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunFingerprint {
    /// Parameter space bounds
    pub xlimits: Array2<f64>,
    /// Number of observations
    pub n_observations: usize,
    /// Number of bootstrap realizations
    pub n_bootstrap: usize,
    /// High-score chain length
    pub chain_length: usize,
}

impl RunFingerprint {
    /// Fingerprint of a run of `solver` with the given bootstrap weights
    pub fn new(solver: &HighScoreSolver, weights: &BootstrapWeights) -> Self {
        RunFingerprint {
            xlimits: solver.xlimits.clone(),
            n_observations: weights.n_observations(),
            n_bootstrap: weights.n_bootstrap(),
            chain_length: solver.chain_length(),
        }
    }

    /// Describes the first difference with a persisted fingerprint, if any
    pub fn mismatch(&self, persisted: &RunFingerprint) -> Option<String> {
        if self.xlimits.dim() != persisted.xlimits.dim() {
            Some(format!(
                "parameter space dimension {} differs from persisted {}",
                self.xlimits.nrows(),
                persisted.xlimits.nrows()
            ))
        } else if self.xlimits != persisted.xlimits {
            Some(format!(
                "bounds {} differ from persisted {}",
                self.xlimits, persisted.xlimits
            ))
        } else if self.n_observations != persisted.n_observations {
            Some(format!(
                "observation count {} differs from persisted {}",
                self.n_observations, persisted.n_observations
            ))
        } else if self.n_bootstrap != persisted.n_bootstrap {
            Some(format!(
                "bootstrap realization count {} differs from persisted {}",
                self.n_bootstrap, persisted.n_bootstrap
            ))
        } else if self.chain_length != persisted.chain_length {
            Some(format!(
                "chain length {} differs from persisted {}",
                self.chain_length, persisted.chain_length
            ))
        } else {
            None
        }
    }
}

/// Checkpoint of a high-score run in a directory.
///
/// Evaluated models are appended to [`MODELS_CHECKPOINT_FILE`] then the small
/// sampler record is rewritten as a whole in [`SAMPLER_CHECKPOINT_FILE`]. The
/// sampler record tells how many models belong to the run: models appended
/// after it (interrupted save) are ignored on load.
#[derive(Debug)]
pub struct RunCheckpoint {
    /// Directory where the checkpoints are saved to
    pub directory: PathBuf,
    /// Indicates how often a checkpoint is created
    pub frequency: CheckpointingFrequency,
    fingerprint: RunFingerprint,
    weights: BootstrapWeights,
    norm: MisfitNorm,
    stop: StopSignal,
    n_saved: AtomicUsize,
}

impl RunCheckpoint {
    /// Create a new `RunCheckpoint` saving a run of `solver` after every iteration.
    ///
    /// Misfits are combined again with `weights` and `norm` when models are reloaded.
    pub fn new<N: AsRef<Path>>(
        directory: N,
        solver: &HighScoreSolver,
        weights: &BootstrapWeights,
        norm: MisfitNorm,
    ) -> Self {
        RunCheckpoint {
            directory: directory.as_ref().to_path_buf(),
            frequency: CheckpointingFrequency::Always,
            fingerprint: RunFingerprint::new(solver, weights),
            weights: weights.clone(),
            norm,
            stop: solver.stop_signal(),
            n_saved: AtomicUsize::new(0),
        }
    }

    /// Fingerprint of the current run
    pub fn fingerprint(&self) -> &RunFingerprint {
        &self.fingerprint
    }

    fn models_path(&self) -> PathBuf {
        self.directory.join(MODELS_CHECKPOINT_FILE)
    }

    fn sampler_path(&self) -> PathBuf {
        self.directory.join(SAMPLER_CHECKPOINT_FILE)
    }

    fn append_models(&self, entries: &[HistoryEntry], truncate: bool) -> Result<(), Error> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(!truncate)
            .truncate(truncate)
            .open(self.models_path())?;
        let mut writer = BufWriter::new(file);
        for entry in entries {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Reads the first `n_models` persisted models. Returns them together with
    /// the number of lines found in the models file.
    fn read_models(&self, n_models: usize) -> Result<(ModelHistory, usize), Error> {
        let mut history = ModelHistory::new(self.weights.clone(), self.norm);
        let path = self.models_path();
        if !path.exists() {
            if n_models > 0 {
                return Err(HsoError::ResumeMismatchError(format!(
                    "{n_models} models expected, {path:?} not found"
                ))
                .into());
            }
            return Ok((history, 0));
        }
        let reader = BufReader::new(File::open(&path)?);
        let mut n_lines = 0;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            n_lines += 1;
            if history.count() == n_models {
                continue;
            }
            let entry: HistoryEntry = serde_json::from_str(&line)?;
            if entry.index != history.count() {
                return Err(HsoError::ResumeMismatchError(format!(
                    "model #{} found where #{} was expected",
                    entry.index,
                    history.count()
                ))
                .into());
            }
            history.append(entry.x, entry.misfits)?;
        }
        if history.count() < n_models {
            return Err(HsoError::ResumeMismatchError(format!(
                "{n_models} models expected, only {} found",
                history.count()
            ))
            .into());
        }
        Ok((history, n_lines))
    }
}

impl Checkpoint<HighScoreSolver, HighScoreState> for RunCheckpoint {
    /// Appends models evaluated since the last save then writes the sampler state.
    ///
    /// If the directory does not exist already, it will be created.
    fn save(&self, solver: &HighScoreSolver, state: &HighScoreState) -> Result<(), Error> {
        if !self.directory.exists() {
            std::fs::create_dir_all(&self.directory)?
        }
        let history = state
            .history()
            .ok_or_else(|| HsoError::InvalidValue("state history not initialized".to_string()))?;
        let n_saved = self.n_saved.load(Ordering::SeqCst);
        let new_entries = history.since(n_saved);
        if !new_entries.is_empty() {
            self.append_models(new_entries, false)?;
        }
        self.n_saved.store(history.count(), Ordering::SeqCst);

        let bytes = serde_json::to_vec(&(solver, state, &self.fingerprint))?;
        let tmp = self.directory.join(format!("{SAMPLER_CHECKPOINT_FILE}.tmp"));
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, self.sampler_path())?;
        Ok(())
    }

    /// Load a checkpoint from disk.
    ///
    /// If there is no checkpoint on disk, it will return `Ok(None)` and models left
    /// by a run which never completed an iteration are discarded.
    /// Returns a [`HsoError::ResumeMismatchError`] when the persisted run is not
    /// compatible with the current one.
    fn load(&self) -> Result<Option<(HighScoreSolver, HighScoreState)>, Error> {
        let path = self.sampler_path();
        if !path.exists() {
            info!("No checkpoint found at {:?}", path);
            if self.models_path().exists() {
                warn!("Discard models of unfinished run {:?}", self.models_path());
                std::fs::remove_file(self.models_path())?;
            }
            self.n_saved.store(0, Ordering::SeqCst);
            return Ok(None);
        }
        info!("Checkpoint found at {:?}, loading...", path);
        let data = std::fs::read(&path)?;
        let (mut solver, state, fingerprint): (HighScoreSolver, HighScoreState, RunFingerprint) =
            serde_json::from_slice(&data)?;
        if let Some(mismatch) = self.fingerprint.mismatch(&fingerprint) {
            return Err(HsoError::ResumeMismatchError(mismatch).into());
        }

        let n_models = state.n_models;
        let (history, n_lines) = self.read_models(n_models)?;
        if n_lines > n_models {
            warn!(
                "Discard {} models recorded after the last checkpoint",
                n_lines - n_models
            );
            self.append_models(history.since(0), true)?;
        }
        let chains = HighScoreChains::replay(
            self.fingerprint.n_bootstrap,
            self.fingerprint.chain_length,
            history.all(),
        )?;
        solver.stop = self.stop.clone();
        self.n_saved.store(n_models, Ordering::SeqCst);

        let state = state.records(history, chains);
        info!(
            "Resume at iteration {} with {} models",
            state.iter, state.n_models
        );
        Ok(Some((solver, state)))
    }

    /// Returns how often a checkpoint is to be saved.
    ///
    /// Used internally by [`save_cond`](`argmin::core::checkpointing::Checkpoint::save_cond`).
    fn frequency(&self) -> CheckpointingFrequency {
        self.frequency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HighScoreConfig, PhaseSpec};
    use argmin::core::State;
    use hiscore_space::BoundedParameterSpace;
    use ndarray::array;
    use serial_test::serial;

    fn solver(chain_length: usize) -> HighScoreSolver {
        let config = HighScoreConfig::default()
            .phases(vec![PhaseSpec::uniform(10)])
            .chain_length(chain_length)
            .check()
            .unwrap();
        let space = BoundedParameterSpace::new(&array![[0., 1.]]).unwrap();
        HighScoreSolver::new(config, &space)
    }

    fn state(weights: &BootstrapWeights, chain_length: usize) -> HighScoreState {
        let history = ModelHistory::new(weights.clone(), MisfitNorm::L2);
        let chains = HighScoreChains::new(weights.n_bootstrap(), chain_length).unwrap();
        HighScoreState::new().records(history, chains)
    }

    fn clean(dir: &str) {
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_fingerprint_mismatch() {
        let weights = BootstrapWeights::unweighted(3).unwrap();
        let fp = RunFingerprint::new(&solver(4), &weights);
        assert_eq!(fp.mismatch(&fp.clone()), None);
        let other = RunFingerprint::new(&solver(5), &weights);
        assert!(fp.mismatch(&other).unwrap().contains("chain length"));
        let other = RunFingerprint::new(&solver(4), &BootstrapWeights::unweighted(2).unwrap());
        assert!(fp.mismatch(&other).unwrap().contains("observation"));
    }

    #[test]
    #[serial]
    fn test_save_and_load() {
        let dir = "target/test_checkpoint_save_load";
        clean(dir);
        let weights = BootstrapWeights::new(&array![[1., 1.], [2., 0.]]).unwrap();
        let solver = solver(2);
        let checkpoint = RunCheckpoint::new(dir, &solver, &weights, MisfitNorm::L2);
        assert!(checkpoint.load().unwrap().is_none());

        let mut state = state(&weights, 2);
        state.record(array![0.1], array![1., 2.]).unwrap();
        state.record(array![0.2], array![0.5, 0.5]).unwrap();
        state.increment_iter();
        checkpoint.save(&solver, &state).unwrap();
        state.record(array![0.3], array![3., 0.1]).unwrap();
        state.increment_iter();
        checkpoint.save(&solver, &state).unwrap();

        let content = std::fs::read_to_string(format!("{dir}/{MODELS_CHECKPOINT_FILE}")).unwrap();
        assert_eq!(content.lines().count(), 3);

        let reloaded = RunCheckpoint::new(dir, &solver, &weights, MisfitNorm::L2);
        let (_, loaded) = reloaded.load().unwrap().unwrap();
        assert_eq!(loaded.get_iter(), 2);
        assert_eq!(loaded.history(), state.history());
        assert_eq!(loaded.chains(), state.chains());
        clean(dir);
    }

    #[test]
    #[serial]
    fn test_load_ignores_models_after_last_save() {
        let dir = "target/test_checkpoint_partial";
        clean(dir);
        let weights = BootstrapWeights::unweighted(1).unwrap();
        let solver = solver(3);
        let checkpoint = RunCheckpoint::new(dir, &solver, &weights, MisfitNorm::L1);
        assert!(checkpoint.load().unwrap().is_none());

        let mut state = state(&weights, 3);
        state.record(array![0.1], array![1.]).unwrap();
        state.increment_iter();
        checkpoint.save(&solver, &state).unwrap();
        // models appended then interrupted before the sampler record is written
        state.record(array![0.2], array![2.]).unwrap();
        checkpoint
            .append_models(state.history().unwrap().since(1), false)
            .unwrap();

        let reloaded = RunCheckpoint::new(dir, &solver, &weights, MisfitNorm::L1);
        let (_, loaded) = reloaded.load().unwrap().unwrap();
        assert_eq!(loaded.n_models, 1);
        let content = std::fs::read_to_string(format!("{dir}/{MODELS_CHECKPOINT_FILE}")).unwrap();
        assert_eq!(content.lines().count(), 1);
        clean(dir);
    }

    #[test]
    #[serial]
    fn test_load_rejects_other_run() {
        let dir = "target/test_checkpoint_mismatch";
        clean(dir);
        let weights = BootstrapWeights::unweighted(2).unwrap();
        let checkpoint = RunCheckpoint::new(dir, &solver(2), &weights, MisfitNorm::L2);
        let mut state = state(&weights, 2);
        state.record(array![0.1], array![1., 1.]).unwrap();
        state.increment_iter();
        checkpoint.save(&solver(2), &state).unwrap();

        let other = RunCheckpoint::new(dir, &solver(4), &weights, MisfitNorm::L2);
        let err = other.load().unwrap_err();
        assert!(matches!(
            HsoError::from_argmin(err),
            HsoError::ResumeMismatchError(_)
        ));
        clean(dir);
    }
}
