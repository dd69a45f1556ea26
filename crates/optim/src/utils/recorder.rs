use crate::history::ModelHistory;
use crate::HighScoreState;

use argmin::core::observers::Observe;
use argmin::core::{Error, State, KV};
use log::info;
use ndarray::{concatenate, Array1, Array2, Axis};
use std::path::Path;

/// Numpy filename for the best misfit trace
pub const HISTORY_FILE: &str = "hiscore_history.npy";
/// Numpy filename for the evaluated models
pub const MODELS_FILE: &str = "hiscore_models.npy";

/// The trace observer collects the best reference misfit and model after
/// every iteration, the trace is saved as a (n_iters, 1 + nx) numpy array
/// `[best misfit, best x]` at the end of the optimization.
#[derive(Default)]
pub struct BestTraceObserver {
    /// Directory where the trace is saved
    pub dir: String,
    rows: Vec<Array1<f64>>,
}

impl BestTraceObserver {
    /// Create an observer saving its trace in directory `dir`
    pub fn new(dir: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            rows: vec![],
        }
    }

    /// Trace collected so far
    pub fn trace(&self) -> Array2<f64> {
        let rows: Vec<_> = self
            .rows
            .iter()
            .map(|r| r.view().insert_axis(Axis(0)))
            .collect();
        if rows.is_empty() {
            Array2::zeros((0, 0))
        } else {
            concatenate(Axis(0), &rows).unwrap_or_else(|_| Array2::zeros((0, 0)))
        }
    }

    fn collect(&mut self, state: &HighScoreState) {
        if let Some(best) = state.get_best_param() {
            let mut row = Array1::zeros(best.len() + 1);
            row[0] = state.get_best_cost();
            row.slice_mut(ndarray::s![1..]).assign(best);
            self.rows.push(row);
        }
    }
}

impl Observe<HighScoreState> for BestTraceObserver {
    fn observe_init(&mut self, _name: &str, state: &HighScoreState, _kv: &KV) -> Result<(), Error> {
        self.collect(state);
        Ok(())
    }

    fn observe_iter(&mut self, state: &HighScoreState, _kv: &KV) -> Result<(), Error> {
        self.collect(state);
        Ok(())
    }

    fn observe_final(&mut self, _state: &HighScoreState) -> Result<(), Error> {
        let trace = self.trace();
        std::fs::create_dir_all(&self.dir)?;
        let filepath = Path::new(&self.dir).join(HISTORY_FILE);
        info!("Save best misfit trace {:?} in {:?}", trace.shape(), filepath);
        ndarray_npy::write_npy(filepath, &trace)?;
        Ok(())
    }
}

/// Writes the evaluated models as a (n_models, nx + n_bootstrap) numpy array,
/// each row being the model parameters followed by its bootstrap misfits.
pub fn export_models<P: AsRef<Path>>(path: P, history: &ModelHistory) -> crate::Result<()> {
    let xs = history.xs();
    let misfits = history.bootstrap_misfits();
    let data = if history.is_empty() {
        Array2::zeros((0, 0))
    } else {
        concatenate![Axis(1), xs, misfits]
    };
    info!("Save {} models in {:?}", data.nrows(), path.as_ref());
    ndarray_npy::write_npy(path, &data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BootstrapWeights, HighScoreChains, MisfitNorm};
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_npy::read_npy;
    use serial_test::serial;

    fn state() -> HighScoreState {
        let weights = BootstrapWeights::new(&array![[1., 1.], [2., 0.]]).unwrap();
        let history = ModelHistory::new(weights, MisfitNorm::L1);
        let chains = HighScoreChains::new(2, 4).unwrap();
        HighScoreState::new().records(history, chains)
    }

    #[test]
    fn test_trace_follows_best() {
        let mut observer = BestTraceObserver::new("target/unused");
        let mut state = state();
        observer.observe_init("HighScore", &state, &KV::new()).unwrap();
        assert_eq!(observer.trace().nrows(), 0);

        state.record(array![0.5, 1.], array![1., 2.]).unwrap();
        state.update();
        observer.observe_iter(&state, &KV::new()).unwrap();
        state.record(array![0., 0.], array![5., 5.]).unwrap();
        state.update();
        observer.observe_iter(&state, &KV::new()).unwrap();

        let trace = observer.trace();
        assert_eq!(trace, array![[3., 0.5, 1.], [3., 0.5, 1.]]);
    }

    #[test]
    #[serial]
    fn test_export_models() {
        let outdir = "target/test_export_models";
        std::fs::create_dir_all(outdir).unwrap();
        let mut state = state();
        state.record(array![0.5, 1.], array![1., 2.]).unwrap();
        state.record(array![0., 0.], array![5., 5.]).unwrap();

        let path = format!("{outdir}/{MODELS_FILE}");
        export_models(&path, state.history().unwrap()).unwrap();
        let data: Array2<f64> = read_npy(&path).unwrap();
        assert_abs_diff_eq!(
            data,
            array![[0.5, 1., 3., 2.], [0., 0., 10., 10.]],
            epsilon = 1e-12
        );
    }
}
