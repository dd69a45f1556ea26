//! Bootstrap weights used to turn per-observation misfits into one global
//! misfit per bootstrap realization.
//!
//! Row 0 of the weight matrix is always the unweighted reference realization.
use crate::errors::{HsoError, Result};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Data, Ix1, Ix2};
use ndarray_rand::rand::Rng;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};

/// Norm used to combine per-observation misfits
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MisfitNorm {
    /// Sum of absolute weighted misfits
    L1,
    /// Square root of the sum of weighted squared misfits
    #[default]
    L2,
}

impl MisfitNorm {
    /// Exponent `p` of the norm
    pub fn exponent(&self) -> f64 {
        match self {
            MisfitNorm::L1 => 1.,
            MisfitNorm::L2 => 2.,
        }
    }
}

/// A (n_bootstrap, n_observations) matrix of non negative weights
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BootstrapWeights {
    weights: Array2<f64>,
}

impl BootstrapWeights {
    /// Constructor given a (n_bootstrap, n_observations) weight matrix
    ///
    /// Entries must be finite and non negative, rows are used as given.
    pub fn new(weights: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Self> {
        if weights.nrows() == 0 || weights.ncols() == 0 {
            return Err(HsoError::InvalidConfigError(format!(
                "bootstrap weights should be a non empty matrix, got {:?}",
                weights.shape()
            )));
        }
        if let Some(w) = weights.iter().find(|w| !(w.is_finite() && **w >= 0.)) {
            return Err(HsoError::InvalidConfigError(format!(
                "bootstrap weights should be finite and non negative, got {w}"
            )));
        }
        Ok(BootstrapWeights {
            weights: weights.to_owned(),
        })
    }

    /// Single reference realization with unit weights
    pub fn unweighted(n_observations: usize) -> Result<Self> {
        Self::new(&Array2::ones((1, n_observations)))
    }

    /// Classic bootstrap: realization `b > 0` weights each observation by the number
    /// of times it is drawn when resampling the observations with replacement.
    pub fn classic(
        n_bootstrap: usize,
        n_observations: usize,
        rng: &mut Xoshiro256Plus,
    ) -> Result<Self> {
        check_sizes(n_bootstrap, n_observations)?;
        let mut weights = Array2::zeros((n_bootstrap, n_observations));
        weights.row_mut(0).fill(1.);
        for mut row in weights.rows_mut().into_iter().skip(1) {
            for _ in 0..n_observations {
                row[rng.gen_range(0..n_observations)] += 1.;
            }
        }
        Self::new(&weights)
    }

    /// Bayesian bootstrap: realization `b > 0` weights are the gaps between sorted
    /// uniform draws on [0, 1], scaled so that each row sums to `n_observations`.
    pub fn bayesian(
        n_bootstrap: usize,
        n_observations: usize,
        rng: &mut Xoshiro256Plus,
    ) -> Result<Self> {
        check_sizes(n_bootstrap, n_observations)?;
        let mut weights = Array2::zeros((n_bootstrap, n_observations));
        weights.row_mut(0).fill(1.);
        let scale = n_observations as f64;
        for mut row in weights.rows_mut().into_iter().skip(1) {
            let mut cuts: Vec<f64> = (1..n_observations).map(|_| rng.gen::<f64>()).collect();
            cuts.push(0.);
            cuts.push(1.);
            cuts.sort_by(|a, b| a.total_cmp(b));
            for (j, pair) in cuts.windows(2).enumerate() {
                row[j] = (pair[1] - pair[0]) * scale;
            }
        }
        Self::new(&weights)
    }

    /// Number of bootstrap realizations (rows)
    pub fn n_bootstrap(&self) -> usize {
        self.weights.nrows()
    }

    /// Number of observations (columns)
    pub fn n_observations(&self) -> usize {
        self.weights.ncols()
    }

    /// The weight matrix
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    /// Weights of realization `b`
    pub fn row(&self, b: usize) -> ArrayView1<f64> {
        self.weights.row(b)
    }

    /// Combines per-observation misfits `m` into one global misfit per realization
    /// `M_b = (sum_i w_b[i] * |m[i]|^p)^(1/p)`
    pub fn combine(
        &self,
        misfits: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        norm: MisfitNorm,
    ) -> Result<Array1<f64>> {
        if misfits.len() != self.n_observations() {
            return Err(HsoError::InvalidValue(format!(
                "expected {} observation misfits, got {}",
                self.n_observations(),
                misfits.len()
            )));
        }
        let p = norm.exponent();
        let powered = misfits.mapv(|m| m.abs().powf(p));
        Ok(self.weights.dot(&powered).mapv(|s| s.powf(1. / p)))
    }
}

fn check_sizes(n_bootstrap: usize, n_observations: usize) -> Result<()> {
    if n_bootstrap == 0 || n_observations == 0 {
        return Err(HsoError::InvalidConfigError(format!(
            "bootstrap needs at least one realization and one observation, got ({n_bootstrap}, {n_observations})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Axis};
    use ndarray_rand::rand::SeedableRng;

    #[test]
    fn test_invalid_weights() {
        assert!(BootstrapWeights::new(&array![[1., -1.]]).is_err());
        assert!(BootstrapWeights::new(&array![[1., f64::INFINITY]]).is_err());
        assert!(BootstrapWeights::new(&Array2::<f64>::zeros((0, 3))).is_err());
        assert!(BootstrapWeights::unweighted(0).is_err());
    }

    #[test]
    fn test_combine_reference_row() {
        let weights = BootstrapWeights::new(&array![[1., 1., 1.], [2., 0., 1.]]).unwrap();
        let m = array![3., -4., 12.];

        let l2 = weights.combine(&m, MisfitNorm::L2).unwrap();
        assert_abs_diff_eq!(l2[0], 13., epsilon = 1e-12);
        assert_abs_diff_eq!(l2[1], (2. * 9. + 144.0_f64).sqrt(), epsilon = 1e-12);

        let l1 = weights.combine(&m, MisfitNorm::L1).unwrap();
        assert_abs_diff_eq!(l1[0], 19., epsilon = 1e-12);
        assert_abs_diff_eq!(l1[1], 18., epsilon = 1e-12);
        assert!(l1.iter().chain(l2.iter()).all(|v| *v >= 0.));
    }

    #[test]
    fn test_combine_length_mismatch() {
        let weights = BootstrapWeights::unweighted(3).unwrap();
        let err = weights.combine(&array![1., 2.], MisfitNorm::L2).unwrap_err();
        assert!(matches!(err, HsoError::InvalidValue(_)));
    }

    #[test]
    fn test_classic_weights() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let weights = BootstrapWeights::classic(5, 20, &mut rng).unwrap();
        assert_eq!(weights.n_bootstrap(), 5);
        assert_eq!(weights.n_observations(), 20);
        assert_eq!(weights.row(0), Array1::<f64>::ones(20));
        let sums = weights.weights().sum_axis(Axis(1));
        assert_abs_diff_eq!(sums, Array1::from_elem(5, 20.), epsilon = 1e-12);
        assert!(weights
            .weights()
            .iter()
            .all(|w| *w >= 0. && w.fract() == 0.));
    }

    #[test]
    fn test_bayesian_weights() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let weights = BootstrapWeights::bayesian(4, 10, &mut rng).unwrap();
        assert_eq!(weights.row(0), Array1::<f64>::ones(10));
        let sums = weights.weights().sum_axis(Axis(1));
        assert_abs_diff_eq!(sums, Array1::from_elem(4, 10.), epsilon = 1e-9);
        assert!(weights.weights().iter().all(|w| *w >= 0.));
    }
}
