use crate::errors::{Result, SpaceError};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix1, Ix2, Zip};
use ndarray_rand::{rand::Rng, rand_distr::Uniform, RandomExt};

#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// A box-shaped parameter space: one `[lower, upper]` interval per named dimension.
///
/// Bounds are validated once at construction (`lower <= upper`, both finite)
/// and never change afterwards.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct BoundedParameterSpace {
    /// Dimension names, defaults to `x0`, `x1`, ...
    names: Vec<String>,
    /// Space definition as a (nx, 2) matrix
    /// The ith row is the [lower_bound, upper_bound] of xi, the ith component of x
    xlimits: Array2<f64>,
}

impl BoundedParameterSpace {
    /// Constructor given a (nx, 2) matrix \[\[lower bound, upper bound\], ...\]
    ///
    /// ```
    /// use hiscore_space::BoundedParameterSpace;
    /// use ndarray::arr2;
    ///
    /// let space = BoundedParameterSpace::new(&arr2(&[[0.0, 1.0], [5.0, 10.0]])).unwrap();
    /// assert_eq!(space.ndim(), 2);
    /// ```
    pub fn new(xlimits: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Self> {
        if xlimits.ncols() != 2 {
            return Err(SpaceError::InvalidShape(format!(
                "xlimits must have 2 columns (lower, upper), got {}",
                xlimits.ncols()
            )));
        }
        if xlimits.nrows() == 0 {
            return Err(SpaceError::InvalidShape(
                "parameter space needs at least one dimension".to_string(),
            ));
        }
        for (index, row) in xlimits.rows().into_iter().enumerate() {
            let (lower, upper) = (row[0], row[1]);
            if !(lower.is_finite() && upper.is_finite() && lower <= upper) {
                return Err(SpaceError::InvalidBounds {
                    index,
                    lower,
                    upper,
                });
            }
        }
        let names = (0..xlimits.nrows()).map(|i| format!("x{i}")).collect();
        Ok(BoundedParameterSpace {
            names,
            xlimits: xlimits.to_owned(),
        })
    }

    /// Constructor given `(name, lower, upper)` triples
    pub fn from_ranges<S: AsRef<str>>(ranges: &[(S, f64, f64)]) -> Result<Self> {
        let mut xlimits = Array2::zeros((ranges.len(), 2));
        for (i, (_, lower, upper)) in ranges.iter().enumerate() {
            xlimits[[i, 0]] = *lower;
            xlimits[[i, 1]] = *upper;
        }
        let names: Vec<&str> = ranges.iter().map(|(name, _, _)| name.as_ref()).collect();
        Self::new(&xlimits)?.named(&names)
    }

    /// Sets dimension names, one per dimension
    pub fn named<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self> {
        if names.len() != self.ndim() {
            return Err(SpaceError::InvalidShape(format!(
                "expected {} names, got {}",
                self.ndim(),
                names.len()
            )));
        }
        self.names = names.iter().map(|n| n.as_ref().to_string()).collect();
        Ok(self)
    }

    /// Number of dimensions
    pub fn ndim(&self) -> usize {
        self.xlimits.nrows()
    }

    /// Dimension names
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The (nx, 2) bounds matrix
    pub fn xlimits(&self) -> &Array2<f64> {
        &self.xlimits
    }

    /// Lower bounds
    pub fn lower(&self) -> ArrayView1<f64> {
        self.xlimits.column(0)
    }

    /// Upper bounds
    pub fn upper(&self) -> ArrayView1<f64> {
        self.xlimits.column(1)
    }

    /// Interval widths `upper - lower`
    pub fn widths(&self) -> Array1<f64> {
        &self.upper() - &self.lower()
    }

    /// Checks `x` has one component per dimension
    pub fn check_dim(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Result<()> {
        if x.len() != self.ndim() {
            return Err(SpaceError::DimensionMismatch {
                expected: self.ndim(),
                found: x.len(),
            });
        }
        Ok(())
    }

    /// Whether every component of `x` lies within its `[lower, upper]` interval
    pub fn contains(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> bool {
        x.len() == self.ndim()
            && Zip::from(x)
                .and(self.xlimits.rows())
                .all(|&v, limits| limits[0] <= v && v <= limits[1])
    }

    /// Projects `x` onto the bounds, component-wise.
    ///
    /// Non finite components are sent to the lower bound.
    pub fn clamp(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Array1<f64> {
        let mut res = x.to_owned();
        self.clamp_inplace(&mut res);
        res
    }

    /// In-place version of [`BoundedParameterSpace::clamp`]
    pub fn clamp_inplace(&self, x: &mut Array1<f64>) {
        Zip::from(x)
            .and(self.xlimits.rows())
            .for_each(|v, limits| {
                *v = if v.is_nan() {
                    limits[0]
                } else {
                    (*v).max(limits[0]).min(limits[1])
                };
            });
    }

    /// Draws one vector uniformly within the bounds
    pub fn sample_uniform<R: Rng + ?Sized>(&self, rng: &mut R) -> Array1<f64> {
        let u = Array1::random_using(self.ndim(), Uniform::new(0., 1.), rng);
        &self.lower() + &(u * self.widths())
    }

    /// Draws `ns` vectors uniformly within the bounds as a (ns, nx) matrix
    pub fn sample<R: Rng + ?Sized>(&self, ns: usize, rng: &mut R) -> Array2<f64> {
        let u = Array2::random_using((ns, self.ndim()), Uniform::new(0., 1.), rng);
        u * self.widths().insert_axis(Axis(0)) + self.lower().insert_axis(Axis(0))
    }
}
