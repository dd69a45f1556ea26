use crate::types::MisfitProblem;
use log::warn;
use ndarray::Array1;
use rand_xoshiro::Xoshiro256Plus;

/// Draws a candidate uniformly within the problem bounds, ignoring history.
///
/// A problem sample of the wrong dimension is replaced by a draw from the bounds.
pub(crate) fn propose_uniform<P: MisfitProblem>(
    problem: &P,
    rng: &mut Xoshiro256Plus,
) -> Array1<f64> {
    let space = problem.bounds();
    let x = problem.sample_uniform(rng);
    match space.check_dim(&x) {
        Ok(()) => space.clamp(&x),
        Err(err) => {
            warn!("Uniform sample discarded: {err}");
            space.sample_uniform(rng)
        }
    }
}
