use hiscore::{
    harvest, BootstrapWeights, EvaluationError, HighScoreBuilder, MisfitFunc, PhaseSpec, Weeding,
};
use hiscore_space::BoundedParameterSpace;
use ndarray::{array, Array1, ArrayView1};
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

/// Travel distance residuals at 5 stations of a candidate epicenter,
/// the true one being located at (3, -4)
fn residuals(x: &ArrayView1<f64>) -> Result<Array1<f64>, EvaluationError> {
    let stations = array![[0., 0.], [8., 1.], [-6., 3.], [2., -9.], [-4., -7.]];
    Ok(Array1::from_shape_fn(stations.nrows(), |i| {
        let dist = |px: f64, py: f64| (px - stations[[i, 0]]).hypot(py - stations[[i, 1]]);
        dist(x[0], x[1]) - dist(3., -4.)
    }))
}

fn main() {
    let space = BoundedParameterSpace::new(&array![[-10., 10.], [-10., 10.]])
        .expect("valid bounds")
        .named(&["east", "north"])
        .expect("one name per dimension");
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let weights = BootstrapWeights::classic(10, 5, &mut rng).expect("bootstrap weights");

    let res = HighScoreBuilder::optimize(MisfitFunc::new(space, weights, residuals))
        .configure(|config| {
            config
                .phases(vec![
                    PhaseSpec::uniform(200),
                    PhaseSpec::directed(800, 2.0, 0.1),
                ])
                .n_bootstrap(10)
                .n_parallel(4)
                .seed(42)
        })
        .build()
        .expect("Optimizer configured")
        .run()
        .expect("Minimization of residuals");
    println!("Best epicenter misfit = {} at x = {}", res.y_opt, res.x_opt);

    let history = res.state.history().expect("models");
    let chains = res.state.chains().expect("chains");
    let ensemble = harvest(history, chains, 5, Weeding::OutlierChains);
    for index in ensemble {
        if let Some(entry) = history.get(index) {
            println!("#{index}: misfit = {} at x = {}", entry.reference_misfit(), entry.x);
        }
    }
}
