/*!
This library defines the bounded parameter space explored by the high-score
optimizer: a list of named dimensions, each with a `[lower, upper]` interval.

The space is expressed internally as a 2D ndarray `(nx, 2)` of
`[lower bound, upper bound]` rows, the same layout used for design-space
definitions in sampling libraries. It offers:
* uniform sampling of fresh parameter vectors,
* clamping (projection) of candidates back onto the bounds,
* membership and dimension checks.

Example:
```
use hiscore_space::BoundedParameterSpace;
use ndarray::{arr1, arr2};
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

let space = BoundedParameterSpace::new(&arr2(&[[-10., 10.], [0., 5.]]))
    .expect("valid bounds")
    .named(&["north_shift", "depth"])
    .expect("one name per dimension");

let mut rng = Xoshiro256Plus::seed_from_u64(42);
let x = space.sample_uniform(&mut rng);
assert!(space.contains(&x));

let clamped = space.clamp(&arr1(&[12., -1.]));
assert_eq!(clamped, arr1(&[10., 0.]));
```
*/
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod errors;
mod space;

pub use errors::*;
pub use space::*;
