mod config;
mod hiscore_solver;
mod state;

pub use config::*;
pub use hiscore_solver::*;
pub use state::*;
