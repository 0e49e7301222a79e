mod engine;
mod error;
mod rng;
mod stats;
mod types;

pub use engine::{
    MonteCarloOutcome, deterministic_path, estimate_fi, run_monte_carlo, run_projection,
    run_projection_at, tax_implications, validate_request,
};
pub use error::ProjectionError;
pub use stats::{percentile, percentile_path, round_to};
pub use types::{
    DEFAULT_NUM_SIMULATIONS, MAX_AGE, PathPoint, ProjectionRequest, ProjectionResult,
    ProjectionSummary, SAFE_WITHDRAWAL_RATE, SAMPLE_PATH_LIMIT, TaxInfo,
};
