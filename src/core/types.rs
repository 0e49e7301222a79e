use serde::Serialize;

/// Monte Carlo sample size used when a caller does not choose one.
pub const DEFAULT_NUM_SIMULATIONS: u32 = 500;

/// Number of raw simulated paths returned for charting.
pub const SAMPLE_PATH_LIMIT: usize = 10;

/// Annual withdrawal rate applied by the tax estimate (the "4% rule").
pub const SAFE_WITHDRAWAL_RATE: f64 = 0.04;

/// Oldest age, current or target, a projection accepts.
pub const MAX_AGE: u32 = 150;

/// Inputs to a single projection. All rates are fractions (0.07 = 7%).
#[derive(Debug, Clone)]
pub struct ProjectionRequest {
    pub current_value: f64,
    pub monthly_contribution: f64,
    pub annual_contribution_increase_pct: f64,
    pub expected_annual_return_pct: f64,
    pub annual_volatility_pct: f64,
    pub years: u32,
    pub current_age: Option<u32>,
    pub target_amount: Option<f64>,
    /// Crossings after this age do not count towards the FI estimate.
    pub target_age: Option<u32>,
    pub effective_tax_rate_pct: f64,
    pub num_simulations: u32,
    /// Fixes the Monte Carlo draws. `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for ProjectionRequest {
    fn default() -> Self {
        Self {
            current_value: 0.0,
            monthly_contribution: 0.0,
            annual_contribution_increase_pct: 0.0,
            expected_annual_return_pct: 0.0,
            annual_volatility_pct: 0.0,
            years: 1,
            current_age: None,
            target_amount: None,
            target_age: None,
            effective_tax_rate_pct: 0.0,
            num_simulations: DEFAULT_NUM_SIMULATIONS,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathPoint {
    pub year: u32,
    pub age: Option<u32>,
    pub portfolio_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxInfo {
    pub gross_withdrawal: f64,
    pub tax_amount: f64,
    pub net_withdrawal: f64,
    pub withdrawal_rate_pct: f64,
    pub tax_rate_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSummary {
    pub median_ending_value: f64,
    pub p10_ending_value: f64,
    pub p90_ending_value: f64,
    pub probability_of_hitting_target: Option<f64>,
    #[serde(rename = "estimatedFIYear")]
    pub estimated_fi_year: Option<i32>,
    #[serde(rename = "estimatedFIAge")]
    pub estimated_fi_age: Option<u32>,
    pub tax_info: Option<TaxInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult {
    pub deterministic_path: Vec<PathPoint>,
    pub monte_carlo_paths_sample: Vec<Vec<PathPoint>>,
    pub median_path: Vec<PathPoint>,
    pub p10_path: Vec<PathPoint>,
    pub p90_path: Vec<PathPoint>,
    pub summary: ProjectionSummary,
}
