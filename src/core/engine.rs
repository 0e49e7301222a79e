use chrono::{Datelike, Local};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use super::error::ProjectionError;
use super::rng::{Rng, derive_seed};
use super::stats::{percentile, percentile_path, round_to};
use super::types::{
    MAX_AGE, PathPoint, ProjectionRequest, ProjectionResult, ProjectionSummary,
    SAFE_WITHDRAWAL_RATE, SAMPLE_PATH_LIMIT, TaxInfo,
};

const MONTHS_PER_YEAR: u32 = 12;

#[derive(Debug)]
struct TrialResult {
    path: Vec<PathPoint>,
    ending_value: f64,
    fi_year: Option<u32>,
}

/// Every simulated trial, in trial-index order.
#[derive(Debug, Clone)]
pub struct MonteCarloOutcome {
    pub paths: Vec<Vec<PathPoint>>,
    /// Unrounded year-`years` values, one per trial.
    pub ending_values: Vec<f64>,
    /// First target-crossing year of each trial that crossed.
    pub fi_years: Vec<u32>,
}

pub fn run_projection(request: &ProjectionRequest) -> Result<ProjectionResult, ProjectionError> {
    run_projection_at(request, Local::now().year())
}

/// Same as [`run_projection`] with the FI calendar year anchored to
/// `calendar_year` instead of the local clock.
pub fn run_projection_at(
    request: &ProjectionRequest,
    calendar_year: i32,
) -> Result<ProjectionResult, ProjectionError> {
    validate_request(request)?;

    let seed = request.seed.unwrap_or_else(rand::random);
    log::debug!(
        "projecting {} years over {} simulations (seed {seed})",
        request.years,
        request.num_simulations
    );

    let deterministic = deterministic_path(request);
    let MonteCarloOutcome {
        paths,
        mut ending_values,
        fi_years,
    } = run_monte_carlo(request, seed);

    let probability_of_hitting_target = request.target_amount.map(|target| {
        let hits = ending_values.iter().filter(|v| **v >= target).count();
        round_to(hits as f64 / ending_values.len() as f64 * 100.0, 1)
    });

    let median_ending = percentile(&mut ending_values, 50.0);
    let p10_ending = percentile(&mut ending_values, 10.0);
    let p90_ending = percentile(&mut ending_values, 90.0);

    let (estimated_fi_year, estimated_fi_age) =
        estimate_fi(&fi_years, request.current_age, calendar_year);

    let tax_info = match request.target_amount {
        Some(target) if request.effective_tax_rate_pct > 0.0 => {
            let final_value = if median_ending >= target {
                median_ending
            } else {
                target
            };
            Some(tax_implications(final_value, request.effective_tax_rate_pct))
        }
        _ => None,
    };

    let median_path = percentile_path(&paths, request.years, 50.0);
    let p10_path = percentile_path(&paths, request.years, 10.0);
    let p90_path = percentile_path(&paths, request.years, 90.0);
    let monte_carlo_paths_sample = paths.into_iter().take(SAMPLE_PATH_LIMIT).collect();

    Ok(ProjectionResult {
        deterministic_path: deterministic,
        monte_carlo_paths_sample,
        median_path,
        p10_path,
        p90_path,
        summary: ProjectionSummary {
            median_ending_value: round_to(median_ending, 2),
            p10_ending_value: round_to(p10_ending, 2),
            p90_ending_value: round_to(p90_ending, 2),
            probability_of_hitting_target,
            estimated_fi_year,
            estimated_fi_age,
            tax_info,
        },
    })
}

pub fn validate_request(request: &ProjectionRequest) -> Result<(), ProjectionError> {
    let mut fields = vec![
        ("current_value", request.current_value),
        ("monthly_contribution", request.monthly_contribution),
        (
            "annual_contribution_increase_pct",
            request.annual_contribution_increase_pct,
        ),
        ("expected_annual_return_pct", request.expected_annual_return_pct),
        ("annual_volatility_pct", request.annual_volatility_pct),
        ("effective_tax_rate_pct", request.effective_tax_rate_pct),
    ];
    if let Some(target) = request.target_amount {
        fields.push(("target_amount", target));
    }
    for (field, value) in fields {
        if !value.is_finite() {
            return Err(ProjectionError::NonFinite { field });
        }
    }

    for (field, value) in [
        ("current_value", request.current_value),
        ("monthly_contribution", request.monthly_contribution),
        ("annual_volatility_pct", request.annual_volatility_pct),
    ] {
        if value < 0.0 {
            return Err(ProjectionError::Negative { field, value });
        }
    }

    if request.years < 1 {
        return Err(ProjectionError::HorizonTooShort {
            years: request.years,
        });
    }
    if request.num_simulations < 1 {
        return Err(ProjectionError::NoSimulations);
    }

    for (field, age) in [
        ("current_age", request.current_age),
        ("target_age", request.target_age),
    ] {
        if let Some(age) = age.filter(|age| *age > MAX_AGE) {
            return Err(ProjectionError::AgeOutOfRange {
                field,
                age,
                max: MAX_AGE,
            });
        }
    }
    Ok(())
}

/// Expected-return path with no randomness. Returns `years + 1` points.
pub fn deterministic_path(request: &ProjectionRequest) -> Vec<PathPoint> {
    let mut path = Vec::with_capacity(request.years as usize + 1);
    let mut value = request.current_value;
    path.push(point(request, 0, value));

    for year in 1..=request.years {
        value = grow_one_year(
            value,
            contribution_for_year(request, year),
            request.expected_annual_return_pct,
        );
        path.push(point(request, year, round_to(value, 2)));
    }
    path
}

/// Runs `num_simulations` trials. Trial `i` draws from its own generator
/// seeded by `derive_seed(seed, i)`, so the outcome for a given seed does not
/// depend on how the trials are scheduled across threads.
pub fn run_monte_carlo(request: &ProjectionRequest, seed: u64) -> MonteCarloOutcome {
    let trials: Vec<TrialResult> = (0..request.num_simulations)
        .into_par_iter()
        .map(|trial| {
            let mut rng = Rng::new(derive_seed(seed, trial));
            simulate_trial(request, &mut rng)
        })
        .collect();

    let mut outcome = MonteCarloOutcome {
        paths: Vec::with_capacity(trials.len()),
        ending_values: Vec::with_capacity(trials.len()),
        fi_years: Vec::new(),
    };
    for trial in trials {
        outcome.paths.push(trial.path);
        outcome.ending_values.push(trial.ending_value);
        if let Some(year) = trial.fi_year {
            outcome.fi_years.push(year);
        }
    }
    outcome
}

/// One trial: a single normal draw per year, no clamping. Values may go
/// negative under large drawdowns and are left that way.
fn simulate_trial(request: &ProjectionRequest, rng: &mut Rng) -> TrialResult {
    let mut path = Vec::with_capacity(request.years as usize + 1);
    let mut value = request.current_value;
    let mut fi_year = None;
    path.push(point(request, 0, value));

    for year in 1..=request.years {
        let annual_return = rng.normal(
            request.expected_annual_return_pct,
            request.annual_volatility_pct,
        );
        value = grow_one_year(value, contribution_for_year(request, year), annual_return);

        if fi_year.is_none() && reaches_target(request, year, value) {
            fi_year = Some(year);
        }
        path.push(point(request, year, round_to(value, 2)));
    }

    TrialResult {
        path,
        ending_value: value,
        fi_year,
    }
}

fn reaches_target(request: &ProjectionRequest, year: u32, value: f64) -> bool {
    let Some(target) = request.target_amount else {
        return false;
    };
    if value < target {
        return false;
    }
    match request.target_age {
        None => true,
        Some(cap) => request
            .current_age
            .and_then(|age| age.checked_add(year))
            .is_some_and(|age| age <= cap),
    }
}

/// Median crossing year, as a calendar year and as an age.
pub fn estimate_fi(
    fi_years: &[u32],
    current_age: Option<u32>,
    calendar_year: i32,
) -> (Option<i32>, Option<u32>) {
    if fi_years.is_empty() {
        return (None, None);
    }

    let mut offsets: Vec<f64> = fi_years.iter().map(|y| f64::from(*y)).collect();
    let offset = percentile(&mut offsets, 50.0).floor();
    let fi_year = calendar_year + offset as i32;
    let fi_age = current_age.and_then(|age| age.checked_add(offset as u32));
    (Some(fi_year), fi_age)
}

pub fn tax_implications(final_value: f64, effective_tax_rate: f64) -> TaxInfo {
    let gross_withdrawal = final_value * SAFE_WITHDRAWAL_RATE;
    let tax_amount = gross_withdrawal * effective_tax_rate;
    TaxInfo {
        gross_withdrawal,
        tax_amount,
        net_withdrawal: gross_withdrawal - tax_amount,
        withdrawal_rate_pct: SAFE_WITHDRAWAL_RATE * 100.0,
        tax_rate_pct: effective_tax_rate,
    }
}

/// Twelve months of contribute-then-grow at `annual_return / 12`.
fn grow_one_year(mut value: f64, monthly_contribution: f64, annual_return: f64) -> f64 {
    let monthly_return = annual_return / MONTHS_PER_YEAR as f64;
    for _ in 0..MONTHS_PER_YEAR {
        value = (value + monthly_contribution) * (1.0 + monthly_return);
    }
    value
}

fn contribution_for_year(request: &ProjectionRequest, year: u32) -> f64 {
    let multiplier = (1.0 + request.annual_contribution_increase_pct).powi(year as i32 - 1);
    request.monthly_contribution * multiplier
}

fn point(request: &ProjectionRequest, year: u32, portfolio_value: f64) -> PathPoint {
    PathPoint {
        year,
        age: request.current_age.and_then(|age| age.checked_add(year)),
        portfolio_value,
    }
}
