use axum::{
    Router,
    extract::{Json, Query},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{DEFAULT_NUM_SIMULATIONS, MAX_AGE, ProjectionRequest, run_projection};

/// Upper bound on trials accepted from a caller. Cost scales with
/// `years * num_simulations`.
pub const MAX_SIMULATIONS: u32 = 10_000;
pub const MAX_YEARS: u32 = 100;
pub const MAX_TAX_RATE: f64 = 0.6;
const HIGH_RETURN_WARNING: f64 = 0.5;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectionPayload {
    #[serde(alias = "currentValue")]
    current_portfolio_value: Option<f64>,
    monthly_contribution: Option<f64>,
    annual_contribution_increase_pct: Option<f64>,
    expected_annual_return_pct: Option<f64>,
    annual_volatility_pct: Option<f64>,
    years: Option<i64>,
    current_age: Option<u32>,
    target_amount: Option<f64>,
    target_age: Option<u32>,
    effective_tax_rate_pct: Option<f64>,
    num_simulations: Option<u32>,
    seed: Option<u64>,
}

/// Projection inputs as accepted from the command line. All rates are
/// fractions, e.g. `0.07` for 7%.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    #[arg(long, help = "Current portfolio value")]
    pub current_value: f64,
    #[arg(long, default_value_t = 0.0)]
    pub monthly_contribution: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        allow_hyphen_values = true,
        help = "Year-over-year growth of the monthly contribution, e.g. 0.03"
    )]
    pub annual_contribution_increase_pct: f64,
    #[arg(
        long,
        default_value_t = 0.07,
        allow_hyphen_values = true,
        help = "Mean annual return, e.g. 0.07"
    )]
    pub expected_annual_return_pct: f64,
    #[arg(
        long,
        default_value_t = 0.15,
        help = "Standard deviation of the annual return"
    )]
    pub annual_volatility_pct: f64,
    #[arg(long, allow_hyphen_values = true, help = "Projection horizon in years")]
    pub years: i64,
    #[arg(long)]
    pub current_age: Option<u32>,
    #[arg(long, help = "Portfolio value that counts as financial independence")]
    pub target_amount: Option<f64>,
    #[arg(long, help = "Crossings after this age do not count towards the FI estimate")]
    pub target_age: Option<u32>,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Effective tax rate on withdrawals, between 0 and 0.6"
    )]
    pub effective_tax_rate_pct: f64,
    #[arg(long, default_value_t = DEFAULT_NUM_SIMULATIONS)]
    pub num_simulations: u32,
    #[arg(long, help = "Seed for reproducible Monte Carlo draws")]
    pub seed: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Validates `args` and converts them to an engine request. Implausibly high
/// return assumptions are logged, not rejected.
pub fn build_request(args: ProjectArgs) -> Result<ProjectionRequest, String> {
    for (name, value) in [
        ("currentPortfolioValue", Some(args.current_value)),
        ("monthlyContribution", Some(args.monthly_contribution)),
        (
            "annualContributionIncreasePct",
            Some(args.annual_contribution_increase_pct),
        ),
        ("expectedAnnualReturnPct", Some(args.expected_annual_return_pct)),
        ("annualVolatilityPct", Some(args.annual_volatility_pct)),
        ("effectiveTaxRatePct", Some(args.effective_tax_rate_pct)),
        ("targetAmount", args.target_amount),
    ] {
        if value.is_some_and(|v| !v.is_finite()) {
            return Err(format!("{name} must be a finite number"));
        }
    }

    if args.current_value < 0.0 {
        return Err("Current portfolio value cannot be negative".to_string());
    }

    if args.monthly_contribution < 0.0 {
        return Err("Monthly contribution cannot be negative".to_string());
    }

    if args.annual_volatility_pct < 0.0 {
        return Err("Volatility cannot be negative".to_string());
    }

    if args.years < 1 {
        return Err("Projection horizon must be at least 1 year".to_string());
    }

    let years = match u32::try_from(args.years) {
        Ok(years) if years <= MAX_YEARS => years,
        _ => return Err(format!("Projection horizon cannot exceed {MAX_YEARS} years")),
    };

    for (name, age) in [
        ("Current age", args.current_age),
        ("Target age", args.target_age),
    ] {
        if age.is_some_and(|age| age > MAX_AGE) {
            return Err(format!("{name} must be between 0 and {MAX_AGE}"));
        }
    }

    if !(0.0..=MAX_TAX_RATE).contains(&args.effective_tax_rate_pct) {
        return Err("Tax rate must be between 0% and 60%".to_string());
    }

    if args.annual_contribution_increase_pct <= -1.0 {
        return Err("Annual contribution increase must be greater than -100%".to_string());
    }

    if args.target_amount.is_some_and(|v| v < 0.0) {
        return Err("Target amount cannot be negative".to_string());
    }

    if !(1..=MAX_SIMULATIONS).contains(&args.num_simulations) {
        return Err(format!(
            "Number of simulations must be between 1 and {MAX_SIMULATIONS}"
        ));
    }

    if args.expected_annual_return_pct > HIGH_RETURN_WARNING {
        log::warn!(
            "Very high expected return: {:.1}%",
            args.expected_annual_return_pct * 100.0
        );
    }

    Ok(ProjectionRequest {
        current_value: args.current_value,
        monthly_contribution: args.monthly_contribution,
        annual_contribution_increase_pct: args.annual_contribution_increase_pct,
        expected_annual_return_pct: args.expected_annual_return_pct,
        annual_volatility_pct: args.annual_volatility_pct,
        years,
        current_age: args.current_age,
        target_amount: args.target_amount,
        target_age: args.target_age,
        effective_tax_rate_pct: args.effective_tax_rate_pct,
        num_simulations: args.num_simulations,
        seed: args.seed,
    })
}

/// Runs one projection for the command line and renders it as JSON.
pub fn run_cli_projection(args: ProjectArgs, pretty: bool) -> Result<String, String> {
    let request = build_request(args)?;
    let result = run_projection(&request).map_err(|e| e.to_string())?;
    let json = if pretty {
        serde_json::to_string_pretty(&result)
    } else {
        serde_json::to_string(&result)
    };
    json.map_err(|e| format!("Failed to serialize projection: {e}"))
}

pub fn router() -> Router {
    Router::new()
        .route(
            "/api/projections",
            get(projection_get_handler).post(projection_post_handler),
        )
        .route("/api/health", get(health_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    log::info!("projection API listening on http://{addr}");

    axum::serve(listener, router()).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn projection_get_handler(Query(payload): Query<ProjectionPayload>) -> Response {
    projection_handler_impl(payload).await
}

async fn projection_post_handler(Json(payload): Json<ProjectionPayload>) -> Response {
    projection_handler_impl(payload).await
}

async fn projection_handler_impl(payload: ProjectionPayload) -> Response {
    let request = match build_request(args_from_payload(payload)) {
        Ok(request) => request,
        Err(msg) => {
            log::debug!("rejected projection request: {msg}");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    log::info!(
        "projection request: {} years, {} simulations",
        request.years,
        request.num_simulations
    );

    match tokio::task::spawn_blocking(move || run_projection(&request)).await {
        Ok(Ok(result)) => json_response(StatusCode::OK, result),
        Ok(Err(e)) => {
            log::error!("Error calculating projections: {e}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Failed to calculate projections: {e}"),
            )
        }
        Err(e) => {
            log::error!("projection task failed: {e}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to calculate projections",
            )
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn args_from_payload(payload: ProjectionPayload) -> ProjectArgs {
    let mut args = default_args_for_api();

    if let Some(v) = payload.current_portfolio_value {
        args.current_value = v;
    }
    if let Some(v) = payload.monthly_contribution {
        args.monthly_contribution = v;
    }
    if let Some(v) = payload.annual_contribution_increase_pct {
        args.annual_contribution_increase_pct = v;
    }
    if let Some(v) = payload.expected_annual_return_pct {
        args.expected_annual_return_pct = v;
    }
    if let Some(v) = payload.annual_volatility_pct {
        args.annual_volatility_pct = v;
    }
    if let Some(v) = payload.years {
        args.years = v;
    }
    if let Some(v) = payload.effective_tax_rate_pct {
        args.effective_tax_rate_pct = v;
    }
    if let Some(v) = payload.num_simulations {
        args.num_simulations = v;
    }

    args.current_age = payload.current_age;
    args.target_amount = payload.target_amount;
    args.target_age = payload.target_age;
    args.seed = payload.seed;
    args
}

fn default_args_for_api() -> ProjectArgs {
    ProjectArgs {
        current_value: 0.0,
        monthly_contribution: 0.0,
        annual_contribution_increase_pct: 0.0,
        expected_annual_return_pct: 0.07,
        annual_volatility_pct: 0.15,
        years: 30,
        current_age: None,
        target_amount: None,
        target_age: None,
        effective_tax_rate_pct: 0.0,
        num_simulations: DEFAULT_NUM_SIMULATIONS,
        seed: None,
    }
}

#[cfg(test)]
fn payload_from_json(json: &str) -> Result<ProjectionPayload, String> {
    serde_json::from_str::<ProjectionPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Uri;
    use serde_json::Value;

    fn sample_args() -> ProjectArgs {
        let mut args = default_args_for_api();
        args.current_value = 25_000.0;
        args.monthly_contribution = 500.0;
        args.years = 10;
        args.num_simulations = 40;
        args.seed = Some(7);
        args
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[test]
    fn build_request_copies_validated_fields() {
        let mut args = sample_args();
        args.current_age = Some(35);
        args.target_amount = Some(100_000.0);
        args.target_age = Some(50);
        args.effective_tax_rate_pct = 0.25;

        let request = build_request(args).expect("valid args");
        assert_eq!(request.current_value, 25_000.0);
        assert_eq!(request.years, 10);
        assert_eq!(request.current_age, Some(35));
        assert_eq!(request.target_amount, Some(100_000.0));
        assert_eq!(request.target_age, Some(50));
        assert_eq!(request.effective_tax_rate_pct, 0.25);
        assert_eq!(request.num_simulations, 40);
        assert_eq!(request.seed, Some(7));
    }

    #[test]
    fn build_request_rejects_negative_contribution() {
        let mut args = sample_args();
        args.monthly_contribution = -1.0;
        let err = build_request(args).expect_err("must reject");
        assert_eq!(err, "Monthly contribution cannot be negative");
    }

    #[test]
    fn build_request_rejects_negative_volatility() {
        let mut args = sample_args();
        args.annual_volatility_pct = -0.1;
        let err = build_request(args).expect_err("must reject");
        assert_eq!(err, "Volatility cannot be negative");
    }

    #[test]
    fn build_request_rejects_short_and_long_horizons() {
        let mut args = sample_args();
        args.years = 0;
        let err = build_request(args).expect_err("must reject");
        assert_eq!(err, "Projection horizon must be at least 1 year");

        let mut args = sample_args();
        args.years = -3;
        assert!(build_request(args).is_err());

        let mut args = sample_args();
        args.years = i64::from(MAX_YEARS) + 1;
        let err = build_request(args).expect_err("must reject");
        assert!(err.contains("cannot exceed"));
    }

    #[test]
    fn build_request_bounds_tax_rate() {
        for rate in [-0.01, 0.61, 25.0] {
            let mut args = sample_args();
            args.effective_tax_rate_pct = rate;
            let err = build_request(args).expect_err("must reject");
            assert_eq!(err, "Tax rate must be between 0% and 60%");
        }

        for rate in [0.0, 0.6] {
            let mut args = sample_args();
            args.effective_tax_rate_pct = rate;
            assert!(build_request(args).is_ok());
        }
    }

    #[test]
    fn build_request_rejects_non_finite_numbers() {
        let mut args = sample_args();
        args.expected_annual_return_pct = f64::INFINITY;
        let err = build_request(args).expect_err("must reject");
        assert!(err.contains("expectedAnnualReturnPct"));

        let mut args = sample_args();
        args.target_amount = Some(f64::NAN);
        let err = build_request(args).expect_err("must reject");
        assert!(err.contains("targetAmount"));
    }

    #[test]
    fn build_request_bounds_ages() {
        let mut args = sample_args();
        args.current_age = Some(MAX_AGE + 1);
        let err = build_request(args).expect_err("must reject");
        assert_eq!(err, "Current age must be between 0 and 150");

        let mut args = sample_args();
        args.target_age = Some(u32::MAX);
        let err = build_request(args).expect_err("must reject");
        assert_eq!(err, "Target age must be between 0 and 150");

        let mut args = sample_args();
        args.current_age = Some(MAX_AGE);
        args.target_age = Some(MAX_AGE);
        assert!(build_request(args).is_ok());
    }

    #[test]
    fn build_request_rejects_horizon_beyond_u32() {
        let mut args = sample_args();
        args.years = i64::from(u32::MAX) + 5;
        let err = build_request(args).expect_err("must reject");
        assert_eq!(err, "Projection horizon cannot exceed 100 years");
    }

    #[test]
    fn build_request_bounds_simulation_count() {
        let mut args = sample_args();
        args.num_simulations = 0;
        assert!(build_request(args).is_err());

        let mut args = sample_args();
        args.num_simulations = MAX_SIMULATIONS + 1;
        assert!(build_request(args).is_err());
    }

    #[test]
    fn build_request_accepts_high_return_with_warning() {
        let mut args = sample_args();
        args.expected_annual_return_pct = 0.8;
        let request = build_request(args).expect("high return is only a warning");
        assert_eq!(request.expected_annual_return_pct, 0.8);
    }

    #[test]
    fn payload_parses_web_keys() {
        let payload = payload_from_json(
            r#"{
                "currentPortfolioValue": 120000,
                "monthlyContribution": 1500,
                "annualContributionIncreasePct": 0.03,
                "expectedAnnualReturnPct": 0.06,
                "annualVolatilityPct": 0.12,
                "years": 25,
                "currentAge": 40,
                "targetAmount": 1000000,
                "targetAge": 60,
                "effectiveTaxRatePct": 0.22,
                "numSimulations": 250,
                "seed": 99
            }"#,
        )
        .expect("valid payload");
        let request = build_request(args_from_payload(payload)).expect("valid request");

        assert_eq!(request.current_value, 120_000.0);
        assert_eq!(request.monthly_contribution, 1_500.0);
        assert_eq!(request.annual_contribution_increase_pct, 0.03);
        assert_eq!(request.expected_annual_return_pct, 0.06);
        assert_eq!(request.annual_volatility_pct, 0.12);
        assert_eq!(request.years, 25);
        assert_eq!(request.current_age, Some(40));
        assert_eq!(request.target_amount, Some(1_000_000.0));
        assert_eq!(request.target_age, Some(60));
        assert_eq!(request.effective_tax_rate_pct, 0.22);
        assert_eq!(request.num_simulations, 250);
        assert_eq!(request.seed, Some(99));
    }

    #[test]
    fn payload_defaults_missing_fields() {
        let payload = payload_from_json(r#"{"currentValue": 5000}"#).expect("valid payload");
        let request = build_request(args_from_payload(payload)).expect("valid request");
        assert_eq!(request.current_value, 5_000.0);
        assert_eq!(request.years, 30);
        assert_eq!(request.num_simulations, DEFAULT_NUM_SIMULATIONS);
        assert_eq!(request.target_amount, None);
        assert_eq!(request.seed, None);
    }

    #[test]
    fn payload_parses_from_query_string() {
        let uri: Uri = "/api/projections?currentPortfolioValue=1000&years=3&seed=5"
            .parse()
            .expect("valid uri");
        let Query(payload) = Query::<ProjectionPayload>::try_from_uri(&uri).expect("valid query");
        let request = build_request(args_from_payload(payload)).expect("valid request");
        assert_eq!(request.current_value, 1_000.0);
        assert_eq!(request.years, 3);
        assert_eq!(request.seed, Some(5));
    }

    #[tokio::test]
    async fn projection_handler_returns_camel_case_result() {
        let payload = payload_from_json(
            r#"{
                "currentPortfolioValue": 10000,
                "monthlyContribution": 0,
                "annualContributionIncreasePct": 0,
                "expectedAnnualReturnPct": 0,
                "annualVolatilityPct": 0,
                "years": 5,
                "currentAge": 30,
                "targetAmount": 20000,
                "effectiveTaxRatePct": 0.2,
                "numSimulations": 20,
                "seed": 1
            }"#,
        )
        .expect("valid payload");

        let response = projection_handler_impl(payload).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL),
            Some(&HeaderValue::from_static("no-store"))
        );

        let body = body_json(response).await;
        let path = body["deterministicPath"].as_array().expect("path array");
        assert_eq!(path.len(), 6);
        assert_eq!(path[5]["portfolioValue"], 10_000.0);
        assert_eq!(path[5]["age"], 35);
        assert_eq!(body["monteCarloPathsSample"].as_array().map(Vec::len), Some(10));
        assert_eq!(body["medianPath"].as_array().map(Vec::len), Some(6));
        assert!(body["p10Path"].is_array());
        assert!(body["p90Path"].is_array());

        let summary = &body["summary"];
        assert_eq!(summary["medianEndingValue"], 10_000.0);
        assert_eq!(summary["probabilityOfHittingTarget"], 0.0);
        assert!(summary["estimatedFIYear"].is_null());
        assert!(summary["estimatedFIAge"].is_null());
        assert_eq!(summary["taxInfo"]["grossWithdrawal"], 800.0);
        assert_eq!(summary["taxInfo"]["withdrawalRatePct"], 4.0);
    }

    #[tokio::test]
    async fn projection_handler_rejects_invalid_input() {
        let payload =
            payload_from_json(r#"{"currentPortfolioValue": 1000, "years": 0}"#).expect("payload");
        let response = projection_handler_impl(payload).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Projection horizon must be at least 1 year");
    }

    #[tokio::test]
    async fn projection_handler_rejects_overflowing_age() {
        let payload = payload_from_json(
            r#"{
                "currentPortfolioValue": 1000,
                "years": 5,
                "currentAge": 4294967295,
                "numSimulations": 3,
                "seed": 1
            }"#,
        )
        .expect("payload");
        let response = projection_handler_impl(payload).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Current age must be between 0 and 150");
    }

    #[tokio::test]
    async fn health_and_fallback_routes() {
        let response = health_handler().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");

        let response = not_found_handler().await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Not found");
    }

    #[test]
    fn cli_projection_renders_json() {
        let json = run_cli_projection(sample_args(), false).expect("projection runs");
        let value: Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["deterministicPath"].as_array().map(Vec::len), Some(11));
        assert!(value["summary"]["probabilityOfHittingTarget"].is_null());

        let mut args = sample_args();
        args.monthly_contribution = -5.0;
        assert!(run_cli_projection(args, true).is_err());
    }
}
