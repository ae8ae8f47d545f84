use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::core::{
    AttemptResult, DistributionParams, MAX_ATTEMPT_COUNTS, MAX_ATTEMPTS, MAX_POPULATION_SIZE,
    MAX_TOTAL_SIMULATIONS, Parameters, PopulationResampling, SimulationConfig, SimulationReport,
    Weights, run,
};

const ORDINALS: [&str; 10] = [
    "First", "Second", "Third", "Fourth", "Fifth", "Sixth", "Seventh", "Eighth", "Ninth", "Tenth",
];

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliPopulationResampling {
    PerEvaluation,
    PerAttempt,
}

impl From<CliPopulationResampling> for PopulationResampling {
    fn from(value: CliPopulationResampling) -> Self {
        match value {
            CliPopulationResampling::PerEvaluation => PopulationResampling::PerEvaluation,
            CliPopulationResampling::PerAttempt => PopulationResampling::PerAttempt,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiPopulationResampling {
    #[serde(alias = "perEvaluation", alias = "per_evaluation")]
    PerEvaluation,
    #[serde(alias = "perAttempt", alias = "per_attempt")]
    PerAttempt,
}

impl From<ApiPopulationResampling> for CliPopulationResampling {
    fn from(value: ApiPopulationResampling) -> Self {
        match value {
            ApiPopulationResampling::PerEvaluation => CliPopulationResampling::PerEvaluation,
            ApiPopulationResampling::PerAttempt => CliPopulationResampling::PerAttempt,
        }
    }
}

/// Attempt counts arrive as a JSON array from POST bodies and as `10,20,30` from query strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AttemptList {
    List(Vec<u32>),
    Csv(String),
}

impl AttemptList {
    fn into_vec(self) -> Result<Vec<u32>, String> {
        match self {
            AttemptList::List(values) => Ok(values),
            AttemptList::Csv(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<u32>()
                        .map_err(|_| format!("attempts must be positive integers (got {s:?})"))
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    talent: Option<f64>,
    effort: Option<f64>,
    weight_talent: Option<f64>,
    weight_effort: Option<f64>,
    weight_luck: Option<f64>,
    percentile: Option<u32>,
    attempts: Option<AttemptList>,

    simulations: Option<u32>,
    batch_size: Option<u32>,
    population_size: Option<u32>,
    seed: Option<u64>,
    luck_mean: Option<f64>,
    luck_std_dev: Option<f64>,
    trait_mean: Option<f64>,
    trait_std_dev: Option<f64>,
    population_resampling: Option<ApiPopulationResampling>,
}

#[derive(Parser, Debug)]
#[command(
    name = "achievement-odds",
    about = "Monte Carlo odds of landing in the top X% given talent, effort and luck"
)]
pub struct App {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one simulation and print the results.
    Run(Cli),
    /// Serve the JSON simulation API.
    Serve {
        #[arg(default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug, Clone)]
pub struct Cli {
    #[arg(long, default_value_t = 5.0, help = "Your talent (0-10)")]
    talent: f64,
    #[arg(long, default_value_t = 5.0, help = "Your effort (0-10)")]
    effort: f64,
    #[arg(long, default_value_t = 0.24, help = "Weight for talent")]
    weight_talent: f64,
    #[arg(long, default_value_t = 0.24, help = "Weight for effort")]
    weight_effort: f64,
    #[arg(long, default_value_t = 0.52, help = "Weight for luck")]
    weight_luck: f64,
    #[arg(
        long,
        default_value_t = 10,
        help = "Top X% to check, between 1 and 99"
    )]
    percentile: u32,
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = [10, 20, 30],
        help = "Attempt counts to evaluate, e.g. 10,20,30"
    )]
    attempts: Vec<u32>,
    #[arg(long, default_value_t = 100_000, help = "Individual trials per attempt count")]
    simulations: u32,
    #[arg(long, default_value_t = 10_000, help = "Trials per batch")]
    batch_size: u32,
    #[arg(long, default_value_t = 10_000)]
    population_size: u32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, default_value_t = 5.0)]
    luck_mean: f64,
    #[arg(long, default_value_t = 2.0)]
    luck_std_dev: f64,
    #[arg(
        long,
        default_value_t = 5.0,
        help = "Mean of population talent and effort"
    )]
    trait_mean: f64,
    #[arg(
        long,
        default_value_t = 2.0,
        help = "Standard deviation of population talent and effort"
    )]
    trait_std_dev: f64,
    #[arg(long, value_enum, default_value_t = CliPopulationResampling::PerEvaluation)]
    population_resampling: CliPopulationResampling,
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

#[derive(Debug)]
struct ApiRequest {
    params: Parameters,
    config: SimulationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LabelledResult<'a> {
    label: String,
    #[serde(flatten)]
    result: &'a AttemptResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse<'a> {
    talent: f64,
    effort: f64,
    weights: Weights,
    percentile: u32,
    total_simulations: u32,
    population_size: u32,
    seed: u64,
    warnings: Vec<String>,
    results: Vec<LabelledResult<'a>>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_request(cli: Cli) -> Result<ApiRequest, String> {
    if cli.attempts.is_empty() {
        return Err("--attempts must list at least one attempt count".to_string());
    }
    if cli.attempts.len() > MAX_ATTEMPT_COUNTS {
        return Err(format!("--attempts must list at most {MAX_ATTEMPT_COUNTS} attempt counts"));
    }
    if cli.attempts.contains(&0) {
        return Err("--attempts must all be > 0".to_string());
    }
    if cli.attempts.iter().any(|&a| a > MAX_ATTEMPTS) {
        return Err(format!("--attempts must all be <= {MAX_ATTEMPTS}"));
    }
    if cli.simulations == 0 {
        return Err("--simulations must be > 0".to_string());
    }
    if cli.simulations > MAX_TOTAL_SIMULATIONS {
        return Err(format!("--simulations must be <= {MAX_TOTAL_SIMULATIONS}"));
    }
    if cli.batch_size == 0 {
        return Err("--batch-size must be > 0".to_string());
    }
    if cli.population_size == 0 {
        return Err("--population-size must be > 0".to_string());
    }
    if cli.population_size > MAX_POPULATION_SIZE {
        return Err(format!("--population-size must be <= {MAX_POPULATION_SIZE}"));
    }
    if cli.luck_std_dev <= 0.0 {
        return Err("--luck-std-dev must be > 0".to_string());
    }
    if cli.trait_std_dev <= 0.0 {
        return Err("--trait-std-dev must be > 0".to_string());
    }

    let params = Parameters {
        talent: cli.talent,
        effort: cli.effort,
        weights: Weights::new(cli.weight_talent, cli.weight_effort, cli.weight_luck),
        percentile: cli.percentile,
        attempts: cli.attempts,
    };
    params.validate().map_err(|e| e.to_string())?;

    let config = SimulationConfig {
        total_simulations: cli.simulations,
        batch_size: cli.batch_size,
        population_size: cli.population_size,
        luck: DistributionParams {
            mean: cli.luck_mean,
            std_dev: cli.luck_std_dev,
        },
        trait_distribution: DistributionParams {
            mean: cli.trait_mean,
            std_dev: cli.trait_std_dev,
        },
        population_resampling: cli.population_resampling.into(),
        seed: cli.seed,
        ..SimulationConfig::default()
    };

    Ok(ApiRequest { params, config })
}

fn attempt_label(index: usize) -> String {
    ORDINALS
        .get(index)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("#{}", index + 1))
}

fn format_report(report: &SimulationReport) -> String {
    let mut out = String::new();
    for warning in &report.warnings {
        out.push_str(&format!("Warning: {warning}\n"));
    }
    for (index, result) in report.results.iter().enumerate() {
        out.push_str(&format!(
            "Results for {} Number of Attempts ({} Attempts):\n",
            attempt_label(index),
            result.attempts
        ));
        out.push_str(&format!(
            "Likelihood of being in the Top {}%: {:.2}%\n",
            report.percentile, result.probability
        ));
    }
    out
}

fn build_simulate_response<'a>(
    request: &ApiRequest,
    report: &'a SimulationReport,
) -> SimulateResponse<'a> {
    SimulateResponse {
        talent: request.params.talent,
        effort: request.params.effort,
        weights: request.params.weights,
        percentile: report.percentile,
        total_simulations: request.config.total_simulations,
        population_size: request.config.population_size,
        seed: request.config.seed,
        warnings: report.warnings.iter().map(|w| w.to_string()).collect(),
        results: report
            .results
            .iter()
            .enumerate()
            .map(|(index, result)| LabelledResult {
                label: attempt_label(index),
                result,
            })
            .collect(),
    }
}

/// Runs the simulation described by `cli` and renders it as text or JSON.
pub fn run_command(cli: Cli) -> Result<String, String> {
    let json = cli.json;
    let request = build_request(cli)?;
    let report = run(&request.params, &request.config).map_err(|e| e.to_string())?;

    if json {
        serde_json::to_string_pretty(&build_simulate_response(&request, &report))
            .map_err(|e| format!("failed to serialize report: {e}"))
    } else {
        Ok(format_report(&report))
    }
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "achievement simulation API listening");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    // Simulations are CPU-bound and run to completion off the async workers.
    let outcome = tokio::task::spawn_blocking(move || {
        let report = run(&request.params, &request.config);
        (request, report)
    })
    .await;

    match outcome {
        Ok((request, Ok(report))) => {
            json_response(StatusCode::OK, build_simulate_response(&request, &report))
        }
        Ok((_, Err(e))) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e) => {
            error!(error = %e, "simulation task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Simulation failed")
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
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

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: SimulatePayload) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.talent {
        cli.talent = v;
    }
    if let Some(v) = payload.effort {
        cli.effort = v;
    }
    if let Some(v) = payload.weight_talent {
        cli.weight_talent = v;
    }
    if let Some(v) = payload.weight_effort {
        cli.weight_effort = v;
    }
    if let Some(v) = payload.weight_luck {
        cli.weight_luck = v;
    }
    if let Some(v) = payload.percentile {
        cli.percentile = v;
    }
    if let Some(v) = payload.attempts {
        cli.attempts = v.into_vec()?;
    }
    if let Some(v) = payload.simulations {
        cli.simulations = v;
    }
    if let Some(v) = payload.batch_size {
        cli.batch_size = v;
    }
    if let Some(v) = payload.population_size {
        cli.population_size = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }
    if let Some(v) = payload.luck_mean {
        cli.luck_mean = v;
    }
    if let Some(v) = payload.luck_std_dev {
        cli.luck_std_dev = v;
    }
    if let Some(v) = payload.trait_mean {
        cli.trait_mean = v;
    }
    if let Some(v) = payload.trait_std_dev {
        cli.trait_std_dev = v;
    }
    if let Some(v) = payload.population_resampling {
        cli.population_resampling = v.into();
    }

    build_request(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        talent: 5.0,
        effort: 5.0,
        weight_talent: 0.24,
        weight_effort: 0.24,
        weight_luck: 0.52,
        percentile: 10,
        attempts: vec![10, 20, 30],
        simulations: 100_000,
        batch_size: 10_000,
        population_size: 10_000,
        seed: 42,
        luck_mean: 5.0,
        luck_std_dev: 2.0,
        trait_mean: 5.0,
        trait_std_dev: 2.0,
        population_resampling: CliPopulationResampling::PerEvaluation,
        json: false,
    }
}
