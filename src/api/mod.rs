use axum::{
    Router,
    extract::Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    Aggregates, DEFAULT_DIVIDEND_EQUITY, FundingPlan, RawRow, RowFlag, ScenarioParameters,
    aggregate, allocate, classify_with_flags,
};
use crate::error::CliError;
use crate::source::read_rows;

#[derive(Args, Debug, Clone)]
pub struct ScenarioArgs {
    #[arg(
        long,
        default_value_t = 7.0,
        help = "Expected dividend per share of the dividend equity"
    )]
    pub dividend_per_share: f64,
    #[arg(
        long,
        default_value_t = 4.0,
        help = "Initial withdrawal rate on non-reserve assets in percent"
    )]
    pub initial_withdrawal_rate: f64,
    #[arg(
        long,
        default_value_t = 2.0,
        help = "Expected inflation in percent, applied to living cost only"
    )]
    pub inflation_rate: f64,
    #[arg(long, default_value_t = 60_000.0)]
    pub monthly_living_expense: f64,
    #[arg(
        long,
        default_value_t = 125_000.0,
        help = "Monthly mortgage and loan payments"
    )]
    pub monthly_debt_service: f64,
    #[arg(
        long,
        default_value_t = DEFAULT_DIVIDEND_EQUITY.to_string(),
        help = "Label marker of the dividend-paying holding"
    )]
    pub dividend_equity: String,
}

impl Default for ScenarioArgs {
    fn default() -> Self {
        Self {
            dividend_per_share: 7.0,
            initial_withdrawal_rate: 4.0,
            inflation_rate: 2.0,
            monthly_living_expense: 60_000.0,
            monthly_debt_service: 125_000.0,
            dividend_equity: DEFAULT_DIVIDEND_EQUITY.to_string(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "ledger-waterfall",
    about = "Classify a household balance sheet export and plan the yearly funding waterfall"
)]
pub struct Cli {
    #[arg(help = "CSV or TSV export of the balance sheet")]
    pub input: PathBuf,
    #[arg(long, help = "Field delimiter; sniffed from the file when omitted")]
    pub delimiter: Option<char>,
    #[arg(long, default_value_t = false)]
    pub pretty: bool,
    #[command(flatten)]
    pub scenario: ScenarioArgs,
}

/// Validated scenario: parameters as fractions plus the dividend equity marker.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSettings {
    pub params: ScenarioParameters,
    pub dividend_equity: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PlanPayload {
    rows: Vec<RawRow>,
    dividend_per_share: Option<f64>,
    initial_withdrawal_rate: Option<f64>,
    inflation_rate: Option<f64>,
    monthly_living_expense: Option<f64>,
    monthly_debt_service: Option<f64>,
    dividend_equity: Option<String>,
}

#[derive(Debug)]
struct PlanRequest {
    rows: Vec<RawRow>,
    settings: PlanSettings,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepMeasure {
    Relative,
    Total,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterfallStep {
    pub label: &'static str,
    pub measure: StepMeasure,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveStatus {
    pub funded_without_reserve: bool,
    pub overdrawn: bool,
    pub unfunded_shortfall: f64,
    pub runway_years: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReport {
    pub dividend_equity: String,
    pub parameters: ScenarioParameters,
    pub aggregates: Aggregates,
    pub plan: FundingPlan,
    pub reserve: ReserveStatus,
    pub steps: Vec<WaterfallStep>,
    pub flags: Vec<RowFlag>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DefaultsResponse {
    parameters: ScenarioParameters,
    dividend_equity: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub fn build_settings(args: ScenarioArgs) -> Result<PlanSettings, String> {
    for (name, value) in [
        ("--dividend-per-share", args.dividend_per_share),
        ("--initial-withdrawal-rate", args.initial_withdrawal_rate),
        ("--inflation-rate", args.inflation_rate),
        ("--monthly-living-expense", args.monthly_living_expense),
        ("--monthly-debt-service", args.monthly_debt_service),
    ] {
        if !value.is_finite() {
            return Err(format!("{name} must be a finite number"));
        }
    }

    if args.dividend_per_share < 0.0 {
        return Err("--dividend-per-share must be >= 0".to_string());
    }

    if !(0.0..=100.0).contains(&args.initial_withdrawal_rate) {
        return Err("--initial-withdrawal-rate must be between 0 and 100".to_string());
    }

    if args.inflation_rate <= -100.0 {
        return Err("--inflation-rate must be > -100".to_string());
    }

    if args.monthly_living_expense < 0.0 {
        return Err("--monthly-living-expense must be >= 0".to_string());
    }

    if args.monthly_debt_service < 0.0 {
        return Err("--monthly-debt-service must be >= 0".to_string());
    }

    let dividend_equity = args.dividend_equity.trim().to_string();
    if dividend_equity.is_empty() {
        return Err("--dividend-equity must not be empty".to_string());
    }

    Ok(PlanSettings {
        params: ScenarioParameters {
            dividend_per_share: args.dividend_per_share,
            initial_withdrawal_rate: args.initial_withdrawal_rate / 100.0,
            inflation_rate: args.inflation_rate / 100.0,
            monthly_living_expense: args.monthly_living_expense,
            monthly_debt_service: args.monthly_debt_service,
        },
        dividend_equity,
    })
}

pub fn build_report(rows: &[RawRow], settings: &PlanSettings) -> PlanReport {
    let classification = classify_with_flags(rows);
    let aggregates = aggregate(&classification.records, &settings.dividend_equity);
    let plan = allocate(&aggregates, aggregates.target_equity_shares, &settings.params);

    let unfunded_shortfall = plan.unfunded_reserve_shortfall(aggregates.reserve_cash);
    let reserve = ReserveStatus {
        funded_without_reserve: plan.is_funded_without_reserve(),
        overdrawn: unfunded_shortfall > 0.0,
        unfunded_shortfall,
        runway_years: plan.reserve_runway_years(aggregates.reserve_cash),
    };

    PlanReport {
        dividend_equity: settings.dividend_equity.clone(),
        parameters: settings.params,
        aggregates,
        plan,
        reserve,
        steps: build_waterfall_steps(&plan),
        flags: classification.flags,
    }
}

/// Chart steps in display order. Cash layers only appear when drawn.
pub fn build_waterfall_steps(plan: &FundingPlan) -> Vec<WaterfallStep> {
    let mut steps = vec![
        WaterfallStep {
            label: "Dividend income",
            measure: StepMeasure::Relative,
            value: plan.dividend_income,
        },
        WaterfallStep {
            label: "Asset sale",
            measure: StepMeasure::Relative,
            value: plan.sold_asset_amount,
        },
    ];

    if plan.ordinary_cash_used > 0.0 {
        steps.push(WaterfallStep {
            label: "Ordinary cash",
            measure: StepMeasure::Relative,
            value: plan.ordinary_cash_used,
        });
    }
    if plan.reserve_cash_used > 0.0 {
        steps.push(WaterfallStep {
            label: "Reserve cash",
            measure: StepMeasure::Relative,
            value: plan.reserve_cash_used,
        });
    }

    steps.extend([
        WaterfallStep {
            label: "Available funds",
            measure: StepMeasure::Total,
            value: plan.funds_available(),
        },
        WaterfallStep {
            label: "Living cost",
            measure: StepMeasure::Relative,
            value: -plan.living_cost,
        },
        WaterfallStep {
            label: "Debt service",
            measure: StepMeasure::Relative,
            value: -plan.debt_cost,
        },
        WaterfallStep {
            label: "Final balance",
            measure: StepMeasure::Total,
            value: plan.final_balance,
        },
    ]);
    steps
}

pub fn run_report(cli: Cli) -> Result<String, CliError> {
    let settings = build_settings(cli.scenario).map_err(CliError::InvalidParameters)?;
    let delimiter = cli
        .delimiter
        .map(|delim| {
            u8::try_from(delim).map_err(|_| {
                CliError::InvalidParameters("--delimiter must be an ASCII character".to_string())
            })
        })
        .transpose()?;
    let rows = read_rows(&cli.input, delimiter)?;

    let report = build_report(&rows, &settings);
    log_report(&report);

    let json = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    Ok(json)
}

fn log_report(report: &PlanReport) {
    info!(
        net_worth = report.aggregates.net_worth,
        final_balance = report.plan.final_balance,
        flags = report.flags.len(),
        "built plan report"
    );
    if report.reserve.overdrawn {
        warn!(
            shortfall = report.reserve.unfunded_shortfall,
            "reserve cash cannot cover this year's draw"
        );
    }
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router();

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "ledger waterfall HTTP API listening");
    println!("Local access: http://127.0.0.1:{port}/api/health");

    axum::serve(listener, app).await
}

fn router() -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/defaults", get(defaults_handler))
        .route("/api/plan", post(plan_handler))
        .fallback(not_found_handler)
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn defaults_handler() -> Response {
    match build_settings(ScenarioArgs::default()) {
        Ok(settings) => json_response(
            StatusCode::OK,
            DefaultsResponse {
                parameters: settings.params,
                dividend_equity: settings.dividend_equity,
            },
        ),
        Err(msg) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &msg),
    }
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn plan_handler(Json(payload): Json<PlanPayload>) -> Response {
    let request = match plan_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => {
            warn!(error = %msg, "rejected plan request");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    let report = build_report(&request.rows, &request.settings);
    log_report(&report);
    json_response(StatusCode::OK, report)
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
fn plan_request_from_json(json: &str) -> Result<PlanRequest, String> {
    let payload = serde_json::from_str::<PlanPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    plan_request_from_payload(payload)
}

fn plan_request_from_payload(payload: PlanPayload) -> Result<PlanRequest, String> {
    let mut args = ScenarioArgs::default();

    if let Some(v) = payload.dividend_per_share {
        args.dividend_per_share = v;
    }
    if let Some(v) = payload.initial_withdrawal_rate {
        args.initial_withdrawal_rate = v;
    }
    if let Some(v) = payload.inflation_rate {
        args.inflation_rate = v;
    }
    if let Some(v) = payload.monthly_living_expense {
        args.monthly_living_expense = v;
    }
    if let Some(v) = payload.monthly_debt_service {
        args.monthly_debt_service = v;
    }
    if let Some(v) = payload.dividend_equity {
        args.dividend_equity = v;
    }

    let settings = build_settings(args)?;
    Ok(PlanRequest {
        rows: payload.rows,
        settings,
    })
}
