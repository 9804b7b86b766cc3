//! Request handlers for the Gold-Finger HTTP API.

use super::{ApiError, AppState};
use crate::{
    core::{
        recurrence::{self, DATE_FORMAT},
        rule::{self, CreatedRule, NewRecurringRule},
        sweep::{SweepSummary, run_sweep},
    },
    entities::recurring_rule,
    errors::Error,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

type ApiResult<T> = std::result::Result<T, ApiError>;

const DEFAULT_PREVIEW_DAYS: u64 = 30;

/// Body returned by the cron trigger.
#[derive(Debug, Serialize)]
pub struct SweepResponse {
    /// Always true; failures of individual rules are reported in the counts
    pub success: bool,
    /// The date the sweep ran for, `YYYY-MM-DD`
    pub date: String,
    /// Per-collection counts
    pub result: SweepSummary,
}

/// Liveness probe.
pub async fn health() -> &'static str {
    "ok"
}

/// Daily cron entry point: runs the recurring sweep for today.
///
/// Requires `Authorization: Bearer <CRON_SECRET>`; anything else is a 401 with no processing.
pub async fn run_recurring_sweep(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<SweepResponse>> {
    authorize_trigger(&headers, state.cron_secret.as_deref())?;

    let today = state.today();
    info!("Recurring sweep triggered for {}", today);
    let result = run_sweep(&state.database, today).await;

    Ok(Json(SweepResponse {
        success: true,
        date: today.format(DATE_FORMAT).to_string(),
        result,
    }))
}

/// Creates a recurring rule and backfills anything already due.
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Json(new_rule): Json<NewRecurringRule>,
) -> ApiResult<(StatusCode, Json<CreatedRule>)> {
    let created = rule::create_recurring_rule(&state.database, new_rule, state.today()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Fetches one rule.
pub async fn get_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<recurring_rule::Model>> {
    let found = rule::get_rule(&state.database, id)
        .await?
        .ok_or(Error::RuleNotFound { id })?;
    Ok(Json(found))
}

/// Lists every rule of an account, active or not.
pub async fn list_account_rules(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> ApiResult<Json<Vec<recurring_rule::Model>>> {
    Ok(Json(
        rule::get_rules_for_account(&state.database, &account_id).await?,
    ))
}

/// Query string of [`upcoming_occurrences`].
#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    /// Last date to include, `YYYY-MM-DD`; defaults to 30 days from today
    pub until: Option<String>,
}

/// Previews the dates a rule will generate next.
pub async fn upcoming_occurrences(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<UpcomingQuery>,
) -> ApiResult<Json<Vec<NaiveDate>>> {
    let until = match query.until.as_deref() {
        Some(raw) => recurrence::parse_date(Some(raw), "until")?,
        None => state.today() + Days::new(DEFAULT_PREVIEW_DAYS),
    };
    Ok(Json(
        rule::upcoming_occurrences(&state.database, id, until).await?,
    ))
}

/// Stops a rule permanently.
pub async fn deactivate_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<recurring_rule::Model>> {
    Ok(Json(rule::deactivate_rule(&state.database, id).await?))
}

/// Query string of [`convert_currency`].
#[derive(Debug, Deserialize)]
pub struct ConvertQuery {
    /// Amount in `from`
    pub amount: f64,
    /// Source currency
    pub from: String,
    /// Target currency
    pub to: String,
}

/// Conversion result.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConvertResponse {
    /// Source amount
    pub amount: f64,
    /// Source currency, upper-case
    pub from: String,
    /// Target currency, upper-case
    pub to: String,
    /// Amount in `to`
    pub converted: f64,
}

/// Converts an amount between currencies using cached rates.
pub async fn convert_currency(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConvertQuery>,
) -> ApiResult<Json<ConvertResponse>> {
    let converted = state
        .rates
        .convert(query.amount, &query.from, &query.to)
        .await?;
    Ok(Json(ConvertResponse {
        amount: query.amount,
        from: query.from.trim().to_ascii_uppercase(),
        to: query.to.trim().to_ascii_uppercase(),
        converted,
    }))
}

/// Checks the bearer token against the configured secret.
fn authorize_trigger(headers: &HeaderMap, expected: Option<&str>) -> Result<(), Error> {
    let Some(expected) = expected else {
        warn!("Cron trigger rejected: CRON_SECRET is not configured");
        return Err(Error::UnauthorizedTrigger);
    };

    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => Ok(()),
        _ => {
            warn!("Cron trigger rejected: missing or wrong bearer token");
            Err(Error::UnauthorizedTrigger)
        }
    }
}

/// Compares secrets without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
