//! HTTP layer - axum router, shared state and request handlers
//!
//! Exposes the daily cron trigger for the recurring sweep, the create-rule action and a
//! currency conversion lookup. End-user authentication happens upstream at the identity
//! provider; the only secret checked here is the cron trigger's shared bearer token.

/// Error to HTTP response mapping
pub mod error;
/// Request handlers
pub mod handlers;

use crate::core::exchange::ExchangeRateCache;
use axum::{
    Router,
    routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Source of "today" for the sweep and rule creation.
pub type Clock = fn() -> NaiveDate;

/// Current UTC calendar date.
#[must_use]
pub fn utc_today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Shared data available to all handlers.
pub struct AppState {
    /// Database connection for all rule and transaction operations
    pub database: DatabaseConnection,
    /// Shared secret the cron trigger must present; `None` rejects every trigger
    pub cron_secret: Option<String>,
    /// Exchange rate lookups
    pub rates: ExchangeRateCache,
    /// Calendar used to decide which occurrences are due
    pub clock: Clock,
}

impl AppState {
    /// Creates state that uses the real UTC calendar.
    #[must_use]
    pub fn new(
        database: DatabaseConnection,
        cron_secret: Option<String>,
        rates: ExchangeRateCache,
    ) -> Self {
        Self {
            database,
            cron_secret,
            rates,
            clock: utc_today,
        }
    }

    /// Replaces the calendar, mainly for tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Today according to [`AppState::clock`].
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        (self.clock)()
    }
}

/// Build the application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/cron/recurring", get(handlers::run_recurring_sweep))
        .route("/api/recurring", post(handlers::create_rule))
        .route("/api/recurring/{id}", get(handlers::get_rule))
        .route(
            "/api/recurring/{id}/upcoming",
            get(handlers::upcoming_occurrences),
        )
        .route(
            "/api/accounts/{account_id}/recurring",
            get(handlers::list_account_rules),
        )
        .route(
            "/api/recurring/{id}/deactivate",
            post(handlers::deactivate_rule),
        )
        .route("/api/rates/convert", get(handlers::convert_currency))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
