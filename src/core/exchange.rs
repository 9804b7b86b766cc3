//! Currency conversion through a third-party rate API, with a time-to-live cache.
//!
//! The cache is an ordinary value owned by whoever needs it (the HTTP state holds one),
//! not a process-wide static. Rates are cached per base currency; an entry older than the
//! TTL is refetched on the next lookup. A failed fetch leaves the cache as it was.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::RwLock, time::Instant};
use tracing::{debug, info, instrument};

/// Source of exchange rates for a base currency.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Returns `currency code -> units of that currency per one unit of base`.
    async fn fetch_rates(&self, base: &str) -> Result<HashMap<String, f64>>;
}

/// Rate provider backed by a JSON HTTP endpoint.
///
/// The URL template's `{base}` placeholder is replaced with the base currency. The response
/// must carry a `rates` object, as exchangerate-api.com and compatible services do.
#[derive(Debug, Clone)]
pub struct HttpRateProvider {
    client: reqwest::Client,
    url_template: String,
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: HashMap<String, f64>,
}

impl HttpRateProvider {
    /// Creates a provider for the given URL template.
    #[must_use]
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url_template: url_template.into(),
        }
    }

    fn url_for(&self, base: &str) -> String {
        self.url_template.replace("{base}", base)
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn fetch_rates(&self, base: &str) -> Result<HashMap<String, f64>> {
        let url = self.url_for(base);
        debug!("Fetching exchange rates from {}", url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::ExchangeRate {
                message: format!("{url} answered {status}"),
            });
        }
        let body: RatesResponse = response.json().await?;
        Ok(body.rates)
    }
}

struct CachedRates {
    rates: HashMap<String, f64>,
    fetched_at: Instant,
}

/// Per-base-currency rate cache in front of a [`RateProvider`].
pub struct ExchangeRateCache {
    provider: Arc<dyn RateProvider>,
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedRates>>,
}

impl ExchangeRateCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(provider: Arc<dyn RateProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Units of `to` per one unit of `from`.
    pub async fn rate(&self, from: &str, to: &str) -> Result<f64> {
        let unavailable = || Error::RateUnavailable {
            from: from.to_string(),
            to: to.to_string(),
        };
        let from_code = normalize_currency(from).ok_or_else(unavailable)?;
        let to_code = normalize_currency(to).ok_or_else(unavailable)?;

        if from_code == to_code {
            return Ok(1.0);
        }

        let rates = self.rates_for(&from_code).await?;
        rates.get(&to_code).copied().ok_or_else(unavailable)
    }

    /// Converts `amount` from one currency into another.
    #[instrument(skip(self))]
    pub async fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64> {
        if !amount.is_finite() {
            return Err(Error::InvalidAmount { amount });
        }
        Ok(amount * self.rate(from, to).await?)
    }

    /// Drops every cached entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    async fn rates_for(&self, base: &str) -> Result<HashMap<String, f64>> {
        {
            let entries = self.entries.read().await;
            if let Some(cached) = entries.get(base) {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.rates.clone());
                }
            }
        }

        let rates = self.provider.fetch_rates(base).await?;
        info!("Exchange rates for {} refreshed ({} currencies)", base, rates.len());

        let mut entries = self.entries.write().await;
        entries.insert(
            base.to_string(),
            CachedRates {
                rates: rates.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(rates)
    }
}

/// Upper-cases a three-letter ISO 4217 code; `None` if it is not one.
#[must_use]
pub fn normalize_currency(code: &str) -> Option<String> {
    let code = code.trim();
    (code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()))
        .then(|| code.to_ascii_uppercase())
}
