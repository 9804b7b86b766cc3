//! Unified error types and result handling.

use thiserror::Error;

/// Every failure the recurrence engine, its stores and the HTTP layer can surface.
#[derive(Debug, Error)]
pub enum Error {
    /// Application configuration could not be loaded or is inconsistent
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// Frequency parameters are malformed or missing; rejected at rule creation
    #[error("Invalid recurrence rule: {message}")]
    InvalidRuleConfiguration {
        /// Which parameter is wrong and why
        message: String,
    },

    /// Amount is zero, negative or not finite
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: f64,
    },

    /// No recurring rule with this id exists
    #[error("Recurring rule not found: {id}")]
    RuleNotFound {
        /// Requested rule id
        id: i64,
    },

    /// The rule's cursor moved underneath us (concurrent sweep or user edit)
    #[error("Cursor for rule {rule_id} is no longer at {expected}")]
    CursorConflict {
        /// Rule being advanced
        rule_id: i64,
        /// Cursor value the update expected to replace
        expected: chrono::NaiveDate,
    },

    /// The sweep trigger was called without the shared secret
    #[error("Unauthorized trigger")]
    UnauthorizedTrigger,

    /// Exchange rate provider could not be reached or answered garbage
    #[error("Exchange rate error: {message}")]
    ExchangeRate {
        /// Upstream failure description
        message: String,
    },

    /// Provider answered but does not know the requested pair
    #[error("No exchange rate from {from} to {to}")]
    RateUnavailable {
        /// Source currency
        from: String,
        /// Target currency
        to: String,
    },

    /// Transaction or rule store write/read failed
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Outbound HTTP failure
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Integer conversion overflowed
    #[error("Integer conversion error: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),
}

impl Error {
    /// Shorthand for [`Error::InvalidRuleConfiguration`].
    pub fn invalid_rule(message: impl Into<String>) -> Self {
        Self::InvalidRuleConfiguration {
            message: message.into(),
        }
    }

    /// True for failures that come from the rule or transaction stores.
    #[must_use]
    pub const fn is_persistence_failure(&self) -> bool {
        matches!(self, Self::Database(_) | Self::CursorConflict { .. })
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
