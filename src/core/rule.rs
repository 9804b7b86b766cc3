//! Recurring rule business logic - creation, lookups and user-initiated deactivation.
//!
//! Creating a rule validates its schedule with the recurrence calculator, stores the first
//! occurrence as the rule's cursor and, when that occurrence is already due, backfills the
//! missed transactions right away through the catch-up generator. The due-rule query used by
//! the daily sweep lives here as well so every read of the rule table goes through one module.

use crate::{
    core::{
        catch_up::{self, CatchUpOutcome},
        exchange::normalize_currency,
        recurrence::{self, RecurrenceSpec},
    },
    entities::{
        CustomUnit, Frequency, RecurringRule, Transaction, TransactionKind, recurring_rule,
        transaction,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Most dates [`upcoming_occurrences`] returns.
pub const MAX_PREVIEW_OCCURRENCES: usize = 1_000;

/// Input of the create-rule action.
///
/// Dates arrive as text so that a missing or malformed start date is reported as an
/// invalid rule rather than a generic deserialization failure.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRecurringRule {
    /// Expense or income
    pub kind: TransactionKind,
    /// Shared account the rule books onto
    pub account_id: String,
    /// Creating user, as reported by the identity provider
    pub user_id: String,
    /// Template amount, must be finite and positive
    pub amount: f64,
    /// ISO 4217 code
    pub currency: String,
    /// Template category
    #[serde(default)]
    pub category: Option<String>,
    /// Template description
    #[serde(default)]
    pub description: String,
    /// Frequency variant
    pub frequency: Frequency,
    /// Step size for custom rules
    #[serde(default)]
    pub custom_interval: Option<i64>,
    /// Step unit for custom rules
    #[serde(default)]
    pub custom_unit: Option<CustomUnit>,
    /// Weekday bitmask for weekly rules
    #[serde(default)]
    pub day_of_week_mask: i64,
    /// Day of month for monthly rules
    #[serde(default)]
    pub day_of_month: Option<i64>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub start_date: Option<String>,
    /// `YYYY-MM-DD`, inclusive
    #[serde(default)]
    pub end_date: Option<String>,
}

impl NewRecurringRule {
    /// Builds and validates the calculator view of this input.
    pub fn to_spec(&self) -> Result<RecurrenceSpec> {
        let start_date = recurrence::parse_date(self.start_date.as_deref(), "start_date")?;
        let end_date = self
            .end_date
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| recurrence::parse_date(Some(s), "end_date"))
            .transpose()?;

        let spec = RecurrenceSpec {
            frequency: self.frequency,
            custom_interval: self
                .custom_interval
                .map(|n| narrow(n, "custom interval"))
                .transpose()?,
            custom_unit: self.custom_unit,
            day_of_week_mask: narrow(self.day_of_week_mask, "day of week mask")?,
            day_of_month: self
                .day_of_month
                .map(|n| narrow(n, "day of month"))
                .transpose()?,
            start_date,
            end_date,
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// Converts a client-supplied integer, reporting out-of-range input as an invalid rule.
fn narrow<T: TryFrom<i64>>(value: i64, field: &str) -> Result<T> {
    T::try_from(value)
        .map_err(|_| Error::invalid_rule(format!("{field} {value} is out of range")))
}

/// Result of [`create_recurring_rule`].
#[derive(Debug, Clone, Serialize)]
pub struct CreatedRule {
    /// The rule as stored after any backfill
    pub rule: recurring_rule::Model,
    /// Transactions generated synchronously for occurrences already due
    pub backfilled: u32,
}

/// Creates a recurring rule and backfills occurrences that are already due.
///
/// The cursor starts at the first occurrence on or after the start date. A rule whose first
/// occurrence already lies beyond its end date is stored inactive and never generates.
/// A failed backfill does not fail creation: the rule is persisted with its cursor at the
/// first missing occurrence and the next sweep picks it up.
#[instrument(skip(db, new_rule), fields(kind = ?new_rule.kind, account_id = %new_rule.account_id))]
pub async fn create_recurring_rule(
    db: &DatabaseConnection,
    new_rule: NewRecurringRule,
    today: NaiveDate,
) -> Result<CreatedRule> {
    if !new_rule.amount.is_finite() || new_rule.amount <= 0.0 {
        return Err(Error::InvalidAmount {
            amount: new_rule.amount,
        });
    }
    let currency = normalize_currency(&new_rule.currency).ok_or_else(|| {
        Error::invalid_rule(format!("'{}' is not a currency code", new_rule.currency))
    })?;
    if new_rule.account_id.trim().is_empty() {
        return Err(Error::invalid_rule("account_id is required"));
    }
    if new_rule.user_id.trim().is_empty() {
        return Err(Error::invalid_rule("user_id is required"));
    }

    let spec = new_rule.to_spec()?;
    let first = recurrence::first_occurrence(&spec)?;
    // A schedule that cannot take its first step would fail every sweep
    recurrence::next_occurrence(first, &spec)?;
    let is_active = spec.end_date.is_none_or(|end| first <= end);

    let now = Utc::now();
    let rule = recurring_rule::ActiveModel {
        kind: Set(new_rule.kind),
        account_id: Set(new_rule.account_id.trim().to_string()),
        user_id: Set(new_rule.user_id.trim().to_string()),
        amount: Set(new_rule.amount),
        currency: Set(currency),
        category: Set(new_rule
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())),
        description: Set(new_rule.description.trim().to_string()),
        frequency: Set(spec.frequency),
        custom_interval: Set(spec.custom_interval.map(i32::try_from).transpose()?),
        custom_unit: Set(spec.custom_unit),
        day_of_week_mask: Set(i32::from(spec.day_of_week_mask)),
        day_of_month: Set(spec.day_of_month.map(i32::try_from).transpose()?),
        start_date: Set(spec.start_date),
        end_date: Set(spec.end_date),
        next_occurrence: Set(first),
        is_active: Set(is_active),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(
        rule_id = rule.id,
        first_occurrence = %first,
        is_active,
        "Recurring rule created"
    );

    if !is_active || first > today {
        return Ok(CreatedRule {
            rule,
            backfilled: 0,
        });
    }

    let backfilled = match catch_up::catch_up_rule(db, &rule, today).await {
        Ok(CatchUpOutcome { generated, .. }) => generated,
        Err(failure) => {
            warn!(rule_id = rule.id, error = %failure, "Backfill stopped early, sweep will retry");
            failure.generated
        }
    };

    let rule = get_rule(db, rule.id)
        .await?
        .ok_or(Error::RuleNotFound { id: rule.id })?;

    Ok(CreatedRule { rule, backfilled })
}

/// Finds a rule by id.
pub async fn get_rule(
    db: &DatabaseConnection,
    rule_id: i64,
) -> Result<Option<recurring_rule::Model>> {
    RecurringRule::find_by_id(rule_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// All rules of an account, oldest first.
pub async fn get_rules_for_account(
    db: &DatabaseConnection,
    account_id: &str,
) -> Result<Vec<recurring_rule::Model>> {
    RecurringRule::find()
        .filter(recurring_rule::Column::AccountId.eq(account_id))
        .order_by_asc(recurring_rule::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Active rules of one collection whose cursor is on or before `today`, across all accounts.
#[instrument(skip(db))]
pub async fn get_due_rules(
    db: &DatabaseConnection,
    kind: TransactionKind,
    today: NaiveDate,
) -> Result<Vec<recurring_rule::Model>> {
    RecurringRule::find()
        .filter(recurring_rule::Column::Kind.eq(kind))
        .filter(recurring_rule::Column::IsActive.eq(true))
        .filter(recurring_rule::Column::NextOccurrence.lte(today))
        .order_by_asc(recurring_rule::Column::NextOccurrence)
        .order_by_asc(recurring_rule::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Transactions generated by a rule, in occurrence order.
pub async fn get_transactions_for_rule(
    db: &DatabaseConnection,
    rule_id: i64,
) -> Result<Vec<transaction::Model>> {
    Transaction::find()
        .filter(transaction::Column::RecurringRuleId.eq(rule_id))
        .order_by_asc(transaction::Column::Date)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Occurrences a still-active rule will generate from its cursor up to `until`.
///
/// Inactive rules have none. The walk starts at the cursor and stops after
/// [`MAX_PREVIEW_OCCURRENCES`] dates.
pub async fn upcoming_occurrences(
    db: &DatabaseConnection,
    rule_id: i64,
    until: NaiveDate,
) -> Result<Vec<NaiveDate>> {
    let rule = get_rule(db, rule_id)
        .await?
        .ok_or(Error::RuleNotFound { id: rule_id })?;
    if !rule.is_active {
        return Ok(Vec::new());
    }

    let spec = RecurrenceSpec::try_from(&rule)?;
    recurrence::occurrences_from(&spec, rule.next_occurrence, until, MAX_PREVIEW_OCCURRENCES)
}

/// Stops a rule for good. Deactivation is terminal; the rule and its history are kept.
#[instrument(skip(db))]
pub async fn deactivate_rule(
    db: &DatabaseConnection,
    rule_id: i64,
) -> Result<recurring_rule::Model> {
    let rule = get_rule(db, rule_id)
        .await?
        .ok_or(Error::RuleNotFound { id: rule_id })?;

    if !rule.is_active {
        return Ok(rule);
    }

    let mut active_model: recurring_rule::ActiveModel = rule.into();
    active_model.is_active = Set(false);
    active_model.updated_at = Set(Utc::now());
    let updated = active_model.update(db).await?;
    info!(rule_id, "Recurring rule deactivated");
    Ok(updated)
}
