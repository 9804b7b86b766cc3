//! Shared test utilities for Gold-Finger.
//!
//! This module provides common helper functions for setting up test databases
//! and creating rules and transactions with sensible defaults.

use crate::{
    core::rule::NewRecurringRule,
    entities::{Frequency, TransactionKind, recurring_rule, transaction},
    errors::Result,
};
use chrono::{NaiveDate, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

/// Description stamped on rows inserted by [`insert_conflicting_transaction`].
pub const CONFLICT_MARKER: &str = "pre-existing row";

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Shorthand for a calendar date.
///
/// # Panics
/// Panics on an invalid date; tests only pass literal dates.
#[allow(clippy::unwrap_used)]
#[must_use]
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Create-rule input for a daily USD expense starting on `start_date`.
///
/// # Defaults
/// * `account_id`: `"household-1"`
/// * `user_id`: `"test_user"`
/// * `amount`: 12.5
#[must_use]
pub fn daily_rule_input(start_date: &str) -> NewRecurringRule {
    NewRecurringRule {
        kind: TransactionKind::Expense,
        account_id: "household-1".to_string(),
        user_id: "test_user".to_string(),
        amount: 12.5,
        currency: "USD".to_string(),
        category: Some("Subscriptions".to_string()),
        description: "Test rule".to_string(),
        frequency: Frequency::Daily,
        custom_interval: None,
        custom_unit: None,
        day_of_week_mask: 0,
        day_of_month: None,
        start_date: Some(start_date.to_string()),
        end_date: None,
    }
}

/// Inserts an active daily rule straight into the table with its cursor at `next_occurrence`.
///
/// `start_date` defaults to `next_occurrence`.
pub async fn insert_rule(
    db: &DatabaseConnection,
    kind: TransactionKind,
    next_occurrence: NaiveDate,
) -> Result<recurring_rule::Model> {
    insert_rule_with(db, next_occurrence, |rule| rule.kind = Set(kind)).await
}

/// Like [`insert_rule`] (expense, daily) but lets the caller override any column first.
pub async fn insert_rule_with<F>(
    db: &DatabaseConnection,
    next_occurrence: NaiveDate,
    customize: F,
) -> Result<recurring_rule::Model>
where
    F: FnOnce(&mut recurring_rule::ActiveModel),
{
    let now = Utc::now();
    let mut rule = recurring_rule::ActiveModel {
        kind: Set(TransactionKind::Expense),
        account_id: Set("household-1".to_string()),
        user_id: Set("test_user".to_string()),
        amount: Set(12.5),
        currency: Set("USD".to_string()),
        category: Set(None),
        description: Set("Test rule".to_string()),
        frequency: Set(Frequency::Daily),
        custom_interval: Set(None),
        custom_unit: Set(None),
        day_of_week_mask: Set(0),
        day_of_month: Set(None),
        start_date: Set(next_occurrence),
        end_date: Set(None),
        next_occurrence: Set(next_occurrence),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    customize(&mut rule);
    Ok(rule.insert(db).await?)
}

/// Inserts a row that occupies `rule`'s slot for `occurrence`, so generating that
/// occurrence fails on the unique index.
pub async fn insert_conflicting_transaction(
    db: &DatabaseConnection,
    rule: &recurring_rule::Model,
    occurrence: NaiveDate,
) -> Result<transaction::Model> {
    let row = transaction::ActiveModel {
        kind: Set(rule.kind),
        recurring_rule_id: Set(Some(rule.id)),
        account_id: Set(rule.account_id.clone()),
        user_id: Set(rule.user_id.clone()),
        amount: Set(rule.amount),
        currency: Set(rule.currency.clone()),
        category: Set(None),
        description: Set(CONFLICT_MARKER.to_string()),
        date: Set(occurrence),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    Ok(row.insert(db).await?)
}
