//! Catch-up generator - materializes every due occurrence of a recurring rule.
//!
//! Starting from the rule's `next_occurrence` cursor, the generator writes one transaction per
//! occurrence up to and including `today` (and never past `end_date`), advancing the cursor one
//! step at a time with the recurrence calculator.
//!
//! Each occurrence is one database transaction: the row insert and the cursor advance commit
//! together or not at all. The advance is a compare-and-swap on the cursor value that was read,
//! so a concurrent sweep or a user edit makes the loser roll back instead of generating twice,
//! and the unique `(recurring_rule_id, date)` index rejects a duplicate row even if the cursor
//! somehow lags behind. A failure stops this rule only, leaving the cursor at the first
//! occurrence that was not generated, which is exactly where the next sweep resumes.

use crate::{
    core::recurrence::{self, RecurrenceSpec},
    entities::{RecurringRule, recurring_rule, transaction},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// Upper bound on occurrences generated for one rule in one run.
///
/// Daily rules hit this after roughly 27 years of downtime; whatever remains is generated
/// by the next sweep.
pub const MAX_OCCURRENCES_PER_RUN: u32 = 10_000;

/// What a completed catch-up did to one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatchUpOutcome {
    /// Transactions written in this run
    pub generated: u32,
    /// Cursor after the run
    pub next_occurrence: NaiveDate,
    /// Whether the rule went inactive in this run
    pub deactivated: bool,
}

/// A catch-up that stopped because an occurrence could not be committed.
///
/// Everything generated before the failure stays committed.
#[derive(Debug, thiserror::Error)]
#[error("catch-up for rule {rule_id} stopped at {stopped_at} after {generated} row(s): {source}")]
pub struct CatchUpFailure {
    /// Rule that failed
    pub rule_id: i64,
    /// Transactions committed before the failure
    pub generated: u32,
    /// Occurrence that could not be generated; the cursor still points here
    pub stopped_at: NaiveDate,
    /// Underlying error
    #[source]
    pub source: Error,
}

/// Generates every due occurrence of `rule` up to `today`.
///
/// Inactive rules are left untouched. A rule whose cursor already lies past its end date is
/// deactivated without generating anything.
#[instrument(
    skip(db, rule),
    fields(rule_id = rule.id, kind = ?rule.kind, cursor = %rule.next_occurrence)
)]
pub async fn catch_up_rule(
    db: &DatabaseConnection,
    rule: &recurring_rule::Model,
    today: NaiveDate,
) -> std::result::Result<CatchUpOutcome, CatchUpFailure> {
    let mut cursor = rule.next_occurrence;
    let mut generated = 0;
    let fail = |generated: u32, stopped_at: NaiveDate, source: Error| CatchUpFailure {
        rule_id: rule.id,
        generated,
        stopped_at,
        source,
    };

    if !rule.is_active {
        return Ok(CatchUpOutcome {
            generated,
            next_occurrence: cursor,
            deactivated: false,
        });
    }

    let spec = RecurrenceSpec::try_from(rule).map_err(|e| fail(generated, cursor, e))?;
    let within_end = |date: NaiveDate| spec.end_date.is_none_or(|end| date <= end);
    let mut deactivated = false;

    while cursor <= today && within_end(cursor) {
        if generated >= MAX_OCCURRENCES_PER_RUN {
            warn!(
                generated,
                %cursor,
                "Occurrence limit reached, remaining occurrences left for the next sweep"
            );
            break;
        }

        let next = recurrence::next_occurrence(cursor, &spec)
            .map_err(|e| fail(generated, cursor, e))?;
        let past_end = !within_end(next);

        materialize_occurrence(db, rule, cursor, next, past_end)
            .await
            .map_err(|e| fail(generated, cursor, e))?;

        debug!(occurrence = %cursor, next = %next, "Occurrence generated");
        generated += 1;
        cursor = next;
        deactivated = past_end;
    }

    if !deactivated && !within_end(cursor) {
        deactivate_at_cursor(db, rule.id, cursor)
            .await
            .map_err(|e| fail(generated, cursor, e))?;
        deactivated = true;
    }

    if generated > 0 || deactivated {
        info!(generated, next_occurrence = %cursor, deactivated, "Catch-up finished");
    }

    Ok(CatchUpOutcome {
        generated,
        next_occurrence: cursor,
        deactivated,
    })
}

/// Writes the transaction for `occurrence` and moves the cursor to `next` in one unit.
///
/// When `deactivate` is set the rule is switched off in the same unit.
async fn materialize_occurrence(
    db: &DatabaseConnection,
    rule: &recurring_rule::Model,
    occurrence: NaiveDate,
    next: NaiveDate,
    deactivate: bool,
) -> Result<transaction::Model> {
    let txn = db.begin().await?;
    let now = Utc::now();

    let row = transaction::ActiveModel {
        kind: Set(rule.kind),
        recurring_rule_id: Set(Some(rule.id)),
        account_id: Set(rule.account_id.clone()),
        user_id: Set(rule.user_id.clone()),
        amount: Set(rule.amount),
        currency: Set(rule.currency.clone()),
        category: Set(rule.category.clone()),
        description: Set(rule.description.clone()),
        date: Set(occurrence),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let mut advance = RecurringRule::update_many()
        .col_expr(recurring_rule::Column::NextOccurrence, Expr::value(next))
        .col_expr(recurring_rule::Column::UpdatedAt, Expr::value(now));
    if deactivate {
        advance = advance.col_expr(recurring_rule::Column::IsActive, Expr::value(false));
    }
    let advanced = advance
        .filter(recurring_rule::Column::Id.eq(rule.id))
        .filter(recurring_rule::Column::NextOccurrence.eq(occurrence))
        .filter(recurring_rule::Column::IsActive.eq(true))
        .exec(&txn)
        .await?;

    if advanced.rows_affected != 1 {
        txn.rollback().await?;
        return Err(Error::CursorConflict {
            rule_id: rule.id,
            expected: occurrence,
        });
    }

    txn.commit().await?;
    Ok(row)
}

/// Switches a rule off if its cursor is still where we left it.
async fn deactivate_at_cursor(
    db: &DatabaseConnection,
    rule_id: i64,
    cursor: NaiveDate,
) -> Result<()> {
    let result = RecurringRule::update_many()
        .col_expr(recurring_rule::Column::IsActive, Expr::value(false))
        .col_expr(recurring_rule::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(recurring_rule::Column::Id.eq(rule_id))
        .filter(recurring_rule::Column::NextOccurrence.eq(cursor))
        .exec(db)
        .await?;

    if result.rows_affected != 1 {
        return Err(Error::CursorConflict {
            rule_id,
            expected: cursor,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::rule::{deactivate_rule, get_rule, get_transactions_for_rule};
    use crate::entities::{Frequency, TransactionKind};
    use crate::test_utils::*;

    async fn dates_for(db: &DatabaseConnection, rule_id: i64) -> Result<Vec<NaiveDate>> {
        Ok(get_transactions_for_rule(db, rule_id)
            .await?
            .into_iter()
            .map(|t| t.date)
            .collect())
    }

    #[tokio::test]
    async fn test_daily_catch_up_generates_each_missed_day() -> Result<()> {
        let db = setup_test_db().await?;
        let rule = insert_rule(&db, TransactionKind::Expense, date(2024, 1, 1)).await?;

        let outcome = catch_up_rule(&db, &rule, date(2024, 1, 4)).await.unwrap();
        assert_eq!(outcome.generated, 4);
        assert_eq!(outcome.next_occurrence, date(2024, 1, 5));
        assert!(!outcome.deactivated);

        assert_eq!(
            dates_for(&db, rule.id).await?,
            vec![
                date(2024, 1, 1),
                date(2024, 1, 2),
                date(2024, 1, 3),
                date(2024, 1, 4)
            ]
        );
        let stored = get_rule(&db, rule.id).await?.unwrap();
        assert_eq!(stored.next_occurrence, date(2024, 1, 5));
        assert!(stored.is_active);

        Ok(())
    }

    #[tokio::test]
    async fn test_second_run_generates_nothing() -> Result<()> {
        let db = setup_test_db().await?;
        let rule = insert_rule(&db, TransactionKind::Expense, date(2024, 1, 1)).await?;

        catch_up_rule(&db, &rule, date(2024, 1, 10)).await.unwrap();
        let reloaded = get_rule(&db, rule.id).await?.unwrap();
        let outcome = catch_up_rule(&db, &reloaded, date(2024, 1, 10)).await.unwrap();

        assert_eq!(outcome.generated, 0);
        assert_eq!(dates_for(&db, rule.id).await?.len(), 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_rule_snapshot_cannot_duplicate() -> Result<()> {
        let db = setup_test_db().await?;
        let rule = insert_rule(&db, TransactionKind::Income, date(2024, 1, 1)).await?;

        catch_up_rule(&db, &rule, date(2024, 1, 3)).await.unwrap();

        // Same snapshot again, as an overlapping sweep would hold it
        let failure = catch_up_rule(&db, &rule, date(2024, 1, 3)).await.unwrap_err();
        assert_eq!(failure.generated, 0);
        assert_eq!(failure.stopped_at, date(2024, 1, 1));
        assert!(failure.source.is_persistence_failure());

        assert_eq!(dates_for(&db, rule.id).await?.len(), 3);
        let stored = get_rule(&db, rule.id).await?.unwrap();
        assert_eq!(stored.next_occurrence, date(2024, 1, 4));
        Ok(())
    }

    #[tokio::test]
    async fn test_deactivated_snapshot_rolls_back_occurrence() -> Result<()> {
        let db = setup_test_db().await?;
        let snapshot = insert_rule(&db, TransactionKind::Expense, date(2024, 1, 1)).await?;
        deactivate_rule(&db, snapshot.id).await?;

        let failure = catch_up_rule(&db, &snapshot, date(2024, 1, 3)).await.unwrap_err();
        assert!(matches!(
            failure.source,
            Error::CursorConflict { expected, .. } if expected == date(2024, 1, 1)
        ));
        assert_eq!(failure.generated, 0);

        // The insert was undone with the failed advance
        assert!(dates_for(&db, snapshot.id).await?.is_empty());
        let stored = get_rule(&db, snapshot.id).await?.unwrap();
        assert_eq!(stored.next_occurrence, date(2024, 1, 1));
        assert!(!stored.is_active);
        Ok(())
    }

    #[tokio::test]
    async fn test_moved_cursor_rolls_back_occurrence() -> Result<()> {
        let db = setup_test_db().await?;
        let snapshot = insert_rule(&db, TransactionKind::Income, date(2024, 1, 1)).await?;

        // Edited elsewhere after the snapshot was read
        let mut edited: recurring_rule::ActiveModel = snapshot.clone().into();
        edited.next_occurrence = Set(date(2024, 1, 5));
        edited.update(&db).await?;

        let failure = catch_up_rule(&db, &snapshot, date(2024, 1, 3)).await.unwrap_err();
        assert!(matches!(failure.source, Error::CursorConflict { .. }));
        assert_eq!(failure.stopped_at, date(2024, 1, 1));

        assert!(dates_for(&db, snapshot.id).await?.is_empty());
        let stored = get_rule(&db, snapshot.id).await?.unwrap();
        assert_eq!(stored.next_occurrence, date(2024, 1, 5));
        Ok(())
    }

    #[tokio::test]
    async fn test_deactivation_past_end_respects_moved_cursor() -> Result<()> {
        let db = setup_test_db().await?;
        let snapshot = insert_rule_with(&db, date(2024, 1, 11), |r| {
            r.start_date = Set(date(2024, 1, 1));
            r.end_date = Set(Some(date(2024, 1, 10)));
        })
        .await?;

        let mut edited: recurring_rule::ActiveModel = snapshot.clone().into();
        edited.next_occurrence = Set(date(2024, 1, 12));
        edited.update(&db).await?;

        let failure = catch_up_rule(&db, &snapshot, date(2024, 1, 20)).await.unwrap_err();
        assert!(matches!(
            failure.source,
            Error::CursorConflict { expected, .. } if expected == date(2024, 1, 11)
        ));
        assert_eq!(failure.generated, 0);

        let stored = get_rule(&db, snapshot.id).await?.unwrap();
        assert!(stored.is_active);
        assert_eq!(stored.next_occurrence, date(2024, 1, 12));
        Ok(())
    }

    #[tokio::test]
    async fn test_end_date_is_inclusive_and_deactivates() -> Result<()> {
        let db = setup_test_db().await?;
        let rule = insert_rule_with(&db, date(2024, 1, 10), |r| {
            r.start_date = Set(date(2024, 1, 1));
            r.end_date = Set(Some(date(2024, 1, 10)));
        })
        .await?;

        let outcome = catch_up_rule(&db, &rule, date(2024, 1, 15)).await.unwrap();
        assert_eq!(outcome.generated, 1);
        assert_eq!(outcome.next_occurrence, date(2024, 1, 11));
        assert!(outcome.deactivated);

        assert_eq!(dates_for(&db, rule.id).await?, vec![date(2024, 1, 10)]);
        let stored = get_rule(&db, rule.id).await?.unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.next_occurrence, date(2024, 1, 11));

        // Inactive is absorbing
        let later = catch_up_rule(&db, &stored, date(2024, 6, 1)).await.unwrap();
        assert_eq!(later.generated, 0);
        assert_eq!(dates_for(&db, rule.id).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_cursor_past_end_deactivates_without_generating() -> Result<()> {
        let db = setup_test_db().await?;
        let rule = insert_rule_with(&db, date(2024, 2, 1), |r| {
            r.start_date = Set(date(2024, 1, 1));
            r.end_date = Set(Some(date(2024, 1, 20)));
        })
        .await?;

        let outcome = catch_up_rule(&db, &rule, date(2024, 3, 1)).await.unwrap();
        assert_eq!(outcome.generated, 0);
        assert!(outcome.deactivated);
        assert!(!get_rule(&db, rule.id).await?.unwrap().is_active);
        Ok(())
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_cursor_at_failed_occurrence() -> Result<()> {
        let db = setup_test_db().await?;
        let rule = insert_rule(&db, TransactionKind::Expense, date(2024, 1, 1)).await?;

        // A row already occupying Jan 3 makes that occurrence's insert fail
        insert_conflicting_transaction(&db, &rule, date(2024, 1, 3)).await?;

        let failure = catch_up_rule(&db, &rule, date(2024, 1, 5)).await.unwrap_err();
        assert_eq!(failure.generated, 2);
        assert_eq!(failure.stopped_at, date(2024, 1, 3));
        assert!(matches!(failure.source, Error::Database(_)));

        let generated: Vec<_> = get_transactions_for_rule(&db, rule.id)
            .await?
            .into_iter()
            .filter(|t| t.description != CONFLICT_MARKER)
            .map(|t| t.date)
            .collect();
        assert_eq!(generated, vec![date(2024, 1, 1), date(2024, 1, 2)]);

        let stored = get_rule(&db, rule.id).await?.unwrap();
        assert_eq!(stored.next_occurrence, date(2024, 1, 3));
        assert!(stored.is_active);
        Ok(())
    }

    #[tokio::test]
    async fn test_monthly_catch_up_clamps_february() -> Result<()> {
        let db = setup_test_db().await?;
        let rule = insert_rule_with(&db, date(2024, 1, 31), |r| {
            r.frequency = Set(Frequency::Monthly);
            r.day_of_month = Set(Some(31));
            r.start_date = Set(date(2024, 1, 31));
        })
        .await?;

        let outcome = catch_up_rule(&db, &rule, date(2024, 4, 30)).await.unwrap();
        assert_eq!(outcome.generated, 4);
        assert_eq!(
            dates_for(&db, rule.id).await?,
            vec![
                date(2024, 1, 31),
                date(2024, 2, 29),
                date(2024, 3, 31),
                date(2024, 4, 30)
            ]
        );
        assert_eq!(outcome.next_occurrence, date(2024, 5, 31));
        Ok(())
    }

    #[tokio::test]
    async fn test_weekly_mask_catch_up_only_hits_selected_days() -> Result<()> {
        let db = setup_test_db().await?;
        let mask = (1 << 1) | (1 << 4);
        let rule = insert_rule_with(&db, date(2024, 1, 1), |r| {
            r.frequency = Set(Frequency::Weekly);
            r.day_of_week_mask = Set(mask);
            r.start_date = Set(date(2024, 1, 1));
        })
        .await?;

        catch_up_rule(&db, &rule, date(2024, 1, 14)).await.unwrap();
        assert_eq!(
            dates_for(&db, rule.id).await?,
            vec![
                date(2024, 1, 1),
                date(2024, 1, 4),
                date(2024, 1, 8),
                date(2024, 1, 11)
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_inactive_rule_is_ignored() -> Result<()> {
        let db = setup_test_db().await?;
        let rule = insert_rule_with(&db, date(2024, 1, 1), |r| {
            r.is_active = Set(false);
        })
        .await?;

        let outcome = catch_up_rule(&db, &rule, date(2024, 1, 31)).await.unwrap();
        assert_eq!(outcome.generated, 0);
        assert!(dates_for(&db, rule.id).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_misconfigured_stored_rule_fails_without_writing() -> Result<()> {
        let db = setup_test_db().await?;
        let rule = insert_rule_with(&db, date(2024, 1, 1), |r| {
            r.frequency = Set(Frequency::Custom);
        })
        .await?;

        let failure = catch_up_rule(&db, &rule, date(2024, 1, 31)).await.unwrap_err();
        assert!(matches!(
            failure.source,
            Error::InvalidRuleConfiguration { .. }
        ));
        assert!(dates_for(&db, rule.id).await?.is_empty());
        Ok(())
    }
}
