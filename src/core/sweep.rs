//! Daily recurring sweep.
//!
//! Finds every active rule whose cursor is due, across all accounts, and runs the catch-up
//! generator on each one, expense rules first and income rules second. A failing rule is
//! logged and counted but never stops the sweep, and failing to list one collection's due
//! rules leaves that collection at zero while the other is still processed.

use crate::{
    core::{catch_up::catch_up_rule, rule::get_due_rules},
    entities::TransactionKind,
};
use chrono::NaiveDate;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tracing::{error, info, instrument};

/// Counts for one collection (expense rules or income rules).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    /// Due rules that were picked up
    pub processed: u32,
    /// Transactions written across those rules
    pub generated: u32,
    /// Rules whose catch-up stopped on an error
    pub errors: u32,
}

/// Result of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    /// Expense rule counts
    pub expenses: CollectionSummary,
    /// Income rule counts
    pub incomes: CollectionSummary,
}

/// Runs catch-up for every due rule of both collections.
#[instrument(skip(db))]
pub async fn run_sweep(db: &DatabaseConnection, today: NaiveDate) -> SweepSummary {
    let summary = SweepSummary {
        expenses: sweep_collection(db, TransactionKind::Expense, today).await,
        incomes: sweep_collection(db, TransactionKind::Income, today).await,
    };
    info!("{}", format_sweep_summary(today, &summary));
    summary
}

async fn sweep_collection(
    db: &DatabaseConnection,
    kind: TransactionKind,
    today: NaiveDate,
) -> CollectionSummary {
    let mut summary = CollectionSummary::default();

    let rules = match get_due_rules(db, kind, today).await {
        Ok(rules) => rules,
        Err(e) => {
            error!(?kind, error = %e, "Failed to fetch due recurring rules");
            return summary;
        }
    };

    for rule in rules {
        summary.processed += 1;
        match catch_up_rule(db, &rule, today).await {
            Ok(outcome) => summary.generated += outcome.generated,
            Err(failure) => {
                error!(
                    ?kind,
                    rule_id = failure.rule_id,
                    stopped_at = %failure.stopped_at,
                    error = %failure.source,
                    "Recurring rule catch-up failed"
                );
                summary.generated += failure.generated;
                summary.errors += 1;
            }
        }
    }

    summary
}

/// Formats a sweep result into a one-line summary for logs.
#[must_use]
pub fn format_sweep_summary(today: NaiveDate, summary: &SweepSummary) -> String {
    format!(
        "Recurring sweep {} - expenses: {} processed, {} generated, {} errors | \
         incomes: {} processed, {} generated, {} errors",
        today.format("%Y-%m-%d"),
        summary.expenses.processed,
        summary.expenses.generated,
        summary.expenses.errors,
        summary.incomes.processed,
        summary.incomes.generated,
        summary.incomes.errors,
    )
}
