//! Database configuration module for Gold-Finger.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs. On top of the generated tables it creates
//! the unique `(recurring_rule_id, date)` index that makes recurring generation idempotent:
//! a second insert for an occurrence that already has a row fails instead of duplicating it.

use crate::entities::{RecurringRule, Transaction, recurring_rule, transaction};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use tracing::{debug, info, instrument};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/gold_finger.sqlite?mode=rwc";

/// Name of the unique index guarding one generated row per rule and occurrence date.
pub const OCCURRENCE_INDEX: &str = "idx_transactions_rule_occurrence";

/// Gets the database URL from the `DATABASE_URL` environment variable or the default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by [`get_database_url`].
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    debug!("Connecting to database at {}", database_url);
    Database::connect(&database_url).await.map_err(Into::into)
}

/// Creates all tables and indexes if they do not exist yet.
///
/// Rules are created before transactions because generated transactions reference them.
#[instrument(skip(db))]
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut rule_table = schema.create_table_from_entity(RecurringRule);
    let mut transaction_table = schema.create_table_from_entity(Transaction);
    rule_table.if_not_exists();
    transaction_table.if_not_exists();
    db.execute(builder.build(&rule_table)).await?;
    db.execute(builder.build(&transaction_table)).await?;

    let occurrence_index = Index::create()
        .name(OCCURRENCE_INDEX)
        .table(Transaction)
        .col(transaction::Column::RecurringRuleId)
        .col(transaction::Column::Date)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&occurrence_index)).await?;

    // The daily sweep filters on exactly these columns
    let due_index = Index::create()
        .name("idx_recurring_rules_due")
        .table(RecurringRule)
        .col(recurring_rule::Column::Kind)
        .col(recurring_rule::Column::IsActive)
        .col(recurring_rule::Column::NextOccurrence)
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&due_index)).await?;

    info!("Database tables and indexes ensured.");
    Ok(())
}
