//! Transaction entity - Expense and income rows, manual or generated by a recurring rule.
//!
//! Generated rows carry `recurring_rule_id` and `date` equal to the occurrence they were
//! created for. The pair is unique (see [`crate::config::database::create_tables`]),
//! which is what makes catch-up idempotent.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::recurring_rule::TransactionKind;

/// Transaction database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Expense or income
    pub kind: TransactionKind,
    /// Originating rule, None for manually entered transactions
    pub recurring_rule_id: Option<i64>,
    /// Shared account the transaction is booked on
    pub account_id: String,
    /// Owner of the transaction
    pub user_id: String,
    /// Transaction amount (always positive, `kind` carries the sign)
    pub amount: f64,
    /// ISO 4217 currency code
    pub currency: String,
    /// Optional category
    pub category: Option<String>,
    /// Human-readable description of the transaction
    pub description: String,
    /// Booking date; the occurrence date for generated rows
    pub date: Date,
    /// When the row was written
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Transaction and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Generated transactions belong to one recurring rule
    #[sea_orm(
        belongs_to = "super::recurring_rule::Entity",
        from = "Column::RecurringRuleId",
        to = "super::recurring_rule::Column::Id"
    )]
    RecurringRule,
}

impl Related<super::recurring_rule::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RecurringRule.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
