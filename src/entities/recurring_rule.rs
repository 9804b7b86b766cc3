//! Recurring rule entity - One row per recurring expense or income definition.
//!
//! A rule carries the transaction template (`amount`, `currency`, `category`, `description`),
//! the frequency parameters consumed by [`crate::core::recurrence`], and the `next_occurrence`
//! cursor that the catch-up generator advances one occurrence at a time.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Whether a rule produces expense rows or income rows
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money going out
    #[sea_orm(string_value = "expense")]
    Expense,
    /// Money coming in
    #[sea_orm(string_value = "income")]
    Income,
}

/// How often a rule fires
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Every day
    #[sea_orm(string_value = "daily")]
    Daily,
    /// Every week, optionally restricted to the weekdays in `day_of_week_mask`
    #[sea_orm(string_value = "weekly")]
    Weekly,
    /// Every month on `day_of_month`, clamped to the month's length
    #[sea_orm(string_value = "monthly")]
    Monthly,
    /// Every `custom_interval` `custom_unit`s
    #[sea_orm(string_value = "custom")]
    Custom,
}

/// Unit of a custom interval
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum CustomUnit {
    /// Interval counted in days
    #[sea_orm(string_value = "days")]
    Days,
    /// Interval counted in weeks
    #[sea_orm(string_value = "weeks")]
    Weeks,
    /// Interval counted in calendar months
    #[sea_orm(string_value = "months")]
    Months,
}

/// Recurring rule database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "recurring_rules")]
pub struct Model {
    /// Unique identifier for the rule
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Expense or income collection
    pub kind: TransactionKind,
    /// Shared account (household, team) the rule belongs to
    pub account_id: String,
    /// User who created the rule
    pub user_id: String,
    /// Amount copied onto every generated transaction
    pub amount: f64,
    /// ISO 4217 currency code, upper-case
    pub currency: String,
    /// Optional category copied onto generated transactions
    pub category: Option<String>,
    /// Description copied onto generated transactions
    pub description: String,
    /// Frequency variant
    pub frequency: Frequency,
    /// Step size for `Frequency::Custom`
    pub custom_interval: Option<i32>,
    /// Step unit for `Frequency::Custom`
    pub custom_unit: Option<CustomUnit>,
    /// Weekday bitmask for weekly rules (bit 0 = Sunday ... bit 6 = Saturday), 0 = unrestricted
    pub day_of_week_mask: i32,
    /// Day of month (1-31) for monthly rules
    pub day_of_month: Option<i32>,
    /// Inclusive lower bound of the schedule
    pub start_date: Date,
    /// Inclusive upper bound of the schedule
    pub end_date: Option<Date>,
    /// Earliest occurrence not yet materialized
    pub next_occurrence: Date,
    /// False once the rule reached its terminal state
    pub is_active: bool,
    /// When the rule was created
    pub created_at: DateTimeUtc,
    /// When the rule was last modified (cursor advances included)
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between `RecurringRule` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One rule has many generated transactions
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
