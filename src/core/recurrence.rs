//! Recurrence calculator - pure date arithmetic for recurring rules.
//!
//! Given a rule's frequency parameters this module computes the first occurrence on or after
//! the start date and the occurrence following any given one. Nothing here touches the
//! database, the clock or any other state: the catch-up generator may call these functions
//! as often as it likes. Deciding what to do with an occurrence past `end_date` is the
//! caller's job.
//!
//! Every sequence produced here is strictly increasing, which is what guarantees that
//! catch-up loops terminate.

use crate::{
    entities::{CustomUnit, Frequency, recurring_rule},
    errors::{Error, Result},
};
use chrono::{Datelike, Days, Months, NaiveDate};

/// Date format used at every text boundary (`YYYY-MM-DD`).
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Largest accepted custom step, in whatever unit the rule uses.
pub const MAX_CUSTOM_INTERVAL: u32 = 10_000;

/// Bits 0 (Sunday) through 6 (Saturday).
const ALL_WEEKDAYS_MASK: u8 = 0b111_1111;

/// The frequency parameters of a rule, already converted to calculator-friendly types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceSpec {
    /// Frequency variant
    pub frequency: Frequency,
    /// Step size, required for [`Frequency::Custom`]
    pub custom_interval: Option<u32>,
    /// Step unit, required for [`Frequency::Custom`]
    pub custom_unit: Option<CustomUnit>,
    /// Weekday bitmask (bit 0 = Sunday); 0 means "same weekday as the start date"
    pub day_of_week_mask: u8,
    /// Anchor day for monthly stepping; defaults to the start date's day
    pub day_of_month: Option<u32>,
    /// Inclusive lower bound
    pub start_date: NaiveDate,
    /// Inclusive upper bound
    pub end_date: Option<NaiveDate>,
}

impl RecurrenceSpec {
    /// A spec with no optional parameters set.
    #[must_use]
    pub const fn new(frequency: Frequency, start_date: NaiveDate) -> Self {
        Self {
            frequency,
            custom_interval: None,
            custom_unit: None,
            day_of_week_mask: 0,
            day_of_month: None,
            start_date,
            end_date: None,
        }
    }

    /// Checks that the parameters the frequency needs are present and in range.
    pub fn validate(&self) -> Result<()> {
        if self.frequency == Frequency::Custom {
            match (self.custom_interval, self.custom_unit) {
                (Some(n), Some(_)) if (1..=MAX_CUSTOM_INTERVAL).contains(&n) => {}
                (Some(n), Some(_)) => {
                    return Err(Error::invalid_rule(format!(
                        "custom interval must be 1..={MAX_CUSTOM_INTERVAL}, got {n}"
                    )));
                }
                _ => {
                    return Err(Error::invalid_rule(
                        "custom frequency requires an interval and a unit",
                    ));
                }
            }
        }

        if let Some(day) = self.day_of_month {
            if !(1..=31).contains(&day) {
                return Err(Error::invalid_rule(format!(
                    "day of month must be between 1 and 31, got {day}"
                )));
            }
        }

        if self.day_of_week_mask > ALL_WEEKDAYS_MASK {
            return Err(Error::invalid_rule(format!(
                "day of week mask must be between 0 and 127, got {}",
                self.day_of_week_mask
            )));
        }

        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(Error::invalid_rule(format!(
                    "end date {end} is before start date {}",
                    self.start_date
                )));
            }
        }

        Ok(())
    }

    /// Day of month used for month-based stepping.
    fn anchor_day(&self) -> u32 {
        self.day_of_month.unwrap_or_else(|| self.start_date.day())
    }
}

impl TryFrom<&recurring_rule::Model> for RecurrenceSpec {
    type Error = Error;

    fn try_from(rule: &recurring_rule::Model) -> Result<Self> {
        let custom_interval = rule
            .custom_interval
            .map(|n| {
                u32::try_from(n).map_err(|_| {
                    Error::invalid_rule(format!("custom interval must be positive, got {n}"))
                })
            })
            .transpose()?;
        let day_of_week_mask = u8::try_from(rule.day_of_week_mask).map_err(|_| {
            Error::invalid_rule(format!(
                "day of week mask must be between 0 and 127, got {}",
                rule.day_of_week_mask
            ))
        })?;
        let day_of_month = rule
            .day_of_month
            .map(|d| {
                u32::try_from(d).map_err(|_| {
                    Error::invalid_rule(format!("day of month must be between 1 and 31, got {d}"))
                })
            })
            .transpose()?;

        let spec = Self {
            frequency: rule.frequency,
            custom_interval,
            custom_unit: rule.custom_unit,
            day_of_week_mask,
            day_of_month,
            start_date: rule.start_date,
            end_date: rule.end_date,
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// Parses a `YYYY-MM-DD` date, treating absence like any other malformed input.
pub fn parse_date(input: Option<&str>, field: &str) -> Result<NaiveDate> {
    let raw = input
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::invalid_rule(format!("{field} is required")))?;

    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| Error::invalid_rule(format!("{field} '{raw}' is not a valid date: {e}")))
}

/// Computes the first occurrence on or after `spec.start_date`.
///
/// The result may lie beyond `spec.end_date`; the caller deactivates the rule in that case.
pub fn first_occurrence(spec: &RecurrenceSpec) -> Result<NaiveDate> {
    spec.validate()?;
    let start = spec.start_date;

    match spec.frequency {
        Frequency::Daily | Frequency::Custom => Ok(start),
        Frequency::Weekly if spec.day_of_week_mask == 0 => Ok(start),
        Frequency::Weekly => first_masked_day(start, spec.day_of_week_mask, 0),
        Frequency::Monthly => {
            let anchor = spec.anchor_day();
            let candidate = clamp_to_month(start.year(), start.month(), anchor)?;
            if candidate >= start {
                Ok(candidate)
            } else {
                add_months_clamped(start, 1, anchor)
            }
        }
    }
}

/// Computes the occurrence that follows `current`.
///
/// Always returns a date strictly after `current`.
pub fn next_occurrence(current: NaiveDate, spec: &RecurrenceSpec) -> Result<NaiveDate> {
    spec.validate()?;
    step(current, spec)
}

/// Lists every occurrence that falls inside `[from, to]` and within the rule's bounds.
pub fn occurrences_between(
    spec: &RecurrenceSpec,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<NaiveDate>> {
    let last = spec.end_date.map_or(to, |end| end.min(to));
    let mut occurrences = Vec::new();
    let mut current = first_occurrence(spec)?;

    while current <= last {
        if current >= from {
            occurrences.push(current);
        }
        current = step(current, spec)?;
    }

    Ok(occurrences)
}

/// Walks forward from `cursor`, itself an occurrence, collecting at most `limit` dates up to
/// `to` and within the rule's bounds.
pub fn occurrences_from(
    spec: &RecurrenceSpec,
    cursor: NaiveDate,
    to: NaiveDate,
    limit: usize,
) -> Result<Vec<NaiveDate>> {
    spec.validate()?;
    let last = spec.end_date.map_or(to, |end| end.min(to));
    let mut occurrences = Vec::new();
    let mut current = cursor;

    while current <= last && occurrences.len() < limit {
        occurrences.push(current);
        if current == last {
            break;
        }
        current = step(current, spec)?;
    }

    Ok(occurrences)
}

fn step(current: NaiveDate, spec: &RecurrenceSpec) -> Result<NaiveDate> {
    let next = match spec.frequency {
        Frequency::Daily => add_days(current, 1)?,
        Frequency::Weekly if spec.day_of_week_mask == 0 => add_days(current, 7)?,
        Frequency::Weekly => first_masked_day(current, spec.day_of_week_mask, 1)?,
        Frequency::Monthly => add_months_clamped(current, 1, spec.anchor_day())?,
        Frequency::Custom => {
            // validate() guarantees both are present
            let interval = spec.custom_interval.unwrap_or(1);
            match spec.custom_unit.unwrap_or(CustomUnit::Days) {
                CustomUnit::Days => add_days(current, u64::from(interval))?,
                CustomUnit::Weeks => add_days(current, u64::from(interval) * 7)?,
                CustomUnit::Months => add_months_clamped(current, interval, spec.anchor_day())?,
            }
        }
    };

    if next <= current {
        return Err(Error::invalid_rule(format!(
            "schedule does not advance past {current}"
        )));
    }
    Ok(next)
}

/// Bit for `date`'s weekday in a day-of-week mask.
#[must_use]
pub fn weekday_bit(date: NaiveDate) -> u8 {
    1 << date.weekday().num_days_from_sunday()
}

/// Number of days in the given month.
#[must_use]
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(28, |last| last.day())
}

/// Earliest day at `from + min_offset` or later whose weekday bit is set.
fn first_masked_day(from: NaiveDate, mask: u8, min_offset: u64) -> Result<NaiveDate> {
    for offset in min_offset..min_offset + 7 {
        let candidate = add_days(from, offset)?;
        if mask & weekday_bit(candidate) != 0 {
            return Ok(candidate);
        }
    }
    Err(Error::invalid_rule(format!(
        "day of week mask {mask:#09b} selects no weekday"
    )))
}

fn clamp_to_month(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day.min(days_in_month(year, month)))
        .ok_or_else(|| Error::invalid_rule(format!("{year}-{month:02} is out of range")))
}

/// Moves `months` months forward from `date` and lands on `anchor_day`, clamped per month.
fn add_months_clamped(date: NaiveDate, months: u32, anchor_day: u32) -> Result<NaiveDate> {
    let target = date
        .with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(months)))
        .ok_or_else(|| Error::invalid_rule(format!("{date} + {months} months is out of range")))?;
    clamp_to_month(target.year(), target.month(), anchor_day)
}

fn add_days(date: NaiveDate, days: u64) -> Result<NaiveDate> {
    date.checked_add_days(Days::new(days))
        .ok_or_else(|| Error::invalid_rule(format!("{date} + {days} days is out of range")))
}
