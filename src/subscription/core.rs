//! Core subscription domain types and schedule arithmetic.

use std::{fmt::Display, str::FromStr};

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, Duration, Month};

use crate::{
    Error,
    currency::CurrencyCode,
    database_id::{AccountId, CategoryId, SubscriptionId},
    user::UserId,
};

/// How often a subscription bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    /// Every day.
    Day,
    /// Every seven days.
    Week,
    /// A calendar month of variable length.
    Month,
    /// Every year on the same day, clamped to 28 February in non-leap years.
    Year,
}

impl IntervalUnit {
    /// The lowercase name stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalUnit::Day => "day",
            IntervalUnit::Week => "week",
            IntervalUnit::Month => "month",
            IntervalUnit::Year => "year",
        }
    }

    /// Parse a stored interval unit, falling back to [IntervalUnit::Month] for
    /// anything unrecognised.
    ///
    /// Input is validated on the way in, so the fallback only matters for rows
    /// written by something other than this crate.
    pub fn from_stored(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            tracing::warn!("unrecognised interval unit \"{value}\", billing monthly instead");
            IntervalUnit::Month
        })
    }
}

impl FromStr for IntervalUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(IntervalUnit::Day),
            "week" => Ok(IntervalUnit::Week),
            "month" => Ok(IntervalUnit::Month),
            "year" => Ok(IntervalUnit::Year),
            _ => Err(Error::InvalidIntervalUnit(s.to_owned())),
        }
    }
}

impl Display for IntervalUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for IntervalUnit {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for IntervalUnit {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str().map(IntervalUnit::from_stored)
    }
}

/// Calculate the billing date that follows `anchor`.
///
/// Months and years are calendar months and years. When the anchor's day does
/// not exist in the target month it is clamped to the last day of that month,
/// e.g. 31 January is followed by 28 (or 29) February, and 29 February is
/// followed by 28 February of the next year.
///
/// # Errors
///
/// Returns [Error::ScheduleOverflow] if the next date falls outside the range
/// of dates supported by [time::Date].
pub fn next_run_date(anchor: Date, interval_unit: IntervalUnit) -> Result<Date, Error> {
    let next = match interval_unit {
        IntervalUnit::Day => anchor.next_day(),
        IntervalUnit::Week => anchor.checked_add(Duration::weeks(1)),
        IntervalUnit::Month => {
            let (year, month) = match anchor.month() {
                Month::December => (anchor.year() + 1, Month::January),
                month => (anchor.year(), month.next()),
            };
            clamped_date(year, month, anchor.day())
        }
        IntervalUnit::Year => clamped_date(anchor.year() + 1, anchor.month(), anchor.day()),
    };

    next.ok_or(Error::ScheduleOverflow(anchor))
}

/// The date `day` of `month`, or the last day of the month if it is shorter.
fn clamped_date(year: i32, month: Month, day: u8) -> Option<Date> {
    (1..=day)
        .rev()
        .find_map(|day| Date::from_calendar_date(year, month, day).ok())
}

/// Where a subscription sits in its billing cycle relative to a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BillingStatus {
    /// Paused by the user, never billed regardless of date.
    Inactive,
    /// The next billing date is in the future.
    Scheduled,
    /// Bills today and has not been processed yet.
    Due,
    /// Billed today; the schedule has moved on.
    Processed,
    /// The billing date has passed without a successful run.
    Stalled,
}

/// A recurring payment that produces one expense transaction per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// The ID of the subscription.
    pub id: SubscriptionId,
    /// The user that owns the subscription.
    pub user_id: UserId,
    /// `None` once the billing account has been deleted.
    pub account_id: Option<AccountId>,
    /// `None` once the category has been deleted.
    pub category_id: Option<CategoryId>,
    /// Who is being paid, e.g. "Netflix".
    pub vendor: String,
    /// Overrides the default transaction description.
    pub description: Option<String>,
    /// The amount billed each cycle, in `input_currency`.
    pub input_amount: Decimal,
    /// The currency the vendor charges in.
    pub input_currency: CurrencyCode,
    /// The first billing date.
    pub starts_on: Date,
    /// The next billing date. Always set; this is the date the engine selects on.
    pub next_run_on: Date,
    /// The last date the subscription was billed, `None` until the first billing.
    pub last_run_on: Option<Date>,
    /// How far `next_run_on` moves after each billing.
    pub interval_unit: IntervalUnit,
    /// Inactive subscriptions are never billed.
    pub active: bool,
}

impl Subscription {
    /// Whether the billing engine should bill this subscription on `today`.
    pub fn is_due(&self, today: Date) -> bool {
        self.active && self.next_run_on == today
    }

    /// Where the subscription sits in its billing cycle on `today`.
    pub fn billing_status(&self, today: Date) -> BillingStatus {
        if !self.active {
            BillingStatus::Inactive
        } else if self.next_run_on == today {
            BillingStatus::Due
        } else if self.next_run_on < today {
            BillingStatus::Stalled
        } else if self.last_run_on == Some(today) {
            BillingStatus::Processed
        } else {
            BillingStatus::Scheduled
        }
    }

    /// The description used for the transactions this subscription creates.
    pub fn transaction_description(&self) -> String {
        match self.description.as_deref().map(str::trim) {
            Some(description) if !description.is_empty() => description.to_owned(),
            _ => format!("Subscription payment for {}", self.vendor),
        }
    }
}

/// The validated data needed to create a [Subscription].
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubscription {
    /// The user that will own the subscription.
    pub user_id: UserId,
    /// The account to bill. Must belong to `user_id`.
    pub account_id: AccountId,
    /// An expense category owned by `user_id`.
    pub category_id: CategoryId,
    /// Who is being paid.
    pub vendor: String,
    /// Overrides the default transaction description.
    pub description: Option<String>,
    /// The amount billed each cycle. Must be positive.
    pub input_amount: Decimal,
    /// The currency `input_amount` is in.
    pub input_currency: CurrencyCode,
    /// The first billing date.
    pub starts_on: Date,
    /// How often the subscription bills.
    pub interval_unit: IntervalUnit,
    /// Whether billing starts straight away.
    pub active: bool,
}

impl NewSubscription {
    /// Create an active subscription that starts billing on `starts_on`.
    ///
    /// # Errors
    ///
    /// Returns [Error::EmptyVendorName] if `vendor` is blank.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        account_id: AccountId,
        category_id: CategoryId,
        vendor: &str,
        input_amount: Decimal,
        input_currency: CurrencyCode,
        starts_on: Date,
        interval_unit: IntervalUnit,
    ) -> Result<Self, Error> {
        let vendor = vendor.trim();

        if vendor.is_empty() {
            return Err(Error::EmptyVendorName);
        }

        Ok(Self {
            user_id,
            account_id,
            category_id,
            vendor: vendor.to_owned(),
            description: None,
            input_amount,
            input_currency,
            starts_on,
            interval_unit,
            active: true,
        })
    }

    /// Set the description copied onto generated transactions.
    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }

    /// Set whether the subscription is active.
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

#[cfg(test)]
mod next_run_date_tests {
    use time::macros::date;

    use crate::{Error, subscription::IntervalUnit};

    use super::next_run_date;

    #[test]
    fn day_advances_one_day() {
        assert_eq!(
            next_run_date(date!(2025 - 02 - 28), IntervalUnit::Day),
            Ok(date!(2025 - 03 - 01))
        );
    }

    #[test]
    fn week_advances_seven_days() {
        assert_eq!(
            next_run_date(date!(2025 - 12 - 29), IntervalUnit::Week),
            Ok(date!(2026 - 01 - 05))
        );
    }

    #[test]
    fn month_keeps_day_of_month() {
        assert_eq!(
            next_run_date(date!(2025 - 03 - 15), IntervalUnit::Month),
            Ok(date!(2025 - 04 - 15))
        );
    }

    #[test]
    fn month_rolls_over_year() {
        assert_eq!(
            next_run_date(date!(2025 - 12 - 31), IntervalUnit::Month),
            Ok(date!(2026 - 01 - 31))
        );
    }

    #[test]
    fn month_clamps_to_end_of_shorter_month() {
        assert_eq!(
            next_run_date(date!(2025 - 01 - 31), IntervalUnit::Month),
            Ok(date!(2025 - 02 - 28))
        );
        assert_eq!(
            next_run_date(date!(2024 - 01 - 31), IntervalUnit::Month),
            Ok(date!(2024 - 02 - 29))
        );
        assert_eq!(
            next_run_date(date!(2025 - 03 - 31), IntervalUnit::Month),
            Ok(date!(2025 - 04 - 30))
        );
    }

    #[test]
    fn year_keeps_month_and_day() {
        assert_eq!(
            next_run_date(date!(2025 - 06 - 10), IntervalUnit::Year),
            Ok(date!(2026 - 06 - 10))
        );
    }

    #[test]
    fn year_clamps_leap_day() {
        assert_eq!(
            next_run_date(date!(2024 - 02 - 29), IntervalUnit::Year),
            Ok(date!(2025 - 02 - 28))
        );
    }

    #[test]
    fn fails_past_the_end_of_the_calendar() {
        let last = date!(9999 - 12 - 31);

        assert_eq!(
            next_run_date(last, IntervalUnit::Day),
            Err(Error::ScheduleOverflow(last))
        );
        assert_eq!(
            next_run_date(last, IntervalUnit::Month),
            Err(Error::ScheduleOverflow(last))
        );
    }
}
