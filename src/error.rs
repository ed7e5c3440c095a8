//! Defines the app level error type.
use time::Date;

use crate::{
    database_id::{AccountId, CategoryId, SubscriptionId},
    exchange_rate::ExchangeRateError,
};

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows. Queries
    /// scoped to a user also return this error for resources owned by another
    /// user.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// A currency code was not three ASCII letters.
    #[error("\"{0}\" is not a valid currency code")]
    InvalidCurrencyCode(String),

    /// An interval unit other than day, week, month or year was given.
    #[error("\"{0}\" is not a valid interval unit")]
    InvalidIntervalUnit(String),

    /// An empty string was used as a subscription's vendor name.
    #[error("vendor name cannot be empty")]
    EmptyVendorName,

    /// An empty string was used as an account name.
    #[error("account name cannot be empty")]
    EmptyAccountName,

    /// An empty string was used as a category name.
    #[error("category name cannot be empty")]
    EmptyCategoryName,

    /// Subscriptions may only be filed under expense categories.
    #[error("category {0} is not an expense category")]
    CategoryNotExpense(CategoryId),

    /// The account ID did not refer to an account owned by the user.
    #[error("account {0} does not exist")]
    InvalidAccount(AccountId),

    /// The category ID did not refer to a category owned by the user.
    #[error("category {0} does not exist")]
    InvalidCategory(CategoryId),

    /// A row referenced a user, account, category or subscription that does not exist.
    #[error("a referenced user, account, category or subscription does not exist")]
    InvalidForeignKey,

    /// The account a subscription bills to has been deleted.
    #[error("the billing account for subscription {0} no longer exists")]
    MissingAccount(SubscriptionId),

    /// The category a subscription is filed under has been deleted.
    #[error("the category for subscription {0} no longer exists")]
    MissingCategory(SubscriptionId),

    /// A transaction already exists for the subscription on the billing date.
    ///
    /// Each subscription may be billed at most once per day, which stops
    /// overlapping billing runs from charging the same subscription twice.
    #[error("subscription {subscription_id} has already been billed on {date}")]
    DuplicateBilling {
        /// The subscription that was billed twice.
        subscription_id: SubscriptionId,
        /// The billing date.
        date: Date,
    },

    /// Advancing a schedule from this date would leave the supported calendar range.
    #[error("cannot schedule the next run after {0}")]
    ScheduleOverflow(Date),

    /// The exchange rate collaborator could not provide a rate or conversion.
    #[error("exchange rate lookup failed: {0}")]
    ExchangeRate(#[from] ExchangeRateError),

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// The daily run time was not formatted as `HH:MM`.
    #[error("\"{0}\" is not a valid run time, expected HH:MM")]
    InvalidRunTime(String),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// Tried to update a subscription that does not exist, or whose schedule
    /// changed since it was read.
    #[error("tried to update a subscription that is not in the database")]
    UpdateMissingSubscription,

    /// Tried to delete a subscription that does not exist
    #[error("tried to delete a subscription that is not in the database")]
    DeleteMissingSubscription,

    /// Tried to delete an account that does not exist
    #[error("tried to delete an account that is not in the database")]
    DeleteMissingAccount,

    /// Tried to delete a category that does not exist
    #[error("tried to delete a category that is not in the database")]
    DeleteMissingCategory,
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
                },
                _,
            ) => Error::InvalidForeignKey,
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}
