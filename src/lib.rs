//! Recurring subscription billing for a personal finance tracker.
//!
//! Users record recurring payments (streaming services, memberships, rent)
//! as subscriptions against one of their accounts. Once a day the billing job
//! finds every active subscription whose next billing date is today, converts
//! its amount into the account's currency when the two differ, records an
//! expense transaction and moves the subscription's schedule forward by one
//! interval.
//!
//! The library exposes the data model and database functions, the billing
//! engine, an exchange rate client, and the daily scheduler used by the
//! `billing` binary.

#![warn(missing_docs)]

mod account;
mod category;
mod config;
mod currency;
mod database_id;
mod db;
mod error;
mod exchange_rate;
mod job;
mod logging;
mod scheduler;
mod subscription;
mod timezone;
mod transaction;
mod user;

#[cfg(test)]
mod test_utils;

pub use account::{Account, create_account, delete_account, get_account, get_accounts};
pub use category::{Category, CategoryType, create_category, delete_category, get_category};
pub use config::{
    BillingConfig, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RUN_AT, ExchangeRateConfig, parse_run_time,
};
pub use currency::CurrencyCode;
pub use database_id::{AccountId, CategoryId, DatabaseId, SubscriptionId, TransactionId};
pub use db::initialize as initialize_db;
pub use error::Error;
pub use exchange_rate::{
    ApiErrorKind, DEFAULT_BASE_URL, DEFAULT_CACHE_TTL, ExchangeRateClient, ExchangeRateError,
    ExchangeRates, RateCache,
};
pub use job::BillingJob;
pub use logging::setup_logging;
pub use scheduler::{ScheduledRun, log_report, next_run, run_daily};
pub use subscription::{
    BilledSubscription, BillingReport, BillingStatus, Charge, FailedSubscription, IntervalUnit,
    NewSubscription, Subscription, SubscriptionChanges, bill_subscription, create_subscription,
    delete_subscription, edit_subscription, get_due_subscriptions, get_overdue_subscriptions,
    get_subscription, get_subscriptions, insert_subscription, next_run_date,
    process_due_subscriptions, quote_charge,
};
pub use timezone::{get_local_offset, local_now, local_today};
pub use transaction::{
    Transaction, TransactionBuilder, TransactionType, count_transactions, get_transaction,
    get_transactions_for_subscription,
};
pub use user::{User, UserId, create_user, get_user};
