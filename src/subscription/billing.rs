//! The recurring billing engine.
//!
//! Once a day the engine bills every active subscription whose next billing
//! date is today: it converts the subscription's amount into the currency of
//! the account it bills to, records an expense transaction and moves the
//! subscription's schedule forward one interval.
//!
//! Each subscription is billed inside its own failure boundary. A subscription
//! that cannot be billed is logged, reported and left untouched, and the rest
//! of the batch carries on.

use rusqlite::Connection;
use rust_decimal::Decimal;
use time::Date;

use crate::{
    Error,
    account::get_account,
    currency::CurrencyCode,
    database_id::{SubscriptionId, TransactionId},
    exchange_rate::ExchangeRates,
    subscription::{Subscription, advance_schedule, get_due_subscriptions, next_run_date},
    transaction::{Transaction, create_transaction},
};

/// An amount converted into an account's currency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Charge {
    /// The amount in the account currency.
    pub amount: Decimal,
    /// The rate used for the conversion, 1 when no conversion was needed.
    pub rate: Decimal,
}

/// A subscription that was billed during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct BilledSubscription {
    /// The subscription that was billed.
    pub subscription_id: SubscriptionId,
    /// The expense transaction the billing created.
    pub transaction_id: TransactionId,
}

/// A subscription that could not be billed during a run.
///
/// The subscription was left exactly as it was before the run.
#[derive(Debug, PartialEq)]
pub struct FailedSubscription {
    /// The subscription that was not billed.
    pub subscription_id: SubscriptionId,
    /// Why billing failed.
    pub error: Error,
}

/// The outcome of a billing run.
#[derive(Debug, PartialEq)]
pub struct BillingReport {
    /// The date the run billed for.
    pub date: Date,
    /// Subscriptions billed by the run, in billing order.
    pub billed: Vec<BilledSubscription>,
    /// Subscriptions the run could not bill, in billing order.
    pub failed: Vec<FailedSubscription>,
}

impl BillingReport {
    fn new(date: Date) -> Self {
        Self {
            date,
            billed: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// The number of due subscriptions the run looked at.
    pub fn due_count(&self) -> usize {
        self.billed.len() + self.failed.len()
    }
}

/// Bill every active subscription that is due on `today`.
///
/// Subscriptions are billed in ascending ID order. Failures are logged and
/// collected in [BillingReport::failed]; they never stop the run and never
/// surface as an `Err`.
///
/// # Errors
///
/// Only fails if the due subscriptions cannot be loaded, in which case nothing
/// was billed.
pub fn process_due_subscriptions<R>(
    connection: &Connection,
    rates: &R,
    today: Date,
) -> Result<BillingReport, Error>
where
    R: ExchangeRates + ?Sized,
{
    let due_subscriptions = get_due_subscriptions(today, connection)?;
    let mut report = BillingReport::new(today);

    tracing::info!(
        "Billing {} subscription(s) due on {today}",
        due_subscriptions.len()
    );

    for subscription in due_subscriptions {
        match bill_subscription(connection, rates, &subscription, today) {
            Ok(transaction) => {
                tracing::debug!(
                    subscription_id = subscription.id,
                    transaction_id = transaction.id,
                    amount = %transaction.amount,
                    "billed subscription"
                );

                report.billed.push(BilledSubscription {
                    subscription_id: subscription.id,
                    transaction_id: transaction.id,
                });
            }
            Err(error) => {
                tracing::error!(
                    subscription_id = subscription.id,
                    %error,
                    "Failed to process subscription {}: {error}",
                    subscription.id
                );

                report.failed.push(FailedSubscription {
                    subscription_id: subscription.id,
                    error,
                });
            }
        }
    }

    tracing::info!(
        "Billed {} of {} subscription(s) due on {today}",
        report.billed.len(),
        report.due_count()
    );

    Ok(report)
}

/// Bill a single subscription for `today`.
///
/// The exchange rate lookups happen first. The transaction and the schedule
/// update are then written in one SQL transaction, so either both are saved or
/// neither is.
///
/// # Errors
///
/// This function will return a:
/// - [Error::MissingAccount] or [Error::MissingCategory] if the subscription's
///   account or category has been deleted,
/// - [Error::ExchangeRate] if the amount could not be converted,
/// - [Error::DuplicateBilling] or [Error::UpdateMissingSubscription] if the
///   subscription was already billed for this date,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn bill_subscription<R>(
    connection: &Connection,
    rates: &R,
    subscription: &Subscription,
    today: Date,
) -> Result<Transaction, Error>
where
    R: ExchangeRates + ?Sized,
{
    let account_id = subscription
        .account_id
        .ok_or(Error::MissingAccount(subscription.id))?;

    let account = get_account(account_id, subscription.user_id, connection).map_err(
        |error| match error {
            Error::NotFound => Error::MissingAccount(subscription.id),
            error => error,
        },
    )?;

    let charge = quote_charge(
        rates,
        subscription.input_amount,
        &subscription.input_currency,
        &account.currency,
    )?;

    let sql_transaction = connection.unchecked_transaction()?;
    let transaction = record_billing(subscription, charge, today, &sql_transaction)?;
    sql_transaction.commit()?;

    Ok(transaction)
}

/// Convert `amount` from `from` into `to`.
///
/// When the currencies match the amount is used as is with a rate of 1 and
/// `rates` is not consulted. Otherwise the rate and the converted amount are
/// requested separately, since the provider may cache or fail them
/// independently.
pub fn quote_charge<R>(
    rates: &R,
    amount: Decimal,
    from: &CurrencyCode,
    to: &CurrencyCode,
) -> Result<Charge, Error>
where
    R: ExchangeRates + ?Sized,
{
    if from == to {
        return Ok(Charge {
            amount,
            rate: Decimal::ONE,
        });
    }

    let rate = rates.rate(from, to)?;
    let amount = rates.convert(from, to, amount)?;

    Ok(Charge { amount, rate })
}

/// Write the expense transaction for a billing and advance the schedule.
///
/// The caller is responsible for wrapping this in a SQL transaction.
pub(crate) fn record_billing(
    subscription: &Subscription,
    charge: Charge,
    today: Date,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let category_id = subscription
        .category_id
        .ok_or(Error::MissingCategory(subscription.id))?;
    let account_id = subscription
        .account_id
        .ok_or(Error::MissingAccount(subscription.id))?;
    let next_run_on = next_run_date(subscription.next_run_on, subscription.interval_unit)?;

    let transaction = create_transaction(
        Transaction::build(
            subscription.user_id,
            account_id,
            category_id,
            subscription.input_amount,
            subscription.input_currency.clone(),
            today,
        )
        .converted(charge.amount, charge.rate)
        .label(&subscription.vendor)
        .description(&subscription.transaction_description())
        .subscription_id(Some(subscription.id)),
        connection,
    )?;

    advance_schedule(
        subscription.id,
        subscription.next_run_on,
        today,
        next_run_on,
        connection,
    )?;

    Ok(transaction)
}
