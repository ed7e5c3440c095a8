//! Creating and editing subscriptions on behalf of a user.
//!
//! A subscription whose start date is today is billed as part of creating or
//! rescheduling it, so it does not have to wait for the next daily run.

use rusqlite::Connection;
use rust_decimal::Decimal;
use time::Date;

use crate::{
    Error,
    account::{Account, get_account},
    category::{CategoryType, get_category},
    currency::CurrencyCode,
    database_id::{AccountId, CategoryId, SubscriptionId},
    exchange_rate::ExchangeRates,
    subscription::{
        IntervalUnit, NewSubscription, Subscription, get_subscription, insert_subscription,
        update_subscription,
    },
    user::UserId,
};

use super::billing::{quote_charge, record_billing};

/// Create a subscription and bill it straight away if it starts today.
///
/// # Errors
///
/// This function will return a:
/// - [Error::InvalidAccount] if the account does not belong to the user,
/// - [Error::InvalidCategory] if the category does not belong to the user,
/// - [Error::CategoryNotExpense] if the category is an income category,
/// - [Error::ExchangeRate] if the first billing could not be converted, in
///   which case the subscription is not created,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_subscription<R>(
    connection: &Connection,
    rates: &R,
    new_subscription: NewSubscription,
    today: Date,
) -> Result<Subscription, Error>
where
    R: ExchangeRates + ?Sized,
{
    let account = get_owned_account(
        new_subscription.account_id,
        new_subscription.user_id,
        connection,
    )?;
    check_expense_category(
        new_subscription.category_id,
        new_subscription.user_id,
        connection,
    )?;

    if !(new_subscription.active && new_subscription.starts_on == today) {
        return insert_subscription(&new_subscription, connection);
    }

    let charge = quote_charge(
        rates,
        new_subscription.input_amount,
        &new_subscription.input_currency,
        &account.currency,
    )?;

    let sql_transaction = connection.unchecked_transaction()?;
    let subscription = insert_subscription(&new_subscription, &sql_transaction)?;
    record_billing(&subscription, charge, today, &sql_transaction)?;
    sql_transaction.commit()?;

    tracing::info!(
        subscription_id = subscription.id,
        "Billed new subscription for {} on its start date",
        subscription.vendor
    );

    get_subscription(subscription.id, subscription.user_id, connection)
}

/// The fields a user may change on an existing subscription.
///
/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionChanges {
    /// Bill a different account. It must belong to the same user.
    pub account_id: Option<AccountId>,
    /// File under a different expense category.
    pub category_id: Option<CategoryId>,
    /// Rename the vendor. Blank names are rejected.
    pub vendor: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    /// Change the amount billed each cycle.
    pub input_amount: Option<Decimal>,
    /// Change the currency the amount is in.
    pub input_currency: Option<CurrencyCode>,
    /// Move the start date. Only moves the schedule if the subscription has
    /// never been billed.
    pub starts_on: Option<Date>,
    /// Change how often the subscription bills.
    pub interval_unit: Option<IntervalUnit>,
    /// Pause (`false`) or resume (`true`) billing.
    pub active: Option<bool>,
}

/// Apply `changes` to the user's subscription.
///
/// Moving the start date of a subscription that has never been billed moves
/// its next billing date too, and bills it immediately if the new start date
/// is today. Once a subscription has been billed its schedule is left alone.
///
/// # Errors
///
/// This function will return a:
/// - [Error::NotFound] if the subscription does not exist for the user,
/// - [Error::EmptyVendorName] if the new vendor is blank,
/// - [Error::InvalidAccount], [Error::InvalidCategory] or
///   [Error::CategoryNotExpense] if a new account or category is not usable,
/// - [Error::ExchangeRate] if an immediate billing could not be converted, in
///   which case none of the changes are saved,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn edit_subscription<R>(
    connection: &Connection,
    rates: &R,
    id: SubscriptionId,
    user_id: UserId,
    changes: SubscriptionChanges,
    today: Date,
) -> Result<Subscription, Error>
where
    R: ExchangeRates + ?Sized,
{
    let mut subscription = get_subscription(id, user_id, connection)?;

    if let Some(account_id) = changes.account_id {
        get_owned_account(account_id, user_id, connection)?;
        subscription.account_id = Some(account_id);
    }

    if let Some(category_id) = changes.category_id {
        check_expense_category(category_id, user_id, connection)?;
        subscription.category_id = Some(category_id);
    }

    if let Some(vendor) = changes.vendor {
        let vendor = vendor.trim();

        if vendor.is_empty() {
            return Err(Error::EmptyVendorName);
        }

        subscription.vendor = vendor.to_owned();
    }

    if let Some(description) = changes.description {
        subscription.description = description;
    }

    if let Some(input_amount) = changes.input_amount {
        subscription.input_amount = input_amount;
    }

    if let Some(input_currency) = changes.input_currency {
        subscription.input_currency = input_currency;
    }

    if let Some(interval_unit) = changes.interval_unit {
        subscription.interval_unit = interval_unit;
    }

    if let Some(active) = changes.active {
        subscription.active = active;
    }

    let mut rescheduled = false;

    match changes.starts_on {
        Some(starts_on) if starts_on != subscription.starts_on => {
            subscription.starts_on = starts_on;

            if subscription.last_run_on.is_none() {
                subscription.next_run_on = starts_on;
                rescheduled = true;
            }
        }
        _ => {}
    }

    if !(rescheduled && subscription.is_due(today)) {
        update_subscription(&subscription, connection)?;
        return Ok(subscription);
    }

    let account_id = subscription
        .account_id
        .ok_or(Error::MissingAccount(subscription.id))?;
    let account = get_owned_account(account_id, user_id, connection)?;
    let charge = quote_charge(
        rates,
        subscription.input_amount,
        &subscription.input_currency,
        &account.currency,
    )?;

    let sql_transaction = connection.unchecked_transaction()?;
    update_subscription(&subscription, &sql_transaction)?;
    record_billing(&subscription, charge, today, &sql_transaction)?;
    sql_transaction.commit()?;

    get_subscription(id, user_id, connection)
}

fn get_owned_account(
    account_id: AccountId,
    user_id: UserId,
    connection: &Connection,
) -> Result<Account, Error> {
    get_account(account_id, user_id, connection).map_err(|error| match error {
        Error::NotFound => Error::InvalidAccount(account_id),
        error => error,
    })
}

fn check_expense_category(
    category_id: CategoryId,
    user_id: UserId,
    connection: &Connection,
) -> Result<(), Error> {
    let category = get_category(category_id, user_id, connection).map_err(|error| match error {
        Error::NotFound => Error::InvalidCategory(category_id),
        error => error,
    })?;

    match category.category_type {
        CategoryType::Expense => Ok(()),
        CategoryType::Income => Err(Error::CategoryNotExpense(category_id)),
    }
}

#[cfg(test)]
mod create_subscription_tests {
    use rust_decimal::Decimal;
    use time::macros::date;

    use crate::{
        Error,
        account::create_account,
        category::{CategoryType, create_category},
        currency::CurrencyCode,
        exchange_rate::ExchangeRateError,
        subscription::{IntervalUnit, NewSubscription, get_subscriptions},
        test_utils::{Fixture, StubRates, get_test_connection},
        transaction::{count_transactions, get_transactions_for_subscription},
        user::create_user,
    };

    use super::create_subscription;

    fn new_subscription(
        fixture: &Fixture,
        currency: &str,
        starts_on: time::Date,
    ) -> NewSubscription {
        NewSubscription::new(
            fixture.user.id,
            fixture.account.id,
            fixture.category.id,
            "Netflix",
            Decimal::new(1599, 2),
            CurrencyCode::new(currency).unwrap(),
            starts_on,
            IntervalUnit::Month,
        )
        .unwrap()
    }

    #[test]
    fn future_start_is_scheduled_without_billing() {
        let connection = get_test_connection();
        let fixture = Fixture::new(&connection, "USD");
        let today = date!(2025 - 03 - 10);

        let subscription = create_subscription(
            &connection,
            &StubRates::new(),
            new_subscription(&fixture, "USD", date!(2025 - 03 - 20)),
            today,
        )
        .unwrap();

        assert_eq!(subscription.next_run_on, date!(2025 - 03 - 20));
        assert_eq!(subscription.last_run_on, None);
        assert_eq!(count_transactions(&connection), Ok(0));
    }

    #[test]
    fn start_today_bills_immediately() {
        let connection = get_test_connection();
        let fixture = Fixture::new(&connection, "USD");
        let today = date!(2025 - 03 - 10);
        let rates = StubRates::new().with_pair(
            "EUR",
            "USD",
            Decimal::new(11, 1),
            Decimal::new(1759, 2),
        );

        let subscription = create_subscription(
            &connection,
            &rates,
            new_subscription(&fixture, "EUR", today),
            today,
        )
        .unwrap();

        assert_eq!(subscription.last_run_on, Some(today));
        assert_eq!(subscription.next_run_on, date!(2025 - 04 - 10));
        let transactions = get_transactions_for_subscription(subscription.id, &connection).unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].amount, Decimal::new(1759, 2));
        assert_eq!(transactions[0].rate, Decimal::new(11, 1));
        assert_eq!(transactions[0].date, today);
    }

    #[test]
    fn paused_subscription_starting_today_is_not_billed() {
        let connection = get_test_connection();
        let fixture = Fixture::new(&connection, "USD");
        let today = date!(2025 - 03 - 10);

        let subscription = create_subscription(
            &connection,
            &StubRates::new(),
            new_subscription(&fixture, "USD", today).active(false),
            today,
        )
        .unwrap();

        assert_eq!(subscription.next_run_on, today);
        assert_eq!(count_transactions(&connection), Ok(0));
    }

    #[test]
    fn failed_first_billing_creates_nothing() {
        let connection = get_test_connection();
        let fixture = Fixture::new(&connection, "USD");
        let today = date!(2025 - 03 - 10);
        let rates = StubRates::new().with_failure(
            "EUR",
            "USD",
            ExchangeRateError::RequestFailed("timed out".to_owned()),
        );

        let result = create_subscription(
            &connection,
            &rates,
            new_subscription(&fixture, "EUR", today),
            today,
        );

        assert_eq!(
            result,
            Err(Error::ExchangeRate(ExchangeRateError::RequestFailed(
                "timed out".to_owned()
            )))
        );
        assert_eq!(get_subscriptions(fixture.user.id, &connection), Ok(vec![]));
        assert_eq!(count_transactions(&connection), Ok(0));
    }

    #[test]
    fn rejects_other_users_account() {
        let connection = get_test_connection();
        let fixture = Fixture::new(&connection, "USD");
        let other_user = create_user("Mallory", &connection).unwrap();
        let other_account = create_account(
            other_user.id,
            "Theirs",
            CurrencyCode::new("USD").unwrap(),
            &connection,
        )
        .unwrap();
        let mut new = new_subscription(&fixture, "USD", date!(2025 - 03 - 20));
        new.account_id = other_account.id;

        let result =
            create_subscription(&connection, &StubRates::new(), new, date!(2025 - 03 - 10));

        assert_eq!(result, Err(Error::InvalidAccount(other_account.id)));
    }

    #[test]
    fn rejects_other_users_category() {
        let connection = get_test_connection();
        let fixture = Fixture::new(&connection, "USD");
        let other_user = create_user("Mallory", &connection).unwrap();
        let other_category =
            create_category(other_user.id, "Theirs", CategoryType::Expense, &connection).unwrap();
        let mut new = new_subscription(&fixture, "USD", date!(2025 - 03 - 20));
        new.category_id = other_category.id;

        let result =
            create_subscription(&connection, &StubRates::new(), new, date!(2025 - 03 - 10));

        assert_eq!(result, Err(Error::InvalidCategory(other_category.id)));
    }

    #[test]
    fn rejects_income_category() {
        let connection = get_test_connection();
        let fixture = Fixture::new(&connection, "USD");
        let salary =
            create_category(fixture.user.id, "Salary", CategoryType::Income, &connection).unwrap();
        let mut new = new_subscription(&fixture, "USD", date!(2025 - 03 - 20));
        new.category_id = salary.id;

        let result =
            create_subscription(&connection, &StubRates::new(), new, date!(2025 - 03 - 10));

        assert_eq!(result, Err(Error::CategoryNotExpense(salary.id)));
    }
}
