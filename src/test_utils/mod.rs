#![allow(missing_docs)]

use std::{collections::HashMap, sync::Mutex};

use rusqlite::Connection;
use rust_decimal::Decimal;
use time::Date;

use crate::{
    account::{Account, create_account},
    category::{Category, CategoryType, create_category},
    currency::CurrencyCode,
    db::initialize,
    exchange_rate::{ExchangeRateError, ExchangeRates},
    subscription::{IntervalUnit, NewSubscription, Subscription, insert_subscription},
    user::{User, create_user},
};

/// An in-memory database with all tables created.
pub(crate) fn get_test_connection() -> Connection {
    let connection =
        Connection::open_in_memory().expect("Could not initialise in-memory SQLite database");
    initialize(&connection).expect("Could not initialise database");
    connection
}

/// A user with one account and one expense category.
pub(crate) struct Fixture {
    pub user: User,
    pub account: Account,
    pub category: Category,
}

impl Fixture {
    pub fn new(connection: &Connection, account_currency: &str) -> Self {
        let user = create_user("Test User", connection).unwrap();
        let account = create_account(
            user.id,
            "Everyday",
            CurrencyCode::new(account_currency).unwrap(),
            connection,
        )
        .unwrap();
        let category =
            create_category(user.id, "Streaming", CategoryType::Expense, connection).unwrap();

        Self {
            user,
            account,
            category,
        }
    }

    /// A monthly subscription of 15.99 that has not been billed yet.
    pub fn subscription(
        &self,
        connection: &Connection,
        vendor: &str,
        currency: &str,
        next_run_on: Date,
    ) -> Subscription {
        let new_subscription = NewSubscription::new(
            self.user.id,
            self.account.id,
            self.category.id,
            vendor,
            Decimal::new(1599, 2),
            CurrencyCode::new(currency).unwrap(),
            next_run_on,
            IntervalUnit::Month,
        )
        .unwrap();

        insert_subscription(&new_subscription, connection).unwrap()
    }
}

type Pair = (String, String);

/// Exchange rates with canned answers that records every call made to it.
///
/// Pairs without a canned answer fail with an unsupported-code API error.
#[derive(Debug, Default)]
pub(crate) struct StubRates {
    pairs: HashMap<Pair, (Decimal, Decimal)>,
    failures: HashMap<Pair, ExchangeRateError>,
    calls: Mutex<Vec<String>>,
}

impl StubRates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `rate` with `rate` and `convert` with `converted` for this pair.
    pub fn with_pair(mut self, from: &str, to: &str, rate: Decimal, converted: Decimal) -> Self {
        self.pairs
            .insert((from.to_owned(), to.to_owned()), (rate, converted));
        self
    }

    /// Fail every lookup for this pair with `error`.
    pub fn with_failure(mut self, from: &str, to: &str, error: ExchangeRateError) -> Self {
        self.failures.insert((from.to_owned(), to.to_owned()), error);
        self
    }

    /// The calls made so far, e.g. `"rate EUR USD"` or `"convert EUR USD 10.00"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn lookup(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<(Decimal, Decimal), ExchangeRateError> {
        let pair = (from.to_string(), to.to_string());

        if let Some(error) = self.failures.get(&pair) {
            return Err(error.clone());
        }

        self.pairs.get(&pair).copied().ok_or_else(|| {
            ExchangeRateError::Api(crate::exchange_rate::ApiErrorKind::UnsupportedCode)
        })
    }
}

impl ExchangeRates for StubRates {
    fn rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> Result<Decimal, ExchangeRateError> {
        self.calls.lock().unwrap().push(format!("rate {from} {to}"));
        self.lookup(from, to).map(|(rate, _)| rate)
    }

    fn convert(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        amount: Decimal,
    ) -> Result<Decimal, ExchangeRateError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("convert {from} {to} {amount}"));
        self.lookup(from, to).map(|(_, converted)| converted)
    }
}
