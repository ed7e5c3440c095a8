//! Defines the core data models and database queries for transactions.

use std::fmt::Display;

use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    currency::CurrencyCode,
    database_id::{AccountId, CategoryId, SubscriptionId, TransactionId},
    db::get_decimal,
    user::UserId,
};

// ============================================================================
// MODELS
// ============================================================================

/// Whether money was earned or spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money added to the account.
    Income,
    /// Money taken from the account.
    Expense,
}

impl TransactionType {
    fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
        }
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for TransactionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// An immutable record of money moving in or out of an account.
///
/// To create a new `Transaction`, use [Transaction::build].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The user that owns the transaction.
    pub user_id: UserId,
    /// The account the money moved in or out of.
    pub account_id: AccountId,
    /// The category the transaction is filed under.
    pub category_id: CategoryId,
    /// Whether the transaction is income or an expense.
    pub transaction_type: TransactionType,
    /// The amount as entered, in `input_currency`.
    pub input_amount: Decimal,
    /// The currency `input_amount` is denominated in.
    pub input_currency: CurrencyCode,
    /// The amount in the account's currency.
    pub amount: Decimal,
    /// The rate used to convert `input_amount` into `amount`.
    pub rate: Decimal,
    /// A short label, e.g. the vendor name.
    pub label: Option<String>,
    /// A free text description of what the transaction was for.
    pub description: Option<String>,
    /// When the transaction happened.
    pub date: Date,
    /// The subscription that generated this transaction, if any.
    pub subscription_id: Option<SubscriptionId>,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// Shortcut for [TransactionBuilder] for discoverability.
    pub fn build(
        user_id: UserId,
        account_id: AccountId,
        category_id: CategoryId,
        input_amount: Decimal,
        input_currency: CurrencyCode,
        date: Date,
    ) -> TransactionBuilder {
        TransactionBuilder {
            user_id,
            account_id,
            category_id,
            transaction_type: TransactionType::Expense,
            input_amount,
            input_currency,
            amount: input_amount,
            rate: Decimal::ONE,
            label: None,
            description: None,
            date,
            subscription_id: None,
        }
    }
}

/// A builder for creating [Transaction] instances.
///
/// The builder defaults to an expense recorded in the account's own currency,
/// i.e. `amount == input_amount` and `rate == 1`. Call
/// [TransactionBuilder::converted] when the input currency differs from the
/// account currency.
///
/// # Examples
///
/// ```ignore
/// use rust_decimal::Decimal;
/// use time::macros::date;
///
/// let transaction = Transaction::build(
///         user_id,
///         account_id,
///         category_id,
///         Decimal::new(1000, 2),
///         CurrencyCode::new("EUR")?,
///         date!(2025 - 01 - 15),
///     )
///     .converted(Decimal::new(1100, 2), Decimal::new(11, 1))
///     .label("Spotify")
///     .subscription_id(Some(3));
/// let transaction = create_transaction(transaction, &connection)?;
/// ```
#[derive(Debug, PartialEq, Clone)]
pub struct TransactionBuilder {
    /// The user that owns the transaction.
    pub user_id: UserId,
    /// The account the money moves in or out of.
    pub account_id: AccountId,
    /// The category the transaction is filed under.
    pub category_id: CategoryId,

    /// Defaults to [TransactionType::Expense].
    pub transaction_type: TransactionType,

    /// The amount as charged, before conversion.
    pub input_amount: Decimal,
    /// The currency `input_amount` is in.
    pub input_currency: CurrencyCode,

    /// The amount in the account currency.
    ///
    /// Should always equal `input_amount * rate`, give or take the rounding of
    /// the exchange rate provider.
    pub amount: Decimal,
    /// The rate used to convert `input_amount` into `amount`.
    pub rate: Decimal,

    /// A short optional label.
    pub label: Option<String>,
    /// Free text shown alongside the transaction.
    pub description: Option<String>,
    /// The date the transaction happened.
    pub date: Date,

    /// The subscription this transaction bills for.
    ///
    /// The database allows at most one transaction per subscription per date,
    /// so billing the same subscription twice on one day fails with
    /// [Error::DuplicateBilling].
    pub subscription_id: Option<SubscriptionId>,
}

impl TransactionBuilder {
    /// Set the transaction type.
    pub fn transaction_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = transaction_type;
        self
    }

    /// Set the amount in the account currency and the rate used to get it.
    pub fn converted(mut self, amount: Decimal, rate: Decimal) -> Self {
        self.amount = amount;
        self.rate = rate;
        self
    }

    /// Set the label for the transaction.
    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_owned());
        self
    }

    /// Set the description for the transaction.
    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }

    /// Set the subscription that generated the transaction.
    pub fn subscription_id(mut self, subscription_id: Option<SubscriptionId>) -> Self {
        self.subscription_id = subscription_id;
        self
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

const TRANSACTION_COLUMNS: &str = "id, user_id, account_id, category_id, type, input_amount, \
    input_currency, amount, rate, label, description, date, subscription_id";

/// Create a new transaction in the database from a builder.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidForeignKey] if the user, account, category or subscription does not exist,
/// - or [Error::DuplicateBilling] if the subscription already has a transaction on that date,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let subscription_id = builder.subscription_id;
    let date = builder.date;

    let transaction = connection
        .prepare(&format!(
            "INSERT INTO \"transaction\" (user_id, account_id, category_id, type, input_amount,
                input_currency, amount, rate, label, description, date, subscription_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(
            (
                builder.user_id,
                builder.account_id,
                builder.category_id,
                builder.transaction_type,
                builder.input_amount.to_string(),
                &builder.input_currency,
                builder.amount.to_string(),
                builder.rate.to_string(),
                &builder.label,
                &builder.description,
                builder.date,
                builder.subscription_id,
            ),
            map_transaction_row,
        )
        .map_err(|error| match (error, subscription_id) {
            (
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error {
                        code: _,
                        extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                    },
                    _,
                ),
                Some(subscription_id),
            ) => Error::DuplicateBilling {
                subscription_id,
                date,
            },
            (error, _) => error.into(),
        })?;

    Ok(transaction)
}

/// Retrieve a transaction from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid transaction,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_transaction(id: TransactionId, connection: &Connection) -> Result<Transaction, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\" WHERE id = :id"
        ))?
        .query_row(&[(":id", &id)], map_transaction_row)
        .map_err(|error| error.into())
}

/// Retrieve the transactions generated by a subscription, oldest first.
pub fn get_transactions_for_subscription(
    subscription_id: SubscriptionId,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\"
             WHERE subscription_id = ?1 ORDER BY date ASC, id ASC"
        ))?
        .query_map([subscription_id], map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(|error| error.into()))
        .collect()
}

/// Get the total number of transactions in the database.
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
pub fn count_transactions(connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM \"transaction\";", [], |row| {
            row.get(0)
        })
        .map_err(|error| error.into())
}

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                account_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                type TEXT NOT NULL CHECK (type IN ('income', 'expense')),
                input_amount TEXT NOT NULL,
                input_currency TEXT NOT NULL,
                amount TEXT NOT NULL,
                rate TEXT NOT NULL,
                label TEXT,
                description TEXT,
                date TEXT NOT NULL,
                subscription_id INTEGER,
                FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE,
                FOREIGN KEY(account_id) REFERENCES account(id)
                    ON UPDATE CASCADE ON DELETE CASCADE,
                FOREIGN KEY(category_id) REFERENCES category(id)
                    ON UPDATE CASCADE ON DELETE CASCADE,
                FOREIGN KEY(subscription_id) REFERENCES subscription(id)
                    ON UPDATE CASCADE ON DELETE SET NULL
                )",
        (),
    )?;

    // Ensure the sequence starts at 1
    connection.execute(
        "INSERT OR IGNORE INTO sqlite_sequence (name, seq) VALUES ('transaction', 0)",
        (),
    )?;

    // One billing per subscription per day. NULL subscription IDs (manual
    // entries) are never considered equal, so they are unaffected.
    connection.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_transaction_subscription_date
         ON \"transaction\"(subscription_id, date);",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_account_date
            ON \"transaction\"(account_id, date);",
        (),
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        account_id: row.get(2)?,
        category_id: row.get(3)?,
        transaction_type: row.get(4)?,
        input_amount: get_decimal(row, 5)?,
        input_currency: row.get(6)?,
        amount: get_decimal(row, 7)?,
        rate: get_decimal(row, 8)?,
        label: row.get(9)?,
        description: row.get(10)?,
        date: row.get(11)?,
        subscription_id: row.get(12)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod database_tests {
    use rust_decimal::Decimal;
    use time::macros::date;

    use crate::{
        Error,
        currency::CurrencyCode,
        test_utils::{Fixture, get_test_connection},
        transaction::{
            Transaction, TransactionType, count_transactions, create_transaction,
            get_transaction, get_transactions_for_subscription,
        },
    };

    #[test]
    fn create_succeeds_with_defaults() {
        let connection = get_test_connection();
        let fixture = Fixture::new(&connection, "USD");
        let amount = Decimal::new(1230, 2);

        let result = create_transaction(
            Transaction::build(
                fixture.user.id,
                fixture.account.id,
                fixture.category.id,
                amount,
                CurrencyCode::new("USD").unwrap(),
                date!(2025 - 10 - 05),
            ),
            &connection,
        );

        match result {
            Ok(transaction) => {
                assert_eq!(transaction.input_amount, amount);
                assert_eq!(transaction.amount, amount);
                assert_eq!(transaction.rate, Decimal::ONE);
                assert_eq!(transaction.transaction_type, TransactionType::Expense);
                assert_eq!(transaction.subscription_id, None);
            }
            Err(error) => panic!("Unexpected error: {error}"),
        }
    }

    #[test]
    fn create_then_get_round_trips_converted_amounts() {
        let connection = get_test_connection();
        let fixture = Fixture::new(&connection, "USD");

        let created = create_transaction(
            Transaction::build(
                fixture.user.id,
                fixture.account.id,
                fixture.category.id,
                Decimal::new(1000, 2),
                CurrencyCode::new("EUR").unwrap(),
                date!(2025 - 10 - 05),
            )
            .converted(Decimal::new(1100, 2), Decimal::new(11, 1))
            .label("Spotify")
            .description("Family plan"),
            &connection,
        )
        .expect("Could not create transaction");

        let got = get_transaction(created.id, &connection).expect("Could not get transaction");

        assert_eq!(created, got);
        assert_eq!(got.amount, Decimal::new(11, 0));
        assert_eq!(got.rate, Decimal::new(11, 1));
        assert_eq!(got.label.as_deref(), Some("Spotify"));
    }

    #[test]
    fn create_fails_on_second_billing_for_same_day() {
        let connection = get_test_connection();
        let fixture = Fixture::new(&connection, "USD");
        let today = date!(2025 - 10 - 04);
        let subscription = fixture.subscription(&connection, "Netflix", "USD", today);
        let builder = Transaction::build(
            fixture.user.id,
            fixture.account.id,
            fixture.category.id,
            Decimal::new(1599, 2),
            CurrencyCode::new("USD").unwrap(),
            today,
        )
        .subscription_id(Some(subscription.id));
        create_transaction(builder.clone(), &connection).expect("Could not create transaction");

        let duplicate = create_transaction(builder, &connection);

        assert_eq!(
            duplicate,
            Err(Error::DuplicateBilling {
                subscription_id: subscription.id,
                date: today
            })
        );
    }

    #[test]
    fn manual_transactions_on_same_day_are_allowed() {
        let connection = get_test_connection();
        let fixture = Fixture::new(&connection, "USD");
        let builder = Transaction::build(
            fixture.user.id,
            fixture.account.id,
            fixture.category.id,
            Decimal::new(500, 2),
            CurrencyCode::new("USD").unwrap(),
            date!(2025 - 10 - 04),
        );

        create_transaction(builder.clone(), &connection).unwrap();
        create_transaction(builder, &connection).unwrap();

        assert_eq!(count_transactions(&connection), Ok(2));
    }

    #[test]
    fn create_fails_on_invalid_account_id() {
        let connection = get_test_connection();
        let fixture = Fixture::new(&connection, "USD");

        let result = create_transaction(
            Transaction::build(
                fixture.user.id,
                fixture.account.id + 42,
                fixture.category.id,
                Decimal::ONE,
                CurrencyCode::new("USD").unwrap(),
                date!(2025 - 10 - 04),
            ),
            &connection,
        );

        assert_eq!(result, Err(Error::InvalidForeignKey));
    }

    #[test]
    fn get_for_subscription_is_ordered_by_date() {
        let connection = get_test_connection();
        let fixture = Fixture::new(&connection, "USD");
        let subscription = fixture.subscription(&connection, "Gym", "USD", date!(2025 - 01 - 01));
        for date in [date!(2025 - 03 - 01), date!(2025 - 01 - 01), date!(2025 - 02 - 01)] {
            create_transaction(
                Transaction::build(
                    fixture.user.id,
                    fixture.account.id,
                    fixture.category.id,
                    Decimal::new(2000, 2),
                    CurrencyCode::new("USD").unwrap(),
                    date,
                )
                .subscription_id(Some(subscription.id)),
                &connection,
            )
            .unwrap();
        }

        let dates: Vec<_> = get_transactions_for_subscription(subscription.id, &connection)
            .unwrap()
            .into_iter()
            .map(|transaction| transaction.date)
            .collect();

        assert_eq!(
            dates,
            vec![date!(2025 - 01 - 01), date!(2025 - 02 - 01), date!(2025 - 03 - 01)]
        );
    }
}
