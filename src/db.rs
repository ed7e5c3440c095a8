//! Database setup and the column helpers shared by the table modules.

use std::str::FromStr;

use rusqlite::{Connection, Row, Transaction as SqlTransaction, types::Type};
use rust_decimal::Decimal;

use crate::{
    Error, account::create_account_table, category::create_category_table,
    subscription::create_subscription_table, transaction::create_transaction_table,
    user::create_user_table,
};

/// Create the application tables if they do not already exist.
///
/// Foreign key enforcement is switched on for `connection` before the tables
/// are created. Deleting an account or category detaches it from its
/// subscriptions only while enforcement is on.
///
/// # Errors
/// Returns an error if the tables cannot be created or if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.pragma_update(None, "foreign_keys", "ON")?;

    let transaction =
        SqlTransaction::new_unchecked(connection, rusqlite::TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_account_table(&transaction)?;
    create_category_table(&transaction)?;
    create_subscription_table(&transaction)?;
    create_transaction_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}

/// Read a monetary value that was stored as text.
///
/// Amounts and rates are stored as their decimal string representation so that
/// no precision is lost to floating point.
pub fn get_decimal(row: &Row, index: usize) -> Result<Decimal, rusqlite::Error> {
    let text: String = row.get(index)?;

    Decimal::from_str(&text).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
    })
}
