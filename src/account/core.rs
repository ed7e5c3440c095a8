use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::{Error, currency::CurrencyCode, database_id::AccountId, user::UserId};

/// A user-owned bucket of money denominated in a single currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// The id for the account.
    pub id: AccountId,
    /// The user that owns the account.
    pub user_id: UserId,
    /// The display name of the account, e.g. "Everyday" or "Travel card".
    pub name: String,
    /// The currency that transactions on this account are recorded in.
    pub currency: CurrencyCode,
}

/// Create the account table.
///
/// # Errors
/// Returns an error if the SQL query failed.
pub fn create_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS account (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            currency TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_account_user ON account(user_id);",
    )?;

    Ok(())
}

/// Create an account for `user_id`.
///
/// # Errors
/// Returns [Error::EmptyAccountName] if `name` is blank, or [Error::SqlError]
/// if the insert fails.
pub fn create_account(
    user_id: UserId,
    name: &str,
    currency: CurrencyCode,
    connection: &Connection,
) -> Result<Account, Error> {
    let name = name.trim();

    if name.is_empty() {
        return Err(Error::EmptyAccountName);
    }

    connection.execute(
        "INSERT INTO account (user_id, name, currency) VALUES (?1, ?2, ?3)",
        (user_id, name, &currency),
    )?;

    Ok(Account {
        id: connection.last_insert_rowid(),
        user_id,
        name: name.to_owned(),
        currency,
    })
}

/// Get the account `id` owned by `user_id`.
///
/// # Errors
/// Returns [Error::NotFound] if the account does not exist or belongs to a
/// different user.
pub fn get_account(
    id: AccountId,
    user_id: UserId,
    connection: &Connection,
) -> Result<Account, Error> {
    connection
        .prepare("SELECT id, user_id, name, currency FROM account WHERE id = ?1 AND user_id = ?2")?
        .query_row((id, user_id), map_row_to_account)
        .map_err(|error| error.into())
}

/// Get all of the accounts owned by `user_id`, ordered by name.
pub fn get_accounts(user_id: UserId, connection: &Connection) -> Result<Vec<Account>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, name, currency FROM account WHERE user_id = ?1 ORDER BY name ASC",
        )?
        .query_map([user_id], map_row_to_account)?
        .map(|maybe_account| maybe_account.map_err(|error| error.into()))
        .collect()
}

/// Delete the account `id` owned by `user_id`.
///
/// Transactions on the account are deleted with it. Subscriptions that billed
/// to the account are kept but lose their account, so the billing engine
/// reports them as failures until the user picks a new account.
///
/// # Errors
/// Returns [Error::DeleteMissingAccount] if no such account exists for the user.
pub fn delete_account(
    id: AccountId,
    user_id: UserId,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM account WHERE id = ?1 AND user_id = ?2",
        (id, user_id),
    )?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingAccount);
    }

    Ok(())
}

/// Map a database row to an [Account].
fn map_row_to_account(row: &Row) -> Result<Account, rusqlite::Error> {
    let id = row.get(0)?;
    let user_id = row.get(1)?;
    let name = row.get(2)?;
    let currency = row.get(3)?;

    Ok(Account {
        id,
        user_id,
        name,
        currency,
    })
}

#[cfg(test)]
mod create_table_tests {
    use rusqlite::Connection;

    use super::create_account_table;

    #[test]
    fn sql_is_valid() {
        let connection =
            Connection::open_in_memory().expect("Could not initialise in-memory SQLite database");

        assert_eq!(Ok(()), create_account_table(&connection));
    }
}
