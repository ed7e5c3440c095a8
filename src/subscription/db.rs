//! Database operations for subscriptions.

use rusqlite::{Connection, Row};
use time::Date;

use crate::{
    Error,
    database_id::SubscriptionId,
    db::get_decimal,
    subscription::{NewSubscription, Subscription},
    user::UserId,
};

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, account_id, category_id, vendor, description, \
    input_amount, input_currency, starts_on, next_run_on, last_run_on, interval_unit, active";

/// Initialize the subscription table and indexes.
pub fn create_subscription_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS subscription (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            account_id INTEGER,
            category_id INTEGER,
            vendor TEXT NOT NULL,
            description TEXT,
            input_amount TEXT NOT NULL,
            input_currency TEXT NOT NULL,
            starts_on TEXT NOT NULL,
            next_run_on TEXT NOT NULL,
            last_run_on TEXT,
            interval_unit TEXT NOT NULL DEFAULT 'month',
            active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE,
            FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE SET NULL,
            FOREIGN KEY(category_id) REFERENCES category(id) ON UPDATE CASCADE ON DELETE SET NULL
        );

        CREATE INDEX IF NOT EXISTS idx_subscription_active_next_run
            ON subscription(active, next_run_on);
        CREATE INDEX IF NOT EXISTS idx_subscription_user_next_run
            ON subscription(user_id, next_run_on);",
    )?;

    Ok(())
}

/// Insert a subscription that has not been billed yet.
///
/// The subscription's first billing date is its start date.
///
/// # Errors
/// Returns [Error::InvalidForeignKey] if the user, account or category does not
/// exist, or [Error::SqlError] if there is some other SQL error.
pub fn insert_subscription(
    subscription: &NewSubscription,
    connection: &Connection,
) -> Result<Subscription, Error> {
    connection
        .prepare(&format!(
            "INSERT INTO subscription (user_id, account_id, category_id, vendor, description,
                input_amount, input_currency, starts_on, next_run_on, last_run_on,
                interval_unit, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, NULL, ?9, ?10)
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))?
        .query_row(
            (
                subscription.user_id,
                subscription.account_id,
                subscription.category_id,
                &subscription.vendor,
                &subscription.description,
                subscription.input_amount.to_string(),
                &subscription.input_currency,
                subscription.starts_on,
                subscription.interval_unit,
                subscription.active,
            ),
            map_subscription_row,
        )
        .map_err(|error| error.into())
}

/// Retrieve the subscription `id` owned by `user_id`.
///
/// # Errors
/// Returns [Error::NotFound] if the subscription does not exist or belongs to
/// a different user.
pub fn get_subscription(
    id: SubscriptionId,
    user_id: UserId,
    connection: &Connection,
) -> Result<Subscription, Error> {
    connection
        .prepare(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscription WHERE id = ?1 AND user_id = ?2"
        ))?
        .query_row((id, user_id), map_subscription_row)
        .map_err(|error| error.into())
}

/// Retrieve a user's subscriptions, soonest billing first.
pub fn get_subscriptions(
    user_id: UserId,
    connection: &Connection,
) -> Result<Vec<Subscription>, Error> {
    query_subscriptions(
        connection,
        "WHERE user_id = ?1 ORDER BY next_run_on ASC, vendor ASC",
        [user_id.as_i64()],
    )
}

/// Retrieve every active subscription that bills on `today`, ordered by ID.
///
/// The query has no side effects, so calling it twice without writes in
/// between returns the same subscriptions.
pub fn get_due_subscriptions(
    today: Date,
    connection: &Connection,
) -> Result<Vec<Subscription>, Error> {
    query_subscriptions(
        connection,
        "WHERE active = 1 AND next_run_on = ?1 ORDER BY id ASC",
        [today],
    )
}

/// Retrieve active subscriptions whose billing date passed without a
/// successful run, oldest first.
///
/// The engine only bills subscriptions due on the day it runs, so these stay
/// put until someone edits them.
pub fn get_overdue_subscriptions(
    today: Date,
    connection: &Connection,
) -> Result<Vec<Subscription>, Error> {
    query_subscriptions(
        connection,
        "WHERE active = 1 AND next_run_on < ?1 ORDER BY next_run_on ASC, id ASC",
        [today],
    )
}

fn query_subscriptions<P: rusqlite::Params>(
    connection: &Connection,
    clause: &str,
    params: P,
) -> Result<Vec<Subscription>, Error> {
    connection
        .prepare(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscription {clause}"
        ))?
        .query_map(params, map_subscription_row)?
        .map(|maybe_subscription| maybe_subscription.map_err(|error| error.into()))
        .collect()
}

/// Record a billing: set `last_run_on` and move the schedule to `next_run_on`.
///
/// The update only applies while the subscription is still scheduled for
/// `expected_next_run_on`, so a subscription cannot be advanced twice for the
/// same billing date.
///
/// # Errors
/// Returns [Error::UpdateMissingSubscription] if the subscription does not
/// exist or has already moved off `expected_next_run_on`.
pub fn advance_schedule(
    id: SubscriptionId,
    expected_next_run_on: Date,
    last_run_on: Date,
    next_run_on: Date,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE subscription SET last_run_on = ?1, next_run_on = ?2
         WHERE id = ?3 AND next_run_on = ?4",
        (last_run_on, next_run_on, id, expected_next_run_on),
    )?;

    if rows_affected == 0 {
        return Err(Error::UpdateMissingSubscription);
    }

    Ok(())
}

/// Overwrite the user editable fields and the schedule of `subscription`.
///
/// # Errors
/// Returns [Error::UpdateMissingSubscription] if no subscription with the same
/// ID exists for the same user.
pub fn update_subscription(
    subscription: &Subscription,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE subscription SET account_id = ?1, category_id = ?2, vendor = ?3,
            description = ?4, input_amount = ?5, input_currency = ?6, starts_on = ?7,
            next_run_on = ?8, last_run_on = ?9, interval_unit = ?10, active = ?11
         WHERE id = ?12 AND user_id = ?13",
        (
            subscription.account_id,
            subscription.category_id,
            &subscription.vendor,
            &subscription.description,
            subscription.input_amount.to_string(),
            &subscription.input_currency,
            subscription.starts_on,
            subscription.next_run_on,
            subscription.last_run_on,
            subscription.interval_unit,
            subscription.active,
            subscription.id,
            subscription.user_id,
        ),
    )?;

    if rows_affected == 0 {
        return Err(Error::UpdateMissingSubscription);
    }

    Ok(())
}

/// Delete a subscription by ID. Transactions it created are kept.
///
/// # Errors
/// Returns [Error::DeleteMissingSubscription] if no such subscription exists
/// for the user.
pub fn delete_subscription(
    id: SubscriptionId,
    user_id: UserId,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM subscription WHERE id = ?1 AND user_id = ?2",
        (id, user_id),
    )?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingSubscription);
    }

    Ok(())
}

fn map_subscription_row(row: &Row) -> Result<Subscription, rusqlite::Error> {
    Ok(Subscription {
        id: row.get(0)?,
        user_id: row.get(1)?,
        account_id: row.get(2)?,
        category_id: row.get(3)?,
        vendor: row.get(4)?,
        description: row.get(5)?,
        input_amount: get_decimal(row, 6)?,
        input_currency: row.get(7)?,
        starts_on: row.get(8)?,
        next_run_on: row.get(9)?,
        last_run_on: row.get(10)?,
        interval_unit: row.get(11)?,
        active: row.get(12)?,
    })
}
