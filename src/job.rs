use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use time::Date;

use crate::{
    Error,
    exchange_rate::ExchangeRates,
    subscription::{BillingReport, process_due_subscriptions},
};

/// A billing run over a shared database connection.
///
/// The connection stays locked for the whole batch, so two runs started at the
/// same time (for example a manual run overlapping the scheduled one) execute
/// one after the other and the second finds nothing left to bill.
#[derive(Debug)]
pub struct BillingJob<R> {
    connection: Arc<Mutex<Connection>>,
    rates: R,
}

impl<R> BillingJob<R>
where
    R: ExchangeRates,
{
    /// Create a job that bills through `connection` using `rates` for conversions.
    pub fn new(connection: Arc<Mutex<Connection>>, rates: R) -> Self {
        Self { connection, rates }
    }

    /// Bill every subscription due on `today`.
    ///
    /// # Errors
    /// Returns [Error::DatabaseLockError] if the connection lock is poisoned,
    /// or the error from loading the due subscriptions.
    pub fn run(&self, today: Date) -> Result<BillingReport, Error> {
        let connection = self.connection.lock().map_err(|error| {
            tracing::error!("could not acquire database lock: {error}");
            Error::DatabaseLockError
        })?;

        process_due_subscriptions(&connection, &self.rates, today)
    }
}

#[cfg(test)]
mod billing_job_tests {
    use std::{
        sync::{Arc, Mutex},
        thread,
    };

    use time::macros::date;

    use crate::{
        Error,
        test_utils::{Fixture, StubRates, get_test_connection},
        transaction::count_transactions,
    };

    use super::BillingJob;

    #[test]
    fn overlapping_runs_bill_once() {
        let connection = get_test_connection();
        let fixture = Fixture::new(&connection, "USD");
        let today = date!(2025 - 03 - 10);
        for vendor in ["Netflix", "Spotify", "iCloud"] {
            fixture.subscription(&connection, vendor, "USD", today);
        }
        let connection = Arc::new(Mutex::new(connection));
        let job = Arc::new(BillingJob::new(connection.clone(), StubRates::new()));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let job = job.clone();
                thread::spawn(move || job.run(today).unwrap())
            })
            .collect();
        let billed: usize = handles
            .into_iter()
            .map(|handle| handle.join().unwrap().billed.len())
            .sum();

        assert_eq!(billed, 3);
        assert_eq!(count_transactions(&connection.lock().unwrap()), Ok(3));
    }

    #[test]
    fn poisoned_lock_is_reported() {
        let connection = Arc::new(Mutex::new(get_test_connection()));
        let job = BillingJob::new(connection.clone(), StubRates::new());
        let _ = thread::spawn(move || {
            let _guard = connection.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert_eq!(job.run(date!(2025 - 03 - 10)), Err(Error::DatabaseLockError));
    }
}
