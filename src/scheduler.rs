//! Runs the billing job once a day at a fixed local time.

use std::{sync::Arc, time::Duration};

use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use time_tz::{Offset, TimeZone};
use tokio::signal;

use crate::{
    Error, config::BillingConfig, exchange_rate::ExchangeRates, job::BillingJob,
    subscription::BillingReport,
};

/// The next daily billing run, fixed at the moment it is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledRun {
    /// The local date the run bills for.
    pub date: Date,
    /// The instant the local clock first reads the run time on `date`.
    pub at: OffsetDateTime,
}

impl ScheduledRun {
    /// How long to sleep from `now` until the run starts.
    pub fn wait_from(&self, now: OffsetDateTime) -> Duration {
        Duration::try_from(self.at - now).unwrap_or(Duration::ZERO)
    }
}

/// The next time after `now` that the clock in `timezone` reads `run_at`.
///
/// If the local time is exactly `run_at`, the next run is tomorrow. The UTC
/// offset of the run is looked up for the run's own date, so a run scheduled
/// across a daylight saving change still starts at `run_at` local time. A
/// `run_at` skipped by a daylight saving change runs at the same wall time
/// under the old offset.
pub fn next_run<Z>(now: OffsetDateTime, timezone: &Z, run_at: Time) -> ScheduledRun
where
    Z: TimeZone,
{
    let local_now = now.to_offset(timezone.get_offset_utc(&now).to_utc());

    let date = if local_now.time() < run_at {
        local_now.date()
    } else {
        local_now.date().next_day().unwrap_or(local_now.date())
    };

    let local_run = PrimitiveDateTime::new(date, run_at);
    let guess = timezone.get_offset_utc(&local_run.assume_utc()).to_utc();
    let offset = timezone
        .get_offset_utc(&local_run.assume_offset(guess))
        .to_utc();
    let at = local_run.assume_offset(offset);

    ScheduledRun { date, at }
}

/// Run `job` every day at `config.run_at` in `config.local_timezone` until a
/// ctrl+c or terminate signal arrives.
///
/// Each batch runs on a blocking thread and bills the date it was scheduled
/// for, even if it starts late. A failed batch is logged and the scheduler
/// waits for the next day.
///
/// # Errors
/// Returns [Error::InvalidTimezoneError] if the configured timezone is not known.
pub async fn run_daily<R>(job: Arc<BillingJob<R>>, config: &BillingConfig) -> Result<(), Error>
where
    R: ExchangeRates + Send + Sync + 'static,
{
    let timezone = time_tz::timezones::get_by_name(&config.local_timezone)
        .ok_or_else(|| Error::InvalidTimezoneError(config.local_timezone.clone()))?;

    loop {
        let now = OffsetDateTime::now_utc();
        let scheduled = next_run(now, timezone, config.run_at);
        let wait = scheduled.wait_from(now);

        tracing::info!(
            "Next billing run for {} at {} (in {}s)",
            scheduled.date,
            scheduled.at,
            wait.as_secs()
        );

        tokio::select! {
            _ = tokio::time::sleep(wait) => {},
            _ = shutdown_signal() => {
                tracing::info!("Stopping billing scheduler.");
                return Ok(());
            },
        }

        let today = scheduled.date;
        let job = job.clone();

        match tokio::task::spawn_blocking(move || job.run(today)).await {
            Ok(Ok(report)) => log_report(&report),
            Ok(Err(error)) => tracing::error!("Billing run for {today} failed: {error}"),
            Err(error) => tracing::error!("Billing run for {today} did not finish: {error}"),
        }
    }
}

/// Log a one line summary of a billing run, plus one line per failure.
pub fn log_report(report: &BillingReport) {
    tracing::info!(
        "Billing run for {}: {} billed, {} failed",
        report.date,
        report.billed.len(),
        report.failed.len()
    );

    for failure in &report.failed {
        tracing::warn!(
            subscription_id = failure.subscription_id,
            "Subscription {} was not billed: {}",
            failure.subscription_id,
            failure.error
        );
    }
}

/// Wait for either the ctrl+c or terminate signal, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!("failed to install signal handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::debug!("Received ctrl+c signal."),
        _ = terminate => tracing::debug!("Received terminate signal."),
    }
}

#[cfg(test)]
mod next_run_tests {
    use std::time::Duration;

    use time::macros::{date, datetime, time};
    use time_tz::timezones;

    use super::next_run;

    const HOUR: u64 = 60 * 60;

    #[test]
    fn waits_until_later_today() {
        let now = datetime!(2025-03-10 07:30 +13);
        let auckland = timezones::get_by_name("Pacific/Auckland").unwrap();

        let run = next_run(now, auckland, time!(09:00));

        assert_eq!(run.date, date!(2025 - 03 - 10));
        assert_eq!(run.at, datetime!(2025-03-10 09:00 +13));
        assert_eq!(run.wait_from(now), Duration::from_secs(90 * 60));
    }

    #[test]
    fn waits_until_tomorrow_once_time_has_passed() {
        let now = datetime!(2025-03-10 09:00:01 UTC);
        let utc = timezones::get_by_name("Etc/UTC").unwrap();

        let run = next_run(now, utc, time!(09:00));

        assert_eq!(run.date, date!(2025 - 03 - 11));
        assert_eq!(run.wait_from(now), Duration::from_secs(24 * HOUR - 1));
    }

    #[test]
    fn exact_run_time_schedules_tomorrow() {
        let now = datetime!(2025-12-31 09:00 UTC);
        let utc = timezones::get_by_name("Etc/UTC").unwrap();

        let run = next_run(now, utc, time!(09:00));

        assert_eq!(run.date, date!(2026 - 01 - 01));
        assert_eq!(run.wait_from(now), Duration::from_secs(24 * HOUR));
    }

    #[test]
    fn date_is_local_not_utc() {
        // 20:00 UTC on the 9th is already the 10th in Auckland.
        let now = datetime!(2025-03-09 20:00 UTC);
        let auckland = timezones::get_by_name("Pacific/Auckland").unwrap();

        let run = next_run(now, auckland, time!(23:59));

        assert_eq!(run.date, date!(2025 - 03 - 10));
        assert_eq!(run.at, datetime!(2025-03-10 23:59 +13));
    }

    #[test]
    fn run_after_daylight_saving_ends_keeps_local_time() {
        // Auckland goes from +13 to +12 at 03:00 on 6 April 2025.
        let now = datetime!(2025-04-05 10:00 +13);
        let auckland = timezones::get_by_name("Pacific/Auckland").unwrap();

        let run = next_run(now, auckland, time!(09:00));

        assert_eq!(run.date, date!(2025 - 04 - 06));
        assert_eq!(run.at, datetime!(2025-04-06 09:00 +12));
        assert_eq!(run.wait_from(now), Duration::from_secs(24 * HOUR));
    }

    #[test]
    fn run_after_daylight_saving_starts_keeps_local_time() {
        // Auckland goes from +12 to +13 at 02:00 on 28 September 2025.
        let now = datetime!(2025-09-27 10:00 +12);
        let auckland = timezones::get_by_name("Pacific/Auckland").unwrap();

        let run = next_run(now, auckland, time!(09:00));

        assert_eq!(run.date, date!(2025 - 09 - 28));
        assert_eq!(run.at, datetime!(2025-09-28 09:00 +13));
        assert_eq!(run.wait_from(now), Duration::from_secs(22 * HOUR));
    }

    #[test]
    fn late_wake_up_does_not_wait_or_change_date() {
        let now = datetime!(2025-03-10 08:00 UTC);
        let utc = timezones::get_by_name("Etc/UTC").unwrap();
        let run = next_run(now, utc, time!(09:00));

        let woke_at = datetime!(2025-03-11 00:30 UTC);

        assert_eq!(run.wait_from(woke_at), Duration::ZERO);
        assert_eq!(run.date, date!(2025 - 03 - 10));
    }
}
