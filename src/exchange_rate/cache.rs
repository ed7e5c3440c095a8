use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use rust_decimal::Decimal;

use crate::currency::CurrencyCode;

/// How long a fetched rate is reused before it is fetched again.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3 * 60 * 60);

type Pair = (CurrencyCode, CurrencyCode);

/// A read-through cache of exchange rates keyed by currency pair.
#[derive(Debug)]
pub struct RateCache {
    ttl: Duration,
    entries: Mutex<HashMap<Pair, (Decimal, Instant)>>,
}

impl RateCache {
    /// Create an empty cache whose entries stay fresh for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached rate for `from` → `to`, calling `fetch` if there is no
    /// fresh one. Failed fetches are not cached.
    ///
    /// The lock is not held while `fetch` runs, so two callers that miss at the
    /// same time may both fetch.
    pub fn get_or_fetch<E>(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        fetch: impl FnOnce() -> Result<Decimal, E>,
    ) -> Result<Decimal, E> {
        let now = Instant::now();

        if let Some(rate) = self.get_at(from, to, now) {
            tracing::debug!("using cached exchange rate for {from}/{to}");
            return Ok(rate);
        }

        let rate = fetch()?;
        self.insert_at(from, to, rate, now);

        Ok(rate)
    }

    fn get_at(&self, from: &CurrencyCode, to: &CurrencyCode, now: Instant) -> Option<Decimal> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        entries
            .get(&(from.clone(), to.clone()))
            .filter(|(_, fetched_at)| now.saturating_duration_since(*fetched_at) < self.ttl)
            .map(|(rate, _)| *rate)
    }

    fn insert_at(&self, from: &CurrencyCode, to: &CurrencyCode, rate: Decimal, now: Instant) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((from.clone(), to.clone()), (rate, now));
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

#[cfg(test)]
mod rate_cache_tests {
    use std::{
        cell::Cell,
        time::{Duration, Instant},
    };

    use rust_decimal::Decimal;

    use crate::currency::CurrencyCode;

    use super::RateCache;

    fn pair() -> (CurrencyCode, CurrencyCode) {
        (
            CurrencyCode::new("EUR").unwrap(),
            CurrencyCode::new("USD").unwrap(),
        )
    }

    #[test]
    fn fetches_once_within_ttl() {
        let cache = RateCache::new(Duration::from_secs(60));
        let (from, to) = pair();
        let fetches = Cell::new(0);
        let fetch = || -> Result<Decimal, ()> {
            fetches.set(fetches.get() + 1);
            Ok(Decimal::new(11, 1))
        };

        assert_eq!(cache.get_or_fetch(&from, &to, fetch), Ok(Decimal::new(11, 1)));
        assert_eq!(cache.get_or_fetch(&from, &to, fetch), Ok(Decimal::new(11, 1)));
        assert_eq!(fetches.get(), 1);
    }

    #[test]
    fn pairs_are_cached_by_direction() {
        let cache = RateCache::new(Duration::from_secs(60));
        let (from, to) = pair();
        cache
            .get_or_fetch(&from, &to, || Ok::<_, ()>(Decimal::new(11, 1)))
            .unwrap();

        let reverse = cache.get_or_fetch(&to, &from, || Ok::<_, ()>(Decimal::new(91, 2)));

        assert_eq!(reverse, Ok(Decimal::new(91, 2)));
    }

    #[test]
    fn expired_entry_is_not_returned() {
        let cache = RateCache::new(Duration::from_secs(60));
        let (from, to) = pair();
        let fetched_at = Instant::now();
        cache.insert_at(&from, &to, Decimal::new(11, 1), fetched_at);

        assert_eq!(
            cache.get_at(&from, &to, fetched_at + Duration::from_secs(59)),
            Some(Decimal::new(11, 1))
        );
        assert_eq!(cache.get_at(&from, &to, fetched_at + Duration::from_secs(60)), None);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = RateCache::new(Duration::from_secs(60));
        let (from, to) = pair();

        let failed = cache.get_or_fetch(&from, &to, || Err("offline"));
        let retried = cache.get_or_fetch(&from, &to, || Ok::<_, &str>(Decimal::new(11, 1)));

        assert_eq!(failed, Err("offline"));
        assert_eq!(retried, Ok(Decimal::new(11, 1)));
    }
}
