use chrono::{DateTime, Duration, Local, NaiveTime, Utc};
use std::sync::{Arc, Mutex};

/// Time source shared by the cache, the context monitor and the alert gate.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Wall-clock time of day used for quiet-hour checks.
    fn local_time(&self) -> NaiveTime {
        self.now().with_timezone(&Local).time()
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests. `local_time` reads the UTC wall time so
/// results do not depend on the host timezone.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Clock starting at 2026-01-05 12:00:00 UTC.
    pub fn at_noon() -> Self {
        let start = DateTime::parse_from_rfc3339("2026-01-05T12:00:00Z")
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Self::new(start)
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn advance_ms(&self, ms: i64) {
        self.advance(Duration::milliseconds(ms));
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }

    /// Moves the clock to `hh:mm` on the current day.
    pub fn set_time_of_day(&self, hour: u32, minute: u32) {
        if let Ok(mut now) = self.now.lock() {
            if let Some(t) = NaiveTime::from_hms_opt(hour, minute, 0) {
                let date = now.date_naive();
                *now = date.and_time(t).and_utc();
            }
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|n| *n).unwrap_or_else(|_| Utc::now())
    }

    fn local_time(&self) -> NaiveTime {
        self.now().naive_utc().time()
    }
}

pub fn system() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at_noon();
        let start = clock.now();
        clock.advance_ms(31_000);
        assert_eq!((clock.now() - start).num_milliseconds(), 31_000);
    }

    #[test]
    fn test_set_time_of_day() {
        let clock = ManualClock::at_noon();
        clock.set_time_of_day(23, 30);
        let t = clock.local_time();
        assert_eq!((t.hour(), t.minute()), (23, 30));
    }
}
