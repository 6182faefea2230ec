use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Policy values read from the alert gate for one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub max_per_hour: u32,
    pub min_interval: std::time::Duration,
    pub critical_bypass: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Critical alert let through regardless of the counters.
    Bypassed,
    HourlyCapReached,
    TooSoon,
}

impl RateDecision {
    pub fn permitted(&self) -> bool {
        matches!(self, RateDecision::Allowed | RateDecision::Bypassed)
    }
}

/// Rolling one-hour counter of delivered proactive alerts
pub struct AlertRateLimiter {
    /// Delivery times, oldest first
    delivered: Mutex<VecDeque<DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl AlertRateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            delivered: Mutex::new(VecDeque::new()),
            clock,
        }
    }

    fn prune(delivered: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
        while let Some(oldest) = delivered.front() {
            if now - *oldest >= Duration::hours(1) {
                delivered.pop_front();
            } else {
                break;
            }
        }
    }

    /// Checks the policy and, when the alert may go out, records it.
    pub fn check(&self, critical: bool, policy: RatePolicy) -> RateDecision {
        let now = self.clock.now();
        let mut delivered = self.delivered.lock().unwrap_or_else(|p| p.into_inner());
        Self::prune(&mut delivered, now);

        if critical && policy.critical_bypass {
            delivered.push_back(now);
            return RateDecision::Bypassed;
        }
        if delivered.len() >= policy.max_per_hour as usize {
            return RateDecision::HourlyCapReached;
        }
        let min_interval = Duration::from_std(policy.min_interval).unwrap_or(Duration::zero());
        if let Some(last) = delivered.back() {
            if now - *last < min_interval {
                return RateDecision::TooSoon;
            }
        }
        delivered.push_back(now);
        RateDecision::Allowed
    }

    /// Alerts delivered in the last hour
    pub fn sent_last_hour(&self) -> usize {
        let now = self.clock.now();
        let mut delivered = self.delivered.lock().unwrap_or_else(|p| p.into_inner());
        Self::prune(&mut delivered, now);
        delivered.len()
    }

    pub fn reset(&self) {
        self.delivered
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn policy(max: u32, interval_secs: u64) -> RatePolicy {
        RatePolicy {
            max_per_hour: max,
            min_interval: std::time::Duration::from_secs(interval_secs),
            critical_bypass: true,
        }
    }

    #[test]
    fn test_min_interval_between_alerts() {
        let clock = ManualClock::at_noon();
        let limiter = AlertRateLimiter::new(Arc::new(clock.clone()));

        assert_eq!(limiter.check(false, policy(10, 60)), RateDecision::Allowed);
        clock.advance(Duration::seconds(30));
        assert_eq!(limiter.check(false, policy(10, 60)), RateDecision::TooSoon);
        clock.advance(Duration::seconds(30));
        assert_eq!(limiter.check(false, policy(10, 60)), RateDecision::Allowed);
    }

    #[test]
    fn test_hourly_cap_rolls_over() {
        let clock = ManualClock::at_noon();
        let limiter = AlertRateLimiter::new(Arc::new(clock.clone()));

        for _ in 0..3 {
            assert!(limiter.check(false, policy(3, 0)).permitted());
            clock.advance(Duration::minutes(1));
        }
        assert_eq!(limiter.check(false, policy(3, 0)), RateDecision::HourlyCapReached);

        clock.advance(Duration::minutes(57));
        assert_eq!(limiter.sent_last_hour(), 2);
        assert_eq!(limiter.check(false, policy(3, 0)), RateDecision::Allowed);
    }

    #[test]
    fn test_critical_bypass() {
        let clock = ManualClock::at_noon();
        let limiter = AlertRateLimiter::new(Arc::new(clock));
        assert!(limiter.check(false, policy(1, 600)).permitted());
        assert_eq!(limiter.check(true, policy(1, 600)), RateDecision::Bypassed);

        let strict = RatePolicy {
            critical_bypass: false,
            ..policy(1, 600)
        };
        assert_eq!(limiter.check(true, strict), RateDecision::HourlyCapReached);
        limiter.reset();
        assert_eq!(limiter.sent_last_hour(), 0);
    }
}
