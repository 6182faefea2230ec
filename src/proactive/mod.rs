pub mod gate;

pub use gate::{
    AlertPreferences, CategoryPreference, GateError, ProactiveAlertGate, QuietHours,
    PREFERENCES_KEY, PREFERENCES_VERSION,
};

use crate::clock::Clock;
use crate::context::{AlertData, AlertSummary, ContextChange, ContextStateMonitor, Severity};
use crate::events::{EventBus, Subscription};
use crate::intel::IntelligenceAggregator;
use crate::rate_limiter::{AlertRateLimiter, RateDecision, RatePolicy};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

/// Alert ids remembered so each alert is announced at most once.
const SEEN_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProactiveAlert {
    pub alert: AlertData,
    pub message: String,
    /// Whether the alert should also be spoken.
    pub speak: bool,
}

/// Turns alert updates into proactive notifications, applying the gate's
/// filters and the rolling rate limits.
#[derive(Clone)]
pub struct ProactiveManager {
    gate: Arc<ProactiveAlertGate>,
    limiter: Arc<AlertRateLimiter>,
    seen: Arc<Mutex<VecDeque<String>>>,
    bus: EventBus<ProactiveAlert>,
}

impl ProactiveManager {
    pub fn new(gate: Arc<ProactiveAlertGate>, clock: Arc<dyn Clock>) -> Self {
        Self {
            gate,
            limiter: Arc::new(AlertRateLimiter::new(clock)),
            seen: Arc::new(Mutex::new(VecDeque::with_capacity(SEEN_CAPACITY))),
            bus: EventBus::new(),
        }
    }

    pub fn gate(&self) -> &Arc<ProactiveAlertGate> {
        &self.gate
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ProactiveAlert) + Send + Sync + 'static,
    {
        self.bus.subscribe(listener)
    }

    /// Processes every alert-summary update published by `monitor`.
    pub fn watch(&self, monitor: &ContextStateMonitor) -> Subscription {
        let manager = self.clone();
        monitor.subscribe(move |event| {
            if event.change == ContextChange::Alerts {
                manager.process_alerts(&event.state.live_data.alerts);
            }
        })
    }

    fn first_sighting(&self, id: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|p| p.into_inner());
        if seen.iter().any(|s| s == id) {
            return false;
        }
        if seen.len() >= SEEN_CAPACITY {
            seen.pop_front();
        }
        seen.push_back(id.to_string());
        true
    }

    fn policy(&self) -> RatePolicy {
        RatePolicy {
            max_per_hour: self.gate.max_alerts_per_hour(),
            min_interval: self.gate.min_alert_interval(),
            critical_bypass: self.gate.critical_bypasses_rate_limit(),
        }
    }

    /// Publishes the alerts in `summary` not seen before that pass the gate
    /// and the rate limits. Returns what was published.
    pub fn process_alerts(&self, summary: &AlertSummary) -> Vec<ProactiveAlert> {
        let mut published = Vec::new();

        // Recent alerts arrive newest first; announce in the order they happened.
        for alert in summary.recent.iter().rev() {
            if !self.first_sighting(&alert.id) {
                continue;
            }
            if !self.gate.should_show_alert(&alert.category, alert.severity) {
                debug!(id = %alert.id, category = %alert.category, "alert filtered by preferences");
                continue;
            }
            let decision = self
                .limiter
                .check(alert.severity == Severity::Critical, self.policy());
            if !decision.permitted() {
                info!(id = %alert.id, ?decision, "proactive alert rate limited");
                continue;
            }
            if decision == RateDecision::Bypassed {
                debug!(id = %alert.id, "critical alert bypassed rate limit");
            }

            let proactive = ProactiveAlert {
                message: compose_message(alert),
                speak: self.gate.voice_alerts_enabled(),
                alert: alert.clone(),
            };
            info!(id = %alert.id, severity = %alert.severity, "publishing proactive alert");
            self.bus.emit(&proactive);
            published.push(proactive);
        }
        published
    }

    /// Runs `aggregate_all` every `interval`; alert updates reach this manager
    /// through [`ProactiveManager::watch`].
    pub fn start_monitor(
        &self,
        aggregator: Arc<IntelligenceAggregator>,
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let intel = aggregator.aggregate_all().await;
                debug!(failed = intel.failed_sources.len(), "periodic refresh done");
                sleep(interval).await;
            }
        })
    }
}

fn compose_message(alert: &AlertData) -> String {
    let severity = match alert.severity {
        Severity::Critical => "Critical",
        Severity::High => "High",
        Severity::Medium => "Medium",
        Severity::Low => "Low",
    };
    let mut message = format!("{} alert: {}.", severity, alert.title.trim_end_matches('.'));
    if !alert.message.trim().is_empty() {
        message.push(' ');
        message.push_str(alert.message.trim());
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn alert(id: &str, category: &str, severity: Severity) -> AlertData {
        AlertData {
            id: id.to_string(),
            category: category.to_string(),
            severity,
            title: format!("{} event", category),
            message: "Check the dashboard".to_string(),
            timestamp: None,
        }
    }

    fn manager() -> (ProactiveManager, ManualClock) {
        let clock = ManualClock::at_noon();
        let gate = Arc::new(ProactiveAlertGate::load(
            Arc::new(MemoryStore::new()),
            Arc::new(clock.clone()),
        ));
        (ProactiveManager::new(gate, Arc::new(clock.clone())), clock)
    }

    fn summary(recent: Vec<AlertData>) -> AlertSummary {
        AlertSummary {
            recent,
            ..AlertSummary::default()
        }
    }

    #[test]
    fn test_each_alert_announced_once() {
        let (manager, clock) = manager();
        let first = summary(vec![alert("a1", "WHALE_SPIKE", Severity::High)]);
        assert_eq!(manager.process_alerts(&first).len(), 1);

        clock.advance(chrono::Duration::minutes(5));
        assert!(manager.process_alerts(&first).is_empty());
    }

    #[test]
    fn test_filtered_and_rate_limited_alerts_are_dropped() {
        let (manager, _) = manager();
        let batch = summary(vec![
            alert("a3", "WHALE_SPIKE", Severity::High),
            alert("a2", "WHALE_SPIKE", Severity::High),
            alert("a1", "WHALE_SPIKE", Severity::Low),
        ]);
        // a1 is below the category minimum, a2 passes, a3 is inside the
        // minimum interval.
        let published = manager.process_alerts(&batch);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].alert.id, "a2");
        assert_eq!(published[0].message, "High alert: WHALE_SPIKE event. Check the dashboard");
        assert!(published[0].speak);
    }

    #[test]
    fn test_critical_alert_bypasses_interval() {
        let (manager, _) = manager();
        let batch = summary(vec![
            alert("a2", "RISK_THRESHOLD", Severity::Critical),
            alert("a1", "WHALE_SPIKE", Severity::High),
        ]);
        assert_eq!(manager.process_alerts(&batch).len(), 2);
    }

    #[test]
    fn test_watch_reacts_to_alert_updates() {
        let clock = ManualClock::at_noon();
        let monitor = ContextStateMonitor::new(Arc::new(clock.clone()));
        let gate = Arc::new(ProactiveAlertGate::load(
            Arc::new(MemoryStore::new()),
            Arc::new(clock.clone()),
        ));
        let manager = ProactiveManager::new(gate, Arc::new(clock));

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let _alerts = manager.subscribe(move |a| sink.lock().unwrap().push(a.alert.id.clone()));
        let _watch = manager.watch(&monitor);

        monitor.update_global_risk(crate::context::RiskLevel::High, 70.0);
        monitor.update_alerts(summary(vec![alert("x", "SPOOFING", Severity::Critical)]));

        assert_eq!(*received.lock().unwrap(), vec!["x".to_string()]);
    }
}
