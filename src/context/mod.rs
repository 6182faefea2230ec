mod routes;
pub mod types;

pub use routes::{module_for_route, route_for_module};
pub use types::*;

use crate::clock::Clock;
use crate::events::{EventBus, Subscription};
use chrono::Duration;
use std::sync::{Arc, Mutex, MutexGuard};

/// Live data older than this is reported as stale.
pub const STALE_AFTER_SECS: i64 = 5 * 60;

/// What changed, delivered together with the resulting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextChange {
    ActivePage,
    ActiveModule,
    SelectedEntity,
    LiveData,
    GlobalRisk,
    Alerts,
    MarketCondition,
    EngineStatus,
    Heatmap,
    IntelligenceSignal,
}

#[derive(Debug, Clone)]
pub struct ContextEvent {
    pub change: ContextChange,
    pub state: ContextState,
}

/// Session-wide view of what the user is looking at and the latest live data.
///
/// Every mutator updates state under the lock, releases it, and only then
/// notifies subscribers. Listeners must not call mutators.
#[derive(Clone)]
pub struct ContextStateMonitor {
    state: Arc<Mutex<ContextState>>,
    bus: EventBus<ContextEvent>,
    clock: Arc<dyn Clock>,
}

impl ContextStateMonitor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ContextState::default())),
            bus: EventBus::new(),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ContextState> {
        // A panicking writer cannot leave the state half-updated in a way
        // readers care about, so recover from poisoning.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn mutate<F>(&self, change: ContextChange, f: F)
    where
        F: FnOnce(&mut ContextState) -> bool,
    {
        let snapshot = {
            let mut state = self.lock();
            if !f(&mut state) {
                return;
            }
            state.clone()
        };
        self.bus.emit(&ContextEvent {
            change,
            state: snapshot,
        });
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ContextEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(listener)
    }

    pub fn snapshot(&self) -> ContextState {
        self.lock().clone()
    }

    pub fn live_data(&self) -> LiveDataSnapshot {
        self.lock().live_data.clone()
    }

    /// Records navigation to `route` and derives the active module from it.
    pub fn update_active_page(&self, route: &str) {
        let module = module_for_route(route);
        let route = route.to_string();
        self.mutate(ContextChange::ActivePage, move |state| {
            if state.active_page == route && state.active_module == module {
                return false;
            }
            let previous_page = std::mem::replace(&mut state.active_page, route);
            push_history(&mut state.page_history, previous_page);
            if state.active_module != module {
                let previous_module = std::mem::replace(&mut state.active_module, module);
                push_history(&mut state.module_history, previous_module);
            }
            true
        });
    }

    pub fn update_active_module(&self, module: DashboardModule) {
        self.mutate(ContextChange::ActiveModule, move |state| {
            if state.active_module == module {
                return false;
            }
            let previous = std::mem::replace(&mut state.active_module, module);
            push_history(&mut state.module_history, previous);
            true
        });
    }

    pub fn update_selected_entity(&self, entity: Option<SelectedEntity>) {
        self.mutate(ContextChange::SelectedEntity, move |state| {
            if state.selected_entity == entity {
                return false;
            }
            state.selected_entity = entity;
            true
        });
    }

    /// Replaces the live snapshot wholesale.
    pub fn update_live_data(&self, mut data: LiveDataSnapshot) {
        let now = self.clock.now();
        self.mutate(ContextChange::LiveData, move |state| {
            data.intelligence_signals.truncate(SIGNAL_CAPACITY);
            data.last_updated.get_or_insert(now);
            state.live_data = data;
            true
        });
    }

    pub fn update_global_risk(&self, level: RiskLevel, score: f64) {
        let now = self.clock.now();
        self.mutate(ContextChange::GlobalRisk, move |state| {
            state.live_data.global_risk_level = level;
            state.live_data.global_risk_score = if score.is_finite() {
                score.clamp(0.0, 100.0)
            } else {
                0.0
            };
            state.live_data.last_updated = Some(now);
            true
        });
    }

    pub fn update_alerts(&self, mut alerts: AlertSummary) {
        let now = self.clock.now();
        self.mutate(ContextChange::Alerts, move |state| {
            alerts.recent.truncate(RECENT_ALERTS_CAPACITY);
            state.live_data.alerts = alerts;
            state.live_data.last_updated = Some(now);
            true
        });
    }

    pub fn update_market_condition(&self, condition: MarketCondition) {
        let now = self.clock.now();
        self.mutate(ContextChange::MarketCondition, move |state| {
            state.live_data.market_condition = condition;
            state.live_data.last_updated = Some(now);
            true
        });
    }

    pub fn update_engine_status(&self, status: EngineStatus) {
        self.mutate(ContextChange::EngineStatus, move |state| {
            if state.live_data.engine_status == status {
                return false;
            }
            state.live_data.engine_status = status;
            true
        });
    }

    pub fn update_heatmap(&self, regions: Vec<HeatmapRegion>) {
        self.mutate(ContextChange::Heatmap, move |state| {
            state.live_data.heatmap_regions = regions
                .into_iter()
                .map(|r| HeatmapRegion {
                    intensity: r.intensity.clamp(0.0, 100.0),
                    region: r.region,
                })
                .collect();
            true
        });
    }

    pub fn add_intelligence_signal(&self, signal: IntelligenceSignal) {
        self.mutate(ContextChange::IntelligenceSignal, move |state| {
            state.live_data.push_signal(signal);
            true
        });
    }

    /// True when live data is older than five minutes or never arrived.
    pub fn is_data_stale(&self) -> bool {
        match self.lock().live_data.last_updated {
            Some(ts) => self.clock.now() - ts > Duration::seconds(STALE_AFTER_SECS),
            None => true,
        }
    }

    /// Human-readable digest of the current context.
    pub fn get_context_summary(&self) -> String {
        let state = self.snapshot();
        let stale = self.is_data_stale();
        compose_summary(&state, stale)
    }
}

pub(crate) fn risk_phrase(data: &LiveDataSnapshot) -> Option<String> {
    match data.global_risk_level {
        RiskLevel::Unknown => None,
        level => Some(format!(
            "global risk is {} ({:.0}/100)",
            level.as_str(),
            data.global_risk_score
        )),
    }
}

pub(crate) fn alert_phrase(alerts: &AlertSummary) -> Option<String> {
    let total = alerts.total();
    if total == 0 {
        return None;
    }
    let mut phrase = format!(
        "{} active alert{}",
        total,
        if total == 1 { "" } else { "s" }
    );
    if alerts.critical > 0 {
        phrase.push_str(&format!(", {} critical", alerts.critical));
    } else if alerts.high > 0 {
        phrase.push_str(&format!(", {} high severity", alerts.high));
    }
    Some(phrase)
}

pub(crate) fn engine_phrase(status: &EngineStatus) -> Option<String> {
    let mut parts = Vec::new();
    if status.whale_activity >= WhaleActivityTier::High {
        parts.push(format!("whale activity is {}", status.whale_activity.as_str()));
    }
    if status.manipulation_alert {
        parts.push("the manipulation monitor is flagging activity".to_string());
    }
    if status.pattern_detection_active && parts.is_empty() {
        parts.push("pattern detection is running".to_string());
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" and "))
    }
}

fn compose_summary(state: &ContextState, stale: bool) -> String {
    let mut summary = format!(
        "You're on {} ({}), which shows {}.",
        state.active_module.display_name(),
        state.active_page,
        state.active_module.description()
    );

    if let Some(entity) = &state.selected_entity {
        summary.push_str(&format!(
            " You have the {} {} selected.",
            entity.kind, entity.display_name
        ));
    }

    let data = &state.live_data;
    let mut facts = Vec::new();
    if let Some(risk) = risk_phrase(data) {
        facts.push(risk);
    }
    if let Some(alerts) = alert_phrase(&data.alerts) {
        facts.push(alerts);
    }
    if let Some(engines) = engine_phrase(&data.engine_status) {
        facts.push(engines);
    }

    if !facts.is_empty() {
        let mut joined = facts.join("; ");
        if let Some(first) = joined.get(0..1) {
            joined = first.to_uppercase() + &joined[1..];
        }
        summary.push(' ');
        summary.push_str(&joined);
        summary.push('.');
    }

    if stale {
        summary.push_str(" Live data may be out of date.");
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn monitor() -> (ContextStateMonitor, ManualClock) {
        let clock = ManualClock::at_noon();
        (ContextStateMonitor::new(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_page_history_is_capped_most_recent_first() {
        let (monitor, _) = monitor();
        for i in 0..11 {
            monitor.update_active_page(&format!("/reports/{}", i));
        }
        // One more visit pushes the 11th page into history
        monitor.update_active_page("/alerts");

        let state = monitor.snapshot();
        assert_eq!(state.page_history.len(), HISTORY_CAPACITY);
        assert_eq!(state.page_history[0], "/reports/10");
        assert_eq!(state.page_history[9], "/reports/1");
    }

    #[test]
    fn test_same_page_twice_does_not_duplicate() {
        let (monitor, _) = monitor();
        monitor.update_active_page("/whales");
        monitor.update_active_page("/whales");
        monitor.update_active_page("/risk");

        let state = monitor.snapshot();
        assert_eq!(state.page_history.front().map(String::as_str), Some("/whales"));
        assert_eq!(state.page_history.iter().filter(|p| *p == "/whales").count(), 1);
    }

    #[test]
    fn test_navigation_derives_module_and_module_history() {
        let (monitor, _) = monitor();
        monitor.update_active_page("/whales/0xdead");
        assert_eq!(monitor.snapshot().active_module, DashboardModule::WhaleTracking);
        monitor.update_active_page("/spoofing");
        let state = monitor.snapshot();
        assert_eq!(state.active_module, DashboardModule::Spoofing);
        assert_eq!(
            state.module_history.iter().copied().collect::<Vec<_>>(),
            vec![DashboardModule::WhaleTracking, DashboardModule::Overview]
        );
    }

    #[test]
    fn test_signal_ring_buffer_drops_oldest() {
        let (monitor, clock) = monitor();
        for i in 0..51 {
            monitor.add_intelligence_signal(IntelligenceSignal {
                source: "patterns".into(),
                kind: "count".into(),
                value: i as f64,
                timestamp: clock.now(),
                confidence: 0.5,
            });
        }
        let signals = monitor.live_data().intelligence_signals;
        assert_eq!(signals.len(), SIGNAL_CAPACITY);
        assert_eq!(signals.front().map(|s| s.value), Some(50.0));
        assert_eq!(signals.back().map(|s| s.value), Some(1.0));
    }

    #[test]
    fn test_subscribers_notified_and_failures_isolated() {
        let (monitor, _) = monitor();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let _bad = monitor.subscribe(|_| panic!("broken widget"));
        let _good = monitor.subscribe(move |event| {
            assert_eq!(event.change, ContextChange::GlobalRisk);
            assert_eq!(event.state.live_data.global_risk_level, RiskLevel::High);
            s.fetch_add(1, Ordering::SeqCst);
        });

        monitor.update_global_risk(RiskLevel::High, 72.0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let (monitor, _) = monitor();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let sub = monitor.subscribe(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        monitor.update_active_page("/risk");
        sub.unsubscribe();
        monitor.update_active_page("/alerts");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_staleness_after_five_minutes() {
        let (monitor, clock) = monitor();
        assert!(monitor.is_data_stale());
        monitor.update_global_risk(RiskLevel::Low, 12.0);
        assert!(!monitor.is_data_stale());
        clock.advance(Duration::seconds(STALE_AFTER_SECS + 1));
        assert!(monitor.is_data_stale());
    }

    #[test]
    fn test_context_summary_includes_conditional_clauses() {
        let (monitor, _) = monitor();
        monitor.update_active_page("/whales");
        let bare = monitor.get_context_summary();
        assert!(bare.contains("Whale Tracker"));
        assert!(!bare.contains("selected"));
        assert!(!bare.contains("alert"));

        monitor.update_selected_entity(Some(SelectedEntity {
            id: "w1".into(),
            kind: "wallet".into(),
            display_name: "Binance Cold 7".into(),
        }));
        monitor.update_global_risk(RiskLevel::High, 71.4);
        monitor.update_alerts(AlertSummary {
            critical: 1,
            high: 2,
            ..AlertSummary::default()
        });

        let summary = monitor.get_context_summary();
        assert!(summary.contains("wallet Binance Cold 7 selected"));
        assert!(summary.contains("Global risk is high (71/100)"));
        assert!(summary.contains("3 active alerts, 1 critical"));
        assert!(!summary.contains("out of date"));
    }

    #[test]
    fn test_risk_score_is_clamped() {
        let (monitor, _) = monitor();
        monitor.update_global_risk(RiskLevel::Critical, 140.0);
        assert_eq!(monitor.live_data().global_risk_score, 100.0);
    }
}
