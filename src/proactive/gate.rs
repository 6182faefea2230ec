use crate::clock::Clock;
use crate::context::Severity;
use crate::store::{KeyValueStore, StoreError};
use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const PREFERENCES_KEY: &str = "pulse.alert_preferences";
pub const PREFERENCES_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("invalid time of day {0:?}, expected HH:MM")]
    InvalidTime(String),
    #[error("unknown severity {0:?}")]
    InvalidSeverity(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPreference {
    pub enabled: bool,
    pub min_severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuietHours {
    pub enabled: bool,
    /// "HH:MM"
    pub start: String,
    /// "HH:MM"
    pub end: String,
    pub allow_critical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPreferences {
    pub proactive_alerts_enabled: bool,
    pub voice_alerts_enabled: bool,
    pub categories: BTreeMap<String, CategoryPreference>,
    pub quiet_hours: QuietHours,
    pub max_alerts_per_hour: u32,
    pub min_alert_interval_seconds: u64,
    pub critical_bypass_rate_limit: bool,
    pub version: u32,
    pub last_updated: Option<DateTime<Utc>>,
}

const DEFAULT_CATEGORIES: &[(&str, Severity)] = &[
    ("WHALE_SPIKE", Severity::Medium),
    ("MANIPULATION", Severity::Medium),
    ("SPOOFING", Severity::Medium),
    ("PATTERN_DETECTED", Severity::Medium),
    ("RISK_THRESHOLD", Severity::High),
    ("MOMENTUM_SHIFT", Severity::High),
    ("ENVIRONMENTAL", Severity::High),
    ("COMPLIANCE", Severity::High),
    ("SYSTEM", Severity::Critical),
];

impl Default for AlertPreferences {
    fn default() -> Self {
        Self {
            proactive_alerts_enabled: true,
            voice_alerts_enabled: true,
            categories: DEFAULT_CATEGORIES
                .iter()
                .map(|(name, min)| {
                    (
                        name.to_string(),
                        CategoryPreference {
                            enabled: true,
                            min_severity: *min,
                        },
                    )
                })
                .collect(),
            quiet_hours: QuietHours {
                enabled: false,
                start: "22:00".to_string(),
                end: "07:00".to_string(),
                allow_critical: true,
            },
            max_alerts_per_hour: 10,
            min_alert_interval_seconds: 60,
            critical_bypass_rate_limit: true,
            version: PREFERENCES_VERSION,
            last_updated: None,
        }
    }
}

/// Upper-case, underscore-separated category key.
pub fn normalize_category(category: &str) -> String {
    category
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' | '.' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, GateError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|_| GateError::InvalidTime(s.to_string()))
}

/// `start == end` is an empty window; `start > end` wraps past midnight.
pub fn in_window(now: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start == end {
        false
    } else if start < end {
        now >= start && now < end
    } else {
        now >= start || now < end
    }
}

fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Brings a stored record of any version up to the current layout by laying
/// it over the current defaults.
pub fn migrate_preferences(stored: &Value) -> AlertPreferences {
    let defaults = AlertPreferences::default();
    let mut merged = match serde_json::to_value(&defaults) {
        Ok(v) => v,
        Err(_) => return defaults,
    };
    deep_merge(&mut merged, stored);
    if let Value::Object(map) = &mut merged {
        map.insert("version".to_string(), Value::from(PREFERENCES_VERSION));
    }
    serde_json::from_value(merged).unwrap_or_else(|e| {
        warn!(error = %e, "stored alert preferences unusable, using defaults");
        defaults
    })
}

/// Decides whether a proactive alert may be shown. Rate limiting is left to
/// the caller; the gate only exposes the policy values.
pub struct ProactiveAlertGate {
    prefs: Mutex<AlertPreferences>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    auto_save: AtomicBool,
}

impl ProactiveAlertGate {
    /// Reads preferences from `store`, migrating or defaulting as needed.
    /// Storage failures are logged and leave the defaults in place.
    pub fn load(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        let (prefs, needs_save) = match store.get(PREFERENCES_KEY) {
            Ok(Some(bytes)) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(raw) => {
                    let stored_version = raw.get("version").and_then(|v| v.as_u64());
                    let current = stored_version == Some(PREFERENCES_VERSION as u64);
                    match current.then(|| serde_json::from_value::<AlertPreferences>(raw.clone())) {
                        Some(Ok(prefs)) => (prefs, false),
                        _ => {
                            info!(?stored_version, "migrating alert preferences");
                            (migrate_preferences(&raw), true)
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "stored alert preferences are not JSON, using defaults");
                    (AlertPreferences::default(), true)
                }
            },
            Ok(None) => (AlertPreferences::default(), false),
            Err(e) => {
                warn!(error = %e, "could not read alert preferences, using defaults");
                (AlertPreferences::default(), false)
            }
        };

        let gate = Self {
            prefs: Mutex::new(prefs),
            store,
            clock,
            auto_save: AtomicBool::new(true),
        };
        if needs_save {
            gate.persist();
        }
        gate
    }

    fn lock(&self) -> MutexGuard<'_, AlertPreferences> {
        self.prefs.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn preferences(&self) -> AlertPreferences {
        self.lock().clone()
    }

    pub fn set_auto_save(&self, enabled: bool) {
        self.auto_save.store(enabled, Ordering::SeqCst);
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&*self.lock())?;
        self.store.set(PREFERENCES_KEY, &bytes)
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!(error = %e, "could not save alert preferences; keeping them in memory");
        }
    }

    fn mutate<F: FnOnce(&mut AlertPreferences)>(&self, f: F) {
        let now = self.clock.now();
        {
            let mut prefs = self.lock();
            f(&mut prefs);
            prefs.last_updated = Some(now);
        }
        if self.auto_save.load(Ordering::SeqCst) {
            self.persist();
        }
    }

    pub fn should_show_alert(&self, category: &str, severity: Severity) -> bool {
        let prefs = self.preferences();
        if !prefs.proactive_alerts_enabled {
            return false;
        }
        if self.quiet_hours_active(&prefs)
            && !(prefs.quiet_hours.allow_critical && severity == Severity::Critical)
        {
            return false;
        }
        match prefs.categories.get(&normalize_category(category)) {
            Some(pref) => pref.enabled && severity >= pref.min_severity,
            None => false,
        }
    }

    pub fn is_in_quiet_hours(&self) -> bool {
        self.quiet_hours_active(&self.preferences())
    }

    fn quiet_hours_active(&self, prefs: &AlertPreferences) -> bool {
        if !prefs.quiet_hours.enabled {
            return false;
        }
        let (Ok(start), Ok(end)) = (
            parse_time_of_day(&prefs.quiet_hours.start),
            parse_time_of_day(&prefs.quiet_hours.end),
        ) else {
            return false;
        };
        let local = self.clock.local_time();
        let now = NaiveTime::from_hms_opt(local.hour(), local.minute(), 0).unwrap_or(local);
        in_window(now, start, end)
    }

    pub fn max_alerts_per_hour(&self) -> u32 {
        self.lock().max_alerts_per_hour
    }

    pub fn min_alert_interval(&self) -> Duration {
        Duration::from_secs(self.lock().min_alert_interval_seconds)
    }

    pub fn critical_bypasses_rate_limit(&self) -> bool {
        self.lock().critical_bypass_rate_limit
    }

    pub fn voice_alerts_enabled(&self) -> bool {
        self.lock().voice_alerts_enabled
    }

    pub fn set_proactive_enabled(&self, enabled: bool) {
        self.mutate(|p| p.proactive_alerts_enabled = enabled);
    }

    pub fn set_voice_alerts_enabled(&self, enabled: bool) {
        self.mutate(|p| p.voice_alerts_enabled = enabled);
    }

    pub fn set_category(&self, category: &str, enabled: bool, min_severity: Severity) {
        let key = normalize_category(category);
        self.mutate(|p| {
            p.categories.insert(key, CategoryPreference { enabled, min_severity });
        });
    }

    pub fn set_quiet_hours(
        &self,
        enabled: bool,
        start: &str,
        end: &str,
        allow_critical: bool,
    ) -> Result<(), GateError> {
        let start = parse_time_of_day(start)?.format("%H:%M").to_string();
        let end = parse_time_of_day(end)?.format("%H:%M").to_string();
        self.mutate(|p| {
            p.quiet_hours = QuietHours {
                enabled,
                start,
                end,
                allow_critical,
            }
        });
        Ok(())
    }

    pub fn set_rate_limit(&self, max_per_hour: u32, min_interval_secs: u64, critical_bypass: bool) {
        self.mutate(|p| {
            p.max_alerts_per_hour = max_per_hour;
            p.min_alert_interval_seconds = min_interval_secs;
            p.critical_bypass_rate_limit = critical_bypass;
        });
    }

    pub fn reset_to_defaults(&self) {
        self.mutate(|p| *p = AlertPreferences::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn gate() -> (ProactiveAlertGate, ManualClock, Arc<MemoryStore>) {
        let clock = ManualClock::at_noon();
        let store = Arc::new(MemoryStore::new());
        let gate = ProactiveAlertGate::load(store.clone(), Arc::new(clock.clone()));
        (gate, clock, store)
    }

    fn t(s: &str) -> NaiveTime {
        parse_time_of_day(s).unwrap()
    }

    #[test]
    fn test_window_wraparound() {
        assert!(in_window(t("23:30"), t("22:00"), t("07:00")));
        assert!(in_window(t("06:59"), t("22:00"), t("07:00")));
        assert!(!in_window(t("12:00"), t("22:00"), t("07:00")));
        assert!(!in_window(t("07:00"), t("22:00"), t("07:00")));
        assert!(in_window(t("13:00"), t("12:00"), t("14:00")));
        assert!(!in_window(t("12:00"), t("12:00"), t("12:00")));
    }

    #[test]
    fn test_quiet_hours_follow_clock() {
        let (gate, clock, _) = gate();
        gate.set_quiet_hours(true, "22:00", "07:00", true).unwrap();
        clock.set_time_of_day(23, 30);
        assert!(gate.is_in_quiet_hours());
        clock.set_time_of_day(12, 0);
        assert!(!gate.is_in_quiet_hours());
    }

    #[test]
    fn test_severity_threshold() {
        let (gate, _, _) = gate();
        gate.set_category("WHALE_SPIKE", true, Severity::Medium);
        assert!(!gate.should_show_alert("WHALE_SPIKE", Severity::Low));
        assert!(gate.should_show_alert("WHALE_SPIKE", Severity::High));
        assert!(gate.should_show_alert("whale-spike", Severity::Medium));
    }

    #[test]
    fn test_critical_bypasses_quiet_hours_when_allowed() {
        let (gate, clock, _) = gate();
        gate.set_quiet_hours(true, "22:00", "07:00", true).unwrap();
        clock.set_time_of_day(23, 30);
        assert!(gate.should_show_alert("RISK_THRESHOLD", Severity::Critical));
        assert!(!gate.should_show_alert("WHALE_SPIKE", Severity::Medium));

        gate.set_quiet_hours(true, "22:00", "07:00", false).unwrap();
        assert!(!gate.should_show_alert("RISK_THRESHOLD", Severity::Critical));
    }

    #[test]
    fn test_master_switch_and_unknown_category() {
        let (gate, _, _) = gate();
        assert!(!gate.should_show_alert("SOMETHING_NEW", Severity::Critical));
        gate.set_proactive_enabled(false);
        assert!(!gate.should_show_alert("SYSTEM", Severity::Critical));
    }

    #[test]
    fn test_invalid_quiet_hours_rejected() {
        let (gate, _, _) = gate();
        assert!(matches!(
            gate.set_quiet_hours(true, "25:00", "07:00", true),
            Err(GateError::InvalidTime(_))
        ));
        assert!(!gate.preferences().quiet_hours.enabled);
    }

    #[test]
    fn test_mutations_persist_and_reload() {
        let (gate, clock, store) = gate();
        gate.set_rate_limit(3, 120, false);
        let reloaded = ProactiveAlertGate::load(store, Arc::new(clock));
        assert_eq!(reloaded.max_alerts_per_hour(), 3);
        assert_eq!(reloaded.min_alert_interval(), Duration::from_secs(120));
        assert!(!reloaded.critical_bypasses_rate_limit());
        assert!(reloaded.preferences().last_updated.is_some());
    }

    #[test]
    fn test_auto_save_off_keeps_store_untouched() {
        let (gate, _, store) = gate();
        gate.set_auto_save(false);
        gate.set_proactive_enabled(false);
        assert_eq!(store.get(PREFERENCES_KEY).unwrap(), None);
        gate.save().unwrap();
        assert!(store.get(PREFERENCES_KEY).unwrap().is_some());
    }

    #[test]
    fn test_old_version_is_merged_onto_defaults() {
        let store = Arc::new(MemoryStore::new());
        let old = json!({
            "version": 1,
            "proactive_alerts_enabled": false,
            "categories": {"WHALE_SPIKE": {"enabled": false, "min_severity": "high"}},
            "quiet_hours": {"enabled": true}
        });
        store.set(PREFERENCES_KEY, old.to_string().as_bytes()).unwrap();

        let gate = ProactiveAlertGate::load(store.clone(), Arc::new(ManualClock::at_noon()));
        let prefs = gate.preferences();
        assert_eq!(prefs.version, PREFERENCES_VERSION);
        assert!(!prefs.proactive_alerts_enabled);
        assert!(prefs.quiet_hours.enabled);
        assert_eq!(prefs.quiet_hours.start, "22:00");
        assert!(!prefs.categories["WHALE_SPIKE"].enabled);
        assert!(prefs.categories.contains_key("SPOOFING"));

        // The migrated record is written back.
        let saved: Value = serde_json::from_slice(&store.get(PREFERENCES_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(saved["version"], PREFERENCES_VERSION);
    }

    #[test]
    fn test_garbage_record_falls_back_to_defaults() {
        let store = Arc::new(MemoryStore::new());
        store.set(PREFERENCES_KEY, b"{not json").unwrap();
        let gate = ProactiveAlertGate::load(store, Arc::new(ManualClock::at_noon()));
        assert_eq!(gate.preferences(), AlertPreferences::default());
    }
}
