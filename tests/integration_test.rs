use pulse_assistant::clock::ManualClock;
use pulse_assistant::context::ContextStateMonitor;
use pulse_assistant::cortex::Cortex;
use pulse_assistant::intel::{
    FetchError, IntelFetcher, IntelSource, IntelligenceAggregator, SourceReport,
};
use pulse_assistant::personality::{DialoguePersonalityEngine, FixedRandom};
use pulse_assistant::proactive::{ProactiveAlertGate, ProactiveManager};
use pulse_assistant::router::TranscriptRouter;
use pulse_assistant::speech::scripted::ScriptedCapability;
use pulse_assistant::speech::{CaptureConfig, DEFAULT_RESTART_DELAY};
use pulse_assistant::store::SledStore;
use pulse_assistant::voice::{VoiceEvent, VoiceSessionAdapter, VoiceState};
use pulse_assistant::wake::{WakeGatedDialogue, WakeWordDetector};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

mockall::mock! {
    pub Fetcher {}
    #[async_trait::async_trait]
    impl IntelFetcher for Fetcher {
        async fn get_json(&self, path: &str) -> Result<Value, FetchError>;
    }
}

fn aggregator_with(fetcher: MockFetcher, clock: &ManualClock) -> IntelligenceAggregator {
    let clock = Arc::new(clock.clone());
    IntelligenceAggregator::with_limits(
        Arc::new(fetcher),
        ContextStateMonitor::new(clock.clone()),
        clock,
        chrono::Duration::seconds(30),
        Duration::from_secs(5),
    )
}

fn risk_score(report: SourceReport) -> f64 {
    match report {
        SourceReport::Risk(risk) => risk.score,
        other => panic!("expected a risk report, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cached_report_served_until_ttl_expires() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let mut fetcher = MockFetcher::new();
    // Two endpoints per fetch: once at t=0 and once after expiry.
    fetcher.expect_get_json().times(4).returning(move |path| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        let score = if n < 2 { 40 } else { 80 };
        if path.ends_with("/global") {
            Ok(json!({"level": "medium", "score": score}))
        } else {
            Ok(json!({"regions": []}))
        }
    });

    let clock = ManualClock::at_noon();
    let aggregator = aggregator_with(fetcher, &clock);

    assert_eq!(risk_score(aggregator.fetch_source(IntelSource::Risk).await), 40.0);

    clock.advance(chrono::Duration::seconds(10));
    assert_eq!(risk_score(aggregator.fetch_source(IntelSource::Risk).await), 40.0);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    clock.advance(chrono::Duration::seconds(21));
    assert_eq!(risk_score(aggregator.fetch_source(IntelSource::Risk).await), 80.0);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_three_failed_sources_still_complete_the_aggregate() {
    let failing = ["/api/whales/", "/api/spoofing/", "/api/predictions/"];

    let mut fetcher = MockFetcher::new();
    fetcher.expect_get_json().returning(move |path| {
        if failing.iter().any(|prefix| path.starts_with(prefix)) {
            Err(FetchError::Status {
                path: path.to_string(),
                status: 503,
            })
        } else {
            Ok(json!({}))
        }
    });

    let clock = ManualClock::at_noon();
    let aggregator = aggregator_with(fetcher, &clock);
    let intel = aggregator.aggregate_all().await;

    assert_eq!(intel.sources.len(), IntelSource::ALL.len());
    assert_eq!(
        intel.failed_sources,
        vec![IntelSource::Whales, IntelSource::Spoofing, IntelSource::Predictions]
    );
    assert_eq!(
        SourceReport::Whales(intel.whales.clone()),
        IntelSource::Whales.neutral_report()
    );
    assert_eq!(
        SourceReport::Spoofing(intel.spoofing.clone()),
        IntelSource::Spoofing.neutral_report()
    );
    assert!(intel.succeeded(IntelSource::Risk));
    assert!(aggregator.monitor().live_data().last_updated.is_some());
}

/// Never answers for the listed path prefixes; `{}` for everything else.
struct HangingFetcher {
    hanging: &'static [&'static str],
}

#[async_trait::async_trait]
impl IntelFetcher for HangingFetcher {
    async fn get_json(&self, path: &str) -> Result<Value, FetchError> {
        if self.hanging.iter().any(|prefix| path.starts_with(prefix)) {
            std::future::pending::<()>().await;
        }
        Ok(json!({}))
    }
}

#[tokio::test(start_paused = true)]
async fn test_hung_sources_time_out_with_neutral_reports() {
    let clock = Arc::new(ManualClock::at_noon());
    let aggregator = IntelligenceAggregator::with_limits(
        Arc::new(HangingFetcher {
            hanging: &["/api/environmental/", "/api/momentum/"],
        }),
        ContextStateMonitor::new(clock.clone()),
        clock,
        chrono::Duration::seconds(30),
        Duration::from_secs(5),
    );

    let started = tokio::time::Instant::now();
    let intel = aggregator.aggregate_all().await;
    let waited = started.elapsed();

    assert!(waited >= Duration::from_secs(5), "{:?}", waited);
    assert!(waited < Duration::from_secs(6), "{:?}", waited);
    assert_eq!(
        intel.failed_sources,
        vec![IntelSource::Environmental, IntelSource::Momentum]
    );
    assert_eq!(
        SourceReport::Environmental(intel.environmental.clone()),
        IntelSource::Environmental.neutral_report()
    );
    assert_eq!(
        SourceReport::Momentum(intel.momentum.clone()),
        IntelSource::Momentum.neutral_report()
    );
    assert!(intel.succeeded(IntelSource::Risk));
}

#[tokio::test]
async fn test_wake_phrase_to_spoken_reply() {
    let mut fetcher = MockFetcher::new();
    fetcher.expect_get_json().returning(|_| Ok(json!({})));

    let clock = ManualClock::at_noon();
    let aggregator = Arc::new(aggregator_with(fetcher, &clock));
    let personality = Arc::new(DialoguePersonalityEngine::new(Arc::new(FixedRandom(1.0)), 0.15));
    let cortex = Cortex::new(aggregator, personality, None);

    let wake = Arc::new(WakeWordDetector::new("hey pulse", Arc::new(clock.clone())));
    let router = Arc::new(TranscriptRouter::new(
        wake.clone(),
        Arc::new(WakeGatedDialogue::new(wake.clone(), Arc::new(cortex))),
    ));
    let capability = Arc::new(ScriptedCapability::new());
    let voice = VoiceSessionAdapter::new(
        capability.clone(),
        router,
        wake,
        CaptureConfig::default(),
        DEFAULT_RESTART_DELAY,
    );

    let replies = Arc::new(Mutex::new(Vec::new()));
    let sink = replies.clone();
    let _events = voice.subscribe(move |event| {
        if let VoiceEvent::Reply(text) = event {
            sink.lock().unwrap().push(text.clone());
        }
    });

    voice.start_wake_word_mode().unwrap();
    assert_eq!(voice.state(), VoiceState::WakeListening);

    capability.say("any alerts right now");
    capability.say("hey pulse any alerts");

    for _ in 0..100 {
        if !replies.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let replies = replies.lock().unwrap().clone();
    assert_eq!(replies.len(), 1, "{:?}", replies);
    assert!(replies[0].contains("There are no active alerts right now."));
}

#[test]
fn test_preferences_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store");
    let clock = ManualClock::at_noon();

    {
        let store = Arc::new(SledStore::open(&path).unwrap());
        let gate = ProactiveAlertGate::load(store, Arc::new(clock.clone()));
        gate.set_quiet_hours(true, "21:30", "06:00", false).unwrap();
        gate.set_rate_limit(4, 120, true);
    }

    let store = Arc::new(SledStore::open(&path).unwrap());
    let gate = ProactiveAlertGate::load(store, Arc::new(clock));
    let prefs = gate.preferences();
    assert!(prefs.quiet_hours.enabled);
    assert_eq!(prefs.quiet_hours.start, "21:30");
    assert!(!prefs.quiet_hours.allow_critical);
    assert_eq!(gate.max_alerts_per_hour(), 4);
    assert_eq!(gate.min_alert_interval(), Duration::from_secs(120));
}

#[test]
fn test_alert_flow_from_monitor_to_manager() {
    use pulse_assistant::context::{AlertData, AlertSummary, Severity};
    use pulse_assistant::store::MemoryStore;

    let clock = ManualClock::at_noon();
    clock.set_time_of_day(23, 30);
    let monitor = ContextStateMonitor::new(Arc::new(clock.clone()));
    let gate = Arc::new(ProactiveAlertGate::load(
        Arc::new(MemoryStore::new()),
        Arc::new(clock.clone()),
    ));
    gate.set_quiet_hours(true, "22:00", "07:00", true).unwrap();
    let manager = ProactiveManager::new(gate, Arc::new(clock.clone()));

    let published = Arc::new(Mutex::new(Vec::new()));
    let sink = published.clone();
    let _alerts = manager.subscribe(move |a| sink.lock().unwrap().push(a.alert.id.clone()));
    let _watch = manager.watch(&monitor);

    let alert = |id: &str, severity| AlertData {
        id: id.to_string(),
        category: "MANIPULATION".to_string(),
        severity,
        title: "Spoofing burst".to_string(),
        message: String::new(),
        timestamp: None,
    };
    monitor.update_alerts(AlertSummary {
        critical: 1,
        medium: 1,
        recent: vec![alert("crit", Severity::Critical), alert("med", Severity::Medium)],
        ..AlertSummary::default()
    });

    // Inside quiet hours only the critical alert gets through.
    assert_eq!(*published.lock().unwrap(), vec!["crit".to_string()]);
}
