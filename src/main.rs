use pulse_assistant::clock;
use pulse_assistant::config_loader::{Settings, SETTINGS};
use pulse_assistant::context::ContextStateMonitor;
use pulse_assistant::cortex::{Cortex, LlmConfig};
use pulse_assistant::intel::{HttpFetcher, IntelligenceAggregator};
use pulse_assistant::personality::{DialoguePersonalityEngine, ThreadRandom};
use pulse_assistant::proactive::{ProactiveAlertGate, ProactiveManager};
use pulse_assistant::router::TranscriptRouter;
use pulse_assistant::service::{self, AssistantService, Notification, OBJECT_PATH, SERVICE_NAME};
use pulse_assistant::speech::{CaptureConfig, SpeechCapability};
use pulse_assistant::store::{KeyValueStore, MemoryStore, SledStore};
use pulse_assistant::voice::VoiceSessionAdapter;
use pulse_assistant::wake::{WakeGatedDialogue, WakeWordDetector};
use std::error::Error;
use std::future::pending;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zbus::connection::Builder;

fn open_store(path: &Path) -> Arc<dyn KeyValueStore> {
    match SledStore::open(path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "preferences will not persist");
            Arc::new(MemoryStore::new())
        }
    }
}

#[cfg(feature = "vosk-capture")]
fn speech_capability(settings: &Settings) -> Arc<dyn SpeechCapability> {
    Arc::new(pulse_assistant::speech::vosk::VoskCapability::new(
        settings.vosk_model_path.clone(),
    ))
}

#[cfg(not(feature = "vosk-capture"))]
fn speech_capability(_settings: &Settings) -> Arc<dyn SpeechCapability> {
    Arc::new(pulse_assistant::speech::UnavailableCapability)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = SETTINGS.read().map_err(|e| e.to_string())?.clone();
    let clock = clock::system();

    let monitor = ContextStateMonitor::new(clock.clone());
    let fetcher = Arc::new(HttpFetcher::new(
        &settings.intel_base_url,
        Duration::from_millis(settings.intel_timeout_ms),
    ));
    let aggregator = Arc::new(IntelligenceAggregator::with_limits(
        fetcher,
        monitor.clone(),
        clock.clone(),
        chrono::Duration::seconds(settings.intel_cache_ttl_secs as i64),
        Duration::from_millis(settings.intel_timeout_ms),
    ));

    let store = open_store(&settings.data_path().join("store"));
    let gate = Arc::new(ProactiveAlertGate::load(store, clock.clone()));
    let manager = ProactiveManager::new(gate.clone(), clock.clone());

    let personality = Arc::new(DialoguePersonalityEngine::new(
        Arc::new(ThreadRandom),
        settings.humor_probability,
    ));
    let cortex = Cortex::new(aggregator.clone(), personality, LlmConfig::from_settings());

    let wake = Arc::new(WakeWordDetector::new(&settings.wake_word, clock.clone()));
    let router = Arc::new(TranscriptRouter::new(
        wake.clone(),
        Arc::new(WakeGatedDialogue::new(wake.clone(), Arc::new(cortex.clone()))),
    ));
    let voice = VoiceSessionAdapter::new(
        speech_capability(&settings),
        router,
        wake,
        CaptureConfig::from_settings(&settings),
        Duration::from_millis(settings.restart_delay_ms),
    );

    let conn = Builder::session()?
        .name(SERVICE_NAME)?
        .serve_at(
            OBJECT_PATH,
            AssistantService {
                aggregator: aggregator.clone(),
                cortex: cortex.clone(),
                voice: voice.clone(),
                gate,
            },
        )?
        .build()
        .await?;

    info!(name = SERVICE_NAME, "Pulse assistant running");

    // Everything the UI should hear about leaves as an AssistantEvent signal.
    let (note_tx, note_rx) = unbounded_channel();
    service::spawn_signal_pump(conn.clone(), note_rx);

    let tx = note_tx.clone();
    let _voice_events = voice.subscribe(move |event| {
        let _ = tx.send(Notification::from_voice(event));
    });

    let tx = note_tx.clone();
    let observer = cortex.clone();
    let _alert_events = manager.subscribe(move |alert| {
        observer.observe(alert.message.clone());
        let _ = tx.send(Notification::from_alert(alert));
    });

    let tx = note_tx;
    let _context_events = monitor.subscribe(move |event| {
        if let Some(note) = Notification::from_context(event) {
            let _ = tx.send(note);
        }
    });

    let _alert_watch = manager.watch(&monitor);
    let _refresh = manager.start_monitor(
        aggregator,
        Duration::from_secs(settings.refresh_interval_secs.max(1)),
    );

    if settings.enable_wake_word {
        if let Err(e) = voice.start_wake_word_mode() {
            warn!(error = %e, "wake word listening unavailable");
        }
    }

    pending::<()>().await;

    Ok(())
}
