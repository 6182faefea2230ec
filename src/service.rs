use crate::context::{ContextChange, ContextEvent, SelectedEntity, Severity};
use crate::cortex::Cortex;
use crate::intel::IntelligenceAggregator;
use crate::proactive::{GateError, ProactiveAlert, ProactiveAlertGate};
use crate::voice::{VoiceEvent, VoiceSessionAdapter};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use zbus::{interface, Connection, SignalContext};

pub const SERVICE_NAME: &str = "org.pulse.Assistant";
pub const OBJECT_PATH: &str = "/org/pulse/Assistant";

pub struct AssistantService {
    pub aggregator: Arc<IntelligenceAggregator>,
    pub cortex: Cortex,
    pub voice: VoiceSessionAdapter,
    pub gate: Arc<ProactiveAlertGate>,
}

fn gate_error(e: GateError) -> zbus::fdo::Error {
    zbus::fdo::Error::InvalidArgs(e.to_string())
}

#[interface(name = "org.pulse.Assistant")]
impl AssistantService {
    #[zbus(name = "Ping")]
    async fn ping(&self) -> String {
        "pong".to_string()
    }

    #[zbus(name = "GetVersion")]
    async fn get_version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    /// Returns the module the route resolved to.
    #[zbus(name = "Navigate")]
    async fn navigate(&self, route: String) -> String {
        let monitor = self.aggregator.monitor();
        monitor.update_active_page(&route);
        monitor.snapshot().active_module.as_str().to_string()
    }

    #[zbus(name = "SelectEntity")]
    async fn select_entity(&self, id: String, kind: String, name: String) -> zbus::fdo::Result<()> {
        let id = id.trim().to_string();
        if id.is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs("Entity id cannot be empty".into()));
        }
        let display_name = if name.trim().is_empty() { id.clone() } else { name };
        self.aggregator
            .monitor()
            .update_selected_entity(Some(SelectedEntity {
                id,
                kind,
                display_name,
            }));
        Ok(())
    }

    #[zbus(name = "ClearEntity")]
    async fn clear_entity(&self) {
        self.aggregator.monitor().update_selected_entity(None);
    }

    #[zbus(name = "Ask")]
    async fn ask(&self, text: String) -> zbus::fdo::Result<String> {
        if text.trim().is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs("Question cannot be empty".into()));
        }
        info!(%text, "received question");
        self.cortex
            .query(text)
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    #[zbus(name = "GetContextSummary")]
    async fn get_context_summary(&self) -> String {
        self.aggregator.monitor().get_context_summary()
    }

    /// Drops cached reports and refetches everything. Returns how many
    /// sources failed.
    #[zbus(name = "Refresh")]
    async fn refresh(&self) -> u32 {
        self.aggregator.clear_cache();
        self.aggregator.aggregate_all().await.failed_sources.len() as u32
    }

    #[zbus(name = "StartWakeMode")]
    async fn start_wake_mode(&self) -> zbus::fdo::Result<()> {
        self.voice
            .start_wake_word_mode()
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    #[zbus(name = "StopWakeMode")]
    async fn stop_wake_mode(&self) {
        self.voice.stop_wake_word_mode();
    }

    #[zbus(name = "StartManualMic")]
    async fn start_manual_mic(&self) -> zbus::fdo::Result<()> {
        self.voice
            .start_manual_mic_session()
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    #[zbus(name = "StopManualMic")]
    async fn stop_manual_mic(&self) {
        self.voice.stop_manual_mic_session();
    }

    #[zbus(name = "GetVoiceState")]
    async fn get_voice_state(&self) -> String {
        self.voice.state().as_str().to_string()
    }

    #[zbus(name = "GetPreferences")]
    async fn get_preferences(&self) -> zbus::fdo::Result<String> {
        serde_json::to_string(&self.gate.preferences())
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    #[zbus(name = "SetProactiveEnabled")]
    async fn set_proactive_enabled(&self, enabled: bool) {
        self.gate.set_proactive_enabled(enabled);
    }

    #[zbus(name = "SetVoiceAlerts")]
    async fn set_voice_alerts(&self, enabled: bool) {
        self.gate.set_voice_alerts_enabled(enabled);
    }

    #[zbus(name = "SetCategory")]
    async fn set_category(
        &self,
        category: String,
        enabled: bool,
        min_severity: String,
    ) -> zbus::fdo::Result<()> {
        let severity = Severity::parse(&min_severity)
            .ok_or_else(|| gate_error(GateError::InvalidSeverity(min_severity.clone())))?;
        if category.trim().is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs("Category cannot be empty".into()));
        }
        self.gate.set_category(&category, enabled, severity);
        Ok(())
    }

    #[zbus(name = "SetQuietHours")]
    async fn set_quiet_hours(
        &self,
        enabled: bool,
        start: String,
        end: String,
        allow_critical: bool,
    ) -> zbus::fdo::Result<()> {
        self.gate
            .set_quiet_hours(enabled, &start, &end, allow_critical)
            .map_err(gate_error)
    }

    #[zbus(name = "SetRateLimit")]
    async fn set_rate_limit(&self, max_per_hour: u32, min_interval_secs: u64, critical_bypass: bool) {
        self.gate
            .set_rate_limit(max_per_hour, min_interval_secs, critical_bypass);
    }

    #[zbus(name = "ResetPreferences")]
    async fn reset_preferences(&self) {
        self.gate.reset_to_defaults();
    }

    #[zbus(signal, name = "AssistantEvent")]
    pub async fn assistant_event(
        ctxt: &SignalContext<'_>,
        kind: &str,
        payload: &str,
    ) -> zbus::Result<()>;
}

/// One `AssistantEvent` signal: a kind tag and a JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: &'static str,
    pub payload: String,
}

impl Notification {
    fn new(kind: &'static str, payload: serde_json::Value) -> Self {
        Self {
            kind,
            payload: payload.to_string(),
        }
    }

    pub fn from_voice(event: &VoiceEvent) -> Self {
        match event {
            VoiceEvent::StateChanged(state) => {
                Self::new("voice-state", json!({ "state": state.as_str() }))
            }
            VoiceEvent::WakeDetected => Self::new("wake", json!({})),
            VoiceEvent::Partial(text) => Self::new("partial", json!({ "text": text })),
            VoiceEvent::Final(text) => Self::new("final", json!({ "text": text })),
            VoiceEvent::Reply(text) => Self::new("reply", json!({ "text": text })),
            VoiceEvent::Error(err) => Self::new(
                "voice-error",
                json!({ "kind": err.kind.as_str(), "message": err.message }),
            ),
        }
    }

    pub fn from_alert(alert: &ProactiveAlert) -> Self {
        Self::new(
            "proactive-alert",
            serde_json::to_value(alert).unwrap_or_else(|_| json!({ "message": alert.message })),
        )
    }

    /// Only page and entity changes are forwarded; live-data updates are
    /// too chatty for the bus.
    pub fn from_context(event: &ContextEvent) -> Option<Self> {
        match event.change {
            ContextChange::ActivePage => Some(Self::new(
                "navigation",
                json!({
                    "route": event.state.active_page,
                    "module": event.state.active_module.as_str(),
                }),
            )),
            ContextChange::SelectedEntity => Some(Self::new(
                "entity",
                serde_json::to_value(&event.state.selected_entity).unwrap_or(serde_json::Value::Null),
            )),
            _ => None,
        }
    }
}

/// Emits every queued notification as an `AssistantEvent` signal.
pub fn spawn_signal_pump(conn: Connection, mut rx: UnboundedReceiver<Notification>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ctxt = match SignalContext::new(&conn, OBJECT_PATH) {
            Ok(ctxt) => ctxt,
            Err(e) => {
                warn!(error = %e, "cannot emit D-Bus signals");
                return;
            }
        };
        while let Some(note) = rx.recv().await {
            if let Err(e) = AssistantService::assistant_event(&ctxt, note.kind, &note.payload).await {
                warn!(kind = note.kind, error = %e, "failed to emit AssistantEvent");
            }
        }
    })
}
