use crate::events::{EventBus, Subscription};
use crate::router::TranscriptRouter;
use crate::speech::{
    CaptureConfig, CaptureError, SessionEvent, SpeechCapability, SpeechCaptureSession,
};
use crate::wake::{ListenMode, WakeEvent, WakeWordDetector};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoiceState {
    Idle,
    WakeListening,
    ManualListening,
}

impl VoiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceState::Idle => "idle",
            VoiceState::WakeListening => "wake-listening",
            VoiceState::ManualListening => "manual-listening",
        }
    }
}

impl fmt::Display for VoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    StateChanged(VoiceState),
    WakeDetected,
    Partial(String),
    Final(String),
    Reply(String),
    Error(CaptureError),
}

struct AdapterInner {
    session: SpeechCaptureSession,
    router: Arc<TranscriptRouter>,
    wake: Arc<WakeWordDetector>,
    base_config: CaptureConfig,
    state: Mutex<VoiceState>,
    bus: EventBus<VoiceEvent>,
    wake_subscription: Mutex<Option<Subscription>>,
}

/// Wake-word and push-to-talk listening over one capture session.
#[derive(Clone)]
pub struct VoiceSessionAdapter {
    inner: Arc<AdapterInner>,
}

impl VoiceSessionAdapter {
    /// Must be called inside a tokio runtime.
    pub fn new(
        capability: Arc<dyn SpeechCapability>,
        router: Arc<TranscriptRouter>,
        wake: Arc<WakeWordDetector>,
        base_config: CaptureConfig,
        restart_delay: Duration,
    ) -> Self {
        let (session, events) =
            SpeechCaptureSession::new(capability, base_config.clone(), restart_delay);
        wake.set_mode(ListenMode::Direct);

        let inner = Arc::new(AdapterInner {
            session,
            router,
            wake: wake.clone(),
            base_config,
            state: Mutex::new(VoiceState::Idle),
            bus: EventBus::new(),
            wake_subscription: Mutex::new(None),
        });

        let bus = inner.bus.clone();
        let subscription = wake.subscribe(move |event| {
            if *event == WakeEvent::Detected {
                bus.emit(&VoiceEvent::WakeDetected);
            }
        });
        if let Ok(mut slot) = inner.wake_subscription.lock() {
            *slot = Some(subscription);
        }

        spawn_pump(Arc::downgrade(&inner), events);
        Self { inner }
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&VoiceEvent) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(listener)
    }

    pub fn state(&self) -> VoiceState {
        *self.inner.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, next: VoiceState) {
        set_state(&self.inner, next);
    }

    fn stop_current(&self) {
        if self.state() != VoiceState::Idle {
            self.inner.session.stop();
            self.inner.wake.set_mode(ListenMode::Direct);
            self.set_state(VoiceState::Idle);
        }
    }

    fn start_mode(&self, target: VoiceState) -> Result<(), CaptureError> {
        let current = self.state();
        if current == target {
            return Ok(());
        }
        if current != VoiceState::Idle {
            self.stop_current();
        }

        let (mode, continuous) = match target {
            VoiceState::WakeListening => (ListenMode::Wake, true),
            _ => (ListenMode::Direct, false),
        };
        self.inner.wake.set_mode(mode);
        self.inner.session.set_config(CaptureConfig {
            continuous,
            ..self.inner.base_config.clone()
        });

        if let Err(e) = self.inner.session.start() {
            self.inner.wake.set_mode(ListenMode::Direct);
            return Err(e);
        }
        info!(state = %target, "voice session started");
        self.set_state(target);
        Ok(())
    }

    pub fn start_wake_word_mode(&self) -> Result<(), CaptureError> {
        self.start_mode(VoiceState::WakeListening)
    }

    pub fn start_manual_mic_session(&self) -> Result<(), CaptureError> {
        self.start_mode(VoiceState::ManualListening)
    }

    pub fn stop_wake_word_mode(&self) {
        if self.state() == VoiceState::WakeListening {
            self.stop_current();
        }
    }

    pub fn stop_manual_mic_session(&self) {
        if self.state() == VoiceState::ManualListening {
            self.stop_current();
        }
    }

    /// Routes typed or injected text as if it had been heard.
    pub async fn process_transcript(&self, text: &str) -> Option<String> {
        let reply = self.inner.router.handle_final(text).await;
        if let Some(reply) = &reply {
            self.inner.bus.emit(&VoiceEvent::Reply(reply.clone()));
        }
        reply
    }
}

fn set_state(inner: &AdapterInner, next: VoiceState) {
    let changed = {
        let mut state = inner.state.lock().unwrap_or_else(|p| p.into_inner());
        let changed = *state != next;
        *state = next;
        changed
    };
    if changed {
        inner.bus.emit(&VoiceEvent::StateChanged(next));
    }
}

fn spawn_pump(weak: Weak<AdapterInner>, mut events: UnboundedReceiver<SessionEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(inner) = weak.upgrade() else {
                break;
            };
            match event {
                SessionEvent::Started => debug!("capture started"),
                SessionEvent::Ended => {
                    let manual = *inner.state.lock().unwrap_or_else(|p| p.into_inner())
                        == VoiceState::ManualListening;
                    if manual {
                        inner.session.stop();
                        inner.wake.set_mode(ListenMode::Direct);
                        set_state(&inner, VoiceState::Idle);
                    }
                }
                SessionEvent::Partial(text) => {
                    inner.bus.emit(&VoiceEvent::Partial(text.clone()));
                    inner.router.handle_partial(&text).await;
                }
                SessionEvent::Final(text) => {
                    inner.bus.emit(&VoiceEvent::Final(text.clone()));
                    if let Some(reply) = inner.router.handle_final(&text).await {
                        inner.bus.emit(&VoiceEvent::Reply(reply));
                    }
                }
                SessionEvent::Error(err) => {
                    inner.bus.emit(&VoiceEvent::Error(err));
                }
            }
        }
        debug!("voice event pump stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::router::{DialogueHandler, RouterError};
    use crate::speech::scripted::ScriptedCapability;
    use crate::speech::{CaptureErrorKind, DEFAULT_RESTART_DELAY};
    use crate::wake::WakeGatedDialogue;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl DialogueHandler for Echo {
        async fn handle(&self, text: &str) -> Result<Option<String>, RouterError> {
            Ok(Some(format!("echo {}", text)))
        }
    }

    fn adapter() -> (VoiceSessionAdapter, Arc<ScriptedCapability>, Arc<Mutex<Vec<VoiceEvent>>>) {
        let cap = Arc::new(ScriptedCapability::new());
        let wake = Arc::new(WakeWordDetector::new("hey pulse", Arc::new(ManualClock::at_noon())));
        let router = Arc::new(TranscriptRouter::new(
            wake.clone(),
            Arc::new(WakeGatedDialogue::new(wake.clone(), Arc::new(Echo))),
        ));
        let adapter = VoiceSessionAdapter::new(
            cap.clone(),
            router,
            wake,
            CaptureConfig::default(),
            DEFAULT_RESTART_DELAY,
        );
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        adapter
            .subscribe(move |e| sink.lock().unwrap().push(e.clone()))
            .detach();
        (adapter, cap, events)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let (adapter, cap, events) = adapter();
        adapter.start_wake_word_mode().unwrap();
        adapter.start_wake_word_mode().unwrap();
        assert_eq!(adapter.state(), VoiceState::WakeListening);
        assert_eq!(cap.start_count(), 1);
        assert_eq!(
            events.lock().unwrap().clone(),
            vec![VoiceEvent::StateChanged(VoiceState::WakeListening)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_returns_to_idle_and_ignores_other_mode() {
        let (adapter, cap, _) = adapter();
        adapter.start_wake_word_mode().unwrap();
        adapter.stop_manual_mic_session();
        assert_eq!(adapter.state(), VoiceState::WakeListening);

        adapter.stop_wake_word_mode();
        adapter.stop_wake_word_mode();
        assert_eq!(adapter.state(), VoiceState::Idle);
        assert!(!cap.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_modes_stops_current_first() {
        let (adapter, cap, _) = adapter();
        adapter.start_wake_word_mode().unwrap();
        adapter.start_manual_mic_session().unwrap();
        assert_eq!(adapter.state(), VoiceState::ManualListening);
        assert_eq!(cap.stop_count(), 1);
        assert_eq!(cap.last_config().map(|c| c.continuous), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_to_manual_survives_old_capture_ending() {
        let (adapter, cap, events) = adapter();
        adapter.start_wake_word_mode().unwrap();
        settle().await;

        adapter.start_manual_mic_session().unwrap();
        settle().await;

        assert_eq!(adapter.state(), VoiceState::ManualListening);
        assert!(cap.is_running());
        assert_eq!(
            events.lock().unwrap().last(),
            Some(&VoiceEvent::StateChanged(VoiceState::ManualListening))
        );

        cap.say("open the risk page");
        settle().await;
        assert!(events
            .lock()
            .unwrap()
            .contains(&VoiceEvent::Reply("echo open the risk page".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_session_can_be_restarted_right_after_stop() {
        let (adapter, cap, _) = adapter();
        adapter.start_manual_mic_session().unwrap();
        settle().await;

        adapter.stop_manual_mic_session();
        adapter.start_manual_mic_session().unwrap();
        settle().await;

        assert_eq!(adapter.state(), VoiceState::ManualListening);
        assert!(cap.is_running());
        assert_eq!(cap.start_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wake_mode_routes_only_after_phrase() {
        let (adapter, cap, events) = adapter();
        adapter.start_wake_word_mode().unwrap();
        settle().await;

        cap.say("what is the risk");
        settle().await;
        cap.say("hey pulse what is the risk");
        settle().await;

        let events = events.lock().unwrap().clone();
        let replies: Vec<&VoiceEvent> = events
            .iter()
            .filter(|e| matches!(e, VoiceEvent::Reply(_)))
            .collect();
        assert_eq!(replies, vec![&VoiceEvent::Reply("echo what is the risk".into())]);
        assert!(events.contains(&VoiceEvent::WakeDetected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_session_ends_with_capture() {
        let (adapter, cap, events) = adapter();
        adapter.start_manual_mic_session().unwrap();
        settle().await;

        cap.say("show me whales");
        cap.end();
        settle().await;

        assert_eq!(adapter.state(), VoiceState::Idle);
        let events = events.lock().unwrap().clone();
        assert!(events.contains(&VoiceEvent::Reply("echo show me whales".into())));
        assert_eq!(events.last(), Some(&VoiceEvent::StateChanged(VoiceState::Idle)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_capability_keeps_idle() {
        let (adapter, cap, events) = adapter();
        cap.set_available(false);
        let err = adapter.start_wake_word_mode().unwrap_err();
        assert_eq!(err.kind, CaptureErrorKind::NotSupported);
        assert_eq!(adapter.state(), VoiceState::Idle);
        settle().await;
        assert!(events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, VoiceEvent::Error(_))));
    }

    #[tokio::test]
    async fn test_process_transcript_bypasses_capture() {
        let (adapter, cap, events) = adapter();
        let reply = adapter.process_transcript("  show alerts ").await;
        assert_eq!(reply.as_deref(), Some("echo show alerts"));
        assert_eq!(cap.start_count(), 0);
        assert_eq!(
            events.lock().unwrap().clone(),
            vec![VoiceEvent::Reply("echo show alerts".into())]
        );
    }
}
