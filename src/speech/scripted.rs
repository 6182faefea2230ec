use super::{CaptureConfig, CaptureError, CaptureErrorKind, PlatformEvent, RecognitionResult, SpeechCapability};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Default)]
struct ScriptState {
    sender: Option<UnboundedSender<PlatformEvent>>,
    running: bool,
    starts: usize,
    stops: usize,
    last_config: Option<CaptureConfig>,
    refuse_next_start: Option<CaptureError>,
}

/// Capability driven by hand; tests push the events a real recognizer
/// would produce.
pub struct ScriptedCapability {
    available: AtomicBool,
    state: Mutex<ScriptState>,
}

impl Default for ScriptedCapability {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCapability {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            state: Mutex::new(ScriptState::default()),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn refuse_next_start(&self, err: CaptureError) {
        if let Ok(mut state) = self.state.lock() {
            state.refuse_next_start = Some(err);
        }
    }

    pub fn start_count(&self) -> usize {
        self.state.lock().map(|s| s.starts).unwrap_or(0)
    }

    pub fn stop_count(&self) -> usize {
        self.state.lock().map(|s| s.stops).unwrap_or(0)
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().map(|s| s.running).unwrap_or(false)
    }

    pub fn last_config(&self) -> Option<CaptureConfig> {
        self.state.lock().ok().and_then(|s| s.last_config.clone())
    }

    fn send(&self, event: PlatformEvent) {
        if let Ok(state) = self.state.lock() {
            if let Some(tx) = &state.sender {
                let _ = tx.send(event);
            }
        }
    }

    /// Platform-initiated end, e.g. the recognizer timing out on silence.
    pub fn end(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.running = false;
        }
        self.send(PlatformEvent::Ended);
    }

    pub fn emit_result(&self, result: RecognitionResult) {
        self.send(PlatformEvent::Result(result));
    }

    pub fn say(&self, text: &str) {
        self.emit_result(RecognitionResult::single(text, true));
    }

    pub fn fail(&self, kind: CaptureErrorKind) {
        self.send(PlatformEvent::Error(CaptureError::new(kind, "scripted failure")));
    }
}

impl SpeechCapability for ScriptedCapability {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn configure(&self, config: &CaptureConfig) {
        if let Ok(mut state) = self.state.lock() {
            state.last_config = Some(config.clone());
        }
    }

    fn start(&self, events: UnboundedSender<PlatformEvent>) -> Result<(), CaptureError> {
        if !self.is_available() {
            return Err(CaptureError::not_supported());
        }
        let mut state = self
            .state
            .lock()
            .map_err(|_| CaptureError::new(CaptureErrorKind::Other, "script state poisoned"))?;
        if let Some(err) = state.refuse_next_start.take() {
            return Err(err);
        }
        state.running = true;
        state.starts += 1;
        let _ = events.send(PlatformEvent::Started);
        state.sender = Some(events);
        Ok(())
    }

    fn stop(&self) {
        let was_running = match self.state.lock() {
            Ok(mut state) => {
                state.stops += 1;
                std::mem::replace(&mut state.running, false)
            }
            Err(_) => false,
        };
        if was_running {
            self.send(PlatformEvent::Ended);
        }
    }
}
