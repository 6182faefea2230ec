use super::{CaptureConfig, CaptureError, PlatformEvent, SpeechCapability};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(300);

/// What the session reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started,
    Ended,
    Partial(String),
    Final(String),
    Error(CaptureError),
}

struct Inner {
    capability: Arc<dyn SpeechCapability>,
    config: Mutex<CaptureConfig>,
    restart_delay: Duration,
    should_restart: AtomicBool,
    capturing: AtomicBool,
    /// Bumped by every `start()`. Platform events are tagged with the
    /// generation they were produced under; older ones are dropped.
    generation: AtomicU64,
    platform_tx: UnboundedSender<(u64, PlatformEvent)>,
    events_tx: UnboundedSender<SessionEvent>,
}

/// Keeps a speech capability listening across platform-initiated ends.
///
/// Platform events are funnelled through one pump task so they are handled
/// strictly in order. Cloning shares the same session.
#[derive(Clone)]
pub struct SpeechCaptureSession {
    inner: Arc<Inner>,
}

impl SpeechCaptureSession {
    /// Must be called inside a tokio runtime; spawns the platform event pump.
    pub fn new(
        capability: Arc<dyn SpeechCapability>,
        config: CaptureConfig,
        restart_delay: Duration,
    ) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (platform_tx, mut platform_rx) = unbounded_channel();
        let (events_tx, events_rx) = unbounded_channel();

        let inner = Arc::new(Inner {
            capability,
            config: Mutex::new(config),
            restart_delay,
            should_restart: AtomicBool::new(false),
            capturing: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            platform_tx,
            events_tx,
        });

        // The pump only holds a weak handle so dropping the last session
        // closes the platform channel and ends the task.
        let weak = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some((generation, event)) = platform_rx.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let session = SpeechCaptureSession { inner };
                if generation != session.generation() {
                    debug!(generation, ?event, "dropping event from a stopped capture");
                    continue;
                }
                session.handle_platform_event(event);
            }
            debug!("speech event pump stopped");
        });

        (Self { inner }, events_rx)
    }

    pub fn config(&self) -> CaptureConfig {
        self.inner
            .config
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Takes effect on the next (re)start.
    pub fn set_config(&self, config: CaptureConfig) {
        if let Ok(mut current) = self.inner.config.lock() {
            *current = config;
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.inner.capturing.load(Ordering::SeqCst)
    }

    pub fn restart_armed(&self) -> bool {
        self.inner.should_restart.load(Ordering::SeqCst)
    }

    fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    pub fn start(&self) -> Result<(), CaptureError> {
        if !self.inner.capability.is_available() {
            let err = CaptureError::not_supported();
            warn!("speech capture unavailable");
            self.inner.should_restart.store(false, Ordering::SeqCst);
            self.emit(SessionEvent::Error(err.clone()));
            return Err(err);
        }
        self.inner.should_restart.store(true, Ordering::SeqCst);
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.begin(generation)
    }

    pub fn stop(&self) {
        self.inner.should_restart.store(false, Ordering::SeqCst);
        self.inner.capability.stop();
        info!("speech capture stopped");
    }

    fn begin(&self, generation: u64) -> Result<(), CaptureError> {
        let config = self.config();
        self.inner.capability.configure(&config);
        debug!(language = %config.language, continuous = config.continuous, generation, "starting capture");

        let (tx, mut rx) = unbounded_channel();
        let platform_tx = self.inner.platform_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if platform_tx.send((generation, event)).is_err() {
                    break;
                }
            }
        });

        self.inner
            .capability
            .start(tx)
            .map_err(|e| {
                warn!(error = %e, "capability refused to start");
                self.emit(SessionEvent::Error(e.clone()));
                e
            })
    }

    fn emit(&self, event: SessionEvent) {
        // The owner may have gone away; nothing to do then.
        let _ = self.inner.events_tx.send(event);
    }

    /// Applies one platform signal as belonging to the current capture. The
    /// pump calls this for every event that is not stale; it is public so a
    /// capability running outside the pump can feed it too.
    pub fn handle_platform_event(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::Started => {
                self.inner.capturing.store(true, Ordering::SeqCst);
                self.emit(SessionEvent::Started);
            }
            PlatformEvent::Ended => {
                self.inner.capturing.store(false, Ordering::SeqCst);
                self.emit(SessionEvent::Ended);
                let continuous = self.config().continuous;
                if continuous && self.inner.should_restart.load(Ordering::SeqCst) {
                    self.schedule_restart();
                }
            }
            PlatformEvent::Result(result) => {
                let Some(text) = result.best_transcript() else {
                    return;
                };
                if result.is_final {
                    self.emit(SessionEvent::Final(text.to_string()));
                } else {
                    self.emit(SessionEvent::Partial(text.to_string()));
                }
            }
            PlatformEvent::Error(err) if err.kind.is_transient() => {
                debug!(kind = %err.kind, "ignoring transient capture error");
            }
            PlatformEvent::Error(err) => {
                // The restart intent is left alone; the next Ended re-arms.
                warn!(error = %err, "speech capture error");
                self.emit(SessionEvent::Error(err));
            }
        }
    }

    fn schedule_restart(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let delay = self.inner.restart_delay;
        let generation = self.generation();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.should_restart.load(Ordering::SeqCst) {
                debug!("restart cancelled by stop");
                return;
            }
            if inner.capturing.load(Ordering::SeqCst)
                || inner.generation.load(Ordering::SeqCst) != generation
            {
                debug!("capture already running again, skipping restart");
                return;
            }
            let session = SpeechCaptureSession { inner };
            if let Err(e) = session.begin(generation) {
                warn!(error = %e, "speech capture restart failed");
            }
        });
    }
}
