pub mod scripted;
pub mod session;
#[cfg(feature = "vosk-capture")]
pub mod vosk;

pub use session::{SessionEvent, SpeechCaptureSession, DEFAULT_RESTART_DELAY};

use crate::config_loader::Settings;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

/// Options applied to the capability before every start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub continuous: bool,
    pub interim_results: bool,
    pub language: String,
    pub max_alternatives: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            continuous: true,
            interim_results: true,
            language: "en-US".to_string(),
            max_alternatives: 1,
        }
    }
}

impl CaptureConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            language: settings.speech_language.clone(),
            max_alternatives: settings.speech_max_alternatives.max(1),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alternative {
    pub transcript: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    /// Best alternative first.
    pub alternatives: Vec<Alternative>,
    pub is_final: bool,
}

impl RecognitionResult {
    pub fn single(transcript: &str, is_final: bool) -> Self {
        Self {
            alternatives: vec![Alternative {
                transcript: transcript.to_string(),
                confidence: 1.0,
            }],
            is_final,
        }
    }

    pub fn best_transcript(&self) -> Option<&str> {
        self.alternatives.first().map(|a| a.transcript.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureErrorKind {
    NoSpeech,
    Aborted,
    NotAllowed,
    Network,
    AudioCapture,
    NotSupported,
    Other,
}

impl CaptureErrorKind {
    /// Errors that happen during normal listening and are not worth reporting.
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureErrorKind::NoSpeech | CaptureErrorKind::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureErrorKind::NoSpeech => "no-speech",
            CaptureErrorKind::Aborted => "aborted",
            CaptureErrorKind::NotAllowed => "not-allowed",
            CaptureErrorKind::Network => "network",
            CaptureErrorKind::AudioCapture => "audio-capture",
            CaptureErrorKind::NotSupported => "not-supported",
            CaptureErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for CaptureErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct CaptureError {
    pub kind: CaptureErrorKind,
    pub message: String,
}

impl CaptureError {
    pub fn new(kind: CaptureErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_supported() -> Self {
        Self::new(
            CaptureErrorKind::NotSupported,
            "speech recognition is not available on this system",
        )
    }
}

/// Lifecycle signals reported by a capability while it runs.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    Started,
    Ended,
    Result(RecognitionResult),
    Error(CaptureError),
}

/// A speech recognizer the session can drive. Implementations report their
/// lifecycle through the sender handed to `start`; every successful start
/// must eventually be followed by `PlatformEvent::Ended`.
pub trait SpeechCapability: Send + Sync {
    fn is_available(&self) -> bool;
    fn configure(&self, config: &CaptureConfig);
    fn start(&self, events: UnboundedSender<PlatformEvent>) -> Result<(), CaptureError>;
    fn stop(&self);
}

/// Stand-in used when no recognizer was compiled in.
pub struct UnavailableCapability;

impl SpeechCapability for UnavailableCapability {
    fn is_available(&self) -> bool {
        false
    }

    fn configure(&self, _config: &CaptureConfig) {}

    fn start(&self, _events: UnboundedSender<PlatformEvent>) -> Result<(), CaptureError> {
        Err(CaptureError::not_supported())
    }

    fn stop(&self) {}
}
