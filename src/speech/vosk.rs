use super::{
    Alternative, CaptureConfig, CaptureError, CaptureErrorKind, PlatformEvent, RecognitionResult,
    SpeechCapability,
};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use vosk::{CompleteResult, DecodingState, Model, Recognizer};

/// Microphone capture through cpal, decoded by an offline Vosk model.
pub struct VoskCapability {
    model_path: PathBuf,
    model: Mutex<Option<Arc<Model>>>,
    config: Mutex<CaptureConfig>,
    running: Arc<AtomicBool>,
}

impl VoskCapability {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            model: Mutex::new(None),
            config: Mutex::new(CaptureConfig::default()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn load_model(&self) -> Result<Arc<Model>, CaptureError> {
        let mut slot = self
            .model
            .lock()
            .map_err(|_| CaptureError::new(CaptureErrorKind::Other, "model lock poisoned"))?;
        if let Some(model) = slot.as_ref() {
            return Ok(model.clone());
        }
        let path = self.model_path.to_string_lossy().to_string();
        info!(model = %path, "loading vosk model");
        let model = Model::new(path.as_str()).map(Arc::new).ok_or_else(|| {
            CaptureError::new(
                CaptureErrorKind::NotSupported,
                format!("could not load vosk model from {}", path),
            )
        })?;
        *slot = Some(model.clone());
        Ok(model)
    }
}

impl SpeechCapability for VoskCapability {
    fn is_available(&self) -> bool {
        self.model_path.exists() && cpal::default_host().default_input_device().is_some()
    }

    fn configure(&self, config: &CaptureConfig) {
        if let Ok(mut current) = self.config.lock() {
            *current = config.clone();
        }
    }

    fn start(&self, events: UnboundedSender<PlatformEvent>) -> Result<(), CaptureError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let model = match self.load_model() {
            Ok(m) => m,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        let config = self
            .config
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default();
        let running = self.running.clone();

        thread::spawn(move || {
            if let Err(e) = capture_loop(&model, &config, &running, &events) {
                warn!(error = %e, "vosk capture failed");
                let _ = events.send(PlatformEvent::Error(e));
            }
            running.store(false, Ordering::SeqCst);
            let _ = events.send(PlatformEvent::Ended);
        });
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn audio_error(e: impl std::fmt::Display) -> CaptureError {
    CaptureError::new(CaptureErrorKind::AudioCapture, e.to_string())
}

// Runs on its own thread: the cpal stream must stay on the thread that built it.
fn capture_loop(
    model: &Model,
    config: &CaptureConfig,
    running: &AtomicBool,
    events: &UnboundedSender<PlatformEvent>,
) -> Result<(), CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::new(CaptureErrorKind::AudioCapture, "no input device found"))?;
    let input = device.default_input_config().map_err(audio_error)?;
    let channels = input.channels().max(1) as usize;
    let sample_rate = input.sample_rate() as f32;
    debug!(channels, sample_rate, "opened input device");

    let (tx, rx) = mpsc::channel::<Vec<i16>>();
    let stream = match input.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &input.clone().into(),
            move |data: &[f32], _: &_| {
                // Keep the first channel only.
                let mono: Vec<i16> = data
                    .chunks(channels)
                    .map(|frame| (frame[0].clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                    .collect();
                let _ = tx.send(mono);
            },
            |err| warn!(error = %err, "input stream error"),
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &input.clone().into(),
            move |data: &[i16], _: &_| {
                let mono: Vec<i16> = data.chunks(channels).map(|frame| frame[0]).collect();
                let _ = tx.send(mono);
            },
            |err| warn!(error = %err, "input stream error"),
            None,
        ),
        other => {
            return Err(audio_error(format!("unsupported sample format {:?}", other)));
        }
    }
    .map_err(audio_error)?;
    stream.play().map_err(audio_error)?;

    let mut recognizer = Recognizer::new(model, sample_rate).ok_or_else(|| {
        CaptureError::new(CaptureErrorKind::Other, "could not create recognizer")
    })?;
    recognizer.set_max_alternatives(config.max_alternatives.max(1) as u16);
    let _ = events.send(PlatformEvent::Started);

    let mut last_partial = String::new();
    while running.load(Ordering::SeqCst) {
        let samples = match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(s) => s,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };
        match recognizer.accept_waveform(&samples) {
            Ok(DecodingState::Finalized) => {
                last_partial.clear();
                if let Some(result) = complete_result(recognizer.result()) {
                    let _ = events.send(PlatformEvent::Result(result));
                    if !config.continuous {
                        break;
                    }
                }
            }
            Ok(DecodingState::Running) => {
                if !config.interim_results {
                    continue;
                }
                let partial = recognizer.partial_result().partial.to_string();
                if !partial.is_empty() && partial != last_partial {
                    let _ = events.send(PlatformEvent::Result(RecognitionResult::single(&partial, false)));
                    last_partial = partial;
                }
            }
            Ok(DecodingState::Failed) | Err(_) => {
                return Err(CaptureError::new(CaptureErrorKind::Other, "decoder rejected audio"));
            }
        }
    }

    drop(stream);
    Ok(())
}

fn complete_result(result: CompleteResult<'_>) -> Option<RecognitionResult> {
    let alternatives: Vec<Alternative> = match result {
        CompleteResult::Single(single) => vec![Alternative {
            transcript: single.text.to_string(),
            confidence: 1.0,
        }],
        CompleteResult::Multiple(multiple) => multiple
            .alternatives
            .iter()
            .map(|alt| Alternative {
                transcript: alt.text.to_string(),
                confidence: alt.confidence,
            })
            .collect(),
    };
    let alternatives: Vec<Alternative> = alternatives
        .into_iter()
        .filter(|a| !a.transcript.trim().is_empty())
        .collect();
    if alternatives.is_empty() {
        return None;
    }
    Some(RecognitionResult {
        alternatives,
        is_final: true,
    })
}
