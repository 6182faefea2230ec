use crate::clock::Clock;
use crate::events::{EventBus, Subscription};
use crate::router::{DialogueHandler, RouterError, WakeDetector};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use deunicode::deunicode;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// How long a bare wake phrase keeps the next utterance armed.
pub const WAKE_WINDOW_SECS: i64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenMode {
    /// Speech reaches the dialogue handler only after the wake phrase.
    Wake,
    /// Every final transcript reaches the dialogue handler.
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeEvent {
    Detected,
    Expired,
}

fn token(word: &str) -> String {
    deunicode(word)
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

fn phrase_tokens(phrase: &str) -> Vec<String> {
    phrase
        .split_whitespace()
        .map(token)
        .filter(|t| !t.is_empty())
        .collect()
}

pub struct WakeWordDetector {
    phrase: Mutex<Vec<String>>,
    mode: Mutex<ListenMode>,
    armed_at: Mutex<Option<DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
    bus: EventBus<WakeEvent>,
}

impl WakeWordDetector {
    pub fn new(phrase: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            phrase: Mutex::new(phrase_tokens(phrase)),
            mode: Mutex::new(ListenMode::Wake),
            armed_at: Mutex::new(None),
            clock,
            bus: EventBus::new(),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&WakeEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(listener)
    }

    pub fn set_phrase(&self, phrase: &str) {
        if let Ok(mut current) = self.phrase.lock() {
            *current = phrase_tokens(phrase);
        }
    }

    pub fn mode(&self) -> ListenMode {
        self.mode.lock().map(|m| *m).unwrap_or(ListenMode::Wake)
    }

    pub fn set_mode(&self, mode: ListenMode) {
        if let Ok(mut current) = self.mode.lock() {
            *current = mode;
        }
        self.disarm();
    }

    pub fn is_armed(&self) -> bool {
        let now = self.clock.now();
        self.armed_at
            .lock()
            .ok()
            .and_then(|a| *a)
            .map(|at| now - at < Duration::seconds(WAKE_WINDOW_SECS))
            .unwrap_or(false)
    }

    fn arm(&self) {
        let was_armed = self.is_armed();
        if let Ok(mut armed) = self.armed_at.lock() {
            *armed = Some(self.clock.now());
        }
        if !was_armed {
            info!("wake phrase detected");
            self.bus.emit(&WakeEvent::Detected);
        }
    }

    fn disarm(&self) {
        if let Ok(mut armed) = self.armed_at.lock() {
            *armed = None;
        }
    }

    /// Finds the wake phrase and returns the words spoken after it.
    pub fn split_after_phrase(&self, text: &str) -> Option<String> {
        let phrase = self.phrase.lock().ok()?.clone();
        if phrase.is_empty() {
            return None;
        }
        let words: Vec<&str> = text.split_whitespace().collect();
        let tokens: Vec<(usize, String)> = words
            .iter()
            .enumerate()
            .map(|(i, w)| (i, token(w)))
            .filter(|(_, t)| !t.is_empty())
            .collect();

        let end = tokens.windows(phrase.len()).find_map(|window| {
            let matches = window.iter().zip(&phrase).all(|((_, t), p)| t == p);
            matches.then(|| window[window.len() - 1].0)
        })?;

        let rest = words[end + 1..].join(" ");
        Some(
            rest.trim_start_matches(|c: char| !c.is_alphanumeric())
                .to_string(),
        )
    }

    /// Decides whether a final transcript is a command for the dialogue
    /// handler, stripping the wake phrase when present.
    pub fn take_command(&self, text: &str) -> Option<String> {
        if self.mode() == ListenMode::Direct {
            return Some(text.to_string());
        }
        if let Some(rest) = self.split_after_phrase(text) {
            if rest.is_empty() {
                self.arm();
                return None;
            }
            self.disarm();
            return Some(rest);
        }
        if self.is_armed() {
            self.disarm();
            return Some(text.to_string());
        }
        if self.armed_at.lock().map(|a| a.is_some()).unwrap_or(false) {
            self.disarm();
            self.bus.emit(&WakeEvent::Expired);
        }
        None
    }
}

#[async_trait]
impl WakeDetector for WakeWordDetector {
    async fn detect(&self, text: &str, _is_final: bool) -> Result<(), RouterError> {
        if self.mode() == ListenMode::Wake && self.split_after_phrase(text).is_some() {
            self.arm();
        }
        Ok(())
    }
}

/// Dialogue stage that only lets commands through the wake gate.
pub struct WakeGatedDialogue {
    wake: Arc<WakeWordDetector>,
    inner: Arc<dyn DialogueHandler>,
}

impl WakeGatedDialogue {
    pub fn new(wake: Arc<WakeWordDetector>, inner: Arc<dyn DialogueHandler>) -> Self {
        Self { wake, inner }
    }
}

#[async_trait]
impl DialogueHandler for WakeGatedDialogue {
    async fn handle(&self, text: &str) -> Result<Option<String>, RouterError> {
        match self.wake.take_command(text) {
            Some(command) => self.inner.handle(&command).await,
            None => {
                debug!(%text, "ignoring speech outside wake window");
                Ok(None)
            }
        }
    }
}
