use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("wake detection failed: {0}")]
    Wake(String),
    #[error("dialogue handling failed: {0}")]
    Dialogue(String),
}

/// First stage: sees every transcript, partial or final.
#[async_trait]
pub trait WakeDetector: Send + Sync {
    async fn detect(&self, text: &str, is_final: bool) -> Result<(), RouterError>;
}

/// Second stage: answers final transcripts.
#[async_trait]
pub trait DialogueHandler: Send + Sync {
    async fn handle(&self, text: &str) -> Result<Option<String>, RouterError>;
}

/// Trims, drops control characters and collapses runs of whitespace.
pub fn normalize_transcript(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct TranscriptRouter {
    wake: Arc<dyn WakeDetector>,
    dialogue: Arc<dyn DialogueHandler>,
}

impl TranscriptRouter {
    pub fn new(wake: Arc<dyn WakeDetector>, dialogue: Arc<dyn DialogueHandler>) -> Self {
        Self { wake, dialogue }
    }

    pub async fn handle_partial(&self, raw: &str) {
        let text = normalize_transcript(raw);
        if text.is_empty() {
            return;
        }
        if let Err(e) = self.wake.detect(&text, false).await {
            warn!(error = %e, "partial transcript dropped");
        }
    }

    /// Wake detection completes before the dialogue stage sees the text.
    pub async fn handle_final(&self, raw: &str) -> Option<String> {
        let text = normalize_transcript(raw);
        if text.is_empty() {
            return None;
        }
        debug!(%text, "final transcript");

        if let Err(e) = self.wake.detect(&text, true).await {
            warn!(error = %e, "wake detection failed");
        }
        match self.dialogue.handle(&text).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "dialogue handling failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn push(&self, entry: String) {
            self.log.lock().unwrap().push(entry);
        }
        fn entries(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    struct Wake(Arc<Recorder>, bool);

    #[async_trait]
    impl WakeDetector for Wake {
        async fn detect(&self, text: &str, is_final: bool) -> Result<(), RouterError> {
            tokio::task::yield_now().await;
            self.0.push(format!("wake:{}:{}", is_final, text));
            if self.1 {
                return Err(RouterError::Wake("boom".into()));
            }
            Ok(())
        }
    }

    struct Dialogue(Arc<Recorder>, bool);

    #[async_trait]
    impl DialogueHandler for Dialogue {
        async fn handle(&self, text: &str) -> Result<Option<String>, RouterError> {
            self.0.push(format!("dialogue:{}", text));
            if self.1 {
                return Err(RouterError::Dialogue("boom".into()));
            }
            Ok(Some(format!("re: {}", text)))
        }
    }

    fn build(wake_fails: bool, dialogue_fails: bool) -> (TranscriptRouter, Arc<Recorder>) {
        let rec = Arc::new(Recorder::default());
        let router = TranscriptRouter::new(
            Arc::new(Wake(rec.clone(), wake_fails)),
            Arc::new(Dialogue(rec.clone(), dialogue_fails)),
        );
        (router, rec)
    }

    #[test]
    fn test_normalize_transcript() {
        assert_eq!(normalize_transcript("  show\t me \n whales\u{7}  "), "show me whales");
        assert_eq!(normalize_transcript(" \n\t "), "");
    }

    #[tokio::test]
    async fn test_final_runs_wake_then_dialogue() {
        let (router, rec) = build(false, false);
        let reply = router.handle_final("  what is   the risk ").await;
        assert_eq!(reply.as_deref(), Some("re: what is the risk"));
        assert_eq!(
            rec.entries(),
            vec!["wake:true:what is the risk", "dialogue:what is the risk"]
        );
    }

    #[tokio::test]
    async fn test_partial_only_reaches_wake() {
        let (router, rec) = build(false, false);
        router.handle_partial("hey pul").await;
        assert_eq!(rec.entries(), vec!["wake:false:hey pul"]);
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let (router, rec) = build(false, false);
        assert_eq!(router.handle_final("   ").await, None);
        router.handle_partial("\n").await;
        assert!(rec.entries().is_empty());
    }

    #[tokio::test]
    async fn test_stage_failures_do_not_propagate() {
        let (router, rec) = build(true, false);
        assert!(router.handle_final("hello").await.is_some());
        assert_eq!(rec.entries().len(), 2);

        let (router, _) = build(false, true);
        assert_eq!(router.handle_final("hello").await, None);
    }
}
