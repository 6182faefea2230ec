//! Tone-aware shaping of the assistant's replies.

pub mod tone;
pub mod vague;
pub mod vocabulary;

pub use tone::{detect_user_tone, determine_response_depth, ResponseDepth, Tone};
pub use vague::{
    builtin_examples, interpret_vague_question, Confidence, Intent, TrainingExample,
    VagueInterpretation,
};
pub use vocabulary::simplify_vocabulary;

use crate::context::{ContextState, DashboardModule};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const DEFAULT_HUMOR_PROBABILITY: f64 = 0.15;

/// Uniform draws in `[0, 1)`.
pub trait RandomSource: Send + Sync {
    fn next_f64(&self) -> f64;
}

pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// Always returns the same draw.
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn next_f64(&self) -> f64 {
        self.0
    }
}

const HUMOR_LINES: &[&str] = &[
    "Even the whales need a nap sometimes.",
    "No crystal ball here, just a lot of data.",
    "The charts never sleep, so you don't have to stare at them all night.",
    "Markets: the only place where sideways is a direction.",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseConfig {
    pub tone: Tone,
    pub depth: ResponseDepth,
    pub use_humor: bool,
    pub include_follow_up: bool,
}

pub struct DialoguePersonalityEngine {
    random: Arc<dyn RandomSource>,
    humor_probability: f64,
    examples: Vec<TrainingExample>,
    humor_cursor: AtomicUsize,
}

impl DialoguePersonalityEngine {
    pub fn new(random: Arc<dyn RandomSource>, humor_probability: f64) -> Self {
        Self::with_examples(random, humor_probability, builtin_examples())
    }

    pub fn with_examples(
        random: Arc<dyn RandomSource>,
        humor_probability: f64,
        examples: Vec<TrainingExample>,
    ) -> Self {
        Self {
            random,
            humor_probability: humor_probability.clamp(0.0, 1.0),
            examples,
            humor_cursor: AtomicUsize::new(0),
        }
    }

    pub fn detect_user_tone(&self, text: &str) -> Tone {
        detect_user_tone(text)
    }

    pub fn determine_response_depth(&self, text: &str, tone: Tone) -> ResponseDepth {
        determine_response_depth(text, tone)
    }

    pub fn should_use_humor(&self, tone: Tone) -> bool {
        if tone == Tone::Frustrated {
            return false;
        }
        self.random.next_f64() < self.humor_probability
    }

    pub fn interpret_vague_question(&self, text: &str, context: &ContextState) -> VagueInterpretation {
        interpret_vague_question(text, context, &self.examples)
    }

    pub fn simplify_vocabulary(&self, text: &str) -> String {
        simplify_vocabulary(text)
    }

    /// Classifies `text` once and derives every shaping decision from it.
    pub fn response_config(&self, text: &str) -> ResponseConfig {
        let tone = self.detect_user_tone(text);
        ResponseConfig {
            tone,
            depth: self.determine_response_depth(text, tone),
            use_humor: self.should_use_humor(tone),
            include_follow_up: tone != Tone::Frustrated,
        }
    }

    pub fn shape_response(&self, base: &str, config: &ResponseConfig, context: &ContextState) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(ack) = acknowledgement(config.tone) {
            parts.push(ack.to_string());
        }

        let body = if config.depth == ResponseDepth::Beginner {
            simplify_vocabulary(base)
        } else {
            base.to_string()
        };
        parts.push(body.trim().to_string());

        if config.use_humor {
            let i = self.humor_cursor.fetch_add(1, Ordering::Relaxed) % HUMOR_LINES.len();
            parts.push(HUMOR_LINES[i].to_string());
        }

        if config.include_follow_up {
            parts.push(follow_up(context.active_module).to_string());
        }

        parts.retain(|p| !p.is_empty());
        parts.join(" ")
    }
}

fn acknowledgement(tone: Tone) -> Option<&'static str> {
    match tone {
        Tone::Frustrated => Some("Sorry about that, let's get this sorted."),
        Tone::Confused => Some("No problem, let me break it down."),
        Tone::Casual => Some("Sure thing!"),
        Tone::Formal => Some("Certainly."),
        Tone::Expert | Tone::Neutral => None,
    }
}

fn follow_up(module: DashboardModule) -> &'static str {
    match module {
        DashboardModule::Risk => "Want me to walk through what's driving the risk score?",
        DashboardModule::Alerts => "Should I read out the most recent alerts?",
        DashboardModule::WhaleTracking => "Want the largest transactions next?",
        DashboardModule::Spoofing | DashboardModule::PatternDetection => {
            "I can explain any of the flagged indicators if you like."
        }
        DashboardModule::Momentum | DashboardModule::MarketSignals => {
            "Want to see which assets are moving the most?"
        }
        DashboardModule::Predictions => "Want the confidence behind that forecast?",
        _ => "Anything else you'd like me to check?",
    }
}
