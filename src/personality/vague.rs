use super::tone::ResponseDepth;
use crate::context::{ContextState, DashboardModule};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ExplainCurrentView,
    AssessRisk,
    SummarizeActivity,
    ExpandPrevious,
    RecommendAction,
    MarketOverview,
    ExplainCause,
    DescribeEntity,
    CheckAlerts,
    WhaleActivity,
    PatternSummary,
    ManipulationCheck,
    MomentumSummary,
    PredictionSummary,
    NetworkOverview,
    EnvironmentalImpact,
    MarketSignals,
    ComplianceStatus,
    ReportHelp,
    SettingsHelp,
    GeneralHelp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Canned question used to disambiguate vague phrasing by word overlap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub question: String,
    pub intent: Intent,
    #[serde(alias = "expectedResponse")]
    pub expected_response: String,
    pub depth: ResponseDepth,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VagueInterpretation {
    pub intent: Intent,
    pub confidence: Confidence,
    /// Other plausible readings, most likely first.
    pub alternates: Vec<Intent>,
    /// What "this"/"it" refers to, when the question leans on context.
    pub subject: Option<String>,
    /// The library pattern or training question that matched.
    pub matched: Option<String>,
}

struct VaguePattern {
    pattern: Regex,
    intent: Intent,
    context_dependent: bool,
    confidence: Confidence,
}

fn pattern(re: &str, intent: Intent, context_dependent: bool, confidence: Confidence) -> VaguePattern {
    VaguePattern {
        pattern: Regex::new(re).unwrap_or_else(|e| panic!("invalid built-in pattern {}: {}", re, e)),
        intent,
        context_dependent,
        confidence,
    }
}

const TRAINING_DATA: &str = include_str!("../../data/training_examples.json");

/// Minimum share of the question's words an example must cover.
const OVERLAP_THRESHOLD: f64 = 0.5;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "what", "whats", "how", "i", "me", "my", "do", "does",
    "of", "in", "on", "any", "there", "this", "that", "to", "be", "we", "you", "it", "its",
    "about", "with", "here", "right", "now", "can", "should", "please", "tell", "show", "so",
];

lazy_static! {
    static ref VAGUE_PATTERNS: Vec<VaguePattern> = vec![
        pattern(r"(?i)\b(what'?s this|what is (this|that)|what am i looking at|what does (this|that) (show|mean))\b", Intent::ExplainCurrentView, true, Confidence::Medium),
        pattern(r"(?i)\b(is (this|that|it) (bad|good|normal|serious)|should i (be )?worr(y|ied))\b", Intent::AssessRisk, true, Confidence::Medium),
        pattern(r"(?i)\b(who is (this|that)|what is this (entity|wallet|address|account))\b", Intent::DescribeEntity, true, Confidence::Medium),
        pattern(r"(?i)\b(tell me more|more (info|details)|go on|elaborate|keep going)\b", Intent::ExpandPrevious, true, Confidence::Low),
        pattern(r"(?i)\b(what should i do|what now|next steps?|what do you recommend)\b", Intent::RecommendAction, true, Confidence::Medium),
        pattern(r"(?i)^\s*(why|how come)\s*\??\s*$", Intent::ExplainCause, true, Confidence::Low),
        pattern(r"(?i)\b(any (new )?alerts|anything (urgent|important|critical))\b", Intent::CheckAlerts, false, Confidence::High),
        pattern(r"(?i)\bhow('?s| is| are) (it|things|the market|markets|everything) (looking|doing|going)\b", Intent::MarketOverview, false, Confidence::High),
        pattern(r"(?i)\b(what'?s (going on|happening|new)|what is (going on|happening)|anything new|what changed)\b", Intent::SummarizeActivity, false, Confidence::Medium),
        pattern(r"(?i)\b(is it safe|am i safe|are we (ok|okay|safe))\b", Intent::AssessRisk, false, Confidence::Medium),
    ];

    static ref TRAINING_EXAMPLES: Vec<TrainingExample> =
        serde_json::from_str(TRAINING_DATA).unwrap_or_else(|e| {
            warn!(error = %e, "built-in training examples are malformed");
            Vec::new()
        });

    // Route fragment, inferred intent, alternates.
    static ref MODULE_FALLBACKS: Vec<(&'static str, Intent, Vec<Intent>)> = vec![
        ("whale", Intent::WhaleActivity, vec![Intent::MarketOverview, Intent::CheckAlerts]),
        ("spoof", Intent::ManipulationCheck, vec![Intent::PatternSummary, Intent::AssessRisk]),
        ("manipulation", Intent::ManipulationCheck, vec![Intent::PatternSummary, Intent::AssessRisk]),
        ("pattern", Intent::PatternSummary, vec![Intent::ManipulationCheck, Intent::SummarizeActivity]),
        ("risk", Intent::AssessRisk, vec![Intent::CheckAlerts, Intent::RecommendAction]),
        ("alert", Intent::CheckAlerts, vec![Intent::AssessRisk, Intent::SummarizeActivity]),
        ("momentum", Intent::MomentumSummary, vec![Intent::MarketOverview, Intent::PredictionSummary]),
        ("predict", Intent::PredictionSummary, vec![Intent::MomentumSummary, Intent::MarketOverview]),
        ("signal", Intent::MarketSignals, vec![Intent::MarketOverview, Intent::MomentumSummary]),
        ("constellation", Intent::NetworkOverview, vec![Intent::DescribeEntity, Intent::WhaleActivity]),
        ("environment", Intent::EnvironmentalImpact, vec![Intent::MarketOverview]),
        ("compliance", Intent::ComplianceStatus, vec![Intent::ReportHelp]),
        ("report", Intent::ReportHelp, vec![Intent::ComplianceStatus]),
        ("setting", Intent::SettingsHelp, vec![Intent::GeneralHelp]),
    ];
}

pub fn builtin_examples() -> Vec<TrainingExample> {
    TRAINING_EXAMPLES.clone()
}

fn keywords(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.replace('\'', ""))
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .map(|w| {
            if w.len() > 3 && w.ends_with('s') {
                w[..w.len() - 1].to_string()
            } else {
                w
            }
        })
        .collect()
}

fn context_known(context: &ContextState) -> bool {
    context.selected_entity.is_some() || context.active_module != DashboardModule::Unknown
}

fn subject(context: &ContextState) -> Option<String> {
    if let Some(entity) = &context.selected_entity {
        return Some(entity.display_name.clone());
    }
    match context.active_module {
        DashboardModule::Unknown => None,
        module => Some(module.display_name().to_string()),
    }
}

fn best_example<'a>(text: &str, examples: &'a [TrainingExample]) -> Option<&'a TrainingExample> {
    let query = keywords(text);
    if query.is_empty() {
        return None;
    }
    examples
        .iter()
        .filter_map(|ex| {
            let shared = keywords(&ex.question).intersection(&query).count();
            let score = shared as f64 / query.len() as f64;
            (shared > 0 && score >= OVERLAP_THRESHOLD).then_some((ex, shared, score))
        })
        .max_by(|a, b| {
            a.2.partial_cmp(&b.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        })
        .map(|(ex, _, _)| ex)
}

/// Works out what an under-specified question is most likely asking.
pub fn interpret_vague_question(
    text: &str,
    context: &ContextState,
    examples: &[TrainingExample],
) -> VagueInterpretation {
    if let Some(p) = VAGUE_PATTERNS.iter().find(|p| p.pattern.is_match(text)) {
        let confidence = match (p.context_dependent, context_known(context)) {
            (true, true) => Confidence::High,
            (true, false) => Confidence::Low,
            (false, _) => p.confidence,
        };
        return VagueInterpretation {
            intent: p.intent,
            confidence,
            alternates: Vec::new(),
            subject: if p.context_dependent { subject(context) } else { None },
            matched: Some(p.pattern.as_str().to_string()),
        };
    }

    if let Some(example) = best_example(text, examples) {
        return VagueInterpretation {
            intent: example.intent,
            confidence: Confidence::Medium,
            alternates: Vec::new(),
            subject: subject(context),
            matched: Some(example.question.clone()),
        };
    }

    let page = context.active_page.to_lowercase();
    let (intent, alternates) = MODULE_FALLBACKS
        .iter()
        .find(|(fragment, _, _)| page.contains(fragment))
        .map(|(_, intent, alternates)| (*intent, alternates.clone()))
        .unwrap_or((
            Intent::GeneralHelp,
            vec![Intent::MarketOverview, Intent::CheckAlerts],
        ));

    VagueInterpretation {
        intent,
        confidence: Confidence::Low,
        alternates,
        subject: subject(context),
        matched: None,
    }
}
