use crate::context::{
    alert_phrase, engine_phrase, module_for_route, risk_phrase, route_for_module, ContextState,
    DashboardModule, RiskLevel,
};
use crate::intel::sources::{IntelSource, MomentumDirection};
use crate::intel::{AggregatedIntelligence, IntelligenceAggregator, MANIPULATION_THRESHOLD};
use crate::personality::vague::{Confidence, Intent, VagueInterpretation};
use crate::personality::DialoguePersonalityEngine;
use crate::router::{DialogueHandler, RouterError};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{channel, Sender};
use tokio::task;
use tracing::{debug, info, warn};

// Maximum number of lines to keep in short-term memory
const MEMORY_SIZE: usize = 50;
const LLM_TIMEOUT: Duration = Duration::from_secs(20);

lazy_static! {
    static ref NAVIGATE: Regex = Regex::new(
        r"(?i)^\s*(?:please\s+)?(?:go to|open|navigate to|take me(?: to)?|switch to)\s+(?:the\s+)?(.+?)(?:\s+(?:page|view|module|tab))?\s*[.!]?\s*$"
    )
    .unwrap_or_else(|e| panic!("invalid navigation pattern: {}", e));
}

#[derive(Debug, Error)]
pub enum CortexError {
    #[error("dialogue task is not running")]
    Offline,
    #[error("LLM request failed: {0}")]
    Llm(#[from] reqwest::Error),
    #[error("LLM returned an empty answer")]
    EmptyAnswer,
}

/// Ollama-compatible endpoint used for questions the templates can't place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub url: String,
    pub model: String,
}

impl LlmConfig {
    /// `None` when the LLM is disabled in settings.
    pub fn from_settings() -> Option<Self> {
        let settings = crate::config_loader::SETTINGS.read().ok()?;
        settings.enable_llm.then(|| Self {
            url: settings.llm_url.trim_end_matches('/').to_string(),
            model: settings.llm_model.clone(),
        })
    }
}

#[derive(Clone)]
pub struct Cortex {
    tx: Sender<CortexMessage>,
}

enum CortexMessage {
    Observe(String),                 // Passive: remember something that happened
    Query(String, Sender<String>),   // Active: answer the user
}

struct Memory {
    history: VecDeque<String>,
}

impl Memory {
    fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(MEMORY_SIZE),
        }
    }

    fn add(&mut self, text: String) {
        if self.history.len() >= MEMORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(text);
    }

    fn get_context(&self) -> String {
        self.history.iter().cloned().collect::<Vec<String>>().join("\n")
    }
}

/// State owned by the dialogue task.
struct Brain {
    aggregator: Arc<IntelligenceAggregator>,
    personality: Arc<DialoguePersonalityEngine>,
    llm: Option<LlmConfig>,
    client: Client,
    memory: Memory,
    last_answer: Option<String>,
}

impl Cortex {
    /// Spawns the dialogue task; must be called inside a tokio runtime.
    pub fn new(
        aggregator: Arc<IntelligenceAggregator>,
        personality: Arc<DialoguePersonalityEngine>,
        llm: Option<LlmConfig>,
    ) -> Self {
        let (tx, mut rx) = channel::<CortexMessage>(100);
        let client = Client::builder()
            .timeout(LLM_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        let mut brain = Brain {
            aggregator,
            personality,
            llm,
            client,
            memory: Memory::new(),
            last_answer: None,
        };

        task::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    CortexMessage::Observe(text) => {
                        debug!(%text, "cortex observing");
                        brain.memory.add(format!("Dashboard: {}", text));
                    }
                    CortexMessage::Query(question, response_tx) => {
                        let answer = brain.answer(&question).await;
                        let _ = response_tx.send(answer).await;
                    }
                }
            }
            debug!("cortex stopped");
        });

        Self { tx }
    }

    /// Records a dashboard event for later questions. Dropped when the
    /// dialogue task is backed up.
    pub fn observe(&self, text: String) {
        if self.tx.try_send(CortexMessage::Observe(text)).is_err() {
            debug!("cortex busy, observation dropped");
        }
    }

    pub async fn query(&self, question: String) -> Result<String, CortexError> {
        let (resp_tx, mut resp_rx) = channel::<String>(1);
        self.tx
            .send(CortexMessage::Query(question, resp_tx))
            .await
            .map_err(|_| CortexError::Offline)?;
        resp_rx.recv().await.ok_or(CortexError::Offline)
    }
}

#[async_trait]
impl DialogueHandler for Cortex {
    async fn handle(&self, text: &str) -> Result<Option<String>, RouterError> {
        self.query(text.to_string())
            .await
            .map(Some)
            .map_err(|e| RouterError::Dialogue(e.to_string()))
    }
}

/// Module named by a navigation command such as "open the whale tracker".
pub fn navigation_target(text: &str) -> Option<DashboardModule> {
    let target = NAVIGATE.captures(text)?.get(1)?.as_str().trim().to_lowercase();
    if matches!(target.as_str(), "home" | "dashboard" | "overview" | "start") {
        return Some(DashboardModule::Overview);
    }
    match module_for_route(&format!("/{}", target.replace(' ', "-"))) {
        DashboardModule::Unknown => None,
        module => Some(module),
    }
}

/// Module whose sources answer `intent`; `None` means no fetch is needed.
fn module_for_intent(intent: Intent) -> Option<DashboardModule> {
    match intent {
        Intent::AssessRisk => Some(DashboardModule::Risk),
        Intent::CheckAlerts => Some(DashboardModule::Alerts),
        Intent::WhaleActivity => Some(DashboardModule::WhaleTracking),
        Intent::PatternSummary => Some(DashboardModule::PatternDetection),
        Intent::ManipulationCheck => Some(DashboardModule::Spoofing),
        Intent::MomentumSummary => Some(DashboardModule::Momentum),
        Intent::PredictionSummary => Some(DashboardModule::Predictions),
        Intent::NetworkOverview => Some(DashboardModule::Constellation),
        Intent::EnvironmentalImpact => Some(DashboardModule::Environmental),
        Intent::MarketSignals => Some(DashboardModule::MarketSignals),
        // Overview fetches every source and refreshes the live snapshot.
        Intent::MarketOverview
        | Intent::ExplainCurrentView
        | Intent::SummarizeActivity
        | Intent::ExplainCause
        | Intent::RecommendAction => Some(DashboardModule::Overview),
        Intent::ExpandPrevious
        | Intent::DescribeEntity
        | Intent::ComplianceStatus
        | Intent::ReportHelp
        | Intent::SettingsHelp
        | Intent::GeneralHelp => None,
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn direction_word(direction: MomentumDirection) -> &'static str {
    match direction {
        MomentumDirection::Up => "up",
        MomentumDirection::Down => "down",
        MomentumDirection::Flat => "flat",
    }
}

fn unreachable_note(intel: &AggregatedIntelligence, source: IntelSource) -> Option<String> {
    (!intel.succeeded(source)).then(|| {
        format!(
            "I couldn't reach the {} feed just now, so treat this as a neutral reading.",
            source
        )
    })
}

impl Brain {
    async fn answer(&mut self, question: &str) -> String {
        info!(%question, "cortex answering");

        if let Some(module) = navigation_target(question) {
            let reply = self.navigate(module);
            self.remember(question, &reply);
            return reply;
        }

        let personality = self.personality.clone();
        let config = personality.response_config(question);
        let state = self.aggregator.monitor().snapshot();
        let reading = personality.interpret_vague_question(question, &state);
        debug!(intent = ?reading.intent, confidence = ?reading.confidence, "interpreted question");

        let base = match (&self.llm, reading.confidence) {
            (Some(llm), Confidence::Low) => match self.ask_llm(llm.clone(), question, &state).await {
                Ok(answer) => answer,
                Err(e) => {
                    warn!(error = %e, "LLM unavailable, answering from templates");
                    self.template_answer(&reading, &state).await
                }
            },
            _ => self.template_answer(&reading, &state).await,
        };

        let reply = personality.shape_response(&base, &config, &self.aggregator.monitor().snapshot());
        self.last_answer = Some(base);
        self.remember(question, &reply);
        reply
    }

    fn remember(&mut self, question: &str, reply: &str) {
        self.memory.add(format!("User: {}", question));
        self.memory.add(format!("Assistant: {}", reply));
    }

    fn navigate(&self, module: DashboardModule) -> String {
        match route_for_module(module) {
            Some(route) => {
                self.aggregator.monitor().update_active_page(route);
                format!("Opening {}.", module.display_name())
            }
            None => "I'm not sure which page you mean.".to_string(),
        }
    }

    async fn ask_llm(
        &self,
        llm: LlmConfig,
        question: &str,
        state: &ContextState,
    ) -> Result<String, CortexError> {
        let full_prompt = format!(
            "You are Pulse, the assistant inside a market-intelligence dashboard. \
             Answer in two or three plain sentences.\n\n\
             Current view: {}\n\nRecent conversation:\n{}\n\nUser question: {}",
            self.aggregator.monitor().get_context_summary(),
            self.memory.get_context(),
            question
        );
        debug!(model = %llm.model, page = %state.active_page, "asking LLM");

        let json: serde_json::Value = self
            .client
            .post(format!("{}/api/generate", llm.url))
            .json(&json!({
                "model": llm.model,
                "prompt": full_prompt,
                "stream": false
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match json["response"].as_str().map(str::trim) {
            Some(answer) if !answer.is_empty() => Ok(answer.to_string()),
            _ => Err(CortexError::EmptyAnswer),
        }
    }

    async fn template_answer(&self, reading: &VagueInterpretation, state: &ContextState) -> String {
        let intel = match module_for_intent(reading.intent) {
            Some(module) => Some(self.aggregator.fetch_module_intelligence(module).await),
            None => None,
        };
        let refreshed = self.aggregator.monitor().live_data();
        let live = &refreshed;

        match (reading.intent, intel) {
            (Intent::ExplainCurrentView, _) => self.aggregator.monitor().get_context_summary(),
            (Intent::ExpandPrevious, _) => match &self.last_answer {
                Some(previous) => format!(
                    "Here's more detail. {} On {}, that ties into {}.",
                    previous,
                    state.active_module.display_name(),
                    state.active_module.description()
                ),
                None => "There's nothing earlier to expand on yet. Ask me about anything on this page."
                    .to_string(),
            },
            (Intent::DescribeEntity, _) => match &state.selected_entity {
                Some(entity) => {
                    let profile = self.aggregator.fetch_entity_profile(&entity.id).await;
                    let mut text = format!(
                        "{} is a {} with a risk score of {:.0}/100, connected to {} other entit{}.",
                        profile.display_name,
                        profile.kind,
                        profile.risk_score,
                        profile.connected_entities,
                        if profile.connected_entities == 1 { "y" } else { "ies" }
                    );
                    if !profile.tags.is_empty() {
                        text.push_str(&format!(" It's tagged {}.", profile.tags.join(", ")));
                    }
                    text
                }
                None => "Select an entity on the dashboard and I'll describe it.".to_string(),
            },
            (Intent::AssessRisk, Some(intel)) => {
                let risk = &intel.risk;
                let mut text = match risk.level {
                    RiskLevel::Unknown => "I don't have a current risk reading yet.".to_string(),
                    level => format!("Global risk is {} at {:.0}/100.", level.as_str(), risk.score),
                };
                if let Some(hottest) = risk
                    .heatmap
                    .iter()
                    .max_by(|a, b| a.intensity.total_cmp(&b.intensity))
                {
                    text.push_str(&format!(" The hottest region is {}.", hottest.region));
                }
                if let Some(note) = unreachable_note(&intel, IntelSource::Risk) {
                    text.push(' ');
                    text.push_str(&note);
                }
                text
            }
            (Intent::CheckAlerts, Some(intel)) => {
                let alerts = &intel.alerts.summary;
                match alert_phrase(alerts) {
                    None => "There are no active alerts right now.".to_string(),
                    Some(phrase) => {
                        let mut text = format!("There {} {}.", if alerts.total() == 1 { "is" } else { "are" }, phrase);
                        let titles: Vec<&str> =
                            alerts.recent.iter().take(3).map(|a| a.title.as_str()).collect();
                        if !titles.is_empty() {
                            text.push_str(&format!(" Most recent: {}.", titles.join("; ")));
                        }
                        text
                    }
                }
            }
            (Intent::WhaleActivity, Some(intel)) => {
                let whales = &intel.whales;
                let mut text = format!(
                    "Whale activity is {}: {} large transaction{} worth ${:.0} in total across {} wallets.",
                    whales.activity_level.as_str(),
                    whales.transaction_count,
                    if whales.transaction_count == 1 { "" } else { "s" },
                    whales.total_volume_usd,
                    whales.active_wallets
                );
                if whales.largest_transaction_usd > 0.0 {
                    text.push_str(&format!(" The largest was ${:.0}.", whales.largest_transaction_usd));
                }
                text
            }
            (Intent::PatternSummary, Some(intel)) => {
                let patterns = &intel.patterns;
                if patterns.patterns.is_empty() {
                    format!(
                        "No patterns are flagged right now; detection is {}.",
                        if patterns.active { "running" } else { "idle" }
                    )
                } else {
                    let names: Vec<String> = patterns
                        .patterns
                        .iter()
                        .take(3)
                        .map(|p| format!("{} ({:.0}% confidence)", p.name, p.confidence * 100.0))
                        .collect();
                    format!(
                        "{} pattern{} flagged, including {}.",
                        patterns.pattern_count,
                        if patterns.pattern_count == 1 { " is" } else { "s are" },
                        names.join(", ")
                    )
                }
            }
            (Intent::ManipulationCheck, Some(intel)) => {
                let spoofing = &intel.spoofing;
                let verdict = if spoofing.manipulation_score >= MANIPULATION_THRESHOLD {
                    "that's high enough to treat as likely manipulation"
                } else {
                    "that's below the manipulation threshold"
                };
                format!(
                    "The manipulation score is {:.0}/100 with {} indicator{}; {}.",
                    spoofing.manipulation_score,
                    spoofing.indicator_count,
                    if spoofing.indicator_count == 1 { "" } else { "s" },
                    verdict
                )
            }
            (Intent::MomentumSummary, Some(intel)) => {
                let momentum = &intel.momentum;
                let mut text = format!(
                    "Momentum is {} with strength {:.0}/100.",
                    direction_word(momentum.direction),
                    momentum.strength
                );
                let movers: Vec<String> = momentum
                    .top_movers
                    .iter()
                    .take(3)
                    .map(|m| format!("{} {:+.1}%", m.symbol, m.change_pct))
                    .collect();
                if !movers.is_empty() {
                    text.push_str(&format!(" Top movers: {}.", movers.join(", ")));
                }
                text
            }
            (Intent::PredictionSummary, Some(intel)) => {
                let p = &intel.predictions;
                format!(
                    "The {} outlook is {} at {:.0}% confidence.",
                    p.horizon,
                    p.outlook,
                    p.confidence * 100.0
                )
            }
            (Intent::NetworkOverview, Some(intel)) => {
                let c = &intel.constellation;
                format!(
                    "The entity graph has {} nodes and {} links grouped into {} clusters.",
                    c.node_count, c.edge_count, c.cluster_count
                )
            }
            (Intent::EnvironmentalImpact, Some(intel)) => {
                let env = &intel.environmental;
                let mut text = format!(
                    "The environmental score is {:.0}/100 and trending {}.",
                    env.score, env.trend
                );
                if !env.factors.is_empty() {
                    text.push_str(&format!(" Main factors: {}.", env.factors.join(", ")));
                }
                text
            }
            (Intent::MarketSignals, Some(intel)) => {
                let s = &intel.market_signals;
                format!(
                    "{} market signal{} active; overall sentiment is {} ({:+.2}).",
                    s.signal_count,
                    if s.signal_count == 1 { " is" } else { "s are" },
                    s.sentiment,
                    s.sentiment_score
                )
            }
            (Intent::MarketOverview, Some(intel)) => format!(
                "The market looks {}. Momentum is {} and sentiment is {}.",
                crate::intel::market_condition_for(&intel.momentum).as_str(),
                direction_word(intel.momentum.direction),
                intel.market_signals.sentiment
            ),
            (Intent::SummarizeActivity, _) => {
                let facts: Vec<String> = [
                    risk_phrase(live),
                    alert_phrase(&live.alerts),
                    engine_phrase(&live.engine_status),
                ]
                .into_iter()
                .flatten()
                .collect();
                if facts.is_empty() {
                    "Things are quiet: no alerts and nothing unusual from the detection engines."
                        .to_string()
                } else {
                    format!("{}.", capitalize(&facts.join("; ")))
                }
            }
            (Intent::ExplainCause, _) => {
                let mut causes = Vec::new();
                if let Some(region) = live
                    .heatmap_regions
                    .iter()
                    .max_by(|a, b| a.intensity.total_cmp(&b.intensity))
                {
                    causes.push(format!("elevated activity in {}", region.region));
                }
                if let Some(engines) = engine_phrase(&live.engine_status) {
                    causes.push(engines);
                }
                if let Some(signal) = live.intelligence_signals.front() {
                    causes.push(format!("the latest {} signal from {}", signal.kind, signal.source));
                }
                if causes.is_empty() {
                    format!(
                        "I don't see a single driver on {} right now.",
                        state.active_module.display_name()
                    )
                } else {
                    format!("The main drivers are {}.", causes.join(", and "))
                }
            }
            (Intent::RecommendAction, _) => {
                if live.alerts.critical > 0 {
                    format!(
                        "Start with the {} critical alert{} in the Alert Center.",
                        live.alerts.critical,
                        if live.alerts.critical == 1 { "" } else { "s" }
                    )
                } else if live.global_risk_level >= RiskLevel::High
                    && live.global_risk_level != RiskLevel::Unknown
                {
                    "Review the Risk Monitor heatmap and the regions driving the score.".to_string()
                } else if live.engine_status.manipulation_alert {
                    "Check Spoofing Detection; the manipulation monitor is flagging activity.".to_string()
                } else {
                    "Nothing needs urgent attention. The Overview is a good place to keep an eye on things."
                        .to_string()
                }
            }
            (Intent::ComplianceStatus, _) => {
                "The Compliance page tracks review status and reporting obligations.".to_string()
            }
            (Intent::ReportHelp, _) => {
                "Reports lets you generate and export summaries of the current intelligence.".to_string()
            }
            (Intent::SettingsHelp, _) => {
                "In Settings you can change alert categories, quiet hours and voice options.".to_string()
            }
            (_, _) => format!(
                "I can explain what's on {}, check alerts and risk, or summarize whale, pattern and momentum activity. What would you like?",
                state.active_module.display_name()
            ),
        }
    }
}
