use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

pub const HISTORY_CAPACITY: usize = 10;
pub const SIGNAL_CAPACITY: usize = 50;
pub const RECENT_ALERTS_CAPACITY: usize = 10;

/// Alert severity. Comparisons always use this ordinal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "info" => Some(Severity::Low),
            "medium" | "moderate" | "warning" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" | "severe" => Some(Severity::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Global risk tier; `Unknown` sorts above `Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
    Unknown,
}

impl RiskLevel {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => RiskLevel::Low,
            "medium" | "moderate" | "elevated" => RiskLevel::Medium,
            "high" => RiskLevel::High,
            "critical" | "extreme" => RiskLevel::Critical,
            _ => RiskLevel::Unknown,
        }
    }

    /// Tier implied by a 0-100 score.
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 80.0 => RiskLevel::Critical,
            s if s >= 60.0 => RiskLevel::High,
            s if s >= 30.0 => RiskLevel::Medium,
            s if s >= 0.0 => RiskLevel::Low,
            _ => RiskLevel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
            RiskLevel::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketCondition {
    Bullish,
    Bearish,
    Neutral,
    Volatile,
    Unknown,
}

impl MarketCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketCondition::Bullish => "bullish",
            MarketCondition::Bearish => "bearish",
            MarketCondition::Neutral => "neutral",
            MarketCondition::Volatile => "volatile",
            MarketCondition::Unknown => "unknown",
        }
    }
}

/// Dashboard sections the assistant can be looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DashboardModule {
    Overview,
    Constellation,
    WhaleTracking,
    Environmental,
    PatternDetection,
    Spoofing,
    Momentum,
    Predictions,
    MarketSignals,
    Alerts,
    Risk,
    Compliance,
    Reports,
    Settings,
    Unknown,
}

impl DashboardModule {
    pub const ALL: [DashboardModule; 15] = [
        DashboardModule::Overview,
        DashboardModule::Constellation,
        DashboardModule::WhaleTracking,
        DashboardModule::Environmental,
        DashboardModule::PatternDetection,
        DashboardModule::Spoofing,
        DashboardModule::Momentum,
        DashboardModule::Predictions,
        DashboardModule::MarketSignals,
        DashboardModule::Alerts,
        DashboardModule::Risk,
        DashboardModule::Compliance,
        DashboardModule::Reports,
        DashboardModule::Settings,
        DashboardModule::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DashboardModule::Overview => "overview",
            DashboardModule::Constellation => "constellation",
            DashboardModule::WhaleTracking => "whale-tracking",
            DashboardModule::Environmental => "environmental",
            DashboardModule::PatternDetection => "pattern-detection",
            DashboardModule::Spoofing => "spoofing",
            DashboardModule::Momentum => "momentum",
            DashboardModule::Predictions => "predictions",
            DashboardModule::MarketSignals => "market-signals",
            DashboardModule::Alerts => "alerts",
            DashboardModule::Risk => "risk",
            DashboardModule::Compliance => "compliance",
            DashboardModule::Reports => "reports",
            DashboardModule::Settings => "settings",
            DashboardModule::Unknown => "unknown",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DashboardModule::Overview => "Overview",
            DashboardModule::Constellation => "Constellation Graph",
            DashboardModule::WhaleTracking => "Whale Tracker",
            DashboardModule::Environmental => "Environmental Intelligence",
            DashboardModule::PatternDetection => "Pattern Detection",
            DashboardModule::Spoofing => "Spoofing Detection",
            DashboardModule::Momentum => "Momentum Scanner",
            DashboardModule::Predictions => "Predictions",
            DashboardModule::MarketSignals => "Market Signals",
            DashboardModule::Alerts => "Alert Center",
            DashboardModule::Risk => "Risk Monitor",
            DashboardModule::Compliance => "Compliance",
            DashboardModule::Reports => "Reports",
            DashboardModule::Settings => "Settings",
            DashboardModule::Unknown => "an unrecognized page",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DashboardModule::Overview => "a high-level view of risk, alerts and market conditions",
            DashboardModule::Constellation => "the entity relationship graph linking wallets, exchanges and clusters",
            DashboardModule::WhaleTracking => "large-holder transactions and wallet movements",
            DashboardModule::Environmental => "macro and environmental factors that move the market",
            DashboardModule::PatternDetection => "trading patterns flagged by the detection engine",
            DashboardModule::Spoofing => "order-book manipulation and spoofing indicators",
            DashboardModule::Momentum => "assets with unusual price momentum",
            DashboardModule::Predictions => "forward-looking forecasts and their confidence",
            DashboardModule::MarketSignals => "aggregated market signals and sentiment",
            DashboardModule::Alerts => "the queue of active and recent alerts",
            DashboardModule::Risk => "global risk scoring and the regional risk heatmap",
            DashboardModule::Compliance => "compliance reporting and review status",
            DashboardModule::Reports => "generated reports and exports",
            DashboardModule::Settings => "assistant and dashboard settings",
            DashboardModule::Unknown => "a page the assistant does not recognize",
        }
    }
}

impl fmt::Display for DashboardModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedEntity {
    pub id: String,
    pub kind: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertData {
    pub id: String,
    pub category: String,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub categories: Vec<String>,
    pub recent: Vec<AlertData>,
}

impl AlertSummary {
    pub fn total(&self) -> u32 {
        self.critical + self.high + self.medium + self.low
    }

    /// Highest tier with a non-zero count.
    pub fn highest_severity(&self) -> Option<Severity> {
        if self.critical > 0 {
            Some(Severity::Critical)
        } else if self.high > 0 {
            Some(Severity::High)
        } else if self.medium > 0 {
            Some(Severity::Medium)
        } else if self.low > 0 {
            Some(Severity::Low)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapRegion {
    pub region: String,
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelligenceSignal {
    pub source: String,
    pub kind: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhaleActivityTier {
    Quiet,
    Low,
    Moderate,
    High,
    Extreme,
}

impl WhaleActivityTier {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quiet" | "none" => Some(WhaleActivityTier::Quiet),
            "low" => Some(WhaleActivityTier::Low),
            "moderate" | "medium" => Some(WhaleActivityTier::Moderate),
            "high" => Some(WhaleActivityTier::High),
            "extreme" | "critical" => Some(WhaleActivityTier::Extreme),
            _ => None,
        }
    }

    /// Tier implied by the number of large transactions in the window.
    pub fn from_transaction_count(count: u64) -> Self {
        match count {
            0 => WhaleActivityTier::Quiet,
            1..=4 => WhaleActivityTier::Low,
            5..=14 => WhaleActivityTier::Moderate,
            15..=39 => WhaleActivityTier::High,
            _ => WhaleActivityTier::Extreme,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WhaleActivityTier::Quiet => "quiet",
            WhaleActivityTier::Low => "low",
            WhaleActivityTier::Moderate => "moderate",
            WhaleActivityTier::High => "high",
            WhaleActivityTier::Extreme => "extreme",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Active,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub fusion: EngineState,
    pub whale_activity: WhaleActivityTier,
    pub pattern_detection_active: bool,
    pub manipulation_alert: bool,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            fusion: EngineState::Idle,
            whale_activity: WhaleActivityTier::Quiet,
            pattern_detection_active: false,
            manipulation_alert: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveDataSnapshot {
    pub global_risk_level: RiskLevel,
    pub global_risk_score: f64,
    pub market_condition: MarketCondition,
    pub alerts: AlertSummary,
    pub heatmap_regions: Vec<HeatmapRegion>,
    /// Newest first, at most [`SIGNAL_CAPACITY`] entries.
    pub intelligence_signals: VecDeque<IntelligenceSignal>,
    pub engine_status: EngineStatus,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for LiveDataSnapshot {
    fn default() -> Self {
        Self {
            global_risk_level: RiskLevel::Unknown,
            global_risk_score: 0.0,
            market_condition: MarketCondition::Unknown,
            alerts: AlertSummary::default(),
            heatmap_regions: Vec::new(),
            intelligence_signals: VecDeque::with_capacity(SIGNAL_CAPACITY),
            engine_status: EngineStatus::default(),
            last_updated: None,
        }
    }
}

impl LiveDataSnapshot {
    pub fn push_signal(&mut self, signal: IntelligenceSignal) {
        self.intelligence_signals.push_front(signal);
        self.intelligence_signals.truncate(SIGNAL_CAPACITY);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextState {
    pub active_page: String,
    pub active_module: DashboardModule,
    pub selected_entity: Option<SelectedEntity>,
    pub live_data: LiveDataSnapshot,
    /// Most recent first.
    pub page_history: VecDeque<String>,
    /// Most recent first.
    pub module_history: VecDeque<DashboardModule>,
}

impl Default for ContextState {
    fn default() -> Self {
        Self {
            active_page: "/".to_string(),
            active_module: DashboardModule::Overview,
            selected_entity: None,
            live_data: LiveDataSnapshot::default(),
            page_history: VecDeque::with_capacity(HISTORY_CAPACITY),
            module_history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }
}

/// Pushes `value` onto a most-recent-first history, skipping an immediate
/// duplicate and dropping the oldest entry past `HISTORY_CAPACITY`.
pub fn push_history<T: PartialEq>(history: &mut VecDeque<T>, value: T) {
    if history.front() == Some(&value) {
        return;
    }
    history.push_front(value);
    history.truncate(HISTORY_CAPACITY);
}
