//! Intelligence sources, their endpoints, and defensive normalization of the
//! loosely-typed JSON they return.
//!
//! Every field is read through the helpers below: a missing, null or
//! wrongly-typed upstream field yields the field's neutral default, never an
//! error. `Default` on each report is the value served when the source is
//! unreachable.

use crate::context::{AlertData, AlertSummary, HeatmapRegion, RiskLevel, Severity, WhaleActivityTier};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntelSource {
    Constellation,
    Whales,
    Environmental,
    Patterns,
    Spoofing,
    Momentum,
    Predictions,
    MarketSignals,
    Alerts,
    Risk,
}

impl IntelSource {
    pub const ALL: [IntelSource; 10] = [
        IntelSource::Constellation,
        IntelSource::Whales,
        IntelSource::Environmental,
        IntelSource::Patterns,
        IntelSource::Spoofing,
        IntelSource::Momentum,
        IntelSource::Predictions,
        IntelSource::MarketSignals,
        IntelSource::Alerts,
        IntelSource::Risk,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            IntelSource::Constellation => "constellation",
            IntelSource::Whales => "whales",
            IntelSource::Environmental => "environmental",
            IntelSource::Patterns => "patterns",
            IntelSource::Spoofing => "spoofing",
            IntelSource::Momentum => "momentum",
            IntelSource::Predictions => "predictions",
            IntelSource::MarketSignals => "market-signals",
            IntelSource::Alerts => "alerts",
            IntelSource::Risk => "risk",
        }
    }

    /// `(name, path)` pairs fetched for this source.
    pub fn endpoints(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            IntelSource::Constellation => &[
                ("graph", "/api/constellation/graph"),
                ("metrics", "/api/constellation/metrics"),
            ],
            IntelSource::Whales => &[
                ("transactions", "/api/whales/transactions"),
                ("wallets", "/api/whales/wallets"),
                ("activity", "/api/whales/activity"),
            ],
            IntelSource::Environmental => &[
                ("summary", "/api/environmental/summary"),
                ("trends", "/api/environmental/trends"),
            ],
            IntelSource::Patterns => &[
                ("status", "/api/patterns/status"),
                ("detected", "/api/patterns/detected"),
            ],
            IntelSource::Spoofing => &[
                ("indicators", "/api/spoofing/indicators"),
                ("manipulation", "/api/spoofing/manipulation-score"),
            ],
            IntelSource::Momentum => &[
                ("scanner", "/api/momentum/scanner"),
                ("movers", "/api/momentum/movers"),
            ],
            IntelSource::Predictions => &[("summary", "/api/predictions/summary")],
            IntelSource::MarketSignals => &[
                ("signals", "/api/market/signals"),
                ("sentiment", "/api/market/sentiment"),
            ],
            IntelSource::Alerts => &[
                ("summary", "/api/alerts/summary"),
                ("recent", "/api/alerts/recent"),
            ],
            IntelSource::Risk => &[
                ("global", "/api/risk/global"),
                ("heatmap", "/api/risk/heatmap"),
            ],
        }
    }

    /// Neutral report served when the source cannot be reached.
    pub fn neutral_report(&self) -> SourceReport {
        match self {
            IntelSource::Constellation => SourceReport::Constellation(Default::default()),
            IntelSource::Whales => SourceReport::Whales(Default::default()),
            IntelSource::Environmental => SourceReport::Environmental(Default::default()),
            IntelSource::Patterns => SourceReport::Patterns(Default::default()),
            IntelSource::Spoofing => SourceReport::Spoofing(Default::default()),
            IntelSource::Momentum => SourceReport::Momentum(Default::default()),
            IntelSource::Predictions => SourceReport::Predictions(Default::default()),
            IntelSource::MarketSignals => SourceReport::MarketSignals(Default::default()),
            IntelSource::Alerts => SourceReport::Alerts(Default::default()),
            IntelSource::Risk => SourceReport::Risk(Default::default()),
        }
    }

    /// Builds the typed report from `{endpoint name: body}`.
    pub fn normalize(&self, raw: &Value) -> SourceReport {
        match self {
            IntelSource::Constellation => SourceReport::Constellation(ConstellationReport::from_json(raw)),
            IntelSource::Whales => SourceReport::Whales(WhaleReport::from_json(raw)),
            IntelSource::Environmental => SourceReport::Environmental(EnvironmentalReport::from_json(raw)),
            IntelSource::Patterns => SourceReport::Patterns(PatternReport::from_json(raw)),
            IntelSource::Spoofing => SourceReport::Spoofing(SpoofingReport::from_json(raw)),
            IntelSource::Momentum => SourceReport::Momentum(MomentumReport::from_json(raw)),
            IntelSource::Predictions => SourceReport::Predictions(PredictionReport::from_json(raw)),
            IntelSource::MarketSignals => SourceReport::MarketSignals(MarketSignalsReport::from_json(raw)),
            IntelSource::Alerts => SourceReport::Alerts(AlertsReport::from_json(raw)),
            IntelSource::Risk => SourceReport::Risk(RiskReport::from_json(raw)),
        }
    }
}

impl fmt::Display for IntelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceReport {
    Constellation(ConstellationReport),
    Whales(WhaleReport),
    Environmental(EnvironmentalReport),
    Patterns(PatternReport),
    Spoofing(SpoofingReport),
    Momentum(MomentumReport),
    Predictions(PredictionReport),
    MarketSignals(MarketSignalsReport),
    Alerts(AlertsReport),
    Risk(RiskReport),
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// First present, non-null field among `keys` (snake and camel spellings).
fn field<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| v.get(*k))
        .find(|f| !f.is_null())
}

fn num(v: Option<&Value>) -> f64 {
    let n = match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

fn count(v: Option<&Value>) -> u64 {
    match v {
        Some(Value::Array(items)) => items.len() as u64,
        other => {
            let n = num(other);
            if n > 0.0 {
                n as u64
            } else {
                0
            }
        }
    }
}

fn text(v: Option<&Value>, default: &str) -> String {
    match v {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => default.to_string(),
    }
}

fn flag(v: Option<&Value>) -> bool {
    match v {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "active" | "running" | "online" | "enabled" | "yes"
        ),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => false,
    }
}

/// Array found either at one of `keys` of `v`, or `v` itself.
fn list<'a>(v: Option<&'a Value>, keys: &[&str]) -> &'a [Value] {
    match v {
        Some(Value::Array(items)) => items,
        Some(obj @ Value::Object(_)) => match field(obj, keys) {
            Some(Value::Array(items)) => items,
            _ => &[],
        },
        _ => &[],
    }
}

fn percent(v: f64) -> f64 {
    // Some engines report 0..1, others 0..100.
    let scaled = if v > 0.0 && v <= 1.0 { v * 100.0 } else { v };
    scaled.clamp(0.0, 100.0)
}

fn unit(v: f64) -> f64 {
    let scaled = if v > 1.0 { v / 100.0 } else { v };
    scaled.clamp(0.0, 1.0)
}

fn timestamp(v: Option<&Value>) -> Option<DateTime<Utc>> {
    match v {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        Some(Value::Number(n)) => {
            let ms = n.as_i64()?;
            // Seconds vs milliseconds since epoch
            let ms = if ms < 100_000_000_000 { ms * 1000 } else { ms };
            Utc.timestamp_millis_opt(ms).single()
        }
        _ => None,
    }
}

fn names(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Object(_) => {
                let name = text(field(item, &["name", "type", "label", "title"]), "");
                if name.is_empty() {
                    None
                } else {
                    Some(name)
                }
            }
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstellationReport {
    pub node_count: u64,
    pub edge_count: u64,
    pub cluster_count: u64,
    pub density: f64,
}

impl ConstellationReport {
    pub fn from_json(raw: &Value) -> Self {
        let graph = field(raw, &["graph"]).unwrap_or(&Value::Null);
        let metrics = field(raw, &["metrics"]).unwrap_or(&Value::Null);

        let mut node_count = count(field(graph, &["nodes"]));
        if node_count == 0 {
            node_count = count(field(metrics, &["node_count", "nodeCount", "nodes"]));
        }
        let mut edge_count = count(field(graph, &["edges", "links"]));
        if edge_count == 0 {
            edge_count = count(field(metrics, &["edge_count", "edgeCount", "edges"]));
        }
        Self {
            node_count,
            edge_count,
            cluster_count: count(field(metrics, &["cluster_count", "clusterCount", "clusters"])),
            density: unit(num(field(metrics, &["density"]))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleReport {
    pub transaction_count: u64,
    pub total_volume_usd: f64,
    pub largest_transaction_usd: f64,
    pub active_wallets: u64,
    pub activity_level: WhaleActivityTier,
}

impl Default for WhaleReport {
    fn default() -> Self {
        Self {
            transaction_count: 0,
            total_volume_usd: 0.0,
            largest_transaction_usd: 0.0,
            active_wallets: 0,
            activity_level: WhaleActivityTier::Quiet,
        }
    }
}

impl WhaleReport {
    pub fn from_json(raw: &Value) -> Self {
        let txs = list(field(raw, &["transactions"]), &["transactions", "items", "data"]);
        let amounts: Vec<f64> = txs
            .iter()
            .map(|tx| num(field(tx, &["amount_usd", "amountUsd", "value_usd", "valueUsd", "amount"])).max(0.0))
            .collect();

        let wallets = field(raw, &["wallets"]);
        let mut active_wallets = wallets
            .and_then(|w| field(w, &["active_count", "activeCount", "count"]))
            .map(|v| count(Some(v)))
            .unwrap_or(0);
        if active_wallets == 0 {
            active_wallets = list(wallets, &["wallets", "items"]).len() as u64;
        }

        let transaction_count = txs.len() as u64;
        let activity = field(raw, &["activity"]).unwrap_or(&Value::Null);
        let activity_level = field(activity, &["level", "tier", "activity_level", "activityLevel"])
            .and_then(|v| v.as_str())
            .and_then(WhaleActivityTier::parse)
            .unwrap_or_else(|| WhaleActivityTier::from_transaction_count(transaction_count));

        Self {
            transaction_count,
            total_volume_usd: amounts.iter().sum(),
            largest_transaction_usd: amounts.iter().cloned().fold(0.0, f64::max),
            active_wallets,
            activity_level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalReport {
    pub score: f64,
    pub trend: String,
    pub factors: Vec<String>,
}

impl Default for EnvironmentalReport {
    fn default() -> Self {
        Self {
            score: 0.0,
            trend: "stable".to_string(),
            factors: Vec::new(),
        }
    }
}

impl EnvironmentalReport {
    pub fn from_json(raw: &Value) -> Self {
        let summary = field(raw, &["summary"]).unwrap_or(&Value::Null);
        let trends = field(raw, &["trends"]).unwrap_or(&Value::Null);
        Self {
            score: percent(num(field(summary, &["score", "impact_score", "impactScore"]))),
            trend: text(field(trends, &["direction", "trend"]), "stable"),
            factors: names(list(field(summary, &["factors"]), &["items"])),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPattern {
    pub name: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternReport {
    pub active: bool,
    pub pattern_count: u64,
    pub patterns: Vec<DetectedPattern>,
}

impl PatternReport {
    pub fn from_json(raw: &Value) -> Self {
        let status = field(raw, &["status"]).unwrap_or(&Value::Null);
        let active = match status {
            Value::String(_) | Value::Bool(_) => flag(Some(status)),
            _ => flag(field(status, &["active", "status", "running"])),
        };
        let patterns: Vec<DetectedPattern> = list(field(raw, &["detected"]), &["patterns", "items"])
            .iter()
            .map(|p| DetectedPattern {
                name: text(field(p, &["name", "type", "pattern"]), "unnamed pattern"),
                confidence: unit(num(field(p, &["confidence", "score"]))),
            })
            .collect();
        let reported = count(field(status, &["pattern_count", "patternCount", "count"]));
        Self {
            active,
            pattern_count: reported.max(patterns.len() as u64),
            patterns,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpoofingReport {
    /// 0-100
    pub manipulation_score: f64,
    pub indicator_count: u64,
    pub indicators: Vec<String>,
}

impl SpoofingReport {
    pub fn from_json(raw: &Value) -> Self {
        let manipulation = field(raw, &["manipulation"]).unwrap_or(&Value::Null);
        let score = match manipulation {
            Value::Number(_) | Value::String(_) => num(Some(manipulation)),
            _ => num(field(manipulation, &["score", "manipulation_score", "manipulationScore"])),
        };
        let indicators = names(list(field(raw, &["indicators"]), &["indicators", "items"]));
        Self {
            manipulation_score: percent(score),
            indicator_count: indicators.len() as u64,
            indicators,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MomentumDirection {
    Up,
    Down,
    Flat,
}

impl MomentumDirection {
    fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "bullish" | "positive" | "rising" => MomentumDirection::Up,
            "down" | "bearish" | "negative" | "falling" => MomentumDirection::Down,
            _ => MomentumDirection::Flat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mover {
    pub symbol: String,
    pub change_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumReport {
    pub direction: MomentumDirection,
    /// 0-100
    pub strength: f64,
    pub top_movers: Vec<Mover>,
}

impl Default for MomentumReport {
    fn default() -> Self {
        Self {
            direction: MomentumDirection::Flat,
            strength: 0.0,
            top_movers: Vec::new(),
        }
    }
}

impl MomentumReport {
    pub fn from_json(raw: &Value) -> Self {
        let scanner = field(raw, &["scanner"]).unwrap_or(&Value::Null);
        let direction = field(scanner, &["direction", "trend", "bias"])
            .and_then(|v| v.as_str())
            .map(MomentumDirection::parse)
            .unwrap_or(MomentumDirection::Flat);
        let top_movers = list(field(raw, &["movers"]), &["movers", "items"])
            .iter()
            .map(|m| Mover {
                symbol: text(field(m, &["symbol", "ticker", "asset"]), "?"),
                change_pct: num(field(m, &["change_pct", "changePct", "change"])),
            })
            .collect();
        Self {
            direction,
            strength: percent(num(field(scanner, &["strength", "score"]))),
            top_movers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionReport {
    pub outlook: String,
    pub confidence: f64,
    pub horizon: String,
}

impl Default for PredictionReport {
    fn default() -> Self {
        Self {
            outlook: "neutral".to_string(),
            confidence: 0.0,
            horizon: "24h".to_string(),
        }
    }
}

impl PredictionReport {
    pub fn from_json(raw: &Value) -> Self {
        let summary = field(raw, &["summary"]).unwrap_or(&Value::Null);
        Self {
            outlook: text(field(summary, &["outlook", "direction", "prediction"]), "neutral"),
            confidence: unit(num(field(summary, &["confidence"]))),
            horizon: text(field(summary, &["horizon", "timeframe"]), "24h"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSignalsReport {
    pub signal_count: u64,
    pub sentiment: String,
    /// -1.0 (bearish) to 1.0 (bullish)
    pub sentiment_score: f64,
}

impl Default for MarketSignalsReport {
    fn default() -> Self {
        Self {
            signal_count: 0,
            sentiment: "neutral".to_string(),
            sentiment_score: 0.0,
        }
    }
}

impl MarketSignalsReport {
    pub fn from_json(raw: &Value) -> Self {
        let sentiment = field(raw, &["sentiment"]).unwrap_or(&Value::Null);
        let signals = field(raw, &["signals"]);
        let listed = list(signals, &["signals", "items"]).len() as u64;
        let reported = signals
            .and_then(|s| field(s, &["count", "total"]))
            .map(|v| count(Some(v)))
            .unwrap_or(0);
        Self {
            signal_count: listed.max(reported),
            sentiment: text(field(sentiment, &["label", "sentiment", "overall"]), "neutral"),
            sentiment_score: num(field(sentiment, &["score", "value"])).clamp(-1.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertsReport {
    pub summary: AlertSummary,
}

impl AlertsReport {
    pub fn from_json(raw: &Value) -> Self {
        let summary = field(raw, &["summary"]).unwrap_or(&Value::Null);
        let tiers = field(summary, &["by_severity", "bySeverity"]).unwrap_or(summary);
        let tier = |name: &str| count(field(tiers, &[name])) as u32;

        let recent: Vec<AlertData> = list(field(raw, &["recent"]), &["alerts", "items"])
            .iter()
            .enumerate()
            .map(|(i, a)| AlertData {
                id: text(field(a, &["id", "alert_id", "alertId"]), &format!("alert-{}", i)),
                category: text(field(a, &["category", "type"]), "SYSTEM").to_ascii_uppercase(),
                severity: field(a, &["severity", "level"])
                    .and_then(|v| v.as_str())
                    .and_then(Severity::parse)
                    .unwrap_or(Severity::Low),
                title: text(field(a, &["title", "name"]), "Alert"),
                message: text(field(a, &["message", "description", "details"]), ""),
                timestamp: timestamp(field(a, &["timestamp", "created_at", "createdAt"])),
            })
            .take(crate::context::RECENT_ALERTS_CAPACITY)
            .collect();

        let mut categories: Vec<String> = list(field(summary, &["categories"]), &["items"])
            .iter()
            .filter_map(|c| c.as_str())
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .collect();
        for alert in &recent {
            if !categories.contains(&alert.category) {
                categories.push(alert.category.clone());
            }
        }

        Self {
            summary: AlertSummary {
                critical: tier("critical"),
                high: tier("high"),
                medium: tier("medium"),
                low: tier("low"),
                categories,
                recent,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub level: RiskLevel,
    pub score: f64,
    pub heatmap: Vec<HeatmapRegion>,
}

impl Default for RiskReport {
    fn default() -> Self {
        Self {
            level: RiskLevel::Unknown,
            score: 0.0,
            heatmap: Vec::new(),
        }
    }
}

impl RiskReport {
    pub fn from_json(raw: &Value) -> Self {
        let global = field(raw, &["global"]).unwrap_or(&Value::Null);
        let score_field = field(global, &["score", "risk_score", "riskScore"]);
        let score = percent(num(score_field));
        let level = match field(global, &["level", "risk_level", "riskLevel"]).and_then(|v| v.as_str()) {
            Some(s) => RiskLevel::parse(s),
            None if score_field.is_some() => RiskLevel::from_score(score),
            None => RiskLevel::Unknown,
        };
        let heatmap = list(field(raw, &["heatmap"]), &["regions", "items"])
            .iter()
            .map(|r| HeatmapRegion {
                region: text(field(r, &["region", "name"]), "unknown"),
                intensity: percent(num(field(r, &["intensity", "score", "value"]))),
            })
            .collect();
        Self { level, score, heatmap }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityProfile {
    pub id: String,
    pub kind: String,
    pub display_name: String,
    pub risk_score: f64,
    pub tags: Vec<String>,
    pub connected_entities: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

impl EntityProfile {
    pub fn unknown(id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: "entity".to_string(),
            display_name: id.to_string(),
            risk_score: 0.0,
            tags: Vec::new(),
            connected_entities: 0,
            last_activity: None,
        }
    }

    pub fn from_json(id: &str, raw: &Value) -> Self {
        let body = field(raw, &["profile", "entity"]).unwrap_or(raw);
        Self {
            id: id.to_string(),
            kind: text(field(body, &["kind", "type", "entity_type", "entityType"]), "entity"),
            display_name: text(field(body, &["display_name", "displayName", "name", "label"]), id),
            risk_score: percent(num(field(body, &["risk_score", "riskScore", "risk"]))),
            tags: names(list(field(body, &["tags", "labels"]), &["items"])),
            connected_entities: count(field(body, &["connections", "connected_entities", "connectedEntities"])),
            last_activity: timestamp(field(body, &["last_activity", "lastActivity", "last_seen", "lastSeen"])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_malformed_fields_fall_back_to_defaults() {
        let raw = json!({
            "graph": "not an object",
            "metrics": {"nodeCount": "lots", "density": null}
        });
        assert_eq!(ConstellationReport::from_json(&raw), ConstellationReport::default());
        assert_eq!(RiskReport::from_json(&json!(null)), RiskReport::default());
        assert_eq!(AlertsReport::from_json(&json!([1, 2, 3])), AlertsReport::default());
    }

    #[test]
    fn test_constellation_counts_arrays_and_metrics() {
        let raw = json!({
            "graph": {"nodes": [{"id": 1}, {"id": 2}], "links": [{}]},
            "metrics": {"clusterCount": 3, "density": 42}
        });
        let report = ConstellationReport::from_json(&raw);
        assert_eq!(report.node_count, 2);
        assert_eq!(report.edge_count, 1);
        assert_eq!(report.cluster_count, 3);
        assert!((report.density - 0.42).abs() < 1e-9);
    }

    #[test]
    fn test_whale_report_sums_and_tiers() {
        let raw = json!({
            "transactions": {"transactions": [
                {"amountUsd": 1_500_000.0},
                {"amount_usd": "2500000"},
                {"amount": -5}
            ]},
            "wallets": {"wallets": [{}, {}]},
            "activity": {}
        });
        let report = WhaleReport::from_json(&raw);
        assert_eq!(report.transaction_count, 3);
        assert_eq!(report.total_volume_usd, 4_000_000.0);
        assert_eq!(report.largest_transaction_usd, 2_500_000.0);
        assert_eq!(report.active_wallets, 2);
        assert_eq!(report.activity_level, WhaleActivityTier::Low);

        let explicit = WhaleReport::from_json(&json!({"activity": {"level": "HIGH"}}));
        assert_eq!(explicit.activity_level, WhaleActivityTier::High);
    }

    #[test]
    fn test_alerts_report_parses_tiers_and_recent() {
        let raw = json!({
            "summary": {"bySeverity": {"critical": 1, "high": "2", "medium": 0}, "categories": ["whale_spike"]},
            "recent": {"alerts": [
                {"id": "a1", "type": "manipulation", "severity": "critical", "title": "Spoofing burst", "timestamp": "2026-01-05T11:59:00Z"},
                {"severity": "nonsense"}
            ]}
        });
        let summary = AlertsReport::from_json(&raw).summary;
        assert_eq!((summary.critical, summary.high, summary.medium, summary.low), (1, 2, 0, 0));
        assert_eq!(summary.recent.len(), 2);
        assert_eq!(summary.recent[0].category, "MANIPULATION");
        assert_eq!(summary.recent[0].severity, Severity::Critical);
        assert!(summary.recent[0].timestamp.is_some());
        assert_eq!(summary.recent[1].id, "alert-1");
        assert_eq!(summary.recent[1].severity, Severity::Low);
        assert_eq!(summary.categories, vec!["WHALE_SPIKE", "MANIPULATION", "SYSTEM"]);
    }

    #[test]
    fn test_risk_level_from_score_when_level_missing() {
        let report = RiskReport::from_json(&json!({
            "global": {"score": 0.82},
            "heatmap": {"regions": [{"name": "APAC", "intensity": 130}]}
        }));
        assert_eq!(report.level, RiskLevel::Critical);
        assert!((report.score - 82.0).abs() < 1e-9);
        assert_eq!(report.heatmap[0].region, "APAC");
        assert_eq!(report.heatmap[0].intensity, 100.0);
    }

    #[test]
    fn test_spoofing_and_momentum() {
        let spoofing = SpoofingReport::from_json(&json!({
            "manipulation": 77,
            "indicators": ["layering", {"name": "wash trading"}, 5]
        }));
        assert_eq!(spoofing.manipulation_score, 77.0);
        assert_eq!(spoofing.indicators, vec!["layering", "wash trading"]);

        let momentum = MomentumReport::from_json(&json!({
            "scanner": {"direction": "Bearish", "strength": 0.6},
            "movers": [{"symbol": "ETH", "changePct": -4.2}]
        }));
        assert_eq!(momentum.direction, MomentumDirection::Down);
        assert!((momentum.strength - 60.0).abs() < 1e-9);
        assert_eq!(momentum.top_movers[0].symbol, "ETH");
    }

    #[test]
    fn test_entity_profile_defaults() {
        let profile = EntityProfile::from_json("0xabc", &json!({"profile": {"type": "wallet", "tags": ["exchange"]}}));
        assert_eq!(profile.kind, "wallet");
        assert_eq!(profile.display_name, "0xabc");
        assert_eq!(profile.tags, vec!["exchange"]);
    }

    #[test]
    fn test_every_source_has_endpoints() {
        for source in IntelSource::ALL {
            assert!(!source.endpoints().is_empty(), "{} has no endpoints", source);
            assert_eq!(source.normalize(&json!({})), source.neutral_report());
        }
    }
}
