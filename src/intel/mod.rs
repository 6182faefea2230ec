pub mod cache;
pub mod fetcher;
pub mod sources;

pub use cache::{CacheEntry, TtlCache, DEFAULT_TTL_MS};
pub use fetcher::{FetchError, HttpFetcher, IntelFetcher};
pub use sources::*;

use crate::clock::Clock;
use crate::context::{
    ContextStateMonitor, DashboardModule, EngineState, IntelligenceSignal, MarketCondition,
    WhaleActivityTier,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Manipulation score at which a signal is recorded and the monitor flagged.
pub const MANIPULATION_THRESHOLD: f64 = 70.0;

/// Merged view over every source. Failed sources carry their neutral report
/// and are listed in `failed_sources`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedIntelligence {
    pub constellation: ConstellationReport,
    pub whales: WhaleReport,
    pub environmental: EnvironmentalReport,
    pub patterns: PatternReport,
    pub spoofing: SpoofingReport,
    pub momentum: MomentumReport,
    pub predictions: PredictionReport,
    pub market_signals: MarketSignalsReport,
    pub alerts: AlertsReport,
    pub risk: RiskReport,
    /// Sources queried for this result.
    pub sources: Vec<IntelSource>,
    pub failed_sources: Vec<IntelSource>,
    pub fetched_at: DateTime<Utc>,
}

impl AggregatedIntelligence {
    fn empty(fetched_at: DateTime<Utc>) -> Self {
        Self {
            constellation: Default::default(),
            whales: Default::default(),
            environmental: Default::default(),
            patterns: Default::default(),
            spoofing: Default::default(),
            momentum: Default::default(),
            predictions: Default::default(),
            market_signals: Default::default(),
            alerts: Default::default(),
            risk: Default::default(),
            sources: Vec::new(),
            failed_sources: Vec::new(),
            fetched_at,
        }
    }

    fn apply(&mut self, report: SourceReport) {
        match report {
            SourceReport::Constellation(r) => self.constellation = r,
            SourceReport::Whales(r) => self.whales = r,
            SourceReport::Environmental(r) => self.environmental = r,
            SourceReport::Patterns(r) => self.patterns = r,
            SourceReport::Spoofing(r) => self.spoofing = r,
            SourceReport::Momentum(r) => self.momentum = r,
            SourceReport::Predictions(r) => self.predictions = r,
            SourceReport::MarketSignals(r) => self.market_signals = r,
            SourceReport::Alerts(r) => self.alerts = r,
            SourceReport::Risk(r) => self.risk = r,
        }
    }

    pub fn succeeded(&self, source: IntelSource) -> bool {
        self.sources.contains(&source) && !self.failed_sources.contains(&source)
    }
}

/// Sources consulted for one dashboard module; `None` means all of them.
pub fn sources_for_module(module: DashboardModule) -> Option<&'static [IntelSource]> {
    match module {
        DashboardModule::Constellation => Some(&[IntelSource::Constellation]),
        DashboardModule::WhaleTracking => Some(&[IntelSource::Whales, IntelSource::Constellation]),
        DashboardModule::Environmental => Some(&[IntelSource::Environmental]),
        DashboardModule::PatternDetection => Some(&[IntelSource::Patterns]),
        DashboardModule::Spoofing => Some(&[IntelSource::Spoofing, IntelSource::Patterns]),
        DashboardModule::Momentum => Some(&[IntelSource::Momentum, IntelSource::MarketSignals]),
        DashboardModule::Predictions => Some(&[IntelSource::Predictions, IntelSource::Momentum]),
        DashboardModule::MarketSignals => Some(&[IntelSource::MarketSignals, IntelSource::Momentum]),
        DashboardModule::Alerts => Some(&[IntelSource::Alerts]),
        DashboardModule::Risk => Some(&[IntelSource::Risk, IntelSource::Alerts]),
        DashboardModule::Overview
        | DashboardModule::Compliance
        | DashboardModule::Reports
        | DashboardModule::Settings
        | DashboardModule::Unknown => None,
    }
}

pub struct IntelligenceAggregator {
    fetcher: Arc<dyn IntelFetcher>,
    monitor: ContextStateMonitor,
    clock: Arc<dyn Clock>,
    cache: TtlCache<SourceReport>,
    profiles: TtlCache<EntityProfile>,
    timeout: Duration,
}

impl IntelligenceAggregator {
    pub fn new(
        fetcher: Arc<dyn IntelFetcher>,
        monitor: ContextStateMonitor,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_limits(
            fetcher,
            monitor,
            clock,
            ChronoDuration::milliseconds(DEFAULT_TTL_MS),
            DEFAULT_TIMEOUT,
        )
    }

    pub fn with_limits(
        fetcher: Arc<dyn IntelFetcher>,
        monitor: ContextStateMonitor,
        clock: Arc<dyn Clock>,
        ttl: ChronoDuration,
        timeout: Duration,
    ) -> Self {
        Self {
            cache: TtlCache::new(ttl, clock.clone()),
            profiles: TtlCache::new(ttl, clock.clone()),
            fetcher,
            monitor,
            clock,
            timeout,
        }
    }

    pub fn monitor(&self) -> &ContextStateMonitor {
        &self.monitor
    }

    async fn get_with_timeout(&self, path: &str) -> Result<Value, FetchError> {
        match tokio::time::timeout(self.timeout, self.fetcher.get_json(path)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(path.to_string())),
        }
    }

    async fn try_fetch_source(&self, source: IntelSource) -> Result<SourceReport, FetchError> {
        if let Some(hit) = self.cache.get(source.key()) {
            debug!(%source, "intelligence cache hit");
            return Ok(hit);
        }

        let requests = source.endpoints().iter().map(|(name, path)| async move {
            (*name, self.get_with_timeout(path).await)
        });

        let mut raw = Map::new();
        for (name, result) in join_all(requests).await {
            raw.insert(name.to_string(), result?);
        }

        let report = source.normalize(&Value::Object(raw));
        self.cache.insert(source.key(), report.clone());
        Ok(report)
    }

    /// One source's report; its neutral default when unreachable.
    pub async fn fetch_source(&self, source: IntelSource) -> SourceReport {
        match self.try_fetch_source(source).await {
            Ok(report) => report,
            Err(e) => {
                warn!(%source, error = %e, "intelligence source unavailable, using neutral data");
                source.neutral_report()
            }
        }
    }

    async fn fetch_many(&self, sources: &[IntelSource]) -> AggregatedIntelligence {
        let results = join_all(
            sources
                .iter()
                .map(|source| async move { (*source, self.try_fetch_source(*source).await) }),
        )
        .await;

        let mut merged = AggregatedIntelligence::empty(self.clock.now());
        for (source, result) in results {
            merged.sources.push(source);
            match result {
                Ok(report) => merged.apply(report),
                Err(e) => {
                    warn!(%source, error = %e, "intelligence source unavailable, using neutral data");
                    merged.failed_sources.push(source);
                    merged.apply(source.neutral_report());
                }
            }
        }
        merged
    }

    /// Fetches every source concurrently and pushes the derived values into
    /// the context monitor.
    pub async fn aggregate_all(&self) -> AggregatedIntelligence {
        let merged = self.fetch_many(&IntelSource::ALL).await;
        if merged.failed_sources.is_empty() {
            info!("aggregated all intelligence sources");
        } else {
            info!(
                failed = merged.failed_sources.len(),
                "aggregated intelligence with degraded sources"
            );
        }
        self.publish(&merged);
        merged
    }

    /// Fetches only the sources relevant to `module`.
    pub async fn fetch_module_intelligence(&self, module: DashboardModule) -> AggregatedIntelligence {
        match sources_for_module(module) {
            Some(sources) => self.fetch_many(sources).await,
            None => self.aggregate_all().await,
        }
    }

    pub async fn fetch_entity_profile(&self, id: &str) -> EntityProfile {
        let id = id.trim();
        if let Some(hit) = self.profiles.get(id) {
            return hit;
        }
        let path = format!("/api/entities/{}/profile", escape_segment(id));
        match self.get_with_timeout(&path).await {
            Ok(raw) => {
                let profile = EntityProfile::from_json(id, &raw);
                self.profiles.insert(id, profile.clone());
                profile
            }
            Err(e) => {
                warn!(entity = id, error = %e, "entity profile unavailable");
                EntityProfile::unknown(id)
            }
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        self.profiles.clear();
    }

    /// Writes derived values into the monitor. Fields backed by a failed
    /// source keep their previous value.
    fn publish(&self, intel: &AggregatedIntelligence) {
        let now = self.clock.now();

        if intel.succeeded(IntelSource::Risk) {
            self.monitor.update_global_risk(intel.risk.level, intel.risk.score);
            self.monitor.update_heatmap(intel.risk.heatmap.clone());
        }
        if intel.succeeded(IntelSource::Alerts) {
            self.monitor.update_alerts(intel.alerts.summary.clone());
        }
        if intel.succeeded(IntelSource::Momentum) {
            self.monitor
                .update_market_condition(market_condition_for(&intel.momentum));
        }

        let mut status = self.monitor.live_data().engine_status;
        if intel.succeeded(IntelSource::Whales) {
            status.whale_activity = intel.whales.activity_level;
        }
        if intel.succeeded(IntelSource::Constellation) {
            status.fusion = if intel.constellation.node_count > 0 {
                EngineState::Active
            } else {
                EngineState::Idle
            };
        }
        if intel.succeeded(IntelSource::Patterns) {
            status.pattern_detection_active = intel.patterns.active;
        }
        if intel.succeeded(IntelSource::Spoofing) {
            status.manipulation_alert = intel.spoofing.manipulation_score >= MANIPULATION_THRESHOLD;
        }
        self.monitor.update_engine_status(status);

        for signal in notable_signals(intel, now) {
            self.monitor.add_intelligence_signal(signal);
        }
    }
}

pub fn market_condition_for(momentum: &MomentumReport) -> MarketCondition {
    match momentum.direction {
        MomentumDirection::Up => MarketCondition::Bullish,
        MomentumDirection::Down => MarketCondition::Bearish,
        MomentumDirection::Flat if momentum.strength >= 70.0 => MarketCondition::Volatile,
        MomentumDirection::Flat => MarketCondition::Neutral,
    }
}

fn notable_signals(intel: &AggregatedIntelligence, now: DateTime<Utc>) -> Vec<IntelligenceSignal> {
    let mut signals = Vec::new();

    if intel.succeeded(IntelSource::Patterns) && intel.patterns.pattern_count > 0 {
        let confidence = if intel.patterns.patterns.is_empty() {
            0.5
        } else {
            intel.patterns.patterns.iter().map(|p| p.confidence).sum::<f64>()
                / intel.patterns.patterns.len() as f64
        };
        signals.push(IntelligenceSignal {
            source: IntelSource::Patterns.key().to_string(),
            kind: "patterns_detected".to_string(),
            value: intel.patterns.pattern_count as f64,
            timestamp: now,
            confidence,
        });
    }

    if intel.succeeded(IntelSource::Spoofing)
        && intel.spoofing.manipulation_score >= MANIPULATION_THRESHOLD
    {
        signals.push(IntelligenceSignal {
            source: IntelSource::Spoofing.key().to_string(),
            kind: "manipulation_score".to_string(),
            value: intel.spoofing.manipulation_score,
            timestamp: now,
            confidence: intel.spoofing.manipulation_score / 100.0,
        });
    }

    if intel.succeeded(IntelSource::Whales) && intel.whales.activity_level >= WhaleActivityTier::High {
        signals.push(IntelligenceSignal {
            source: IntelSource::Whales.key().to_string(),
            kind: "whale_activity".to_string(),
            value: intel.whales.total_volume_usd,
            timestamp: now,
            confidence: 0.8,
        });
    }

    signals
}

fn escape_segment(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' | ':' => c.to_string(),
            other => {
                let mut buf = [0u8; 4];
                other
                    .encode_utf8(&mut buf)
                    .bytes()
                    .map(|b| format!("%{:02X}", b))
                    .collect()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::context::RiskLevel;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;

    /// Serves canned bodies by path; anything else fails.
    struct CannedFetcher {
        bodies: HashMap<&'static str, Value>,
    }

    #[async_trait]
    impl IntelFetcher for CannedFetcher {
        async fn get_json(&self, path: &str) -> Result<Value, FetchError> {
            self.bodies
                .get(path)
                .cloned()
                .ok_or_else(|| FetchError::Transport(format!("no route for {}", path)))
        }
    }

    fn aggregator(bodies: HashMap<&'static str, Value>) -> IntelligenceAggregator {
        let clock = Arc::new(ManualClock::at_noon());
        let monitor = ContextStateMonitor::new(clock.clone());
        IntelligenceAggregator::new(Arc::new(CannedFetcher { bodies }), monitor, clock)
    }

    #[tokio::test]
    async fn test_derived_values_reach_monitor() {
        let mut bodies = HashMap::new();
        bodies.insert("/api/risk/global", json!({"level": "high", "score": 74}));
        bodies.insert("/api/risk/heatmap", json!({"regions": [{"region": "EU", "intensity": 40}]}));
        bodies.insert("/api/constellation/graph", json!({"nodes": [1, 2, 3]}));
        bodies.insert("/api/constellation/metrics", json!({}));
        bodies.insert("/api/momentum/scanner", json!({"direction": "up", "strength": 55}));
        bodies.insert("/api/momentum/movers", json!([]));
        bodies.insert("/api/patterns/status", json!({"active": true}));
        bodies.insert("/api/patterns/detected", json!({"patterns": [{"name": "wedge", "confidence": 0.9}]}));
        bodies.insert("/api/spoofing/indicators", json!([]));
        bodies.insert("/api/spoofing/manipulation-score", json!({"score": 81}));

        let agg = aggregator(bodies);
        let intel = agg.aggregate_all().await;
        assert_eq!(intel.failed_sources.len(), 5);

        let live = agg.monitor().live_data();
        assert_eq!(live.global_risk_level, RiskLevel::High);
        assert_eq!(live.global_risk_score, 74.0);
        assert_eq!(live.market_condition, MarketCondition::Bullish);
        assert_eq!(live.engine_status.fusion, EngineState::Active);
        assert!(live.engine_status.pattern_detection_active);
        assert!(live.engine_status.manipulation_alert);
        assert_eq!(live.heatmap_regions.len(), 1);

        let kinds: Vec<&str> = live.intelligence_signals.iter().map(|s| s.kind.as_str()).collect();
        assert_eq!(kinds, vec!["manipulation_score", "patterns_detected"]);
    }

    #[tokio::test]
    async fn test_failed_sources_keep_previous_monitor_values() {
        let agg = aggregator(HashMap::new());
        agg.monitor().update_global_risk(RiskLevel::Medium, 40.0);

        let intel = agg.aggregate_all().await;
        assert_eq!(intel.failed_sources.len(), IntelSource::ALL.len());
        assert_eq!(intel.risk, RiskReport::default());
        assert_eq!(agg.monitor().live_data().global_risk_level, RiskLevel::Medium);
        assert_eq!(agg.monitor().live_data().engine_status.fusion, EngineState::Idle);
    }

    #[tokio::test]
    async fn test_module_intelligence_fetches_subset() {
        let mut bodies = HashMap::new();
        bodies.insert("/api/alerts/summary", json!({"critical": 2}));
        bodies.insert("/api/alerts/recent", json!([]));
        let agg = aggregator(bodies);

        let intel = agg.fetch_module_intelligence(DashboardModule::Alerts).await;
        assert_eq!(intel.sources, vec![IntelSource::Alerts]);
        assert!(intel.failed_sources.is_empty());
        assert_eq!(intel.alerts.summary.critical, 2);

        let all = agg.fetch_module_intelligence(DashboardModule::Reports).await;
        assert_eq!(all.sources.len(), IntelSource::ALL.len());
    }

    #[tokio::test]
    async fn test_entity_profile_failure_yields_unknown() {
        let mut bodies = HashMap::new();
        bodies.insert("/api/entities/0xab%2Fcd/profile", json!({"name": "Desk 9", "type": "desk"}));
        let agg = aggregator(bodies);

        let profile = agg.fetch_entity_profile("0xab/cd").await;
        assert_eq!(profile.display_name, "Desk 9");
        assert_eq!(profile.kind, "desk");

        let missing = agg.fetch_entity_profile("nobody").await;
        assert_eq!(missing, EntityProfile::unknown("nobody"));
    }

    #[test]
    fn test_market_condition_mapping() {
        let mut m = MomentumReport::default();
        assert_eq!(market_condition_for(&m), MarketCondition::Neutral);
        m.strength = 90.0;
        assert_eq!(market_condition_for(&m), MarketCondition::Volatile);
        m.direction = MomentumDirection::Down;
        assert_eq!(market_condition_for(&m), MarketCondition::Bearish);
    }
}
