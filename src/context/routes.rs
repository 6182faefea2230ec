use super::types::DashboardModule;

const EXACT_ROUTES: &[(&str, DashboardModule)] = &[
    ("/", DashboardModule::Overview),
    ("/dashboard", DashboardModule::Overview),
    ("/overview", DashboardModule::Overview),
    ("/constellation", DashboardModule::Constellation),
    ("/whales", DashboardModule::WhaleTracking),
    ("/whale-tracker", DashboardModule::WhaleTracking),
    ("/environmental", DashboardModule::Environmental),
    ("/patterns", DashboardModule::PatternDetection),
    ("/pattern-detection", DashboardModule::PatternDetection),
    ("/spoofing", DashboardModule::Spoofing),
    ("/manipulation", DashboardModule::Spoofing),
    ("/momentum", DashboardModule::Momentum),
    ("/predictions", DashboardModule::Predictions),
    ("/signals", DashboardModule::MarketSignals),
    ("/market-signals", DashboardModule::MarketSignals),
    ("/alerts", DashboardModule::Alerts),
    ("/risk", DashboardModule::Risk),
    ("/risk-heatmap", DashboardModule::Risk),
    ("/compliance", DashboardModule::Compliance),
    ("/reports", DashboardModule::Reports),
    ("/settings", DashboardModule::Settings),
];

const PREFIX_ROUTES: &[(&str, DashboardModule)] = &[
    ("/dashboard", DashboardModule::Overview),
    ("/constellation", DashboardModule::Constellation),
    ("/whales", DashboardModule::WhaleTracking),
    ("/intelligence/whales", DashboardModule::WhaleTracking),
    ("/environmental", DashboardModule::Environmental),
    ("/intelligence/environmental", DashboardModule::Environmental),
    ("/patterns", DashboardModule::PatternDetection),
    ("/intelligence/patterns", DashboardModule::PatternDetection),
    ("/spoofing", DashboardModule::Spoofing),
    ("/momentum", DashboardModule::Momentum),
    ("/predictions", DashboardModule::Predictions),
    ("/signals", DashboardModule::MarketSignals),
    ("/alerts", DashboardModule::Alerts),
    ("/risk", DashboardModule::Risk),
    ("/compliance", DashboardModule::Compliance),
    ("/reports", DashboardModule::Reports),
    ("/settings", DashboardModule::Settings),
];

// Checked in order; first hit wins.
const KEYWORDS: &[(&str, DashboardModule)] = &[
    ("constellation", DashboardModule::Constellation),
    ("graph", DashboardModule::Constellation),
    ("whale", DashboardModule::WhaleTracking),
    ("wallet", DashboardModule::WhaleTracking),
    ("environment", DashboardModule::Environmental),
    ("pattern", DashboardModule::PatternDetection),
    ("spoof", DashboardModule::Spoofing),
    ("manipulat", DashboardModule::Spoofing),
    ("momentum", DashboardModule::Momentum),
    ("mover", DashboardModule::Momentum),
    ("predict", DashboardModule::Predictions),
    ("forecast", DashboardModule::Predictions),
    ("signal", DashboardModule::MarketSignals),
    ("sentiment", DashboardModule::MarketSignals),
    ("alert", DashboardModule::Alerts),
    ("risk", DashboardModule::Risk),
    ("heatmap", DashboardModule::Risk),
    ("compliance", DashboardModule::Compliance),
    ("report", DashboardModule::Reports),
    ("export", DashboardModule::Reports),
    ("setting", DashboardModule::Settings),
    ("preference", DashboardModule::Settings),
];

fn normalize_route(route: &str) -> String {
    let path = route
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Maps a dashboard route to the module it belongs to: exact table, then the
/// longest matching path prefix (never `/`), then keyword search.
pub fn module_for_route(route: &str) -> DashboardModule {
    let path = normalize_route(route);

    if let Some((_, module)) = EXACT_ROUTES.iter().find(|(r, _)| *r == path) {
        return *module;
    }

    let prefix_hit = PREFIX_ROUTES
        .iter()
        .filter(|(prefix, _)| {
            path.starts_with(prefix)
                && path.as_bytes().get(prefix.len()).map_or(true, |b| *b == b'/')
        })
        .max_by_key(|(prefix, _)| prefix.len());
    if let Some((_, module)) = prefix_hit {
        return *module;
    }

    KEYWORDS
        .iter()
        .find(|(keyword, _)| path.contains(keyword))
        .map(|(_, module)| *module)
        .unwrap_or(DashboardModule::Unknown)
}

/// Canonical route for `module`, the first exact route that maps to it.
pub fn route_for_module(module: DashboardModule) -> Option<&'static str> {
    EXACT_ROUTES
        .iter()
        .find(|(_, m)| *m == module)
        .map(|(route, _)| *route)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_for_module_round_trips() {
        for module in DashboardModule::ALL {
            if let Some(route) = route_for_module(module) {
                assert_eq!(module_for_route(route), module);
            }
        }
        assert_eq!(route_for_module(DashboardModule::WhaleTracking), Some("/whales"));
        assert_eq!(route_for_module(DashboardModule::Unknown), None);
    }

    #[test]
    fn test_exact_routes() {
        assert_eq!(module_for_route("/"), DashboardModule::Overview);
        assert_eq!(module_for_route("/whales"), DashboardModule::WhaleTracking);
        assert_eq!(module_for_route("/alerts/"), DashboardModule::Alerts);
        assert_eq!(module_for_route("/Risk?tab=heatmap"), DashboardModule::Risk);
    }

    #[test]
    fn test_longest_prefix_wins() {
        assert_eq!(
            module_for_route("/intelligence/whales/0xabc"),
            DashboardModule::WhaleTracking
        );
        assert_eq!(
            module_for_route("/patterns/head-and-shoulders"),
            DashboardModule::PatternDetection
        );
        // prefix must end on a segment boundary
        assert_eq!(module_for_route("/riskiest"), DashboardModule::Risk);
    }

    #[test]
    fn test_keyword_fallback_and_unknown() {
        assert_eq!(
            module_for_route("/tools/spoofing-lab"),
            DashboardModule::Spoofing
        );
        assert_eq!(module_for_route("/labs/forecasting"), DashboardModule::Predictions);
        assert_eq!(module_for_route("/about"), DashboardModule::Unknown);
    }
}
