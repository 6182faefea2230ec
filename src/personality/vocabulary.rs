use lazy_static::lazy_static;
use regex::{Captures, Regex};

// Longer phrases come first so they are replaced before their parts.
const PLAIN_TERMS: &[(&str, &str)] = &[
    ("market capitalization", "total market value"),
    ("order book", "list of waiting buy and sell orders"),
    ("wash trading", "trading with yourself to fake activity"),
    ("bid-ask spread", "gap between buying and selling prices"),
    ("basis points", "hundredths of a percent"),
    ("manipulation", "unfair price tricks"),
    ("spoofing", "placing fake orders"),
    ("layering", "stacking fake orders"),
    ("volatility", "how much prices swing"),
    ("liquidity", "how easily it can be bought or sold"),
    ("correlation", "tendency to move together"),
    ("momentum", "speed of the price move"),
    ("heatmap", "color-coded map"),
    ("anomaly", "unusual event"),
    ("anomalies", "unusual events"),
    ("counterparty", "other side of the trade"),
    ("arbitrage", "profiting from price differences"),
    ("drawdown", "drop from the peak"),
    ("slippage", "difference from the expected price"),
    ("bearish", "expecting prices to fall"),
    ("bullish", "expecting prices to rise"),
];

lazy_static! {
    static ref SUBSTITUTIONS: Vec<(Regex, &'static str)> = PLAIN_TERMS
        .iter()
        .filter_map(|(term, plain)| {
            Regex::new(&format!(r"(?i)\b{}\b", regex::escape(term)))
                .ok()
                .map(|re| (re, *plain))
        })
        .collect();
}

fn match_case(original: &str, plain: &str) -> String {
    let starts_upper = original.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
    if !starts_upper {
        return plain.to_string();
    }
    let mut chars = plain.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Replaces technical market terms with plain-language equivalents.
pub fn simplify_vocabulary(text: &str) -> String {
    SUBSTITUTIONS
        .iter()
        .fold(text.to_string(), |acc, (re, plain)| {
            re.replace_all(&acc, |caps: &Captures| match_case(&caps[0], plain))
                .into_owned()
        })
}
