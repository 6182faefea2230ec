use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Frustrated,
    Confused,
    Expert,
    Casual,
    Formal,
    Neutral,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Frustrated => "frustrated",
            Tone::Confused => "confused",
            Tone::Expert => "expert",
            Tone::Casual => "casual",
            Tone::Formal => "formal",
            Tone::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseDepth {
    Beginner,
    Standard,
    Advanced,
}

fn rule(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {}: {}", pattern, e))
}

lazy_static! {
    // Evaluated top to bottom; the first match wins.
    static ref TONE_RULES: Vec<(Regex, Tone)> = vec![
        (
            rule(r"(?i)\b(ugh+|argh+|annoying|frustrat\w*|useless|ridiculous|wtf|come on|doesn'?t work|not working|still broken|broken again|sick of|fed up)\b|!{2,}"),
            Tone::Frustrated,
        ),
        (
            rule(r"(?i)\b(confus\w*|don'?t (understand|get it)|what does .+ mean|what'?s an?|what is an?|i'?m (lost|new)|unclear|makes no sense|huh)\b|\?{2,}"),
            Tone::Confused,
        ),
        (
            rule(r"(?i)\b(vwap|order ?book|liquidity|layering|wash[- ]trad\w*|slippage|volatility|correlation|basis points|bps|z-?score|sharpe|arbitrage|market depth|bid-ask|spread|mempool|on-chain|drawdown|beta)\b"),
            Tone::Expert,
        ),
        (
            rule(r"(?i)\b(hey|yo|sup|cool|awesome|lol|gonna|wanna|dude|thx|yeah|yep|nah|btw|kinda)\b"),
            Tone::Casual,
        ),
        (
            rule(r"(?i)\b(please|kindly|could you|would you|i would like|provide|regarding|furthermore|thank you)\b"),
            Tone::Formal,
        ),
    ];

    static ref BEGINNER_DEPTH: Regex =
        rule(r"(?i)\b(simple|simply|basics?|eli5|explain like|plain (english|terms)|beginner|layman'?s?)\b");
    static ref ADVANCED_DEPTH: Regex =
        rule(r"(?i)\b(in[- ]depth|detailed|technical(ly)?|advanced|deep dive|full breakdown|all the details)\b");
}

pub fn detect_user_tone(text: &str) -> Tone {
    TONE_RULES
        .iter()
        .find(|(pattern, _)| pattern.is_match(text))
        .map(|(_, tone)| *tone)
        .unwrap_or(Tone::Neutral)
}

/// Explicit depth requests win over the tone-derived depth.
pub fn determine_response_depth(text: &str, tone: Tone) -> ResponseDepth {
    if BEGINNER_DEPTH.is_match(text) {
        return ResponseDepth::Beginner;
    }
    if ADVANCED_DEPTH.is_match(text) {
        return ResponseDepth::Advanced;
    }
    match tone {
        Tone::Confused | Tone::Frustrated => ResponseDepth::Beginner,
        Tone::Expert => ResponseDepth::Advanced,
        _ => ResponseDepth::Standard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_cascade_order() {
        assert_eq!(detect_user_tone("ugh, this is useless"), Tone::Frustrated);
        // Frustration outranks confusion.
        assert_eq!(detect_user_tone("I don't understand, it's not working!!"), Tone::Frustrated);
        assert_eq!(detect_user_tone("what does layering mean?"), Tone::Confused);
        assert_eq!(detect_user_tone("show the VWAP deviation and order book depth"), Tone::Expert);
        assert_eq!(detect_user_tone("yo what's up with whales"), Tone::Casual);
        assert_eq!(detect_user_tone("Could you provide the risk summary"), Tone::Formal);
        assert_eq!(detect_user_tone("show me the heatmap"), Tone::Neutral);
    }

    #[test]
    fn test_depth_keywords_override_tone() {
        assert_eq!(
            determine_response_depth("give me a deep dive", Tone::Confused),
            ResponseDepth::Advanced
        );
        assert_eq!(
            determine_response_depth("explain the spread simply", Tone::Expert),
            ResponseDepth::Beginner
        );
    }

    #[test]
    fn test_depth_from_tone() {
        assert_eq!(determine_response_depth("hmm", Tone::Frustrated), ResponseDepth::Beginner);
        assert_eq!(determine_response_depth("hmm", Tone::Confused), ResponseDepth::Beginner);
        assert_eq!(determine_response_depth("hmm", Tone::Expert), ResponseDepth::Advanced);
        assert_eq!(determine_response_depth("hmm", Tone::Casual), ResponseDepth::Standard);
    }
}
