//! Trigger conditions for backoff layers.

use crate::dictionary::PropertyRef;
use crate::recommend::Recommendations;

/// A pure predicate over a query and its direct recommendations, deciding
/// whether a layer's backoff procedure fires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Condition {
    /// At least this many recommendations came back.
    AboveThreshold(usize),
    /// Fewer than this many recommendations came back.
    BelowThreshold(usize),
    /// The best recommendation's probability is below the threshold.
    /// An empty result counts as probability 0, so it always triggers.
    TooUnlikely(f64),
    /// Strictly more than this many recommendations came back.
    TooMany(usize),
    /// Unconditional; used for the terminal fallback layer.
    Always,
}

impl Condition {
    pub fn holds(&self, recommendations: &Recommendations, _query: &[PropertyRef]) -> bool {
        match *self {
            Condition::AboveThreshold(threshold) => recommendations.len() >= threshold,
            Condition::BelowThreshold(threshold) => recommendations.len() < threshold,
            Condition::TooUnlikely(threshold) => recommendations.top_probability() < threshold,
            Condition::TooMany(threshold) => recommendations.len() > threshold,
            Condition::Always => true,
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::AboveThreshold(t) => write!(f, "aboveThreshold({t})"),
            Condition::BelowThreshold(t) => write!(f, "belowThreshold({t})"),
            Condition::TooUnlikely(t) => write!(f, "tooUnlikelyRecommendations({t})"),
            Condition::TooMany(t) => write!(f, "tooManyRecommendations({t})"),
            Condition::Always => write!(f, "always"),
        }
    }
}
