use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::{MatchRecord, Sign, Triple};

pub const STRONG_VALUE_THRESHOLD: f64 = 7.0;
pub const OVERBET_THRESHOLD: f64 = -10.0;
pub const HEDGE_VALUE_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValuationConfig {
    /// Best value above this is a strong value sign.
    pub strong_value_threshold: f64,
    /// Best value below this means the whole match is overbet.
    pub overbet_threshold: f64,
    /// A favourite whose value is below this gets hedged with the runner-up.
    pub hedge_value_threshold: f64,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            strong_value_threshold: STRONG_VALUE_THRESHOLD,
            overbet_threshold: OVERBET_THRESHOLD,
            hedge_value_threshold: HEDGE_VALUE_THRESHOLD,
        }
    }
}

impl ValuationConfig {
    pub fn from_env() -> Self {
        Self {
            strong_value_threshold: env_f64("VALUE_STRONG_THRESHOLD", STRONG_VALUE_THRESHOLD),
            overbet_threshold: env_f64("VALUE_OVERBET_THRESHOLD", OVERBET_THRESHOLD),
            hedge_value_threshold: env_f64("VALUE_HEDGE_THRESHOLD", HEDGE_VALUE_THRESHOLD),
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    /// Signs in coupon order 1, X, 2.
    Signs(Vec<Sign>),
    Unknown,
}

impl Recommendation {
    fn from_signs(mut signs: Vec<Sign>) -> Self {
        signs.sort();
        signs.dedup();
        Recommendation::Signs(signs)
    }

    pub fn contains(&self, sign: Sign) -> bool {
        match self {
            Recommendation::Signs(signs) => signs.contains(&sign),
            Recommendation::Unknown => false,
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Signs(signs) => {
                for sign in signs {
                    f.write_str(sign.label())?;
                }
                Ok(())
            }
            Recommendation::Unknown => f.write_str("unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusLabel {
    StrongValue(Sign),
    Overbet,
    Neutral,
    MissingOdds,
}

impl StatusLabel {
    pub fn badge(self) -> &'static str {
        match self {
            StatusLabel::StrongValue(_) => "💎",
            StatusLabel::Overbet => "⚠",
            StatusLabel::Neutral => "·",
            StatusLabel::MissingOdds => "❓",
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusLabel::StrongValue(sign) => write!(f, "strong value ({sign})"),
            StatusLabel::Overbet => f.write_str("overbet"),
            StatusLabel::Neutral => f.write_str("neutral"),
            StatusLabel::MissingOdds => f.write_str("missing odds"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    /// Margin-free probabilities in percent, one decimal.
    pub implied: Triple<f64>,
    /// Implied minus public distribution, in percentage points.
    pub value: Triple<f64>,
    pub recommendation: Recommendation,
    pub status: StatusLabel,
}

/// Removes the bookmaker margin by renormalising 1/odds to 100%.
///
/// Any price that is not a positive number yields all zeros.
pub fn implied_probabilities(odds: &Triple<f64>) -> Triple<f64> {
    if Sign::ALL
        .iter()
        .any(|s| !(odds[*s].is_finite() && odds[*s] > 0.0))
    {
        return Triple::default();
    }
    let raw = odds.map(|o| 1.0 / o);
    let total = raw.home + raw.draw + raw.away;
    raw.map(|r| round1(100.0 * r / total))
}

pub fn value_deltas(implied: &Triple<f64>, distribution: &Triple<u32>) -> Triple<f64> {
    Triple::new(
        implied.home - distribution.home as f64,
        implied.draw - distribution.draw as f64,
        implied.away - distribution.away as f64,
    )
}

pub fn evaluate(record: &MatchRecord, cfg: &ValuationConfig) -> Valuation {
    if !record.has_odds() {
        return Valuation {
            implied: Triple::default(),
            value: Triple::default(),
            recommendation: Recommendation::Unknown,
            status: StatusLabel::MissingOdds,
        };
    }

    let implied = implied_probabilities(&record.odds);
    let value = value_deltas(&implied, &record.distribution);
    let by_value = rank_desc(&value);
    let best = by_value[0];
    let favorite = rank_desc(&implied)[0];
    let best_value = value[best];

    let status = if best_value > cfg.strong_value_threshold {
        StatusLabel::StrongValue(best)
    } else if best_value < cfg.overbet_threshold {
        StatusLabel::Overbet
    } else {
        StatusLabel::Neutral
    };

    // Value picks the sign, the market favourite hedges it.
    let signs = if best != favorite {
        vec![best, favorite]
    } else if best_value < cfg.hedge_value_threshold {
        vec![best, by_value[1]]
    } else {
        vec![best]
    };

    Valuation {
        implied,
        value,
        recommendation: Recommendation::from_signs(signs),
        status,
    }
}

/// Signs by descending value. Equal values keep coupon order.
fn rank_desc(values: &Triple<f64>) -> [Sign; 3] {
    let mut order = Sign::ALL;
    order.sort_by(|a, b| values[*b].total_cmp(&values[*a]));
    order
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
