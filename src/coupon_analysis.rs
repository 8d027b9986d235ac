use std::env;
use std::path::PathBuf;

use serde::Serialize;

use crate::coupon_parse::{CouponParseError, ParserConfig, parse_coupon};
use crate::odds_fetch::OddsSource;
use crate::state::{CouponKind, MatchRecord, OddsOrigin, Triple};
use crate::team_names::{ApproximateMatcher, DEFAULT_ACCEPT_SCORE, NameResolution, TeamNormalizer};
use crate::valuation::{StatusLabel, Valuation, ValuationConfig, evaluate};

/// Which odds feed the valuation when both the page and a provider have prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OddsPrecedence {
    ExternalFirst,
    PageOnly,
    ExternalOnly,
}

impl OddsPrecedence {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "external" | "api" => Some(OddsPrecedence::ExternalFirst),
            "page" | "svs" => Some(OddsPrecedence::PageOnly),
            "external-only" | "api-only" => Some(OddsPrecedence::ExternalOnly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub parser: ParserConfig,
    pub valuation: ValuationConfig,
    pub precedence: OddsPrecedence,
    pub accept_score: u8,
    pub aliases_file: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            parser: ParserConfig::default(),
            valuation: ValuationConfig::default(),
            precedence: OddsPrecedence::ExternalFirst,
            accept_score: DEFAULT_ACCEPT_SCORE,
            aliases_file: None,
        }
    }
}

impl AnalysisConfig {
    pub fn from_env() -> Self {
        let precedence = env::var("ODDS_PRECEDENCE")
            .ok()
            .and_then(|v| OddsPrecedence::parse(&v))
            .unwrap_or(OddsPrecedence::ExternalFirst);
        let accept_score = env::var("TEAM_MATCH_MIN_SCORE")
            .ok()
            .and_then(|v| v.trim().parse::<u8>().ok())
            .unwrap_or(DEFAULT_ACCEPT_SCORE)
            .clamp(50, 100);
        let aliases_file = env::var("TEAM_ALIASES_FILE")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Self {
            parser: ParserConfig::from_env(),
            valuation: ValuationConfig::from_env(),
            precedence,
            accept_score,
            aliases_file,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedMatch {
    pub record: MatchRecord,
    pub valuation: Valuation,
    /// How the home team was looked up at the odds provider, if it was.
    pub name_match: Option<NameResolution>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CouponAnalysis {
    pub kind: CouponKind,
    pub matches: Vec<AnalyzedMatch>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CouponSummary {
    pub strong_value: usize,
    pub overbet: usize,
    pub neutral: usize,
    pub missing_odds: usize,
    pub external_odds: usize,
}

impl CouponAnalysis {
    pub fn summary(&self) -> CouponSummary {
        let mut out = CouponSummary::default();
        for m in &self.matches {
            match m.valuation.status {
                StatusLabel::StrongValue(_) => out.strong_value += 1,
                StatusLabel::Overbet => out.overbet += 1,
                StatusLabel::Neutral => out.neutral += 1,
                StatusLabel::MissingOdds => out.missing_odds += 1,
            }
            if matches!(m.record.source, OddsOrigin::External { .. }) {
                out.external_odds += 1;
            }
        }
        out
    }
}

/// Parses a pasted coupon, merges provider odds and values every match.
pub fn analyze_coupon(
    text: &str,
    cfg: &AnalysisConfig,
    normalizer: &TeamNormalizer,
    source: Option<&dyn OddsSource>,
    matcher: &dyn ApproximateMatcher,
) -> Result<CouponAnalysis, CouponParseError> {
    let parsed = parse_coupon(text, &cfg.parser)?;
    let mut warnings = parsed.warnings;
    let candidates = source.map(|s| s.candidates()).unwrap_or_default();

    let matches = parsed
        .records
        .iter()
        .map(|record| {
            let (record, name_match) = merge_external_odds(
                record,
                cfg.precedence,
                normalizer,
                source,
                &candidates,
                matcher,
                &mut warnings,
            );
            let valuation = evaluate(&record, &cfg.valuation);
            AnalyzedMatch {
                record,
                valuation,
                name_match,
            }
        })
        .collect();

    Ok(CouponAnalysis {
        kind: parsed.kind,
        matches,
        warnings,
    })
}

/// Returns a copy of `record` carrying the odds the precedence policy picks.
pub fn merge_external_odds(
    record: &MatchRecord,
    precedence: OddsPrecedence,
    normalizer: &TeamNormalizer,
    source: Option<&dyn OddsSource>,
    candidates: &[String],
    matcher: &dyn ApproximateMatcher,
    warnings: &mut Vec<String>,
) -> (MatchRecord, Option<NameResolution>) {
    let mut out = record.clone();
    let source = match (precedence, source) {
        (OddsPrecedence::PageOnly, _) | (_, None) => {
            if precedence == OddsPrecedence::ExternalOnly {
                clear_odds(&mut out);
            }
            return (out, None);
        }
        (_, Some(source)) => source,
    };

    let resolution = normalizer.resolve(&record.home_team, candidates, matcher);
    let external = resolution
        .accepted()
        .and_then(|(name, score)| source.lookup(name).map(|odds| (name.to_string(), score, odds)))
        .filter(|(_, _, odds)| valid_odds(odds));

    match external {
        Some((matched_name, score, odds)) => {
            out.odds = odds;
            out.source = OddsOrigin::External {
                provider: source.provider().to_string(),
                matched_name,
                score,
            };
        }
        None => {
            if let NameResolution::Rejected { best, score } = &resolution {
                warnings.push(format!(
                    "match {}: closest {} name \"{best}\" scored {score}, below {}",
                    record.index,
                    source.provider(),
                    normalizer.accept_score()
                ));
            }
            if precedence == OddsPrecedence::ExternalOnly {
                clear_odds(&mut out);
            }
        }
    }
    (out, Some(resolution))
}

fn clear_odds(record: &mut MatchRecord) {
    record.odds = Triple::default();
    record.source = OddsOrigin::Missing;
}

fn valid_odds(odds: &Triple<f64>) -> bool {
    [odds.home, odds.draw, odds.away]
        .iter()
        .all(|o| o.is_finite() && *o > 1.0)
}
