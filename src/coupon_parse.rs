use std::env;
use std::ops::Range;

use rayon::prelude::*;
use thiserror::Error;

use crate::state::{CouponKind, MATCHES_PER_COUPON, MatchRecord, OddsOrigin, Triple};
use crate::team_names::clean_team_name;

const DASHES: [char; 4] = ['-', '–', '—', '−'];
const SPACED_SEPARATORS: [&str; 4] = [" - ", " – ", " — ", " − "];
const DISTRIBUTION_TRIGGER: &str = "svenska folket";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponParseError {
    #[error("found {found} of {expected} match numbers in the pasted text")]
    AnchorCount { found: usize, expected: usize },
}

#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub expected_matches: usize,
    /// Lines after the match number searched for the "Home - Away" separator.
    pub name_search_lines: usize,
    /// Lines after the match number used as names when no separator is found.
    pub fallback_name_offsets: (usize, usize),
    pub distribution_window: usize,
    pub odds_window: usize,
    pub odds_trigger_max_len: usize,
    /// How far the last match's block reaches past its match number.
    pub tail_window: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            expected_matches: MATCHES_PER_COUPON,
            name_search_lines: 5,
            fallback_name_offsets: (1, 3),
            distribution_window: 6,
            odds_window: 6,
            odds_trigger_max_len: 20,
            tail_window: 24,
        }
    }
}

impl ParserConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            distribution_window: env_usize("PARSER_DISTRIBUTION_WINDOW", d.distribution_window, 3, 12),
            odds_window: env_usize("PARSER_ODDS_WINDOW", d.odds_window, 3, 12),
            tail_window: env_usize("PARSER_TAIL_WINDOW", d.tail_window, 4, 200),
            name_search_lines: env_usize("PARSER_NAME_SEARCH_LINES", d.name_search_lines, 2, 10),
            ..d
        }
    }
}

fn env_usize(key: &str, default: usize, min: usize, max: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
        .clamp(min, max)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCoupon {
    pub kind: CouponKind,
    pub records: Vec<MatchRecord>,
    pub warnings: Vec<String>,
}

/// A line that is exactly the number of the next match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub index: u8,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockExtract {
    pub record: MatchRecord,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OddsScan {
    Trigger,
    Fallback,
}

pub fn parse_coupon(text: &str, cfg: &ParserConfig) -> Result<ParsedCoupon, CouponParseError> {
    let lines = normalize_lines(text);
    let anchors = find_anchors(&lines, cfg.expected_matches);
    if anchors.len() < cfg.expected_matches {
        return Err(CouponParseError::AnchorCount {
            found: anchors.len(),
            expected: cfg.expected_matches,
        });
    }

    let blocks = block_ranges(&anchors, lines.len(), cfg.tail_window);
    let extracted: Vec<BlockExtract> = blocks
        .par_iter()
        .map(|(index, range)| extract_block(*index, &lines[range.clone()], cfg))
        .collect();

    let mut records = Vec::with_capacity(extracted.len());
    let mut warnings = Vec::new();
    for block in extracted {
        records.push(block.record);
        warnings.extend(block.warnings);
    }

    Ok(ParsedCoupon {
        kind: detect_coupon_kind(text),
        records,
        warnings,
    })
}

/// Trimmed, non-blank lines. Offsets elsewhere count these, not raw lines.
pub fn normalize_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect()
}

/// Finds match numbers 1, 2, 3, ... in strict order.
///
/// Number K is only searched for after K-1 was found, which skips the stray
/// "1"/"2" labels of 1X2 headers and odds columns that precede it.
pub fn find_anchors(lines: &[&str], expected: usize) -> Vec<Anchor> {
    let expected = expected.min(u8::MAX as usize);
    let mut anchors = Vec::with_capacity(expected);
    let mut target = 1usize;

    for (pos, line) in lines.iter().enumerate() {
        if target > expected {
            break;
        }
        if *line != target.to_string() {
            continue;
        }
        let Some(next) = lines.get(pos + 1) else {
            break;
        };
        if is_noise_neighbor(next) {
            continue;
        }
        anchors.push(Anchor {
            index: target as u8,
            line: pos,
        });
        target += 1;
    }

    anchors
}

fn block_ranges(anchors: &[Anchor], total: usize, tail_window: usize) -> Vec<(u8, Range<usize>)> {
    anchors
        .iter()
        .enumerate()
        .map(|(i, anchor)| {
            let end = anchors
                .get(i + 1)
                .map(|next| next.line)
                .unwrap_or_else(|| (anchor.line + tail_window.max(1)).min(total));
            (anchor.index, anchor.line..end)
        })
        .collect()
}

/// Reads one match out of its block. `block[0]` is the match number line.
pub fn extract_block(index: u8, block: &[&str], cfg: &ParserConfig) -> BlockExtract {
    let mut record = MatchRecord::new(index);
    let mut warnings = Vec::new();

    if let Some((home, away)) = find_team_names(block, cfg) {
        record.home_team = clean_team_name(home);
        record.away_team = clean_team_name(away);
    }
    if !record.has_names() {
        warnings.push(format!("match {index}: team names not found"));
    }

    let (has_trigger, pcts) = scan_distribution(block, cfg);
    match Triple::from_slice(&pcts) {
        Some(dist) => record.distribution = dist,
        None if !has_trigger => {
            warnings.push(format!("match {index}: no \"Svenska folket\" section"));
        }
        None => warnings.push(format!(
            "match {index}: distribution incomplete ({} of 3 values)",
            pcts.len()
        )),
    }

    let (scan, prices) = scan_odds(block, cfg);
    match Triple::from_slice(&prices) {
        Some(odds) => {
            record.odds = odds;
            record.source = OddsOrigin::Page;
        }
        None => warnings.push(format!(
            "match {index}: odds missing ({} of 3 prices)",
            prices.len()
        )),
    }
    if scan == OddsScan::Fallback && record.has_odds() {
        warnings.push(format!(
            "match {index}: no odds heading, used the last prices in the block"
        ));
    }

    BlockExtract { record, warnings }
}

fn find_team_names<'a>(block: &[&'a str], cfg: &ParserConfig) -> Option<(&'a str, &'a str)> {
    let end = block.len().min(cfg.name_search_lines + 1);

    // Separator on a line of its own, names on the lines around it.
    for pos in 2..end {
        if !is_dash(block[pos]) {
            continue;
        }
        let (Some(home), Some(away)) = (block.get(pos - 1), block.get(pos + 1)) else {
            continue;
        };
        if !is_boilerplate(home, cfg) && !is_boilerplate(away, cfg) {
            return Some((*home, *away));
        }
    }

    for &line in block.iter().take(end).skip(1) {
        for sep in SPACED_SEPARATORS {
            if let Some((home, away)) = line.split_once(sep) {
                if is_name_part(home) && is_name_part(away) {
                    return Some((home.trim(), away.trim()));
                }
            }
        }
    }

    for &line in block.iter().take(end).skip(1) {
        if line.chars().count() <= 3 || line.chars().filter(|c| DASHES.contains(c)).count() != 1 {
            continue;
        }
        if let Some((home, away)) = line.split_once(DASHES) {
            if is_name_part(home) && is_name_part(away) {
                return Some((home.trim(), away.trim()));
            }
        }
    }

    let (first, second) = cfg.fallback_name_offsets;
    match (block.get(first), block.get(second)) {
        (Some(home), Some(away)) if !is_boilerplate(home, cfg) && !is_boilerplate(away, cfg) => {
            Some((*home, *away))
        }
        _ => None,
    }
}

fn is_name_part(part: &str) -> bool {
    let part = part.trim();
    !part.is_empty() && !looks_numeric(part)
}

fn scan_distribution(block: &[&str], cfg: &ParserConfig) -> (bool, Vec<u32>) {
    let Some(trigger) = block
        .iter()
        .skip(1)
        .position(|l| l.to_lowercase().contains(DISTRIBUTION_TRIGGER))
        .map(|p| p + 1)
    else {
        return (false, Vec::new());
    };
    let start = trigger + 1;
    let window = &block[start..(start + cfg.distribution_window).min(block.len())];

    let mut values: Vec<u32> = window
        .iter()
        .flat_map(|l| percentages_in(l))
        .take(3)
        .collect();
    if values.len() < 3 {
        // The percent sign sometimes gets lost when copying. With an "X" label
        // in the window, bare "1" and "2" lines are sign labels, not values.
        let labelled = window.iter().any(|l| l.eq_ignore_ascii_case("x"));
        values = window
            .iter()
            .filter(|l| !(labelled && matches!(**l, "1" | "2")))
            .flat_map(|l| {
                let pcts = percentages_in(l);
                if pcts.is_empty() {
                    bare_percentage(l).into_iter().collect()
                } else {
                    pcts
                }
            })
            .take(3)
            .collect();
    }
    (true, values)
}

fn scan_odds(block: &[&str], cfg: &ParserConfig) -> (OddsScan, Vec<f64>) {
    let trigger = block
        .iter()
        .skip(1)
        .position(|l| is_odds_trigger(l, cfg))
        .map(|p| p + 1);

    match trigger {
        Some(trigger) => {
            let start = trigger + 1;
            let window = &block[start..(start + cfg.odds_window).min(block.len())];
            let prices = window
                .iter()
                .flat_map(|l| decimals_in(l))
                .take(3)
                .collect();
            (OddsScan::Trigger, prices)
        }
        None => {
            // Prices trail the percentages on most layouts.
            let all: Vec<f64> = block.iter().skip(1).flat_map(|l| decimals_in(l)).collect();
            let start = all.len().saturating_sub(3);
            (OddsScan::Fallback, all[start..].to_vec())
        }
    }
}

fn is_odds_trigger(line: &str, cfg: &ParserConfig) -> bool {
    line.chars().count() <= cfg.odds_trigger_max_len
        && line
            .split(|c: char| !c.is_alphanumeric())
            .any(|w| w.eq_ignore_ascii_case("odds"))
}

/// Percent values on a line, "45%" and "45 %" alike.
fn percentages_in(line: &str) -> Vec<u32> {
    let bytes = line.as_bytes();
    let mut out = Vec::new();
    for (i, b) in bytes.iter().enumerate() {
        if *b != b'%' {
            continue;
        }
        let mut end = i;
        while end > 0 && bytes[end - 1] == b' ' {
            end -= 1;
        }
        let mut start = end;
        while start > 0 && bytes[start - 1].is_ascii_digit() {
            start -= 1;
        }
        if start == end || end - start > 3 {
            continue;
        }
        if start > 0 && matches!(bytes[start - 1], b',' | b'.') {
            continue;
        }
        if let Ok(v) = line[start..end].parse::<u32>() {
            if v <= 100 {
                out.push(v);
            }
        }
    }
    out
}

fn bare_percentage(line: &str) -> Option<u32> {
    if line.is_empty() || line.len() > 3 || !line.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    line.parse::<u32>().ok().filter(|v| *v <= 100)
}

fn decimals_in(line: &str) -> Vec<f64> {
    line.split_whitespace().filter_map(parse_decimal).collect()
}

/// "2,10" or "2.10". Prices at or below 1.0 are not odds.
fn parse_decimal(token: &str) -> Option<f64> {
    let (int, frac) = token.split_once([',', '.'])?;
    let digits = |s: &str, max: usize| {
        !s.is_empty() && s.len() <= max && s.bytes().all(|b| b.is_ascii_digit())
    };
    if !digits(int, 3) || !digits(frac, 3) {
        return None;
    }
    let value: f64 = format!("{int}.{frac}").parse().ok()?;
    (value > 1.0).then_some(value)
}

fn is_dash(line: &str) -> bool {
    let mut chars = line.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if DASHES.contains(&c))
}

fn looks_numeric(line: &str) -> bool {
    line.chars().any(|c| c.is_ascii_digit())
        && line
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '%' | ' '))
}

// Real match numbers are followed by a team name, never by these.
fn is_noise_neighbor(line: &str) -> bool {
    line.eq_ignore_ascii_case("x")
        || is_dash(line)
        || line.to_lowercase().contains("tipsinfo")
        || looks_numeric(line)
}

fn is_boilerplate(line: &str, cfg: &ParserConfig) -> bool {
    is_noise_neighbor(line)
        || line.to_lowercase().contains(DISTRIBUTION_TRIGGER)
        || is_odds_trigger(line, cfg)
}

pub fn detect_coupon_kind(text: &str) -> CouponKind {
    let lower = text.to_lowercase();
    if lower.contains("europatipset") {
        CouponKind::Europatipset
    } else if lower.contains("stryktipset") {
        CouponKind::Stryktipset
    } else {
        CouponKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchors_skip_1x2_header() {
        let lines = vec!["1", "X", "2", "1", "Arsenal", "2", "Leeds"];
        let anchors = find_anchors(&lines, 13);
        assert_eq!(
            anchors,
            vec![Anchor { index: 1, line: 3 }, Anchor { index: 2, line: 5 }]
        );
    }

    #[test]
    fn anchors_are_strictly_sequential() {
        // "3" before "2" does not count, and "2" followed by a price is an odds label.
        let lines = vec!["1", "Arsenal", "3", "Hull", "2", "2,10", "2", "Leeds", "3", "Derby"];
        let anchors = find_anchors(&lines, 13);
        let found: Vec<(u8, usize)> = anchors.iter().map(|a| (a.index, a.line)).collect();
        assert_eq!(found, vec![(1, 0), (2, 6), (3, 8)]);
    }

    #[test]
    fn anchor_followed_by_tipsinfo_is_rejected() {
        let lines = vec!["1", "Tipsinfo", "1", "Arsenal"];
        let anchors = find_anchors(&lines, 13);
        assert_eq!(anchors, vec![Anchor { index: 1, line: 2 }]);
    }

    #[test]
    fn anchor_followed_by_a_dash_is_rejected() {
        let lines = vec!["1", "-", "1", "Arsenal"];
        let anchors = find_anchors(&lines, 13);
        assert_eq!(anchors, vec![Anchor { index: 1, line: 2 }]);
    }

    #[test]
    fn percentages_handle_several_per_line() {
        assert_eq!(percentages_in("45% 30 % 25%"), vec![45, 30, 25]);
        assert_eq!(percentages_in("12,5%"), Vec::<u32>::new());
        assert_eq!(percentages_in("Svenska folket"), Vec::<u32>::new());
    }

    #[test]
    fn decimals_accept_comma_and_dot() {
        assert_eq!(parse_decimal("2,10"), Some(2.10));
        assert_eq!(parse_decimal("3.4"), Some(3.4));
        assert_eq!(parse_decimal("0,95"), None);
        assert_eq!(parse_decimal("45%"), None);
        assert_eq!(parse_decimal("1X2"), None);
    }

    #[test]
    fn block_with_standalone_separator() {
        let block = vec![
            "4", "Leeds", "-", "Derby", "Svenska folket", "50%", "30%", "20%", "Odds", "1,90",
            "3,50", "4,00",
        ];
        let out = extract_block(4, &block, &ParserConfig::default());
        assert_eq!(out.record.home_team, "Leeds");
        assert_eq!(out.record.away_team, "Derby");
        assert_eq!(out.record.distribution, Triple::new(50, 30, 20));
        assert_eq!(out.record.odds, Triple::new(1.90, 3.50, 4.00));
        assert_eq!(out.record.source, OddsOrigin::Page);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn hyphenated_name_is_not_split_when_separator_line_exists() {
        let block = vec!["6", "Paris Saint-Germain", "-", "Lyon"];
        let (home, away) = find_team_names(&block, &ParserConfig::default()).expect("names");
        assert_eq!(home, "Paris Saint-Germain");
        assert_eq!(away, "Lyon");
    }

    #[test]
    fn inline_separator_is_used() {
        let block = vec!["7", "Real Sociedad - Girona", "Svenska folket"];
        let (home, away) = find_team_names(&block, &ParserConfig::default()).expect("names");
        assert_eq!((home, away), ("Real Sociedad", "Girona"));
    }

    #[test]
    fn bare_integers_are_used_when_percent_signs_are_lost() {
        let block = vec!["2", "A", "-", "B", "Svenska folket", "41", "33", "26"];
        let out = extract_block(2, &block, &ParserConfig::default());
        assert_eq!(out.record.distribution, Triple::new(41, 33, 26));
    }

    #[test]
    fn sign_labels_are_not_read_as_bare_values() {
        let block = vec![
            "1", "Arsenal", "-", "Chelsea", "Svenska folket", "1", "41", "X", "33", "2", "26",
        ];
        let out = extract_block(1, &block, &ParserConfig::default());
        assert_eq!(out.record.distribution, Triple::new(41, 33, 26));
    }

    #[test]
    fn missing_fields_become_sentinels() {
        let block = vec!["3", "A", "-", "B", "Svenska folket", "41%", "33%"];
        let out = extract_block(3, &block, &ParserConfig::default());
        assert_eq!(out.record.distribution, Triple::default());
        assert_eq!(out.record.odds, Triple::default());
        assert_eq!(out.record.source, OddsOrigin::Missing);
        assert_eq!(out.warnings.len(), 2);
    }

    #[test]
    fn fallback_takes_last_three_prices() {
        let block = vec![
            "9", "A", "-", "B", "1,50", "Svenska folket", "40%", "30%", "30%", "2,05", "3,30",
            "3,75",
        ];
        let out = extract_block(9, &block, &ParserConfig::default());
        assert_eq!(out.record.odds, Triple::new(2.05, 3.30, 3.75));
    }

    #[test]
    fn oddset_is_not_an_odds_heading() {
        let cfg = ParserConfig::default();
        assert!(is_odds_trigger("Odds", &cfg));
        assert!(is_odds_trigger("Spelbolagens odds", &cfg));
        assert!(!is_odds_trigger("Oddset", &cfg));
        assert!(!is_odds_trigger(
            "Här kan du jämföra odds från flera spelbolag inför helgen",
            &cfg
        ));
    }

    #[test]
    fn coupon_kind_prefers_europatipset() {
        assert_eq!(detect_coupon_kind("Europatipset\nStryktipset"), CouponKind::Europatipset);
        assert_eq!(detect_coupon_kind("STRYKTIPSET"), CouponKind::Stryktipset);
        assert_eq!(detect_coupon_kind("nothing"), CouponKind::Unknown);
    }
}
