use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use tipset_terminal::coupon_analysis::{AnalysisConfig, OddsPrecedence, analyze_coupon};
use tipset_terminal::odds_fetch::{ExternalOdds, OddsSource, PROVIDER, parse_odds_events_json};
use tipset_terminal::state::{AppState, OddsOrigin, Screen, Triple};
use tipset_terminal::team_names::{DEFAULT_ACCEPT_SCORE, NameResolution, StrsimMatcher, TeamNormalizer};
use tipset_terminal::valuation::StatusLabel;

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

struct FakeOdds {
    prices: HashMap<String, Triple<f64>>,
}

impl FakeOdds {
    fn new(entries: &[(&str, (f64, f64, f64))]) -> Self {
        let prices = entries
            .iter()
            .map(|(name, (h, d, a))| (name.to_string(), Triple::new(*h, *d, *a)))
            .collect();
        Self { prices }
    }
}

impl OddsSource for FakeOdds {
    fn provider(&self) -> &str {
        "fake"
    }

    fn candidates(&self) -> Vec<String> {
        let mut names: Vec<String> = self.prices.keys().cloned().collect();
        names.sort();
        names
    }

    fn lookup(&self, team_name: &str) -> Option<Triple<f64>> {
        self.prices.get(team_name).copied()
    }
}

fn config(precedence: OddsPrecedence) -> AnalysisConfig {
    AnalysisConfig {
        precedence,
        ..AnalysisConfig::default()
    }
}

fn normalizer() -> TeamNormalizer {
    TeamNormalizer::with_default_translations(DEFAULT_ACCEPT_SCORE)
}

fn provider_odds() -> ExternalOdds {
    let raw = read_fixture("odds_api_events.json");
    let mut odds = ExternalOdds::new(PROVIDER);
    for event in parse_odds_events_json(&raw).expect("fixture should parse") {
        odds.insert_event(&event);
    }
    odds
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn provider_events_use_median_prices() {
    let raw = read_fixture("odds_api_events.json");
    let events = parse_odds_events_json(&raw).expect("fixture should parse");
    // Leeds has no draw price and Hull only a spreads market.
    let homes: Vec<&str> = events.iter().map(|e| e.home_team.as_str()).collect();
    assert_eq!(
        homes,
        vec!["Arsenal", "Newcastle United", "Brighton and Hove Albion", "Manchester City"]
    );

    let arsenal = &events[0];
    assert_eq!(arsenal.bookmakers_used, 2);
    assert!(close(arsenal.prices.home, 2.15));
    assert!(close(arsenal.prices.draw, 3.45));
    assert!(close(arsenal.prices.away, 3.50));

    let newcastle = &events[1];
    assert_eq!(newcastle.bookmakers_used, 3);
    assert_eq!(newcastle.prices, Triple::new(1.90, 3.60, 4.40));
}

#[test]
fn null_body_means_no_events() {
    assert!(parse_odds_events_json("null").expect("null is ok").is_empty());
    assert!(parse_odds_events_json("{not json").is_err());
}

#[test]
fn external_odds_replace_page_odds_when_names_match() {
    let raw = read_fixture("stryktipset_full.txt");
    let odds = provider_odds();
    let analysis = analyze_coupon(
        &raw,
        &config(OddsPrecedence::ExternalFirst),
        &normalizer(),
        Some(&odds),
        &StrsimMatcher,
    )
    .expect("fixture should parse");

    let arsenal = &analysis.matches[0];
    assert_eq!(
        arsenal.record.source,
        OddsOrigin::External {
            provider: PROVIDER.to_string(),
            matched_name: "Arsenal".to_string(),
            score: 100,
        }
    );
    assert_eq!(
        arsenal.name_match,
        Some(NameResolution::Exact("Arsenal".to_string()))
    );
    assert!(close(arsenal.record.odds.home, 2.15));

    let brighton = &analysis.matches[1];
    assert_eq!(brighton.record.odds, Triple::new(2.05, 3.45, 3.70));
    match &brighton.record.source {
        OddsOrigin::External {
            matched_name,
            score,
            ..
        } => {
            assert_eq!(matched_name, "Brighton and Hove Albion");
            assert!(*score >= DEFAULT_ACCEPT_SCORE);
        }
        other => panic!("expected provider odds, got {other:?}"),
    }

    let newcastle = &analysis.matches[2];
    assert_eq!(newcastle.record.odds, Triple::new(1.90, 3.60, 4.40));

    // No provider price for Aston Villa, the page odds stay.
    let villa = &analysis.matches[3];
    assert_eq!(villa.record.source, OddsOrigin::Page);
    assert_eq!(villa.record.odds, Triple::new(1.75, 3.80, 4.60));

    let summary = analysis.summary();
    assert_eq!(summary.external_odds, 3);
    assert_eq!(summary.missing_odds, 1);
}

#[test]
fn page_only_ignores_the_provider() {
    let raw = read_fixture("stryktipset_full.txt");
    let odds = provider_odds();
    let analysis = analyze_coupon(
        &raw,
        &config(OddsPrecedence::PageOnly),
        &normalizer(),
        Some(&odds),
        &StrsimMatcher,
    )
    .expect("fixture should parse");

    assert!(analysis.matches.iter().all(|m| m.name_match.is_none()));
    assert_eq!(analysis.matches[0].record.odds, Triple::new(1.85, 3.60, 4.20));

    let summary = analysis.summary();
    assert_eq!(summary.external_odds, 0);
    assert_eq!(summary.strong_value, 4);
    assert_eq!(summary.overbet, 0);
    assert_eq!(summary.neutral, 8);
    assert_eq!(summary.missing_odds, 1);
}

#[test]
fn external_only_drops_page_odds_without_a_match() {
    let raw = read_fixture("stryktipset_full.txt");
    let source = FakeOdds::new(&[("Arsenal", (2.50, 3.20, 2.90))]);
    let analysis = analyze_coupon(
        &raw,
        &config(OddsPrecedence::ExternalOnly),
        &normalizer(),
        Some(&source),
        &StrsimMatcher,
    )
    .expect("fixture should parse");

    assert_eq!(analysis.matches[0].record.odds, Triple::new(2.50, 3.20, 2.90));
    for m in &analysis.matches[1..] {
        assert_eq!(m.record.source, OddsOrigin::Missing, "match {}", m.record.index);
        assert_eq!(m.valuation.status, StatusLabel::MissingOdds);
    }
    assert_eq!(analysis.summary().missing_odds, 12);
}

#[test]
fn low_scoring_name_is_rejected_and_reported() {
    let raw = read_fixture("stryktipset_full.txt");
    let odds = provider_odds();
    let strict = TeamNormalizer::with_default_translations(99);
    let analysis = analyze_coupon(
        &raw,
        &config(OddsPrecedence::ExternalFirst),
        &strict,
        Some(&odds),
        &StrsimMatcher,
    )
    .expect("fixture should parse");

    let brighton = &analysis.matches[1];
    assert_eq!(brighton.record.source, OddsOrigin::Page);
    assert_eq!(brighton.record.odds, Triple::new(2.00, 3.50, 3.80));
    assert!(matches!(
        brighton.name_match,
        Some(NameResolution::Rejected { .. })
    ));
    assert!(
        analysis
            .warnings
            .iter()
            .any(|w| w.starts_with("match 2:") && w.contains("Brighton and Hove Albion"))
    );
    // Exact hits are unaffected by the threshold.
    assert!(matches!(
        analysis.matches[0].record.source,
        OddsOrigin::External { .. }
    ));
}

#[test]
fn translated_name_finds_the_provider_team() {
    let raw = read_fixture("stryktipset_full.txt");
    let source = FakeOdds::new(&[
        ("Sheffield United", (1.70, 3.80, 5.00)),
        ("Sheffield Wednesday", (2.40, 3.30, 3.00)),
    ]);
    let analysis = analyze_coupon(
        &raw,
        &config(OddsPrecedence::ExternalFirst),
        &normalizer(),
        Some(&source),
        &StrsimMatcher,
    )
    .expect("fixture should parse");

    let sheffield = &analysis.matches[11];
    assert_eq!(sheffield.record.odds, Triple::new(1.70, 3.80, 5.00));
    assert_eq!(
        sheffield.name_match,
        Some(NameResolution::Exact("Sheffield United".to_string()))
    );
}

#[test]
fn app_state_reports_a_short_paste() {
    let raw = read_fixture("coupon_ten_matches.txt");
    let mut state = AppState::new();
    state.append_paste(&raw);
    let result = analyze_coupon(
        &state.paste_buffer,
        &AnalysisConfig::default(),
        &normalizer(),
        None,
        &StrsimMatcher,
    );
    state.apply_analysis(result);

    assert!(state.analysis.is_none());
    assert_eq!(state.screen, Screen::Paste);
    assert!(state.logs.iter().any(|l| l.starts_with("[ERROR]") && l.contains("10 of 13")));
}

#[test]
fn app_state_moves_to_the_coupon_after_analysis() {
    let raw = read_fixture("stryktipset_full.txt");
    let mut state = AppState::new();
    state.append_paste(&raw);
    let result = analyze_coupon(
        &state.paste_buffer,
        &config(OddsPrecedence::PageOnly),
        &normalizer(),
        None,
        &StrsimMatcher,
    );
    state.apply_analysis(result);

    assert_eq!(state.screen, Screen::Coupon);
    assert_eq!(state.matches().len(), 13);
    for _ in 0..20 {
        state.select_next();
    }
    assert_eq!(state.selected, 12);
    state.toggle_value_view();
    assert_eq!(state.screen, Screen::Value);
    assert!(state.logs.iter().any(|l| l.starts_with("[WARN] match 11:")));
}
