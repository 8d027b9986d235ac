use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use tipset_terminal::coupon_analysis::{AnalysisConfig, OddsPrecedence, analyze_coupon};
use tipset_terminal::coupon_parse::{ParserConfig, parse_coupon};
use tipset_terminal::team_names::{DEFAULT_ACCEPT_SCORE, StrsimMatcher, TeamNormalizer, similarity_score};
use tipset_terminal::valuation::{ValuationConfig, evaluate};

fn bench_parse_coupon(c: &mut Criterion) {
    let cfg = ParserConfig::default();
    c.bench_function("parse_coupon", |b| {
        b.iter(|| {
            let coupon = parse_coupon(black_box(COUPON), &cfg).unwrap();
            black_box(coupon.records.len());
        })
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let coupon = parse_coupon(COUPON, &ParserConfig::default()).unwrap();
    let cfg = ValuationConfig::default();
    c.bench_function("evaluate_coupon", |b| {
        b.iter(|| {
            for record in &coupon.records {
                black_box(evaluate(black_box(record), &cfg));
            }
        })
    });
}

fn bench_analyze_page_odds(c: &mut Criterion) {
    let cfg = AnalysisConfig {
        precedence: OddsPrecedence::PageOnly,
        ..AnalysisConfig::default()
    };
    let normalizer = TeamNormalizer::with_default_translations(DEFAULT_ACCEPT_SCORE);
    c.bench_function("analyze_coupon_page_odds", |b| {
        b.iter(|| {
            let analysis =
                analyze_coupon(black_box(COUPON), &cfg, &normalizer, None, &StrsimMatcher).unwrap();
            black_box(analysis.summary());
        })
    });
}

fn bench_similarity(c: &mut Criterion) {
    c.bench_function("similarity_score", |b| {
        b.iter(|| {
            black_box(similarity_score(
                black_box("Wolverhampton"),
                black_box("Wolverhampton Wanderers"),
            ))
        })
    });
}

criterion_group!(
    perf,
    bench_parse_coupon,
    bench_evaluate,
    bench_analyze_page_odds,
    bench_similarity
);
criterion_main!(perf);

static COUPON: &str = include_str!("../tests/fixtures/stryktipset_full.txt");
