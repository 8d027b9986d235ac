use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::Context;
use serde_json::json;

use tipset_terminal::coupon_analysis::{AnalysisConfig, CouponAnalysis, OddsPrecedence, analyze_coupon};
use tipset_terminal::odds_fetch::{OddsFetchConfig, OddsSource, fetch_external_odds};
use tipset_terminal::state::{Sign, coupon_kind_label};
use tipset_terminal::team_names::{StrsimMatcher, TeamNormalizer};

// Usage: coupon_report [--json] [--page-odds] [coupon.txt]
// Reads stdin when no file is given.
fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let mut as_json = false;
    let mut page_odds = false;
    let mut path: Option<PathBuf> = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--json" => as_json = true,
            "--page-odds" => page_odds = true,
            _ => path = Some(PathBuf::from(arg)),
        }
    }

    let text = match path.as_ref() {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("read coupon from stdin")?;
            buf
        }
    };

    let mut cfg = AnalysisConfig::from_env();
    if page_odds {
        cfg.precedence = OddsPrecedence::PageOnly;
    }
    let normalizer = match cfg.aliases_file.as_ref() {
        Some(path) => TeamNormalizer::from_aliases_file(path, cfg.accept_score)?,
        None => TeamNormalizer::with_default_translations(cfg.accept_score),
    };

    let external = if cfg.precedence == OddsPrecedence::PageOnly {
        None
    } else {
        let report = fetch_external_odds(&OddsFetchConfig::from_env())?;
        for err in &report.errors {
            eprintln!("[WARN] odds: {err}");
        }
        Some(report.odds).filter(|odds| !odds.is_empty())
    };
    let source = external.as_ref().map(|odds| odds as &dyn OddsSource);

    let analysis = analyze_coupon(&text, &cfg, &normalizer, source, &StrsimMatcher)?;
    for warning in &analysis.warnings {
        eprintln!("[WARN] {warning}");
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&analysis_json(&analysis))?);
    } else {
        print_table(&analysis);
    }
    Ok(())
}

fn analysis_json(analysis: &CouponAnalysis) -> serde_json::Value {
    let matches: Vec<_> = analysis
        .matches
        .iter()
        .map(|m| {
            json!({
                "index": m.record.index,
                "home_team": m.record.home_team,
                "away_team": m.record.away_team,
                "distribution": m.record.distribution,
                "odds": m.record.odds,
                "odds_source": m.record.source,
                "implied": m.valuation.implied,
                "value": m.valuation.value,
                "recommendation": m.valuation.recommendation.to_string(),
                "status": m.valuation.status.to_string(),
            })
        })
        .collect();
    json!({
        "coupon": coupon_kind_label(analysis.kind),
        "summary": analysis.summary(),
        "matches": matches,
        "warnings": analysis.warnings,
    })
}

fn print_table(analysis: &CouponAnalysis) {
    println!("{}", coupon_kind_label(analysis.kind));
    println!(
        "{:>2}  {:<40} {:<5} {:<18} {:>17} {:>17}",
        "#", "Match", "Tips", "Status", "Value 1/X/2", "Public 1/X/2"
    );
    for m in &analysis.matches {
        let values = Sign::ALL
            .iter()
            .map(|s| format!("{:+.1}", m.valuation.value[*s]))
            .collect::<Vec<_>>()
            .join("/");
        let public = Sign::ALL
            .iter()
            .map(|s| m.record.distribution[*s].to_string())
            .collect::<Vec<_>>()
            .join("/");
        println!(
            "{:>2}  {:<40} {:<5} {:<18} {:>17} {:>17}",
            m.record.index,
            format!("{} - {}", m.record.home_team, m.record.away_team),
            m.valuation.recommendation.to_string(),
            m.valuation.status.to_string(),
            values,
            public
        );
    }
    let s = analysis.summary();
    println!(
        "{} strong value, {} overbet, {} neutral, {} missing odds, {} priced externally",
        s.strong_value, s.overbet, s.neutral, s.missing_odds, s.external_odds
    );
}
