use std::cmp::Ordering;
use std::collections::HashMap;
use std::env;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::http_cache::fetch_text_cached;
use crate::http_client::http_client;
use crate::state::Triple;

pub const PROVIDER: &str = "theoddsapi";
const BASE_URL: &str = "https://api.the-odds-api.com/v4/sports";
const DEFAULT_CACHE_TTL_SECS: u64 = 900;

/// Leagues that make up most Stryktipset and Europatipset coupons.
const DEFAULT_SPORT_KEYS: &[&str] = &[
    "soccer_epl",
    "soccer_efl_champ",
    "soccer_uefa_champs_league",
    "soccer_uefa_europa_league",
    "soccer_spain_la_liga",
    "soccer_italy_serie_a",
    "soccer_germany_bundesliga",
    "soccer_france_ligue_one",
    "soccer_sweden_allsvenskan",
    "soccer_portugal_primeira_liga",
    "soccer_netherlands_eredivisie",
];

/// Bookmaker prices keyed by team name.
pub trait OddsSource {
    fn provider(&self) -> &str;
    /// Every name `lookup` answers for.
    fn candidates(&self) -> Vec<String>;
    fn lookup(&self, team_name: &str) -> Option<Triple<f64>>;
}

#[derive(Debug, Clone)]
pub struct OddsFetchConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub regions: String,
    pub sport_keys: Vec<String>,
    pub cache_ttl_secs: u64,
}

impl OddsFetchConfig {
    pub fn from_env() -> Self {
        let enabled = env_bool("ODDS_ENABLED", true);
        let api_key = env::var("ODDS_API_KEY")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let regions = env::var("ODDS_REGIONS")
            .unwrap_or_else(|_| "eu".to_string())
            .trim()
            .to_ascii_lowercase();
        let sport_keys = env::var("ODDS_SPORT_KEYS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|keys| !keys.is_empty())
            .unwrap_or_else(|| DEFAULT_SPORT_KEYS.iter().map(|k| k.to_string()).collect());
        let cache_ttl_secs = env::var("ODDS_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CACHE_TTL_SECS)
            .min(24 * 60 * 60);

        Self {
            enabled,
            api_key,
            regions,
            sport_keys,
            cache_ttl_secs,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OddsEvent {
    home_team: String,
    away_team: String,
    #[serde(default)]
    bookmakers: Vec<OddsBookmaker>,
}

#[derive(Debug, Deserialize)]
struct OddsBookmaker {
    #[serde(default)]
    markets: Vec<OddsMarket>,
}

#[derive(Debug, Deserialize)]
struct OddsMarket {
    key: String,
    #[serde(default)]
    outcomes: Vec<OddsOutcome>,
}

#[derive(Debug, Deserialize)]
struct OddsOutcome {
    name: String,
    price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventPrices {
    pub home_team: String,
    pub away_team: String,
    /// Median decimal price per sign across bookmakers.
    pub prices: Triple<f64>,
    pub bookmakers_used: u8,
}

#[derive(Debug, Clone, Default)]
pub struct ExternalOdds {
    provider: String,
    by_team: HashMap<String, Triple<f64>>,
    pub fetched_at_unix: i64,
}

impl ExternalOdds {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            by_team: HashMap::new(),
            fetched_at_unix: Utc::now().timestamp(),
        }
    }

    /// Files the event under the home team, plus a short alias without "FC" and the like.
    pub fn insert_event(&mut self, event: &EventPrices) {
        self.by_team
            .insert(event.home_team.clone(), event.prices);
        let alias = simplified_name(&event.home_team);
        if alias != event.home_team && !alias.is_empty() {
            self.by_team.entry(alias).or_insert(event.prices);
        }
    }

    pub fn len(&self) -> usize {
        self.by_team.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_team.is_empty()
    }
}

impl OddsSource for ExternalOdds {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn candidates(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_team.keys().cloned().collect();
        names.sort();
        names
    }

    fn lookup(&self, team_name: &str) -> Option<Triple<f64>> {
        self.by_team.get(team_name).copied()
    }
}

pub struct ExternalOddsReport {
    pub odds: ExternalOdds,
    pub leagues_fetched: usize,
    pub errors: Vec<String>,
}

/// Pulls h2h prices for every configured league. A failing league is noted
/// in `errors` and the rest still load.
pub fn fetch_external_odds(cfg: &OddsFetchConfig) -> Result<ExternalOddsReport> {
    let mut report = ExternalOddsReport {
        odds: ExternalOdds::new(PROVIDER),
        leagues_fetched: 0,
        errors: Vec::new(),
    };
    if !cfg.enabled {
        return Ok(report);
    }
    let Some(api_key) = cfg.api_key.as_deref() else {
        report
            .errors
            .push("ODDS_API_KEY missing, using page odds only".to_string());
        return Ok(report);
    };

    let client = http_client()?;
    for sport_key in &cfg.sport_keys {
        match fetch_sport_events(client, sport_key, api_key, cfg) {
            Ok(events) => {
                report.leagues_fetched += 1;
                for event in &events {
                    report.odds.insert_event(event);
                }
            }
            Err(err) => report.errors.push(format!("{sport_key}: {err:#}")),
        }
    }
    Ok(report)
}

fn fetch_sport_events(
    client: &Client,
    sport_key: &str,
    api_key: &str,
    cfg: &OddsFetchConfig,
) -> Result<Vec<EventPrices>> {
    let url = format!(
        "{BASE_URL}/{sport_key}/odds/?apiKey={api_key}&regions={}&markets=h2h&oddsFormat=decimal",
        cfg.regions
    );
    let cache_key = format!("{PROVIDER}:{sport_key}:{}", cfg.regions);
    let body = fetch_text_cached(client, &url, &cache_key, cfg.cache_ttl_secs)
        .context("odds request failed")?;
    parse_odds_events_json(&body)
}

pub fn parse_odds_events_json(raw: &str) -> Result<Vec<EventPrices>> {
    if raw.trim() == "null" {
        return Ok(Vec::new());
    }
    let events: Vec<OddsEvent> = serde_json::from_str(raw).context("invalid odds json")?;
    Ok(events.iter().filter_map(event_prices).collect())
}

fn event_prices(event: &OddsEvent) -> Option<EventPrices> {
    let mut home = Vec::new();
    let mut draw = Vec::new();
    let mut away = Vec::new();

    for bookmaker in &event.bookmakers {
        let Some(market) = bookmaker
            .markets
            .iter()
            .find(|m| m.key.eq_ignore_ascii_case("h2h"))
        else {
            continue;
        };
        let Some((h, d, a)) =
            extract_hda_prices(&market.outcomes, &event.home_team, &event.away_team)
        else {
            continue;
        };
        home.push(h);
        draw.push(d);
        away.push(a);
    }

    Some(EventPrices {
        home_team: event.home_team.clone(),
        away_team: event.away_team.clone(),
        prices: Triple::new(median_f64(&home)?, median_f64(&draw)?, median_f64(&away)?),
        bookmakers_used: home.len().min(u8::MAX as usize) as u8,
    })
}

fn extract_hda_prices(
    outcomes: &[OddsOutcome],
    home_team: &str,
    away_team: &str,
) -> Option<(f64, f64, f64)> {
    let mut home: Option<f64> = None;
    let mut draw: Option<f64> = None;
    let mut away: Option<f64> = None;

    for outcome in outcomes {
        let name = outcome.name.trim();
        if name.eq_ignore_ascii_case(home_team.trim()) {
            home = Some(outcome.price);
        } else if name.eq_ignore_ascii_case(away_team.trim()) {
            away = Some(outcome.price);
        } else if is_draw_label(name) {
            draw = Some(outcome.price);
        }
    }

    match (home, draw, away) {
        (Some(h), Some(d), Some(a)) if h > 1.0 && d > 1.0 && a > 1.0 => Some((h, d, a)),
        _ => None,
    }
}

fn is_draw_label(name: &str) -> bool {
    let n = name.trim().to_ascii_lowercase();
    n == "draw" || n == "tie" || n == "x"
}

fn simplified_name(name: &str) -> String {
    name.split_whitespace()
        .filter(|w| !matches!(*w, "FC" | "AFC" | "AS" | "CF"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| {
            let t = v.trim().to_ascii_lowercase();
            !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
        })
        .unwrap_or(default)
}

fn median_f64(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_even_count_averages() {
        assert_eq!(median_f64(&[2.0, 4.0, 3.0, 5.0]), Some(3.5));
        assert_eq!(median_f64(&[]), None);
    }

    #[test]
    fn simplified_name_drops_club_suffixes() {
        assert_eq!(simplified_name("Brentford FC"), "Brentford");
        assert_eq!(simplified_name("AS Monaco"), "Monaco");
        assert_eq!(simplified_name("Leeds United"), "Leeds United");
    }

    #[test]
    fn alias_does_not_shadow_a_real_team() {
        let mut odds = ExternalOdds::new(PROVIDER);
        odds.insert_event(&EventPrices {
            home_team: "Brentford".to_string(),
            away_team: "Fulham".to_string(),
            prices: Triple::new(2.0, 3.4, 3.8),
            bookmakers_used: 1,
        });
        odds.insert_event(&EventPrices {
            home_team: "Brentford FC".to_string(),
            away_team: "Fulham".to_string(),
            prices: Triple::new(9.0, 9.0, 9.0),
            bookmakers_used: 1,
        });
        assert_eq!(odds.lookup("Brentford"), Some(Triple::new(2.0, 3.4, 3.8)));
        assert_eq!(odds.lookup("Brentford FC"), Some(Triple::new(9.0, 9.0, 9.0)));
        assert_eq!(odds.len(), 2);
    }

    #[test]
    fn disabled_fetch_makes_no_request() {
        let cfg = OddsFetchConfig {
            enabled: false,
            api_key: Some("k".to_string()),
            regions: "eu".to_string(),
            sport_keys: vec!["soccer_epl".to_string()],
            cache_ttl_secs: 900,
        };
        let report = fetch_external_odds(&cfg).expect("disabled fetch is ok");
        assert!(report.odds.is_empty());
        assert!(report.errors.is_empty());
    }

    #[test]
    fn missing_key_is_reported_not_fatal() {
        let cfg = OddsFetchConfig {
            enabled: true,
            api_key: None,
            regions: "eu".to_string(),
            sport_keys: vec!["soccer_epl".to_string()],
            cache_ttl_secs: 900,
        };
        let report = fetch_external_odds(&cfg).expect("missing key is ok");
        assert_eq!(report.leagues_fetched, 0);
        assert_eq!(report.errors.len(), 1);
    }
}
