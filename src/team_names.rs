use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use strsim::jaro_winkler;

use crate::state::PLACEHOLDER_TEAM;

pub const DEFAULT_ACCEPT_SCORE: u8 = 85;

/// Coupon names that differ from what odds providers call the club.
const DEFAULT_TRANSLATIONS: &[(&str, &str)] = &[
    ("Sheffield U", "Sheffield United"),
    ("Sheffield W", "Sheffield Wednesday"),
    ("Queens Park Rangers", "QPR"),
    ("Wolverhampton", "Wolverhampton Wanderers"),
    ("Wolves", "Wolverhampton Wanderers"),
    ("Blackburn", "Blackburn Rovers"),
    ("West Bromwich", "West Bromwich Albion"),
    ("WBA", "West Bromwich Albion"),
    ("IFK Gbg", "IFK Göteborg"),
    ("Malmö", "Malmö FF"),
    ("Djurgården", "Djurgårdens IF"),
    ("AIK", "AIK Stockholm"),
    ("Paris Saint-Germain", "Paris Saint Germain"),
    ("PSG", "Paris Saint Germain"),
    ("Inter", "Inter Milan"),
    ("AC Milan", "Milan"),
    ("Bayern München", "Bayern Munich"),
    ("Athletic Bilbao", "Athletic Club"),
    ("Sporting Lissabon", "Sporting CP"),
    ("Royale Union SG", "Union St. Gilloise"),
    ("Marseille", "Olympique de Marseille"),
    ("Ajax", "Ajax Amsterdam"),
    ("Bodö/Glimt", "Bodo/Glimt"),
];

/// Finds the closest candidate name and scores it 0..=100.
pub trait ApproximateMatcher {
    fn best_match(&self, query: &str, candidates: &[String]) -> Option<(String, u8)>;
}

/// Scores names by the mean of Jaro-Winkler similarity and shared-word overlap.
///
/// Word overlap keeps "Manchester United" from pairing with "Manchester City"
/// while still letting "Wolverhampton" find "Wolverhampton Wanderers".
#[derive(Debug, Clone, Copy, Default)]
pub struct StrsimMatcher;

impl ApproximateMatcher for StrsimMatcher {
    fn best_match(&self, query: &str, candidates: &[String]) -> Option<(String, u8)> {
        let mut best: Option<(&String, u8)> = None;
        for candidate in candidates {
            let score = similarity_score(query, candidate);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((candidate, score)),
            }
        }
        best.map(|(name, score)| (name.clone(), score))
    }
}

pub fn similarity_score(a: &str, b: &str) -> u8 {
    let a_norm = words(a).join(" ");
    let b_norm = words(b).join(" ");
    if a_norm.is_empty() || b_norm.is_empty() {
        return 0;
    }
    let jw = jaro_winkler(&a_norm, &b_norm);
    let overlap = word_overlap(&a_norm, &b_norm);
    (((jw + overlap) / 2.0) * 100.0).round().clamp(0.0, 100.0) as u8
}

fn word_overlap(a: &str, b: &str) -> f64 {
    let a_words: HashSet<&str> = a.split_whitespace().collect();
    let b_words: HashSet<&str> = b.split_whitespace().collect();
    let shorter = a_words.len().min(b_words.len());
    if shorter == 0 {
        return 0.0;
    }
    a_words.intersection(&b_words).count() as f64 / shorter as f64
}

fn words(name: &str) -> Vec<String> {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Outcome of mapping a coupon name onto an odds provider's names.
#[derive(Debug, Clone, PartialEq)]
pub enum NameResolution {
    Exact(String),
    Approximate { name: String, score: u8 },
    Rejected { best: String, score: u8 },
    NoCandidates,
}

impl NameResolution {
    /// Name that may be used for a lookup. Rejected matches never are.
    pub fn accepted(&self) -> Option<(&str, u8)> {
        match self {
            NameResolution::Exact(name) => Some((name.as_str(), 100)),
            NameResolution::Approximate { name, score } => Some((name.as_str(), *score)),
            NameResolution::Rejected { .. } | NameResolution::NoCandidates => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TeamNormalizer {
    translations: HashMap<String, String>,
    accept_score: u8,
}

impl TeamNormalizer {
    pub fn new(translations: HashMap<String, String>, accept_score: u8) -> Self {
        Self {
            translations,
            accept_score,
        }
    }

    pub fn with_default_translations(accept_score: u8) -> Self {
        Self::new(default_translations(), accept_score)
    }

    /// Default translations with the entries of a JSON object file laid on top.
    pub fn from_aliases_file(path: &Path, accept_score: u8) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read team aliases {}", path.display()))?;
        let extra: HashMap<String, String> =
            serde_json::from_str(&raw).context("team aliases must be a JSON object of strings")?;
        let mut translations = default_translations();
        translations.extend(extra);
        Ok(Self::new(translations, accept_score))
    }

    pub fn accept_score(&self) -> u8 {
        self.accept_score
    }

    pub fn canonical<'a>(&'a self, name: &'a str) -> &'a str {
        self.translations
            .get(name)
            .map(String::as_str)
            .unwrap_or(name)
    }

    pub fn resolve(
        &self,
        name: &str,
        candidates: &[String],
        matcher: &dyn ApproximateMatcher,
    ) -> NameResolution {
        if candidates.is_empty() {
            return NameResolution::NoCandidates;
        }
        let query = self.canonical(name);
        if let Some(hit) = candidates.iter().find(|c| c.eq_ignore_ascii_case(query)) {
            return NameResolution::Exact(hit.clone());
        }
        match matcher.best_match(query, candidates) {
            Some((best, score)) if score >= self.accept_score => {
                NameResolution::Approximate { name: best, score }
            }
            Some((best, score)) => NameResolution::Rejected { best, score },
            None => NameResolution::NoCandidates,
        }
    }
}

pub fn default_translations() -> HashMap<String, String> {
    DEFAULT_TRANSLATIONS
        .iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect()
}

/// Strips copy-paste debris from a team name.
///
/// Returns the placeholder when nothing usable is left.
pub fn clean_team_name(raw: &str) -> String {
    let mut name = strip_ordinal_prefix(raw.trim());

    let mut tokens: Vec<&str> = name.split_whitespace().collect();
    while tokens.first().is_some_and(|t| is_sign_token(t)) {
        tokens.remove(0);
    }
    while tokens.last().is_some_and(|t| is_sign_token(t)) {
        tokens.pop();
    }
    name = tokens.join(" ");
    name = strip_glued_signs(&name);

    let name = name
        .trim_matches(|c: char| !(c.is_alphanumeric() || c == ')' || c == '.'))
        .to_string();
    if name.is_empty() {
        PLACEHOLDER_TEAM.to_string()
    } else {
        name
    }
}

fn is_sign_token(token: &str) -> bool {
    matches!(token, "1" | "X" | "2")
}

// "1. Arsenal", "12) Brentford", "3: Leeds". Longer numbers are club names ("1860 München").
fn strip_ordinal_prefix(raw: &str) -> String {
    let digits = raw.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits > 2 {
        return raw.to_string();
    }
    let rest = raw[digits..].trim_start();
    match rest.chars().next() {
        Some('.' | ')' | ':') => rest[1..].trim_start().to_string(),
        _ => raw.to_string(),
    }
}

// "Everton1X" -> "Everton"
fn strip_glued_signs(name: &str) -> String {
    let trimmed = name.trim_end_matches(['1', 'X', '2']);
    if trimmed.len() == name.len() {
        return name.to_string();
    }
    match trimmed.chars().last() {
        Some(c) if c.is_lowercase() => trimmed.to_string(),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_strips_ordinals_and_sign_debris() {
        assert_eq!(clean_team_name("1. Arsenal"), "Arsenal");
        assert_eq!(clean_team_name("12) Brentford"), "Brentford");
        assert_eq!(clean_team_name("Arsenal 1"), "Arsenal");
        assert_eq!(clean_team_name("X Chelsea"), "Chelsea");
        assert_eq!(clean_team_name("Everton1X"), "Everton");
        assert_eq!(clean_team_name("  Hull   City "), "Hull City");
        assert_eq!(clean_team_name("• Leeds •"), "Leeds");
    }

    #[test]
    fn clean_keeps_numbers_that_belong_to_the_name() {
        assert_eq!(clean_team_name("1860 München"), "1860 München");
        assert_eq!(clean_team_name("Schalke 04"), "Schalke 04");
        assert_eq!(clean_team_name("Union St. Gilloise"), "Union St. Gilloise");
    }

    #[test]
    fn clean_falls_back_to_placeholder() {
        assert_eq!(clean_team_name("X"), PLACEHOLDER_TEAM);
        assert_eq!(clean_team_name("  "), PLACEHOLDER_TEAM);
    }

    #[test]
    fn canonical_uses_exact_translation_only() {
        let n = TeamNormalizer::with_default_translations(DEFAULT_ACCEPT_SCORE);
        assert_eq!(n.canonical("Wolves"), "Wolverhampton Wanderers");
        assert_eq!(n.canonical("wolves"), "wolves");
    }

    #[test]
    fn prefix_name_is_accepted() {
        let score = similarity_score("Wolverhampton", "Wolverhampton Wanderers");
        assert!(score >= DEFAULT_ACCEPT_SCORE, "score {score}");
    }

    #[test]
    fn shared_city_is_not_enough() {
        let score = similarity_score("Manchester United", "Manchester City");
        assert!(score < DEFAULT_ACCEPT_SCORE, "score {score}");
    }

    #[test]
    fn resolve_rejects_low_scores() {
        let n = TeamNormalizer::new(HashMap::new(), DEFAULT_ACCEPT_SCORE);
        let candidates = vec!["Chelsea".to_string(), "Everton".to_string()];
        let res = n.resolve("Arsenal", &candidates, &StrsimMatcher);
        assert!(matches!(res, NameResolution::Rejected { .. }));
        assert!(res.accepted().is_none());
    }

    #[test]
    fn resolve_prefers_translated_exact_hit() {
        let n = TeamNormalizer::with_default_translations(DEFAULT_ACCEPT_SCORE);
        let candidates = vec![
            "Sheffield United".to_string(),
            "Sheffield Wednesday".to_string(),
        ];
        let res = n.resolve("Sheffield W", &candidates, &StrsimMatcher);
        assert_eq!(res, NameResolution::Exact("Sheffield Wednesday".to_string()));
    }
}
