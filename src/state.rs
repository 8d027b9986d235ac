use std::collections::VecDeque;
use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::coupon_analysis::{AnalyzedMatch, CouponAnalysis};
use crate::coupon_parse::CouponParseError;

pub const MATCHES_PER_COUPON: usize = 13;
pub const PLACEHOLDER_TEAM: &str = "-";

/// One pools sign: "1" home win, "X" draw, "2" away win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sign {
    Home,
    Draw,
    Away,
}

impl Sign {
    /// Coupon order.
    pub const ALL: [Sign; 3] = [Sign::Home, Sign::Draw, Sign::Away];

    pub fn label(self) -> &'static str {
        match self {
            Sign::Home => "1",
            Sign::Draw => "X",
            Sign::Away => "2",
        }
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One value per sign.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Triple<T> {
    pub home: T,
    pub draw: T,
    pub away: T,
}

impl<T: Copy> Triple<T> {
    pub fn new(home: T, draw: T, away: T) -> Self {
        Self { home, draw, away }
    }

    pub fn get(&self, sign: Sign) -> T {
        match sign {
            Sign::Home => self.home,
            Sign::Draw => self.draw,
            Sign::Away => self.away,
        }
    }

    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Triple<U> {
        Triple {
            home: f(self.home),
            draw: f(self.draw),
            away: f(self.away),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Sign, T)> + '_ {
        Sign::ALL.into_iter().map(move |s| (s, self.get(s)))
    }

    /// Builds a triple from the first three values, if there are at least three.
    pub fn from_slice(values: &[T]) -> Option<Self> {
        match values {
            [home, draw, away, ..] => Some(Self::new(*home, *draw, *away)),
            _ => None,
        }
    }
}

impl<T> Index<Sign> for Triple<T> {
    type Output = T;

    fn index(&self, sign: Sign) -> &T {
        match sign {
            Sign::Home => &self.home,
            Sign::Draw => &self.draw,
            Sign::Away => &self.away,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CouponKind {
    Stryktipset,
    Europatipset,
    Unknown,
}

pub fn coupon_kind_label(kind: CouponKind) -> &'static str {
    match kind {
        CouponKind::Stryktipset => "Stryktipset",
        CouponKind::Europatipset => "Europatipset",
        CouponKind::Unknown => "Coupon",
    }
}

/// Where a record's odds came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OddsOrigin {
    Page,
    External {
        provider: String,
        matched_name: String,
        score: u8,
    },
    Missing,
}

impl OddsOrigin {
    pub fn label(&self) -> String {
        match self {
            OddsOrigin::Page => "page".to_string(),
            OddsOrigin::External { provider, .. } => provider.clone(),
            OddsOrigin::Missing => "none".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub index: u8,
    pub home_team: String,
    pub away_team: String,
    /// Public betting split in percent. All zeros when it could not be parsed.
    pub distribution: Triple<u32>,
    /// Decimal odds. `0.0` marks a missing price.
    pub odds: Triple<f64>,
    pub source: OddsOrigin,
}

impl MatchRecord {
    pub fn new(index: u8) -> Self {
        Self {
            index,
            home_team: PLACEHOLDER_TEAM.to_string(),
            away_team: PLACEHOLDER_TEAM.to_string(),
            distribution: Triple::default(),
            odds: Triple::default(),
            source: OddsOrigin::Missing,
        }
    }

    pub fn has_odds(&self) -> bool {
        Sign::ALL
            .iter()
            .all(|s| self.odds[*s].is_finite() && self.odds[*s] > 0.0)
    }

    pub fn has_distribution(&self) -> bool {
        self.distribution != Triple::default()
    }

    pub fn has_names(&self) -> bool {
        self.home_team != PLACEHOLDER_TEAM && self.away_team != PLACEHOLDER_TEAM
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Paste,
    Coupon,
    Value,
}

pub struct AppState {
    pub screen: Screen,
    pub paste_buffer: String,
    pub analysis: Option<CouponAnalysis>,
    pub selected: usize,
    pub help_overlay: bool,
    pub logs: VecDeque<String>,
    pub last_export: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            screen: Screen::Paste,
            paste_buffer: String::new(),
            analysis: None,
            selected: 0,
            help_overlay: false,
            logs: VecDeque::new(),
            last_export: None,
        }
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        const MAX_LOGS: usize = 200;
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn append_paste(&mut self, text: &str) {
        if !self.paste_buffer.is_empty() && !self.paste_buffer.ends_with('\n') {
            self.paste_buffer.push('\n');
        }
        self.paste_buffer.push_str(text);
    }

    pub fn clear_paste(&mut self) {
        self.paste_buffer.clear();
        self.analysis = None;
        self.selected = 0;
        self.screen = Screen::Paste;
    }

    pub fn paste_line_count(&self) -> usize {
        self.paste_buffer
            .lines()
            .filter(|l| !l.trim().is_empty())
            .count()
    }

    /// Stores a finished analysis, or reports why the paste could not be read.
    pub fn apply_analysis(&mut self, result: Result<CouponAnalysis, CouponParseError>) {
        match result {
            Ok(analysis) => {
                for warning in &analysis.warnings {
                    self.push_log(format!("[WARN] {warning}"));
                }
                let summary = analysis.summary();
                self.push_log(format!(
                    "[INFO] Analysed {} matches: {} strong value, {} overbet, {} missing odds",
                    analysis.matches.len(),
                    summary.strong_value,
                    summary.overbet,
                    summary.missing_odds
                ));
                self.analysis = Some(analysis);
                self.selected = 0;
                self.screen = Screen::Coupon;
            }
            Err(err) => {
                self.push_log(format!("[ERROR] {err}"));
                self.push_log("[INFO] Copy the whole coupon page and paste it again");
                self.analysis = None;
                self.selected = 0;
                self.screen = Screen::Paste;
            }
        }
    }

    pub fn matches(&self) -> &[AnalyzedMatch] {
        self.analysis
            .as_ref()
            .map(|a| a.matches.as_slice())
            .unwrap_or(&[])
    }

    pub fn selected_match(&self) -> Option<&AnalyzedMatch> {
        self.matches().get(self.selected)
    }

    pub fn select_next(&mut self) {
        let total = self.matches().len();
        if total == 0 {
            self.selected = 0;
            return;
        }
        self.selected = (self.selected + 1).min(total - 1);
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn toggle_value_view(&mut self) {
        self.screen = match self.screen {
            Screen::Coupon => Screen::Value,
            Screen::Value => Screen::Coupon,
            Screen::Paste if self.analysis.is_some() => Screen::Coupon,
            Screen::Paste => Screen::Paste,
        };
    }
}
