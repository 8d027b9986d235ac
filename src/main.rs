use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Bar, BarChart, BarGroup, Block, Borders, Clear, Paragraph, Wrap};

use tipset_terminal::analysis_export::export_coupon_xlsx;
use tipset_terminal::coupon_analysis::{AnalysisConfig, AnalyzedMatch, OddsPrecedence, analyze_coupon};
use tipset_terminal::odds_fetch::{ExternalOdds, OddsFetchConfig, OddsSource, fetch_external_odds};
use tipset_terminal::state::{AppState, OddsOrigin, Screen, Sign, coupon_kind_label};
use tipset_terminal::team_names::{StrsimMatcher, TeamNormalizer};
use tipset_terminal::valuation::StatusLabel;

struct App {
    state: AppState,
    should_quit: bool,
    cfg: AnalysisConfig,
    odds_cfg: OddsFetchConfig,
    normalizer: TeamNormalizer,
    external: Option<ExternalOdds>,
    external_loaded_at: Option<Instant>,
}

impl App {
    fn new() -> Self {
        let cfg = AnalysisConfig::from_env();
        let odds_cfg = OddsFetchConfig::from_env();
        let mut state = AppState::new();

        let normalizer = match cfg.aliases_file.as_ref() {
            Some(path) => match TeamNormalizer::from_aliases_file(path, cfg.accept_score) {
                Ok(n) => {
                    state.push_log(format!("[INFO] Team aliases loaded from {}", path.display()));
                    n
                }
                Err(err) => {
                    state.push_log(format!("[WARN] {err:#}, using built-in aliases"));
                    TeamNormalizer::with_default_translations(cfg.accept_score)
                }
            },
            None => TeamNormalizer::with_default_translations(cfg.accept_score),
        };

        Self {
            state,
            should_quit: false,
            cfg,
            odds_cfg,
            normalizer,
            external: None,
            external_loaded_at: None,
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        if self.state.help_overlay {
            if matches!(key.code, KeyCode::Char('?') | KeyCode::Esc) {
                self.state.help_overlay = false;
            }
            return;
        }
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('a') | KeyCode::Enter => self.analyze(),
            KeyCode::Char('c') => {
                self.state.clear_paste();
                self.state.push_log("[INFO] Paste cleared");
            }
            KeyCode::Char('p') | KeyCode::Esc => self.state.screen = Screen::Paste,
            KeyCode::Char('v') => self.state.toggle_value_view(),
            KeyCode::Char('j') | KeyCode::Down => self.state.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.state.select_prev(),
            KeyCode::Char('r') => {
                self.load_external_odds(true);
                if self.state.analysis.is_some() {
                    self.analyze();
                }
            }
            KeyCode::Char('e') => self.export(),
            KeyCode::Char('?') => self.state.help_overlay = true,
            _ => {}
        }
    }

    fn on_paste(&mut self, text: &str) {
        self.state.append_paste(text);
        self.state.push_log(format!(
            "[INFO] Pasted text, {} lines in buffer",
            self.state.paste_line_count()
        ));
    }

    fn analyze(&mut self) {
        if self.state.paste_buffer.trim().is_empty() {
            self.state.push_log("[INFO] Paste a coupon first");
            return;
        }
        self.load_external_odds(false);

        let source: Option<&dyn OddsSource> = match self.cfg.precedence {
            OddsPrecedence::PageOnly => None,
            _ => self
                .external
                .as_ref()
                .filter(|odds| !odds.is_empty())
                .map(|odds| odds as &dyn OddsSource),
        };
        let result = analyze_coupon(
            &self.state.paste_buffer,
            &self.cfg,
            &self.normalizer,
            source,
            &StrsimMatcher,
        );
        self.state.apply_analysis(result);
    }

    fn load_external_odds(&mut self, force: bool) {
        if self.cfg.precedence == OddsPrecedence::PageOnly || !self.odds_cfg.enabled {
            return;
        }
        let ttl = Duration::from_secs(self.odds_cfg.cache_ttl_secs);
        let fresh = self
            .external_loaded_at
            .map(|t| t.elapsed() < ttl)
            .unwrap_or(false);
        if fresh && !force {
            return;
        }

        match fetch_external_odds(&self.odds_cfg) {
            Ok(report) => {
                for err in &report.errors {
                    self.state.push_log(format!("[WARN] Odds: {err}"));
                }
                self.state.push_log(format!(
                    "[INFO] Odds: {} team prices from {} leagues",
                    report.odds.len(),
                    report.leagues_fetched
                ));
                self.external = Some(report.odds);
                self.external_loaded_at = Some(Instant::now());
            }
            Err(err) => self.state.push_log(format!("[ERROR] Odds fetch failed: {err:#}")),
        }
    }

    fn export(&mut self) {
        let Some(analysis) = self.state.analysis.as_ref() else {
            self.state.push_log("[INFO] Nothing to export yet");
            return;
        };
        let path = std::env::var("EXPORT_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
                PathBuf::from(format!("tipset_analysis_{stamp}.xlsx"))
            });
        match export_coupon_xlsx(&path, analysis) {
            Ok(report) => {
                let msg = format!(
                    "Exported {} matches to {}",
                    report.matches,
                    path.display()
                );
                self.state.push_log(format!("[INFO] {msg}"));
                self.state.last_export = Some(msg);
            }
            Err(err) => self.state.push_log(format!("[ERROR] Export failed: {err:#}")),
        }
    }
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let mut app = App::new();
    if let Some(path) = std::env::args().nth(1).map(PathBuf::from) {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("read coupon {}", path.display()))?;
        app.on_paste(&text);
        app.analyze();
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => app.on_key(key),
                Event::Paste(text) => app.on_paste(&text),
                _ => {}
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let area = frame.size();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(6),
            Constraint::Length(2),
        ])
        .split(area);

    let header = Paragraph::new(header_text(&app.state))
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    match app.state.screen {
        Screen::Paste => render_paste(frame, chunks[1], &app.state),
        Screen::Coupon => render_coupon(frame, chunks[1], &app.state),
        Screen::Value => render_value(frame, chunks[1], &app.state),
    }

    let console = Paragraph::new(console_text(&app.state, chunks[2].height.saturating_sub(2)))
        .block(Block::default().title("Console").borders(Borders::ALL));
    frame.render_widget(console, chunks[2]);

    let footer = Paragraph::new(footer_text(&app.state))
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, chunks[3]);

    if app.state.help_overlay {
        render_help_overlay(frame, area);
    }
}

fn header_text(state: &AppState) -> String {
    let kind = state
        .analysis
        .as_ref()
        .map(|a| coupon_kind_label(a.kind))
        .unwrap_or("Coupon");
    let view = match state.screen {
        Screen::Paste => "PASTE",
        Screen::Coupon => "TIPS",
        Screen::Value => "VALUE",
    };
    let line1 = format!("  1X2  TIPSET TERMINAL | {kind} | {view}");
    let line2 = match state.analysis.as_ref() {
        Some(a) => {
            let s = a.summary();
            format!(
                "       {} strong value | {} overbet | {} missing odds | {} priced externally",
                s.strong_value, s.overbet, s.missing_odds, s.external_odds
            )
        }
        None => "       No coupon analysed".to_string(),
    };
    format!("{line1}\n{line2}")
}

fn footer_text(state: &AppState) -> String {
    match state.screen {
        Screen::Paste => "paste text | a/Enter Analyse | c Clear | v Tips | ? Help | q Quit".to_string(),
        Screen::Coupon | Screen::Value => {
            "j/k/↑/↓ Move | v Tips/Value | r Refresh odds | e Export | p Paste | ? Help | q Quit"
                .to_string()
        }
    }
}

fn render_paste(frame: &mut Frame, area: Rect, state: &AppState) {
    let mut text = vec![
        "Copy the whole Stryktipset or Europatipset page and paste it here.".to_string(),
        format!("{} non-blank lines in buffer.", state.paste_line_count()),
        String::new(),
    ];
    let preview_rows = area.height.saturating_sub(5) as usize;
    text.extend(
        state
            .paste_buffer
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .take(preview_rows)
            .map(|l| format!("  {l}")),
    );
    let paragraph = Paragraph::new(text.join("\n"))
        .block(Block::default().title("Paste").borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn coupon_columns() -> [Constraint; 7] {
    [
        Constraint::Length(4),
        Constraint::Min(24),
        Constraint::Length(6),
        Constraint::Length(20),
        Constraint::Length(20),
        Constraint::Length(14),
        Constraint::Length(12),
    ]
}

fn render_coupon(frame: &mut Frame, area: Rect, state: &AppState) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(area);

    let widths = coupon_columns();
    render_header_row(
        frame,
        sections[0],
        &widths,
        &["#", "Match", "Tips", "Status", "Implied 1/X/2", "Public 1/X/2", "Odds"],
    );

    let list_area = sections[1];
    let matches = state.matches();
    if matches.is_empty() {
        let empty = Paragraph::new("No coupon analysed, press p and paste one")
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, list_area);
        return;
    }

    let visible = list_area.height as usize;
    let (start, end) = visible_range(state.selected, matches.len(), visible);
    for (i, idx) in (start..end).enumerate() {
        let row_area = Rect {
            x: list_area.x,
            y: list_area.y + i as u16,
            width: list_area.width,
            height: 1,
        };
        let selected = idx == state.selected;
        let row_style = if selected {
            Style::default().fg(Color::White).bg(Color::DarkGray)
        } else {
            Style::default()
        };
        if selected {
            frame.render_widget(Block::default().style(row_style), row_area);
        }
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(widths)
            .split(row_area);

        let m = &matches[idx];
        let status_style = row_style.fg(status_color(m.valuation.status));
        render_cell_text(frame, cols[0], &m.record.index.to_string(), row_style);
        render_cell_text(
            frame,
            cols[1],
            &format!("{} - {}", m.record.home_team, m.record.away_team),
            row_style,
        );
        render_cell_text(
            frame,
            cols[2],
            &m.valuation.recommendation.to_string(),
            row_style.add_modifier(Modifier::BOLD),
        );
        render_cell_text(
            frame,
            cols[3],
            &format!("{} {}", m.valuation.status.badge(), m.valuation.status),
            status_style,
        );
        render_cell_text(frame, cols[4], &implied_text(m), row_style);
        render_cell_text(frame, cols[5], &public_text(m), row_style);
        render_cell_text(frame, cols[6], &source_text(&m.record.source), row_style);
    }
}

fn render_value(frame: &mut Frame, area: Rect, state: &AppState) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(columns[0]);
    let widths = [
        Constraint::Length(4),
        Constraint::Min(18),
        Constraint::Length(8),
        Constraint::Length(8),
        Constraint::Length(8),
    ];
    render_header_row(frame, sections[0], &widths, &["#", "Home", "Val 1", "Val X", "Val 2"]);

    let list_area = sections[1];
    let matches = state.matches();
    let visible = list_area.height as usize;
    let (start, end) = visible_range(state.selected, matches.len(), visible);
    for (i, idx) in (start..end).enumerate() {
        let row_area = Rect {
            x: list_area.x,
            y: list_area.y + i as u16,
            width: list_area.width,
            height: 1,
        };
        let selected = idx == state.selected;
        let row_style = if selected {
            Style::default().fg(Color::White).bg(Color::DarkGray)
        } else {
            Style::default()
        };
        if selected {
            frame.render_widget(Block::default().style(row_style), row_area);
        }
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(widths)
            .split(row_area);

        let m = &matches[idx];
        render_cell_text(frame, cols[0], &m.record.index.to_string(), row_style);
        render_cell_text(frame, cols[1], &m.record.home_team, row_style);
        for (col, sign) in Sign::ALL.into_iter().enumerate() {
            let text = if m.valuation.status == StatusLabel::MissingOdds {
                "-".to_string()
            } else {
                format!("{:+.1}", m.valuation.value[sign])
            };
            let style = row_style.fg(value_color(m.valuation.value[sign]));
            render_cell_text(frame, cols[col + 2], &text, style);
        }
    }

    let detail = Block::default()
        .title("Implied vs public")
        .borders(Borders::ALL);
    let inner = detail.inner(columns[1]);
    frame.render_widget(detail, columns[1]);
    match state.selected_match() {
        Some(m) if m.valuation.status != StatusLabel::MissingOdds => {
            frame.render_widget(value_bar_chart(m), inner);
        }
        Some(_) => {
            let empty = Paragraph::new("No odds for this match")
                .style(Style::default().fg(Color::DarkGray));
            frame.render_widget(empty, inner);
        }
        None => {}
    }
}

fn value_bar_chart(m: &AnalyzedMatch) -> BarChart<'static> {
    let mut chart = BarChart::default()
        .bar_width(4)
        .bar_gap(1)
        .group_gap(3)
        .max(100);
    for sign in Sign::ALL {
        let implied = Bar::default()
            .value(m.valuation.implied[sign].round().max(0.0) as u64)
            .style(Style::default().fg(Color::Cyan));
        let public = Bar::default()
            .value(m.record.distribution[sign] as u64)
            .style(Style::default().fg(Color::Magenta));
        chart = chart.data(
            BarGroup::default()
                .label(Line::from(sign.label()))
                .bars(&[implied, public]),
        );
    }
    chart
}

fn render_header_row(frame: &mut Frame, area: Rect, widths: &[Constraint], labels: &[&str]) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(widths)
        .split(area);
    let style = Style::default().add_modifier(Modifier::BOLD);
    for (col, label) in cols.iter().zip(labels) {
        render_cell_text(frame, *col, label, style);
    }
}

fn render_cell_text(frame: &mut Frame, area: Rect, text: &str, style: Style) {
    if area.width == 0 || area.height == 0 {
        return;
    }
    let paragraph = Paragraph::new(text.to_string()).style(style);
    frame.render_widget(paragraph, area);
}

fn visible_range(selected: usize, total: usize, visible: usize) -> (usize, usize) {
    if total == 0 {
        return (0, 0);
    }
    if total <= visible {
        return (0, total);
    }

    let mut start = selected.saturating_sub(visible / 2);
    if start + visible > total {
        start = total - visible;
    }
    (start, start + visible)
}

fn implied_text(m: &AnalyzedMatch) -> String {
    if m.valuation.status == StatusLabel::MissingOdds {
        return "-".to_string();
    }
    let p = &m.valuation.implied;
    format!("{:.0}/{:.0}/{:.0}", p.home, p.draw, p.away)
}

fn public_text(m: &AnalyzedMatch) -> String {
    if !m.record.has_distribution() {
        return "-".to_string();
    }
    let d = &m.record.distribution;
    format!("{}/{}/{}", d.home, d.draw, d.away)
}

fn source_text(source: &OddsOrigin) -> String {
    match source {
        OddsOrigin::External { score, .. } => format!("api {score}"),
        other => other.label(),
    }
}

fn status_color(status: StatusLabel) -> Color {
    match status {
        StatusLabel::StrongValue(_) => Color::Green,
        StatusLabel::Overbet => Color::Red,
        StatusLabel::Neutral => Color::Gray,
        StatusLabel::MissingOdds => Color::Yellow,
    }
}

fn value_color(value: f64) -> Color {
    if value > 0.0 {
        Color::Green
    } else if value < 0.0 {
        Color::Red
    } else {
        Color::Gray
    }
}

fn console_text(state: &AppState, rows: u16) -> String {
    if state.logs.is_empty() {
        return "No messages yet".to_string();
    }
    let rows = rows.max(1) as usize;
    let skip = state.logs.len().saturating_sub(rows);
    state
        .logs
        .iter()
        .skip(skip)
        .cloned()
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 60, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "Tipset Terminal - Help",
        "",
        "Paste:",
        "  (paste)      Append clipboard text",
        "  a / Enter    Analyse coupon",
        "  c            Clear buffer",
        "",
        "Tips / Value:",
        "  j/k or ↑/↓   Move",
        "  v            Toggle tips / value view",
        "  r            Refresh external odds",
        "  e            Export to xlsx",
        "  p / Esc      Back to paste",
        "",
        "  ?            Toggle help",
        "  q            Quit",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}
