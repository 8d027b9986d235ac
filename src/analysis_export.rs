use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::coupon_analysis::{AnalyzedMatch, CouponAnalysis};
use crate::state::{OddsOrigin, Sign, coupon_kind_label};

pub struct ExportReport {
    pub matches: usize,
    pub value_rows: usize,
}

pub fn export_coupon_xlsx(path: &Path, analysis: &CouponAnalysis) -> Result<ExportReport> {
    let summary_rows = analysis_rows(analysis);
    let value_rows = value_rows(analysis);

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet
            .set_name("Analysis")
            .context("name analysis sheet")?;
        write_rows(sheet, &summary_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Value").context("name value sheet")?;
        write_rows(sheet, &value_rows)?;
    }
    workbook
        .save(path)
        .with_context(|| format!("save {}", path.display()))?;

    Ok(ExportReport {
        matches: summary_rows.len().saturating_sub(1),
        value_rows: value_rows.len().saturating_sub(1),
    })
}

pub fn analysis_rows(analysis: &CouponAnalysis) -> Vec<Vec<String>> {
    let mut rows = vec![vec![
        "Match".to_string(),
        "Home".to_string(),
        "Away".to_string(),
        "Tips".to_string(),
        "Status".to_string(),
        "Odds source".to_string(),
        "Matched name".to_string(),
        "Score".to_string(),
        "Coupon".to_string(),
    ]];
    let kind = coupon_kind_label(analysis.kind);
    rows.extend(analysis.matches.iter().map(|m| analysis_row(m, kind)));
    rows
}

fn analysis_row(m: &AnalyzedMatch, kind: &str) -> Vec<String> {
    let (matched, score) = match &m.record.source {
        OddsOrigin::External {
            matched_name,
            score,
            ..
        } => (matched_name.clone(), score.to_string()),
        _ => (String::new(), String::new()),
    };
    vec![
        m.record.index.to_string(),
        m.record.home_team.clone(),
        m.record.away_team.clone(),
        m.valuation.recommendation.to_string(),
        m.valuation.status.to_string(),
        m.record.source.label(),
        matched,
        score,
        kind.to_string(),
    ]
}

pub fn value_rows(analysis: &CouponAnalysis) -> Vec<Vec<String>> {
    let mut header = vec!["Match".to_string(), "Home".to_string()];
    for prefix in ["Odds", "Implied", "Public", "Value"] {
        for sign in Sign::ALL {
            header.push(format!("{prefix} {sign}"));
        }
    }
    let mut rows = vec![header];
    for m in &analysis.matches {
        let mut row = vec![m.record.index.to_string(), m.record.home_team.clone()];
        row.extend(Sign::ALL.iter().map(|s| fmt_price(m.record.odds[*s])));
        row.extend(Sign::ALL.iter().map(|s| format!("{:.1}", m.valuation.implied[*s])));
        row.extend(Sign::ALL.iter().map(|s| m.record.distribution[*s].to_string()));
        row.extend(Sign::ALL.iter().map(|s| format!("{:+.1}", m.valuation.value[*s])));
        rows.push(row);
    }
    rows
}

fn fmt_price(price: f64) -> String {
    if price > 0.0 {
        format!("{price:.2}")
    } else {
        "-".to_string()
    }
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell {row_idx}:{col_idx}"))?;
        }
    }
    Ok(())
}
