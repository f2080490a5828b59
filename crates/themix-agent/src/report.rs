//! Run persistence: JSON artifacts plus an Excel workbook per run.
//!
//! Layout under `results_dir`:
//!   <run>/<run>_input_params.json
//!   <run>/<run>_{enrichr,toppfun,gprofiler}_results.json
//!   <run>/<run>_literature_results.json
//!   <run>/<run>_themed_results.json
//!   <run>/enrichment_analysis.xlsx

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde::Serialize;
use tracing::debug;

use themix_common::models::{
    AggregatedResult, AnalysisResult, EnrichmentTerm, GeneList, LiteratureRecord, Theme,
};
use themix_common::{Result, ThemixError};

use crate::agent::{sanitise_analysis_name, AnalysisRequest};

/// Everything a finished run produced, borrowed for writing.
pub struct RunArtifacts<'a> {
    pub request: &'a AnalysisRequest,
    pub genes: &'a GeneList,
    pub enrichr_terms: &'a [EnrichmentTerm],
    pub toppfun_terms: &'a [EnrichmentTerm],
    pub gprofiler_terms: &'a [EnrichmentTerm],
    pub literature: &'a [LiteratureRecord],
    pub aggregated: &'a AggregatedResult,
    pub result: &'a AnalysisResult,
}

#[derive(Serialize)]
struct InputParams<'a> {
    genes: &'a [String],
    email: &'a str,
    background_genes: &'a [String],
    ranked: bool,
    search_terms: &'a [String],
    context: &'a str,
    timestamp: String,
}

/// Write all artifacts for one run and return the run directory.
pub fn save_run(results_dir: &str, artifacts: &RunArtifacts<'_>) -> Result<PathBuf> {
    let name = run_name(artifacts.request);
    let dir = Path::new(results_dir).join(&name);
    fs::create_dir_all(&dir)?;
    debug!(dir = %dir.display(), "Writing run artifacts");

    let params = InputParams {
        genes: artifacts.genes.symbols(),
        email: &artifacts.request.email,
        background_genes: &artifacts.request.background_genes,
        ranked: artifacts.request.ranked,
        search_terms: &artifacts.request.search_terms,
        context: &artifacts.request.context,
        timestamp: Local::now().to_rfc3339(),
    };
    write_json(&dir, &format!("{name}_input_params.json"), &params)?;
    write_json(&dir, &format!("{name}_enrichr_results.json"), &artifacts.enrichr_terms)?;
    write_json(&dir, &format!("{name}_toppfun_results.json"), &artifacts.toppfun_terms)?;
    write_json(&dir, &format!("{name}_gprofiler_results.json"), &artifacts.gprofiler_terms)?;
    write_json(&dir, &format!("{name}_literature_results.json"), &artifacts.literature)?;
    write_json(&dir, &format!("{name}_themed_results.json"), &artifacts.result)?;

    write_workbook(&dir.join("enrichment_analysis.xlsx"), artifacts)
        .map_err(|e| ThemixError::Io(std::io::Error::other(e.to_string())))?;

    Ok(dir)
}

fn run_name(request: &AnalysisRequest) -> String {
    match request.analysis_name.as_deref().map(sanitise_analysis_name) {
        Some(name) if !name.is_empty() => name,
        _ => format!("run_{}", Local::now().format("%Y_%m_%d_%H_%M_%S")),
    }
}

fn write_json<T: Serialize>(dir: &Path, file: &str, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    fs::write(dir.join(file), body)?;
    Ok(())
}

// ── Workbook ────────────────────────────────────────────────────────────────

fn write_workbook(
    path: &Path,
    artifacts: &RunArtifacts<'_>,
) -> std::result::Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    write_summary_sheet(workbook.add_worksheet(), artifacts, &bold)?;

    let mut used_names: HashSet<String> = HashSet::new();
    used_names.insert("Summary".to_string());
    used_names.insert("Literature Findings".to_string());
    for theme in &artifacts.result.themes {
        let sheet_name = unique_sheet_name(&theme.name, &mut used_names);
        write_theme_sheet(workbook.add_worksheet(), &sheet_name, theme, artifacts, &bold)?;
    }

    write_literature_sheet(workbook.add_worksheet(), artifacts.literature, &bold)?;

    workbook.save(path)
}

fn write_summary_sheet(
    sheet: &mut Worksheet,
    artifacts: &RunArtifacts<'_>,
    bold: &Format,
) -> std::result::Result<(), XlsxError> {
    sheet.set_name("Summary")?;
    sheet.set_column_width(0, 18)?;
    sheet.set_column_width(1, 90)?;

    sheet.write_string_with_format(0, 0, "Genes", bold)?;
    sheet.write_string(0, 1, artifacts.genes.join(", "))?;
    sheet.write_string_with_format(1, 0, "Ranked", bold)?;
    sheet.write_string(1, 1, if artifacts.request.ranked { "yes" } else { "no" })?;
    sheet.write_string_with_format(2, 0, "Context", bold)?;
    sheet.write_string(2, 1, artifacts.request.context.as_str())?;
    sheet.write_string_with_format(3, 0, "Search terms", bold)?;
    sheet.write_string(3, 1, artifacts.request.search_terms.join(", "))?;

    sheet.write_string_with_format(5, 0, "Summary", bold)?;
    sheet.write_string(5, 1, artifacts.result.summary.as_str())?;

    sheet.write_string_with_format(7, 0, "Theme", bold)?;
    sheet.write_string_with_format(7, 1, "Description", bold)?;
    let mut row = 8;
    for theme in &artifacts.result.themes {
        sheet.write_string(row, 0, theme.name.as_str())?;
        sheet.write_string(row, 1, theme.description.as_str())?;
        row += 1;
    }
    Ok(())
}

fn write_theme_sheet(
    sheet: &mut Worksheet,
    sheet_name: &str,
    theme: &Theme,
    artifacts: &RunArtifacts<'_>,
    bold: &Format,
) -> std::result::Result<(), XlsxError> {
    sheet.set_name(sheet_name)?;
    sheet.set_column_width(0, 16)?;
    sheet.set_column_width(1, 60)?;
    sheet.set_column_width(2, 24)?;
    sheet.set_column_width(4, 50)?;

    sheet.write_string_with_format(0, 0, "Theme", bold)?;
    sheet.write_string(0, 1, theme.name.as_str())?;
    sheet.write_string_with_format(1, 0, "Description", bold)?;
    sheet.write_string(1, 1, theme.description.as_str())?;
    let theme_genes: Vec<&str> = theme.genes.iter().map(String::as_str).collect();
    sheet.write_string_with_format(2, 0, "Genes", bold)?;
    sheet.write_string(2, 1, theme_genes.join(", "))?;

    sheet.write_string_with_format(4, 0, "Term ID", bold)?;
    sheet.write_string_with_format(4, 1, "Name", bold)?;
    sheet.write_string_with_format(4, 2, "Tools", bold)?;
    sheet.write_string_with_format(4, 3, "Best adj. p", bold)?;
    sheet.write_string_with_format(4, 4, "Overlapping genes", bold)?;

    let mut row = 5;
    for term_id in &theme.term_ids {
        // Synthesis already validated membership; a miss here only skips a row.
        let Some(entry) = artifacts.aggregated.get(term_id) else { continue };
        let tools: Vec<&str> = entry.terms.iter().map(|t| t.tool.as_str()).collect();
        let genes: Vec<&str> = entry.genes.iter().map(String::as_str).collect();
        sheet.write_string(row, 0, entry.term_id.as_str())?;
        sheet.write_string(row, 1, entry.display_name())?;
        sheet.write_string(row, 2, tools.join(","))?;
        sheet.write_number(row, 3, entry.best_adjusted_p)?;
        sheet.write_string(row, 4, genes.join(","))?;
        row += 1;
    }
    Ok(())
}

fn write_literature_sheet(
    sheet: &mut Worksheet,
    literature: &[LiteratureRecord],
    bold: &Format,
) -> std::result::Result<(), XlsxError> {
    sheet.set_name("Literature Findings")?;
    sheet.set_column_width(0, 12)?;
    sheet.set_column_width(2, 70)?;
    sheet.set_column_width(4, 90)?;

    sheet.write_string_with_format(0, 0, "PMID", bold)?;
    sheet.write_string_with_format(0, 1, "Year", bold)?;
    sheet.write_string_with_format(0, 2, "Title", bold)?;
    sheet.write_string_with_format(0, 3, "Matched genes", bold)?;
    sheet.write_string_with_format(0, 4, "Abstract", bold)?;

    for (i, record) in literature.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_string(row, 0, record.pmid.as_str())?;
        sheet.write_string(row, 1, record.year.as_deref().unwrap_or(""))?;
        sheet.write_string(row, 2, record.title.as_str())?;
        sheet.write_string(row, 3, record.matched_genes.join(","))?;
        sheet.write_string(row, 4, record.abstract_snippet.as_deref().unwrap_or(""))?;
    }
    Ok(())
}

/// Excel sheet names reject []:*?/\ and cap at 31 characters.
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().to_string();
    let cleaned = if cleaned.is_empty() { "Sheet".to_string() } else { cleaned };
    cleaned.chars().take(31).collect()
}

fn unique_sheet_name(name: &str, used: &mut HashSet<String>) -> String {
    let base = sanitize_sheet_name(name);
    let mut candidate = base.clone();
    let mut counter = 2;
    while !used.insert(candidate.clone()) {
        let suffix = format!(" ({counter})");
        let keep = 31usize.saturating_sub(suffix.chars().count());
        candidate = format!("{}{suffix}", base.chars().take(keep).collect::<String>());
        counter += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_sheet_name_replaces_forbidden_chars() {
        assert_eq!(sanitize_sheet_name("Cell cycle: G1/S"), "Cell cycle_ G1_S");
        assert_eq!(sanitize_sheet_name("[DNA] repair?"), "_DNA_ repair_");
    }

    #[test]
    fn test_sanitize_sheet_name_truncates_to_31() {
        let long = "a very long functional theme name that keeps going";
        assert_eq!(sanitize_sheet_name(long).chars().count(), 31);
    }

    #[test]
    fn test_sanitize_sheet_name_empty_falls_back() {
        assert_eq!(sanitize_sheet_name("   "), "Sheet");
    }

    #[test]
    fn test_unique_sheet_name_disambiguates() {
        let mut used = HashSet::new();
        assert_eq!(unique_sheet_name("Apoptosis", &mut used), "Apoptosis");
        assert_eq!(unique_sheet_name("Apoptosis", &mut used), "Apoptosis (2)");
        assert_eq!(unique_sheet_name("Apoptosis", &mut used), "Apoptosis (3)");
    }
}
