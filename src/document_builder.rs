//! Document Builder Module
//!
//! Assembles the results of a run into a report and renders it as HTML,
//! Markdown or JSON.

use crate::dictionary::DefinitionResult;
use crate::highlight::{self, Highlighted, MatchMode, SearchOutcome, escape_html, escape_markdown};
use crate::ocr::RecognizedLine;
use crate::region::SourceRectangle;
use anyhow::Result;
use serde::Serialize;
use std::fmt::{self, Write as _};

/// Output document format.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Html,
    Md,
    Json,
}

/// Where the text came from.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
}

/// Result of one keyword search.
#[derive(Debug, Clone, Serialize)]
pub struct KeywordReport {
    pub keyword: String,
    pub match_mode: MatchMode,
    pub matches: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<DefinitionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meaning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search: Option<String>,
    #[serde(skip)]
    highlighted: Option<Highlighted>,
}

impl KeywordReport {
    /// Builds the report for a search; `None` when no keyword was entered.
    pub fn from_outcome(
        outcome: SearchOutcome,
        mode: MatchMode,
        definition: Option<DefinitionResult>,
    ) -> Option<Self> {
        let (query, highlighted) = match outcome {
            SearchOutcome::NoKeyword => return None,
            SearchOutcome::NoMatches { query } => (query, None),
            SearchOutcome::Matches { query, highlighted } => (query, Some(highlighted)),
        };
        Some(KeywordReport {
            keyword: query.as_str().to_string(),
            match_mode: mode,
            matches: highlighted.as_ref().map_or(0, Highlighted::match_count),
            markup: highlighted.as_ref().map(Highlighted::markup),
            meaning: definition.as_ref().map(ToString::to_string),
            definition,
            web_search: highlight::web_search_url(&query).ok().map(String::from),
            highlighted,
        })
    }
}

/// Everything produced for one image.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub source: SourceInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<SourceRectangle>,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<String>,
    pub text: String,
    pub lines: Vec<RecognizedLine>,
    pub searches: Vec<KeywordReport>,
}

/// Renders a complete report.
pub fn render_report(report: &Report, format: OutputFormat) -> Result<String> {
    let mut out = String::new();
    match format {
        OutputFormat::Json => {
            out = serde_json::to_string_pretty(report)?;
            out.push('\n');
        }
        OutputFormat::Md => write_report_markdown(&mut out, report)?,
        OutputFormat::Html => write_report_html(&mut out, report)?,
    }
    Ok(out)
}

/// Renders a single keyword result, used by interactive mode.
pub fn render_keyword(search: &KeywordReport, format: OutputFormat) -> Result<String> {
    let mut out = String::new();
    match format {
        OutputFormat::Json => {
            out = serde_json::to_string(search)?;
            out.push('\n');
        }
        OutputFormat::Md => write_keyword_markdown(&mut out, search)?,
        OutputFormat::Html => write_keyword_html(&mut out, search)?,
    }
    Ok(out)
}

/// A backtick fence longer than any backtick run inside `text`.
fn code_fence(text: &str, min: usize) -> String {
    let longest = text
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(min.max(longest + 1))
}

fn write_report_markdown(out: &mut String, report: &Report) -> fmt::Result {
    writeln!(out, "# OCR Results\n")?;
    let fence = code_fence(&report.source.path, 1);
    writeln!(
        out,
        "Source: {fence} {} {fence} ({}x{}, {})  ",
        report.source.path, report.source.width, report.source.height, report.source.format
    )?;
    if let Some(region) = &report.region {
        writeln!(out, "Selected region: {}  ", region)?;
    }
    writeln!(out, "OCR backend: {}\n", escape_markdown(&report.backend))?;

    if let Some(error) = &report.extraction_error {
        writeln!(out, "> **Error:** {}\n", escape_markdown(error))?;
    }

    writeln!(out, "## Extracted Text\n")?;
    if report.text.trim().is_empty() {
        writeln!(out, "_No text was recognized._\n")?;
    } else {
        let fence = code_fence(&report.text, 3);
        writeln!(out, "{fence}text\n{}\n{fence}\n", report.text)?;
    }

    for search in &report.searches {
        write_keyword_markdown(out, search)?;
    }
    Ok(())
}

fn write_keyword_markdown(out: &mut String, search: &KeywordReport) -> fmt::Result {
    let keyword = escape_markdown(&search.keyword);
    writeln!(out, "## Search Results for '{}'\n", keyword)?;
    match &search.highlighted {
        None => writeln!(out, "No matches for '{}'.\n", keyword)?,
        Some(highlighted) => writeln!(
            out,
            "{} match(es):\n\n{}\n",
            search.matches,
            highlighted.render_markdown()
        )?,
    }
    if let Some(meaning) = &search.meaning {
        writeln!(out, "### Meaning of '{}'\n\n{}\n", keyword, escape_markdown(meaning))?;
    }
    if let (Some(url), Some(_)) = (&search.web_search, &search.highlighted) {
        writeln!(out, "[Search '{}' on Google](<{}>)\n", keyword, url)?;
    }
    Ok(())
}

fn write_report_html(out: &mut String, report: &Report) -> fmt::Result {
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>OCR Results</title>\n");
    out.push_str("<style>body { background-color: white; color: black; font-family: sans-serif; }</style>\n");
    out.push_str("</head>\n<body>\n<h1>OCR Results</h1>\n");
    writeln!(
        out,
        "<p>Source: <code>{}</code> ({}x{}, {})</p>",
        escape_html(&report.source.path),
        report.source.width,
        report.source.height,
        report.source.format
    )?;
    if let Some(region) = &report.region {
        writeln!(out, "<p>Selected region: {}</p>", region)?;
    }
    writeln!(out, "<p>OCR backend: {}</p>", escape_html(&report.backend))?;

    if let Some(error) = &report.extraction_error {
        writeln!(out, "<p class=\"error\"><strong>Error:</strong> {}</p>", escape_html(error))?;
    }

    out.push_str("<h2>Extracted Text</h2>\n");
    if report.text.trim().is_empty() {
        out.push_str("<p><em>No text was recognized.</em></p>\n");
    } else {
        writeln!(out, "<pre>{}</pre>", escape_html(&report.text))?;
    }

    for search in &report.searches {
        write_keyword_html(out, search)?;
    }
    out.push_str("</body>\n</html>\n");
    Ok(())
}

fn write_keyword_html(out: &mut String, search: &KeywordReport) -> fmt::Result {
    let keyword = escape_html(&search.keyword);
    writeln!(out, "<h2>Search Results for '{}'</h2>", keyword)?;
    match &search.highlighted {
        None => writeln!(out, "<p>No matches for '{}'.</p>", keyword)?,
        Some(highlighted) => writeln!(out, "<div>{}</div>", highlighted.render_html())?,
    }
    if let Some(meaning) = &search.meaning {
        writeln!(
            out,
            "<h3>Meaning of '{}'</h3>\n<p>{}</p>",
            keyword,
            escape_html(meaning)
        )?;
    }
    if let (Some(url), Some(_)) = (&search.web_search, &search.highlighted) {
        writeln!(
            out,
            "<p><a href=\"{}\">Search '{}' on Google</a></p>",
            escape_html(url),
            keyword
        )?;
    }
    Ok(())
}
