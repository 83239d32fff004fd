//! Keyword Search Module
//!
//! Finds a keyword in extracted text and marks every occurrence for display.

use log::warn;
use regex::Regex;
use serde::Serialize;
use std::borrow::Cow;
use std::ops::Range;
use url::Url;

const HIGHLIGHT_OPEN: &str = "<span style='background-color: yellow; font-weight: bold;'>";
const HIGHLIGHT_CLOSE: &str = "</span>";
const WEB_SEARCH_BASE: &str = "https://www.google.com/search";

/// How a keyword is matched against the text.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    /// Whole words only, ignoring case.
    #[default]
    WholeWord,
    /// Any occurrence within a line, case-sensitive.
    Substring,
}

/// A trimmed, non-empty search keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordQuery {
    keyword: String,
}

impl KeywordQuery {
    /// Returns `None` when nothing but whitespace was entered.
    pub fn parse(raw: &str) -> Option<Self> {
        let keyword = raw.trim();
        if keyword.is_empty() {
            None
        } else {
            Some(KeywordQuery {
                keyword: keyword.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.keyword
    }

    /// Lower-cased form used for dictionary lookups.
    pub fn normalized(&self) -> String {
        self.keyword.to_lowercase()
    }
}

/// Byte ranges of every match of `query` in `text`.
pub fn find_matches(text: &str, query: &KeywordQuery, mode: MatchMode) -> Vec<Range<usize>> {
    match mode {
        MatchMode::WholeWord => {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(query.as_str()));
            match Regex::new(&pattern) {
                Ok(re) => re.find_iter(text).map(|m| m.range()).collect(),
                Err(e) => {
                    warn!("Cannot search for '{}': {}", query.as_str(), e);
                    Vec::new()
                }
            }
        }
        MatchMode::Substring => text
            .match_indices(query.as_str())
            .filter(|(_, m)| !m.contains('\n'))
            .map(|(start, m)| start..start + m.len())
            .collect(),
    }
}

/// Text together with the ranges to emphasize.
#[derive(Debug, Clone, PartialEq)]
pub struct Highlighted {
    text: String,
    matches: Vec<Range<usize>>,
}

impl Highlighted {
    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn matches(&self) -> &[Range<usize>] {
        &self.matches
    }

    /// Matches wrapped in highlight spans, newlines kept as-is. Identical to
    /// the input when there are no matches.
    pub fn markup(&self) -> String {
        if self.matches.is_empty() {
            return self.text.clone();
        }
        self.wrap(HIGHLIGHT_OPEN, HIGHLIGHT_CLOSE, Cow::Borrowed)
    }

    /// A standalone HTML fragment: text escaped, matches highlighted and each
    /// newline rendered as an explicit `<br>`.
    pub fn render_html(&self) -> String {
        self.wrap(HIGHLIGHT_OPEN, HIGHLIGHT_CLOSE, escape_html)
            .replace('\n', "<br>\n")
    }

    /// Matches in bold, newlines kept as Markdown hard breaks. Markdown
    /// syntax in the text itself is escaped.
    pub fn render_markdown(&self) -> String {
        self.wrap("**", "**", escape_markdown).replace('\n', "  \n")
    }

    fn wrap<'a>(&'a self, open: &str, close: &str, escape: fn(&'a str) -> Cow<'a, str>) -> String {
        let mut out = String::with_capacity(self.text.len() + self.matches.len() * (open.len() + close.len()));
        let mut cursor = 0;
        for range in &self.matches {
            out.push_str(&escape(&self.text[cursor..range.start]));
            out.push_str(open);
            out.push_str(&escape(&self.text[range.clone()]));
            out.push_str(close);
            cursor = range.end;
        }
        out.push_str(&escape(&self.text[cursor..]));
        out
    }
}

/// Escapes the characters HTML treats specially.
pub fn escape_html(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

const MARKDOWN_SPECIAL: [char; 13] = ['\\', '`', '*', '_', '[', ']', '<', '>', '#', '|', '~', '&', '!'];

/// Backslash-escapes the characters Markdown would read as emphasis, code,
/// links or inline HTML.
pub fn escape_markdown(text: &str) -> Cow<'_, str> {
    if !text.contains(MARKDOWN_SPECIAL) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        if MARKDOWN_SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    Cow::Owned(out)
}

/// Marks every occurrence of `query` in `text`.
pub fn highlight(text: &str, query: &KeywordQuery, mode: MatchMode) -> Highlighted {
    Highlighted {
        text: text.to_string(),
        matches: find_matches(text, query, mode),
    }
}

/// Result of searching a keyword, keeping "nothing entered" apart from
/// "entered but not found".
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    NoKeyword,
    NoMatches { query: KeywordQuery },
    Matches { query: KeywordQuery, highlighted: Highlighted },
}

impl SearchOutcome {
    pub fn query(&self) -> Option<&KeywordQuery> {
        match self {
            SearchOutcome::NoKeyword => None,
            SearchOutcome::NoMatches { query } | SearchOutcome::Matches { query, .. } => Some(query),
        }
    }
}

pub fn search(text: &str, raw_keyword: &str, mode: MatchMode) -> SearchOutcome {
    let Some(query) = KeywordQuery::parse(raw_keyword) else {
        return SearchOutcome::NoKeyword;
    };
    let highlighted = highlight(text, &query, mode);
    if highlighted.match_count() == 0 {
        SearchOutcome::NoMatches { query }
    } else {
        SearchOutcome::Matches { query, highlighted }
    }
}

/// Web search link for the keyword's meaning.
pub fn web_search_url(query: &KeywordQuery) -> Result<Url, url::ParseError> {
    Url::parse_with_params(
        WEB_SEARCH_BASE,
        &[("q", format!("{} meaning", query.as_str()))],
    )
}
