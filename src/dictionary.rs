//! Dictionary Lookup Module
//!
//! Resolves a keyword to a definition through the Free Dictionary API. Every
//! failure is folded into a [`DefinitionResult`] so callers never see a fault.

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "https://api.dictionaryapi.dev/api/v2/entries/en/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const NOT_FOUND_MESSAGE: &str = "Meaning not found.";
const UNAVAILABLE_MESSAGE: &str = "Could not retrieve meaning. Check your internet connection.";

/// A definition taken from the first meaning group of the first entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Definition {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_of_speech: Option<String>,
}

/// Outcome of a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DefinitionResult {
    Found(Definition),
    NotFound,
    Unavailable,
}

impl DefinitionResult {
    pub fn definition(&self) -> Option<&Definition> {
        match self {
            DefinitionResult::Found(definition) => Some(definition),
            _ => None,
        }
    }
}

impl fmt::Display for DefinitionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionResult::Found(definition) => f.write_str(&definition.text),
            DefinitionResult::NotFound => f.write_str(NOT_FOUND_MESSAGE),
            DefinitionResult::Unavailable => f.write_str(UNAVAILABLE_MESSAGE),
        }
    }
}

/// Anything that can define a word. Sources are shared between sessions.
pub trait DefinitionSource: Send + Sync {
    fn define(&self, word: &str) -> DefinitionResult;
}

/// Interprets a dictionary API response.
pub fn parse_response(status: u16, body: &str) -> DefinitionResult {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            warn!("Dictionary response (HTTP {}) is not JSON: {}", status, e);
            return DefinitionResult::Unavailable;
        }
    };

    match status {
        200 => first_definition(&parsed)
            .map(DefinitionResult::Found)
            .unwrap_or(DefinitionResult::NotFound),
        404 => match parsed.get("message").and_then(Value::as_str) {
            Some(message) => {
                debug!("Dictionary has no entry: {}", message);
                DefinitionResult::NotFound
            }
            None => DefinitionResult::Unavailable,
        },
        _ => {
            warn!("Dictionary request failed with HTTP {}", status);
            DefinitionResult::Unavailable
        }
    }
}

/// `[0].meanings[0].definitions[0].definition`, with every step checked.
fn first_definition(entries: &Value) -> Option<Definition> {
    let meaning = entries
        .as_array()?
        .first()?
        .get("meanings")?
        .as_array()?
        .first()?;
    let text = meaning
        .get("definitions")?
        .as_array()?
        .first()?
        .get("definition")?
        .as_str()?;
    if text.trim().is_empty() {
        return None;
    }
    Some(Definition {
        text: text.to_string(),
        part_of_speech: meaning
            .get("partOfSpeech")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Blocking client for the dictionary web API.
pub struct DictionaryClient {
    http: reqwest::blocking::Client,
    endpoint: Url,
}

impl DictionaryClient {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = Self::http_builder(timeout).build()?;
        Self::with_http_client(endpoint, http)
    }

    /// Uses a preconfigured HTTP client, e.g. one with proxy settings.
    pub fn with_http_client(endpoint: &str, http: reqwest::blocking::Client) -> anyhow::Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        if endpoint.cannot_be_a_base() {
            anyhow::bail!("dictionary endpoint '{}' cannot take a path", endpoint);
        }
        Ok(DictionaryClient { http, endpoint })
    }

    /// Builder with the request timeout and user agent this client uses.
    pub fn http_builder(timeout: Duration) -> reqwest::blocking::ClientBuilder {
        reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
    }

    /// URL for `word`, appended as a percent-encoded path segment.
    pub fn url_for(&self, word: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(word);
        }
        url
    }
}

impl DefinitionSource for DictionaryClient {
    fn define(&self, word: &str) -> DefinitionResult {
        let url = self.url_for(word);
        debug!("GET {}", url);

        let response = match self.http.get(url).send() {
            Ok(response) => response,
            Err(e) => {
                warn!("Dictionary request for '{}' failed: {}", word, e);
                return DefinitionResult::Unavailable;
            }
        };
        let status = response.status();
        match response.text() {
            Ok(body) => parse_response(status.as_u16(), &body),
            Err(e) => {
                warn!("Failed to read dictionary response ({}): {}", status, e);
                DefinitionResult::Unavailable
            }
        }
    }
}

/// Memoizes lookups per word for the lifetime of the process.
///
/// `Unavailable` is not stored, so a transient outage is retried.
pub struct CachedDictionary {
    inner: Box<dyn DefinitionSource>,
    cache: Mutex<HashMap<String, DefinitionResult>>,
}

impl CachedDictionary {
    pub fn new(inner: Box<dyn DefinitionSource>) -> Self {
        CachedDictionary {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().len()
    }
}

impl DefinitionSource for CachedDictionary {
    fn define(&self, word: &str) -> DefinitionResult {
        if let Some(hit) = self.cache.lock().get(word) {
            debug!("Dictionary cache hit for '{}'", word);
            return hit.clone();
        }
        let result = self.inner.define(word);
        if result != DefinitionResult::Unavailable {
            info!("Looked up '{}': {}", word, if result.definition().is_some() { "found" } else { "not found" });
            self.cache.lock().insert(word.to_string(), result.clone());
        }
        result
    }
}

impl fmt::Debug for DictionaryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DictionaryClient")
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}
