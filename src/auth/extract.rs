//! Locating a session token in an incoming request.

use axum::http::{
    header::{AUTHORIZATION, COOKIE},
    HeaderMap,
};
use thiserror::Error;

pub const DEFAULT_COOKIE_NAME: &str = "token";

/// One place a token may be carried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenSource {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// A cookie with the given name.
    Cookie(String),
}

impl TokenSource {
    #[must_use]
    pub fn extract(&self, headers: &HeaderMap) -> Option<String> {
        match self {
            Self::Bearer => bearer_token(headers),
            Self::Cookie(name) => cookie_token(headers, name),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown token source: {0} (expected bearer or cookie)")]
pub struct UnknownTokenSource(pub String);

/// Sources tried in order; the first one that yields a token wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenExtractors(Vec<TokenSource>);

impl TokenExtractors {
    #[must_use]
    pub fn new(sources: Vec<TokenSource>) -> Self {
        Self(sources)
    }

    /// Parse a comma separated list such as `bearer,cookie`.
    ///
    /// # Errors
    ///
    /// Returns the first entry that is neither `bearer` nor `cookie`.
    pub fn parse(list: &str, cookie_name: &str) -> Result<Self, UnknownTokenSource> {
        let mut sources = Vec::new();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let source = match entry.to_ascii_lowercase().as_str() {
                "bearer" => TokenSource::Bearer,
                "cookie" => TokenSource::Cookie(cookie_name.to_string()),
                _ => return Err(UnknownTokenSource(entry.to_string())),
            };
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
        Ok(Self(sources))
    }

    #[must_use]
    pub fn sources(&self) -> &[TokenSource] {
        &self.0
    }

    #[must_use]
    pub fn extract(&self, headers: &HeaderMap) -> Option<String> {
        self.0.iter().find_map(|source| source.extract(headers))
    }
}

impl Default for TokenExtractors {
    fn default() -> Self {
        Self(vec![
            TokenSource::Bearer,
            TokenSource::Cookie(DEFAULT_COOKIE_NAME.to_string()),
        ])
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn cookie_token(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let Some((key, val)) = pair.trim().split_once('=') else {
                continue;
            };
            if key.trim() == name && !val.trim().is_empty() {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}
