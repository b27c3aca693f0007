//! Authorized hostnames
//!
//! A host is allowed when it equals a whitelist entry or is a subdomain of one.
//! The same rule is embedded in the guard snippet, so [`DomainWhitelist::allows`]
//! is what a browser running the protected bundle will decide.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Environment variable overriding the configured domains
pub const DOMAINS_ENV: &str = "DISTGUARD_DOMAINS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WhitelistError {
    #[error("domain whitelist is empty")]
    Empty,

    #[error("domain whitelist contains an empty entry")]
    EmptyEntry,

    #[error("invalid domain {0:?}: only letters, digits, '.' and '-' are allowed")]
    InvalidDomain(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DomainWhitelist {
    entries: Vec<String>,
}

impl Default for DomainWhitelist {
    fn default() -> Self {
        Self {
            entries: vec!["localhost".to_string(), "zoomie.io".to_string()],
        }
    }
}

impl DomainWhitelist {
    pub fn new<I, S>(entries: I) -> Result<Self, WhitelistError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for entry in entries {
            let domain = normalize_entry(entry.as_ref())?;
            if !normalized.contains(&domain) {
                normalized.push(domain);
            }
        }
        if normalized.is_empty() {
            return Err(WhitelistError::Empty);
        }
        Ok(Self {
            entries: normalized,
        })
    }

    /// Parse a comma-separated list such as `example.com, cdn.example.com`
    pub fn parse_list(list: &str) -> Result<Self, WhitelistError> {
        Self::new(list.split(','))
    }

    /// Parse `value` when it holds a non-empty list, else build the `fallback`
    pub fn override_or<F>(value: Option<&str>, fallback: F) -> Result<Self, WhitelistError>
    where
        F: FnOnce() -> Result<Self, WhitelistError>,
    {
        match value.map(str::trim) {
            Some(list) if !list.is_empty() => Self::parse_list(list),
            _ => fallback(),
        }
    }

    /// Use `DISTGUARD_DOMAINS` when it is set to a non-empty value, else `fallback`
    pub fn from_env_or<F>(fallback: F) -> Result<Self, WhitelistError>
    where
        F: FnOnce() -> Result<Self, WhitelistError>,
    {
        Self::override_or(std::env::var(DOMAINS_ENV).ok().as_deref(), fallback)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn allows(&self, host: &str) -> bool {
        let host = host.trim().to_ascii_lowercase();
        let host = host.strip_suffix('.').unwrap_or(&host);
        self.entries.iter().any(|entry| {
            host == entry
                || (host.len() > entry.len()
                    && host.ends_with(entry.as_str())
                    && host.as_bytes()[host.len() - entry.len() - 1] == b'.')
        })
    }

    /// JSON array literal of the entries, for embedding in generated code
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.entries).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Dot-separated labels of letters, digits and `-`
fn domain_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9-]+(\.[a-z0-9-]+)*$").expect("domain pattern is a valid regex")
    })
}

fn normalize_entry(raw: &str) -> Result<String, WhitelistError> {
    let trimmed = raw.trim().to_ascii_lowercase();
    let domain = trimmed.strip_prefix('.').unwrap_or(&trimmed);
    if domain.is_empty() {
        return Err(WhitelistError::EmptyEntry);
    }
    if !domain_pattern().is_match(domain) {
        return Err(WhitelistError::InvalidDomain(raw.trim().to_string()));
    }
    Ok(domain.to_string())
}
