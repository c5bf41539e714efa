//! Header and query-parameter predicates.
//!
//! # Responsibilities
//! - Compile configured predicates once at route build time
//! - Match a header by exact value, regex, integer range or presence
//! - Match a query parameter by exact value, regex or presence
//! - Combine predicates with AND semantics
//!
//! # Design Decisions
//! - Regex predicates must match the whole value
//! - A missing header fails unless the predicate is inverted
//! - Empty predicate list = always matches

use regex::Regex;
use thiserror::Error;

use crate::config::schema::{HeaderMatcherConfig, QueryParameterMatcherConfig};
use crate::routing::headers::{Headers, QueryParams};

/// Errors compiling a predicate.
#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("invalid regex '{pattern}' for '{name}': {source}")]
    InvalidRegex {
        name: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("empty range [{start}, {end}) for header '{name}'")]
    EmptyRange { name: String, start: i64, end: i64 },

    #[error("header '{0}' sets both a value and a range")]
    AmbiguousPredicate(String),

    #[error("predicate has an empty name")]
    EmptyName,
}

fn compile_full_match(name: &str, pattern: &str) -> Result<Regex, MatcherError> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| MatcherError::InvalidRegex {
        name: name.to_string(),
        pattern: pattern.to_string(),
        source,
    })
}

/// How a header value is compared.
#[derive(Debug, Clone)]
pub enum HeaderMatchSpec {
    /// Header only needs to be present.
    Present,
    Exact(String),
    Regex(Regex),
    /// Value parses as an integer in `[start, end)`.
    Range { start: i64, end: i64 },
}

impl HeaderMatchSpec {
    fn matches(&self, value: &str) -> bool {
        match self {
            HeaderMatchSpec::Present => true,
            HeaderMatchSpec::Exact(expected) => value == expected.as_str(),
            HeaderMatchSpec::Regex(regex) => regex.is_match(value),
            HeaderMatchSpec::Range { start, end } => value
                .trim()
                .parse::<i64>()
                .map(|v| v >= *start && v < *end)
                .unwrap_or(false),
        }
    }
}

/// A single compiled header predicate.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    name: String,
    spec: HeaderMatchSpec,
    invert: bool,
}

impl HeaderMatcher {
    pub fn new(name: impl AsRef<str>, spec: HeaderMatchSpec) -> Self {
        Self {
            name: name.as_ref().to_ascii_lowercase(),
            spec,
            invert: false,
        }
    }

    pub fn present(name: impl AsRef<str>) -> Self {
        Self::new(name, HeaderMatchSpec::Present)
    }

    pub fn exact(name: impl AsRef<str>, value: impl Into<String>) -> Self {
        Self::new(name, HeaderMatchSpec::Exact(value.into()))
    }

    pub fn regex(name: impl AsRef<str>, pattern: &str) -> Result<Self, MatcherError> {
        let regex = compile_full_match(name.as_ref(), pattern)?;
        Ok(Self::new(name, HeaderMatchSpec::Regex(regex)))
    }

    /// Negate this predicate.
    pub fn inverted(mut self) -> Self {
        self.invert = !self.invert;
        self
    }

    pub fn from_config(config: &HeaderMatcherConfig) -> Result<Self, MatcherError> {
        if config.name.is_empty() {
            return Err(MatcherError::EmptyName);
        }

        let spec = match (&config.value, config.range) {
            (Some(_), Some(_)) => {
                return Err(MatcherError::AmbiguousPredicate(config.name.clone()));
            }
            (None, Some(range)) => {
                if range.start >= range.end {
                    return Err(MatcherError::EmptyRange {
                        name: config.name.clone(),
                        start: range.start,
                        end: range.end,
                    });
                }
                HeaderMatchSpec::Range {
                    start: range.start,
                    end: range.end,
                }
            }
            (Some(value), None) if config.regex => {
                HeaderMatchSpec::Regex(compile_full_match(&config.name, value)?)
            }
            (Some(value), None) => HeaderMatchSpec::Exact(value.clone()),
            (None, None) => HeaderMatchSpec::Present,
        };

        let matcher = Self::new(&config.name, spec);
        Ok(if config.invert { matcher.inverted() } else { matcher })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &HeaderMatchSpec {
        &self.spec
    }

    pub fn is_inverted(&self) -> bool {
        self.invert
    }

    /// Expected literal value of a non-inverted exact predicate.
    pub fn exact_value(&self) -> Option<&str> {
        match &self.spec {
            HeaderMatchSpec::Exact(value) if !self.invert => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn matches(&self, headers: &Headers) -> bool {
        let matched = headers
            .get(&self.name)
            .map(|value| self.spec.matches(value))
            .unwrap_or(false);
        matched != self.invert
    }
}

/// How a query parameter value is compared.
#[derive(Debug, Clone)]
pub enum QueryMatchSpec {
    Present,
    Exact(String),
    Regex(Regex),
}

/// A single compiled query-parameter predicate.
#[derive(Debug, Clone)]
pub struct QueryParameterMatcher {
    name: String,
    spec: QueryMatchSpec,
}

impl QueryParameterMatcher {
    pub fn new(name: impl Into<String>, spec: QueryMatchSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }

    pub fn from_config(config: &QueryParameterMatcherConfig) -> Result<Self, MatcherError> {
        if config.name.is_empty() {
            return Err(MatcherError::EmptyName);
        }

        let spec = match &config.value {
            Some(value) if config.regex => {
                QueryMatchSpec::Regex(compile_full_match(&config.name, value)?)
            }
            Some(value) => QueryMatchSpec::Exact(value.clone()),
            None => QueryMatchSpec::Present,
        };
        Ok(Self::new(config.name.clone(), spec))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if any parameter with this name satisfies the predicate.
    pub fn matches(&self, params: &QueryParams) -> bool {
        params
            .iter()
            .filter(|(key, _)| *key == self.name)
            .any(|(_, value)| match &self.spec {
                QueryMatchSpec::Present => true,
                QueryMatchSpec::Exact(expected) => value == expected,
                QueryMatchSpec::Regex(regex) => regex.is_match(value),
            })
    }
}

/// Every predicate must match the request headers.
pub fn match_headers(headers: &Headers, matchers: &[HeaderMatcher]) -> bool {
    matchers.iter().all(|m| m.matches(headers))
}

/// Every predicate must match the parsed query parameters.
pub fn match_query_params(params: &QueryParams, matchers: &[QueryParameterMatcher]) -> bool {
    matchers.iter().all(|m| m.matches(params))
}

/// Name of a header that no request can satisfy given these predicates:
/// two different exact values, or required and forbidden at once.
pub fn find_contradiction(matchers: &[HeaderMatcher]) -> Option<&str> {
    for (i, a) in matchers.iter().enumerate() {
        for b in &matchers[i + 1..] {
            if a.name != b.name {
                continue;
            }
            if let (Some(x), Some(y)) = (a.exact_value(), b.exact_value()) {
                if x != y {
                    return Some(&a.name);
                }
            }
            let presence = |m: &HeaderMatcher| matches!(m.spec, HeaderMatchSpec::Present);
            if presence(a) && presence(b) && a.invert != b.invert {
                return Some(&a.name);
            }
        }
    }
    None
}
