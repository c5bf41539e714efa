//! Request and response header rewriting.
//!
//! # Responsibilities
//! - Remove configured headers
//! - Add configured headers, replacing or appending
//! - Expand `%MATCHED%` and `%REQ(name)%` in values
//!
//! # Design Decisions
//! - Removal runs before additions so a directive can replace a removed header
//! - Appending a value already present is a no-op
//! - A template may not read a header its own parser adds or removes, so
//!   evaluating twice gives the same headers as evaluating once

use thiserror::Error;

use crate::config::schema::HeaderValueOptionConfig;
use crate::routing::headers::Headers;

const MATCHED_VAR: &str = "%MATCHED%";
const REQ_VAR_OPEN: &str = "%REQ(";
const REQ_VAR_CLOSE: &str = ")%";

/// A directive whose value depends on a header the same parser rewrites.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("header '{name}' reads '%REQ({referenced})%', which the same rule rewrites")]
pub struct HeaderTemplateError {
    pub name: String,
    pub referenced: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Matched,
    RequestHeader(String),
}

/// Parsed header value with substitution points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderValueTemplate {
    segments: Vec<Segment>,
}

impl HeaderValueTemplate {
    /// Parse a template. Unterminated variables are kept as literal text.
    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = raw;

        while !rest.is_empty() {
            if let Some(tail) = rest.strip_prefix(MATCHED_VAR) {
                flush(&mut literal, &mut segments);
                segments.push(Segment::Matched);
                rest = tail;
                continue;
            }
            if let Some(tail) = rest.strip_prefix(REQ_VAR_OPEN) {
                if let Some(end) = tail.find(REQ_VAR_CLOSE) {
                    flush(&mut literal, &mut segments);
                    segments.push(Segment::RequestHeader(tail[..end].to_ascii_lowercase()));
                    rest = &tail[end + REQ_VAR_CLOSE.len()..];
                    continue;
                }
            }

            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                literal.push(c);
            }
            rest = chars.as_str();
        }
        flush(&mut literal, &mut segments);

        Self { segments }
    }

    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Request headers this template reads.
    pub fn referenced_headers(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::RequestHeader(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Expand the template. Missing request headers expand to "".
    pub fn render(&self, headers: &Headers, matched: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Matched => out.push_str(matched),
                Segment::RequestHeader(name) => out.push_str(headers.get(name).unwrap_or("")),
            }
        }
        out
    }
}

fn flush(literal: &mut String, segments: &mut Vec<Segment>) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}

/// One header to add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderDirective {
    name: String,
    value: HeaderValueTemplate,
    append: bool,
}

impl HeaderDirective {
    pub fn new(name: &str, value: &str, append: bool) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            value: HeaderValueTemplate::parse(value),
            append,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Ordered header add/remove directives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderParser {
    headers_to_add: Vec<HeaderDirective>,
    headers_to_remove: Vec<String>,
}

impl HeaderParser {
    pub fn new(
        headers_to_add: Vec<HeaderDirective>,
        headers_to_remove: Vec<String>,
    ) -> Result<Self, HeaderTemplateError> {
        let parser = Self {
            headers_to_add,
            headers_to_remove: headers_to_remove
                .into_iter()
                .map(|name| name.to_ascii_lowercase())
                .collect(),
        };
        parser.check_references()?;
        Ok(parser)
    }

    fn check_references(&self) -> Result<(), HeaderTemplateError> {
        let rewritten = |name: &str| {
            self.headers_to_add.iter().any(|d| d.name == name)
                || self.headers_to_remove.iter().any(|r| r == name)
        };
        for directive in &self.headers_to_add {
            if let Some(referenced) = directive.value.referenced_headers().find(|r| rewritten(r)) {
                return Err(HeaderTemplateError {
                    name: directive.name.clone(),
                    referenced: referenced.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn from_config(
        add: &[HeaderValueOptionConfig],
        remove: &[String],
    ) -> Result<Self, HeaderTemplateError> {
        let directives = add
            .iter()
            .filter(|option| !option.name.is_empty())
            .map(|option| HeaderDirective::new(&option.name, &option.value, option.append))
            .collect();
        Self::new(directives, remove.to_vec())
    }

    pub fn is_empty(&self) -> bool {
        self.headers_to_add.is_empty() && self.headers_to_remove.is_empty()
    }

    pub fn evaluate(&self, headers: &mut Headers, matched: &str) {
        for name in &self.headers_to_remove {
            headers.remove(name);
        }

        for directive in &self.headers_to_add {
            let value = directive.value.render(headers, matched);
            if !directive.append {
                headers.insert(&directive.name, value);
                continue;
            }
            let already_present = headers
                .get(&directive.name)
                .map(|existing| existing.split(',').any(|v| v.trim() == value))
                .unwrap_or(false);
            if !already_present {
                headers.append(&directive.name, &value);
            }
        }
    }
}
