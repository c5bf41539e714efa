//! Virtual hosts: named, ordered route lists.

use std::fmt;

use crate::routing::headers::Headers;
use crate::routing::rule::RouteRule;

/// Index of a virtual host inside its route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualHostId(usize);

impl VirtualHostId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for VirtualHostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vh#{}", self.0)
    }
}

/// A group of routes served for a set of domains.
///
/// Routes are evaluated in configuration order and the first match wins.
#[derive(Debug)]
pub struct VirtualHost {
    id: VirtualHostId,
    name: String,
    domains: Vec<String>,
    routes: Vec<Box<dyn RouteRule>>,
}

impl VirtualHost {
    pub fn new(
        id: VirtualHostId,
        name: impl Into<String>,
        domains: Vec<String>,
        routes: Vec<Box<dyn RouteRule>>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            domains,
            routes,
        }
    }

    pub fn id(&self) -> VirtualHostId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn routes(&self) -> &[Box<dyn RouteRule>] {
        &self.routes
    }

    /// First rule accepting the request, without touching its headers.
    pub fn find_route(&self, headers: &Headers, random_value: u64) -> Option<&dyn RouteRule> {
        self.routes
            .iter()
            .find(|rule| rule.matches(headers, random_value))
            .map(|rule| rule.as_ref())
    }

    /// Like [`find_route`](Self::find_route), then finalizes the request headers.
    pub fn route(&self, headers: &mut Headers, random_value: u64) -> Option<&dyn RouteRule> {
        let rule = self.find_route(headers, random_value)?;
        rule.finalize_request_headers(headers);
        Some(rule)
    }
}
