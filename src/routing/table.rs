//! Route table: virtual hosts plus domain lookup.
//!
//! # Responsibilities
//! - Build every virtual host and route from `RouterConfig`
//! - Select the virtual host for a request's host
//! - Find the first matching rule in that virtual host
//!
//! # Design Decisions
//! - Immutable after build; shared read-only across threads
//! - A route that fails to build is skipped and reported, the rest still serve
//! - Host lookup: exact (HashMap) → longest `*.suffix` wildcard → `*` default
//! - No match returns `None`, never an error

use std::borrow::Cow;
use std::collections::HashMap;

use thiserror::Error;

use crate::config::schema::RouterConfig;
use crate::observability::metrics;
use crate::routing::headers::{Headers, SERVICE_HEADER};
use crate::routing::rule::{build_route_rule, PathMatchType, RouteConfigError, RouteRule};
use crate::routing::virtual_host::{VirtualHost, VirtualHostId};

/// A route skipped at build time.
#[derive(Debug, Error)]
#[error("virtual host '{virtual_host}' route #{index} ({route}): {source}")]
pub struct RouteBuildError {
    pub virtual_host: String,
    pub index: usize,
    /// Route name, or its matcher when unnamed.
    pub route: String,
    #[source]
    pub source: RouteConfigError,
}

/// Result of building a table: the table and the routes left out of it.
#[derive(Debug)]
pub struct RouteTableBuild {
    pub table: RouteTable,
    pub errors: Vec<RouteBuildError>,
}

/// A successful lookup.
#[derive(Debug, Clone, Copy)]
pub struct RouteMatch<'a> {
    pub virtual_host: &'a VirtualHost,
    pub rule: &'a dyn RouteRule,
}

/// A `service` header value statically bound to one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicServiceRoute {
    pub service: String,
    pub cluster: String,
}

#[derive(Debug, Default)]
pub struct RouteTable {
    generation: u64,
    virtual_hosts: Vec<VirtualHost>,
    exact_domains: HashMap<String, VirtualHostId>,
    /// `(".suffix", id)`, longest suffix first.
    wildcard_domains: Vec<(String, VirtualHostId)>,
    default_virtual_host: Option<VirtualHostId>,
}

impl RouteTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn build(config: &RouterConfig) -> RouteTableBuild {
        let mut table = RouteTable::empty();
        let mut errors = Vec::new();

        for (vh_index, vh_config) in config.virtual_hosts.iter().enumerate() {
            let id = VirtualHostId::new(vh_index);
            let mut routes = Vec::with_capacity(vh_config.routes.len());

            for (index, route_config) in vh_config.routes.iter().enumerate() {
                match build_route_rule(id, route_config) {
                    Ok(rule) => routes.push(rule),
                    Err(source) => {
                        let route = route_config
                            .name
                            .clone()
                            .or_else(|| route_label(route_config))
                            .unwrap_or_default();
                        tracing::warn!(
                            virtual_host = %vh_config.name,
                            index,
                            route = %route,
                            error = %source,
                            "Skipping route that failed to build"
                        );
                        errors.push(RouteBuildError {
                            virtual_host: vh_config.name.clone(),
                            index,
                            route,
                            source,
                        });
                    }
                }
            }

            let domains: Vec<String> = vh_config
                .domains
                .iter()
                .map(|d| d.to_ascii_lowercase())
                .collect();
            for domain in &domains {
                table.register_domain(domain, id);
            }

            tracing::debug!(
                virtual_host = %vh_config.name,
                domains = ?domains,
                routes = routes.len(),
                "Built virtual host"
            );
            table
                .virtual_hosts
                .push(VirtualHost::new(id, vh_config.name.clone(), domains, routes));
        }

        table
            .wildcard_domains
            .sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));

        if !errors.is_empty() {
            metrics::record_build_errors(errors.len());
        }
        tracing::info!(
            virtual_hosts = table.virtual_hosts.len(),
            routes = table.route_count(),
            errors = errors.len(),
            "Route table built"
        );

        RouteTableBuild { table, errors }
    }

    fn register_domain(&mut self, domain: &str, id: VirtualHostId) {
        if domain == "*" {
            if self.default_virtual_host.is_none() {
                self.default_virtual_host = Some(id);
            }
        } else if let Some(suffix) = domain.strip_prefix('*') {
            if !self.wildcard_domains.iter().any(|(s, _)| s == suffix) {
                self.wildcard_domains.push((suffix.to_string(), id));
            }
        } else {
            self.exact_domains.entry(domain.to_string()).or_insert(id);
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub fn virtual_hosts(&self) -> &[VirtualHost] {
        &self.virtual_hosts
    }

    pub fn virtual_host(&self, id: VirtualHostId) -> Option<&VirtualHost> {
        self.virtual_hosts.get(id.index())
    }

    pub fn route_count(&self) -> usize {
        self.virtual_hosts.iter().map(|vh| vh.routes().len()).sum()
    }

    /// Virtual host serving `host` (port and case ignored).
    pub fn select_virtual_host(&self, host: &str) -> Option<&VirtualHost> {
        let host = strip_port(host);
        let host: Cow<'_, str> = if host.bytes().any(|b| b.is_ascii_uppercase()) {
            Cow::Owned(host.to_ascii_lowercase())
        } else {
            Cow::Borrowed(host)
        };

        let id = self
            .exact_domains
            .get(host.as_ref())
            .copied()
            .or_else(|| {
                self.wildcard_domains
                    .iter()
                    .find(|(suffix, _)| host.len() > suffix.len() && host.ends_with(suffix.as_str()))
                    .map(|(_, id)| *id)
            })
            .or(self.default_virtual_host)?;

        self.virtual_host(id)
    }

    /// First rule accepting the request, headers left untouched.
    pub fn find_route(&self, headers: &Headers, random_value: u64) -> Option<RouteMatch<'_>> {
        let host = headers.host().unwrap_or("");
        let Some(virtual_host) = self.select_virtual_host(host) else {
            tracing::trace!(host = %host, "No virtual host for request");
            metrics::record_no_route();
            return None;
        };

        match virtual_host.find_route(headers, random_value) {
            Some(rule) => {
                tracing::trace!(
                    virtual_host = %virtual_host.name(),
                    match_type = %rule.match_type(),
                    matcher = %rule.matcher(),
                    "Route matched"
                );
                metrics::record_route_matched(rule.match_type());
                Some(RouteMatch { virtual_host, rule })
            }
            None => {
                tracing::trace!(
                    virtual_host = %virtual_host.name(),
                    path = headers.path().unwrap_or(""),
                    "No route matched"
                );
                metrics::record_no_route();
                None
            }
        }
    }

    /// Find the route and finalize the request headers for it.
    pub fn route(&self, headers: &mut Headers, random_value: u64) -> Option<RouteMatch<'_>> {
        let matched = self.find_route(headers, random_value)?;
        matched.rule.finalize_request_headers(headers);
        Some(matched)
    }

    /// `(service, cluster)` pairs for routes bound to a single cluster by
    /// the `service` header, either as their discriminator or as an exact
    /// header predicate.
    pub fn basic_service_routes(&self) -> Vec<BasicServiceRoute> {
        let mut pairs = Vec::new();
        for rule in self.virtual_hosts.iter().flat_map(|vh| vh.routes()) {
            let cluster = rule.cluster_name();
            if cluster.is_empty() {
                continue;
            }

            let service = if rule.match_type() == PathMatchType::ServiceHeader {
                Some(rule.matcher())
            } else {
                rule.base()
                    .config_headers()
                    .iter()
                    .find(|m| m.name() == SERVICE_HEADER)
                    .and_then(|m| m.exact_value())
            };

            if let Some(service) = service {
                pairs.push(BasicServiceRoute {
                    service: service.to_string(),
                    cluster: cluster.to_string(),
                });
            }
        }
        pairs
    }
}

fn route_label(config: &crate::config::schema::RouteConfig) -> Option<String> {
    let spec = &config.route_match;
    spec.path
        .clone()
        .or_else(|| spec.prefix.clone())
        .or_else(|| spec.regex.clone())
        .or_else(|| spec.service.clone())
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literal: keep the brackets, drop the port.
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}
