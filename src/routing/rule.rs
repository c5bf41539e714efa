//! Route rules: shared base state and the four path-matching variants.
//!
//! # Responsibilities
//! - Compile a `RouteConfig` into an immutable rule
//! - Run the header/query predicate shared by all variants
//! - Discriminate on exact path, path prefix, path regex or the `service` header
//! - Resolve the upstream cluster and rewrite headers after a match
//!
//! # Design Decisions
//! - Variants embed `RouteRuleBase` and are dispatched through `RouteRule`
//! - The routing outcome is one `RouteAction`, fixed at construction
//! - Regex and service variants do not run the header/query predicate
//! - Rewrites start from the request's original path, so finalizing twice is a no-op
//!
//! # Data Flow
//! ```text
//! RouteConfig
//!     → build_route_rule (validate specifiers, compile predicates and policies)
//!     → Box<dyn RouteRule>
//!
//! Request headers
//!     → RouteRule::matches (base predicate, then discriminator)
//!     → RouteRule::finalize_request_headers (path/host rewrite, header parser)
//!     → RouteRuleBase::resolve_cluster
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::config::schema::{
    RedirectConfig, RouteActionConfig, RouteConfig, RoutePriority,
};
use crate::routing::header_parser::{HeaderParser, HeaderTemplateError};
use crate::routing::headers::{
    Headers, HOST_HEADER, PATH_HEADER, QUERY_STRING_HEADER, SERVICE_HEADER,
};
use crate::routing::matcher::{
    find_contradiction, match_headers, match_query_params, HeaderMatcher, MatcherError,
    QueryParameterMatcher,
};
use crate::routing::policy::{
    HashPolicy, MetadataMatchCriteria, RateLimitPolicy, RetryPolicy, RoutePolicy, ShadowPolicy,
    VirtualClusterEntry,
};
use crate::routing::virtual_host::VirtualHostId;
use crate::routing::weighted::{WeightError, WeightedClusters};

/// Errors compiling a single route.
#[derive(Debug, Error)]
pub enum RouteConfigError {
    #[error("route has no path specifier (prefix, path, regex or service)")]
    MissingPathSpecifier,

    #[error("route sets more than one path specifier")]
    MultiplePathSpecifiers,

    #[error("route has no action (route, redirect or direct_response)")]
    MissingAction,

    #[error("route sets more than one action")]
    MultipleActions,

    #[error("invalid weighted clusters: {0}")]
    Weights(#[from] WeightError),

    #[error("invalid path regex '{pattern}': {source}")]
    InvalidPathRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid predicate: {0}")]
    Matcher(#[from] MatcherError),

    #[error("invalid virtual cluster '{name}': {source}")]
    InvalidVirtualCluster {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("header predicates on '{name}' can never match together")]
    ContradictoryHeaders { name: String },

    #[error(transparent)]
    HeaderTemplate(#[from] HeaderTemplateError),
}

/// Which discriminator a rule uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMatchType {
    Exact,
    Prefix,
    Regex,
    ServiceHeader,
}

impl PathMatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathMatchType::Exact => "exact",
            PathMatchType::Prefix => "prefix",
            PathMatchType::Regex => "regex",
            PathMatchType::ServiceHeader => "service_header",
        }
    }
}

impl fmt::Display for PathMatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Redirect answered instead of forwarding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectAction {
    host: Option<String>,
    path: Option<String>,
    https: bool,
}

impl RedirectAction {
    pub fn new(host: Option<String>, path: Option<String>, https: bool) -> Self {
        Self { host, path, https }
    }

    /// Absolute `Location` for this request.
    ///
    /// Host and path fall back to the request's own; the query string is
    /// kept only when the path is not overridden.
    pub fn location(&self, headers: &Headers) -> String {
        let scheme = if self.https { "https" } else { "http" };
        let host = self
            .host
            .as_deref()
            .or_else(|| headers.host())
            .unwrap_or("");

        match &self.path {
            Some(path) => format!("{scheme}://{host}{path}"),
            None => {
                let path = headers.path().unwrap_or("/");
                match headers.get(QUERY_STRING_HEADER).filter(|q| !q.is_empty()) {
                    Some(query) => format!("{scheme}://{host}{path}?{query}"),
                    None => format!("{scheme}://{host}{path}"),
                }
            }
        }
    }
}

impl From<&RedirectConfig> for RedirectAction {
    fn from(config: &RedirectConfig) -> Self {
        Self::new(
            config.host_redirect.clone(),
            config.path_redirect.clone(),
            config.https_redirect,
        )
    }
}

/// Response answered without contacting an upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectResponse {
    pub status: u16,
    pub body: Option<String>,
}

/// The routing outcome of a rule. Exactly one applies.
#[derive(Debug, Clone)]
pub enum RouteAction {
    Cluster(String),
    /// Cluster name is read from this request header.
    ClusterHeader { header_name: String },
    WeightedClusters(WeightedClusters),
    Redirect(RedirectAction),
    DirectResponse(DirectResponse),
}

impl fmt::Display for RouteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteAction::Cluster(name) => write!(f, "cluster:{name}"),
            RouteAction::ClusterHeader { header_name } => write!(f, "cluster_header:{header_name}"),
            RouteAction::WeightedClusters(clusters) => {
                f.write_str("weighted:")?;
                for (i, entry) in clusters.entries().iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}={}", entry.name(), entry.weight())?;
                }
                Ok(())
            }
            RouteAction::Redirect(_) => f.write_str("redirect"),
            RouteAction::DirectResponse(response) => {
                write!(f, "direct_response:{}", response.status)
            }
        }
    }
}

/// Where a matched request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterResolution<'a> {
    Cluster(&'a str),
    /// No usable cluster; answer with this status.
    NotFound { status: u16 },
    Redirect(String),
    DirectResponse(&'a DirectResponse),
}

/// State shared by every rule variant.
#[derive(Debug)]
pub struct RouteRuleBase {
    name: Option<String>,
    virtual_host: VirtualHostId,
    case_sensitive: bool,
    prefix_rewrite: Option<String>,
    host_rewrite: Option<String>,
    action: RouteAction,
    cluster_not_found_response_code: u16,
    timeout: Duration,
    priority: RoutePriority,
    config_headers: Vec<HeaderMatcher>,
    config_query_parameters: Vec<QueryParameterMatcher>,
    policy: RoutePolicy,
    metadata_match_criteria: Option<MetadataMatchCriteria>,
    request_headers_parser: HeaderParser,
    response_headers_parser: HeaderParser,
    virtual_clusters: Vec<VirtualClusterEntry>,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl RouteRuleBase {
    /// A rule with only an action; everything else at its default.
    pub fn new(virtual_host: VirtualHostId, action: RouteAction) -> Self {
        Self {
            name: None,
            virtual_host,
            case_sensitive: true,
            prefix_rewrite: None,
            host_rewrite: None,
            action,
            cluster_not_found_response_code: 503,
            timeout: Duration::ZERO,
            priority: RoutePriority::Default,
            config_headers: Vec::new(),
            config_query_parameters: Vec::new(),
            policy: RoutePolicy::default(),
            metadata_match_criteria: None,
            request_headers_parser: HeaderParser::default(),
            response_headers_parser: HeaderParser::default(),
            virtual_clusters: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: Vec<HeaderMatcher>) -> Self {
        self.config_headers = headers;
        self
    }

    pub fn with_query_parameters(mut self, params: Vec<QueryParameterMatcher>) -> Self {
        self.config_query_parameters = params;
        self
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn with_prefix_rewrite(mut self, rewrite: impl Into<String>) -> Self {
        self.prefix_rewrite = Some(rewrite.into());
        self
    }

    pub fn with_host_rewrite(mut self, rewrite: impl Into<String>) -> Self {
        self.host_rewrite = Some(rewrite.into());
        self
    }

    pub fn with_policy(mut self, policy: RoutePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_request_headers_parser(mut self, parser: HeaderParser) -> Self {
        self.request_headers_parser = parser;
        self
    }

    pub fn from_config(
        virtual_host: VirtualHostId,
        config: &RouteConfig,
    ) -> Result<Self, RouteConfigError> {
        let action_count = [
            config.route.is_some(),
            config.redirect.is_some(),
            config.direct_response.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if action_count == 0 {
            return Err(RouteConfigError::MissingAction);
        }
        if action_count > 1 {
            return Err(RouteConfigError::MultipleActions);
        }

        let config_headers = config
            .route_match
            .headers
            .iter()
            .map(HeaderMatcher::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(name) = find_contradiction(&config_headers) {
            return Err(RouteConfigError::ContradictoryHeaders {
                name: name.to_string(),
            });
        }

        let config_query_parameters = config
            .route_match
            .query_parameters
            .iter()
            .map(QueryParameterMatcher::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        let mut base = match (&config.route, &config.redirect, &config.direct_response) {
            (Some(route), _, _) => Self::from_action_config(virtual_host, route)?,
            (_, Some(redirect), _) => {
                Self::new(virtual_host, RouteAction::Redirect(redirect.into()))
            }
            (_, _, Some(direct)) => Self::new(
                virtual_host,
                RouteAction::DirectResponse(DirectResponse {
                    status: direct.status,
                    body: direct.body.clone(),
                }),
            ),
            (None, None, None) => return Err(RouteConfigError::MissingAction),
        };

        base.name = config.name.clone();
        base.case_sensitive = config.route_match.case_sensitive;
        base.config_headers = config_headers;
        base.config_query_parameters = config_query_parameters;
        base.metadata = config.metadata.clone();
        base.priority = config.priority;
        Ok(base)
    }

    fn from_action_config(
        virtual_host: VirtualHostId,
        route: &RouteActionConfig,
    ) -> Result<Self, RouteConfigError> {
        let action = match (
            &route.cluster_name,
            &route.cluster_header,
            &route.weighted_clusters,
        ) {
            (Some(name), None, None) => RouteAction::Cluster(name.clone()),
            (None, Some(header), None) => RouteAction::ClusterHeader {
                header_name: header.to_ascii_lowercase(),
            },
            (None, None, Some(weighted)) => {
                RouteAction::WeightedClusters(WeightedClusters::from_config(weighted)?)
            }
            (None, None, None) => return Err(RouteConfigError::MissingAction),
            _ => return Err(RouteConfigError::MultipleActions),
        };

        let policy = RoutePolicy::new(
            route
                .retry_policy
                .as_ref()
                .map(RetryPolicy::from)
                .unwrap_or_default(),
            route
                .rate_limits
                .as_ref()
                .map(RateLimitPolicy::from)
                .unwrap_or_default(),
            route
                .shadow
                .as_ref()
                .map(ShadowPolicy::from)
                .unwrap_or_default(),
            HashPolicy::from(route.hash_policy.as_slice()),
        );

        let virtual_clusters = route
            .virtual_clusters
            .iter()
            .map(|vc| {
                VirtualClusterEntry::from_config(vc).map_err(|source| {
                    RouteConfigError::InvalidVirtualCluster {
                        name: vc.name.clone(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let criteria = MetadataMatchCriteria::new(&route.metadata_match);

        let mut base = Self::new(virtual_host, action).with_policy(policy);
        base.prefix_rewrite = route.prefix_rewrite.clone();
        base.host_rewrite = route.host_rewrite.clone();
        base.cluster_not_found_response_code = route.cluster_not_found_response_code;
        base.timeout = Duration::from_millis(route.timeout_ms);
        base.metadata_match_criteria = (!criteria.is_empty()).then_some(criteria);
        base.request_headers_parser = HeaderParser::from_config(
            &route.request_headers_to_add,
            &route.request_headers_to_remove,
        )?;
        base.response_headers_parser = HeaderParser::from_config(
            &route.response_headers_to_add,
            &route.response_headers_to_remove,
        )?;
        base.virtual_clusters = virtual_clusters;
        Ok(base)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn action(&self) -> &RouteAction {
        &self.action
    }

    /// Statically configured cluster; "" unless the action is a single cluster.
    pub fn cluster_name(&self) -> &str {
        match &self.action {
            RouteAction::Cluster(name) => name,
            _ => "",
        }
    }

    /// Route timeout; zero means no override.
    pub fn global_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    pub fn virtual_host(&self) -> VirtualHostId {
        self.virtual_host
    }

    pub fn metadata_match_criteria(&self) -> Option<&MetadataMatchCriteria> {
        self.metadata_match_criteria.as_ref()
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn priority(&self) -> RoutePriority {
        self.priority
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn has_predicates(&self) -> bool {
        !self.config_headers.is_empty() || !self.config_query_parameters.is_empty()
    }

    /// Header predicates, in configuration order.
    pub fn config_headers(&self) -> &[HeaderMatcher] {
        &self.config_headers
    }

    /// Criteria for the cluster picked by `random_value`: the route's
    /// criteria overlaid with the weighted entry's own.
    pub fn metadata_match_for(&self, random_value: u64) -> Option<MetadataMatchCriteria> {
        let entry_criteria = match &self.action {
            RouteAction::WeightedClusters(clusters) => clusters
                .select(random_value)
                .ok()
                .and_then(|entry| entry.metadata_match()),
            _ => None,
        };

        match (&self.metadata_match_criteria, entry_criteria) {
            (Some(route), Some(entry)) => Some(route.merge(entry)),
            (Some(route), None) => Some(route.clone()),
            (None, Some(entry)) => Some(entry.clone()),
            (None, None) => None,
        }
    }

    pub fn resolve_cluster<'a>(
        &'a self,
        headers: &'a Headers,
        random_value: u64,
    ) -> ClusterResolution<'a> {
        match &self.action {
            RouteAction::Cluster(name) => ClusterResolution::Cluster(name),
            RouteAction::ClusterHeader { header_name } => {
                match headers.get(header_name).filter(|v| !v.is_empty()) {
                    Some(cluster) => ClusterResolution::Cluster(cluster),
                    None => ClusterResolution::NotFound {
                        status: self.cluster_not_found_response_code,
                    },
                }
            }
            RouteAction::WeightedClusters(clusters) => match clusters.select(random_value) {
                Ok(entry) => ClusterResolution::Cluster(entry.name()),
                Err(e) => {
                    tracing::warn!(error = %e, "Weighted cluster selection failed");
                    ClusterResolution::NotFound {
                        status: self.cluster_not_found_response_code,
                    }
                }
            },
            RouteAction::Redirect(redirect) => ClusterResolution::Redirect(redirect.location(headers)),
            RouteAction::DirectResponse(response) => ClusterResolution::DirectResponse(response),
        }
    }

    /// First virtual cluster classifying this request.
    pub fn virtual_cluster(&self, headers: &Headers) -> Option<&str> {
        self.virtual_clusters
            .iter()
            .find(|vc| vc.matches(headers))
            .map(VirtualClusterEntry::name)
    }

    /// Header and query predicate shared by the exact and prefix variants.
    ///
    /// Query predicates only apply when the request carries at least one
    /// query parameter.
    pub fn match_route(&self, headers: &Headers, _random_value: u64) -> bool {
        if !match_headers(headers, &self.config_headers) {
            return false;
        }
        if self.config_query_parameters.is_empty() {
            return true;
        }

        let params = headers.query_params();
        if params.is_empty() {
            return true;
        }
        match_query_params(&params, &self.config_query_parameters)
    }

    /// Apply path rewrite, host rewrite and the request header parser.
    pub fn finalize_request_headers(&self, headers: &mut Headers, matched: &str) {
        self.finalize_path_header(headers, matched);
        if let Some(host) = &self.host_rewrite {
            headers.insert(HOST_HEADER, host.as_str());
        }
        self.request_headers_parser.evaluate(headers, matched);
    }

    pub fn finalize_response_headers(&self, headers: &mut Headers) {
        self.response_headers_parser.evaluate(headers, "");
    }

    fn finalize_path_header(&self, headers: &mut Headers, matched: &str) {
        let Some(rewrite) = &self.prefix_rewrite else {
            return;
        };
        let original = match headers.original_path().or_else(|| headers.path()) {
            Some(path) => path.to_string(),
            None => return,
        };

        let leading = original.get(..matched.len());
        let covered = match leading {
            Some(leading) if self.case_sensitive => leading == matched,
            Some(leading) => leading.eq_ignore_ascii_case(matched),
            None => false,
        };
        if !covered {
            return;
        }

        let rewritten = format!("{rewrite}{}", &original[matched.len()..]);
        tracing::trace!(from = %original, to = %rewritten, "Rewriting request path");
        headers.set_original_path(original);
        headers.insert(PATH_HEADER, rewritten);
    }
}

/// A compiled route: base state plus a path discriminator.
pub trait RouteRule: Send + Sync + fmt::Debug {
    fn base(&self) -> &RouteRuleBase;

    /// Whether this rule accepts the request.
    fn matches(&self, headers: &Headers, random_value: u64) -> bool;

    /// The literal this rule matches on (path, prefix, regex source or service).
    fn matcher(&self) -> &str;

    fn match_type(&self) -> PathMatchType;

    fn finalize_request_headers(&self, headers: &mut Headers) {
        self.base().finalize_request_headers(headers, self.matcher());
    }

    fn finalize_response_headers(&self, headers: &mut Headers) {
        self.base().finalize_response_headers(headers);
    }

    fn cluster_name(&self) -> &str {
        self.base().cluster_name()
    }

    fn global_timeout(&self) -> Duration {
        self.base().global_timeout()
    }

    fn policy(&self) -> &RoutePolicy {
        self.base().policy()
    }

    fn virtual_host(&self) -> VirtualHostId {
        self.base().virtual_host()
    }

    fn metadata_match_criteria(&self) -> Option<&MetadataMatchCriteria> {
        self.base().metadata_match_criteria()
    }
}

/// Matches one exact path.
#[derive(Debug)]
pub struct ExactRouteRule {
    base: RouteRuleBase,
    path: String,
}

impl ExactRouteRule {
    pub fn new(base: RouteRuleBase, path: impl Into<String>) -> Self {
        Self {
            base,
            path: path.into(),
        }
    }
}

impl RouteRule for ExactRouteRule {
    fn base(&self) -> &RouteRuleBase {
        &self.base
    }

    fn matches(&self, headers: &Headers, random_value: u64) -> bool {
        if !self.base.match_route(headers, random_value) {
            return false;
        }
        match headers.path() {
            Some(path) if self.base.case_sensitive => path == self.path,
            Some(path) => path.eq_ignore_ascii_case(&self.path),
            None => false,
        }
    }

    fn matcher(&self) -> &str {
        &self.path
    }

    fn match_type(&self) -> PathMatchType {
        PathMatchType::Exact
    }
}

/// Matches a path prefix, always case sensitive.
#[derive(Debug)]
pub struct PrefixRouteRule {
    base: RouteRuleBase,
    prefix: String,
}

impl PrefixRouteRule {
    pub fn new(base: RouteRuleBase, prefix: impl Into<String>) -> Self {
        Self {
            base,
            prefix: prefix.into(),
        }
    }
}

impl RouteRule for PrefixRouteRule {
    fn base(&self) -> &RouteRuleBase {
        &self.base
    }

    fn matches(&self, headers: &Headers, random_value: u64) -> bool {
        self.base.match_route(headers, random_value)
            && headers
                .path()
                .map(|path| path.starts_with(self.prefix.as_str()))
                .unwrap_or(false)
    }

    fn matcher(&self) -> &str {
        &self.prefix
    }

    fn match_type(&self) -> PathMatchType {
        PathMatchType::Prefix
    }
}

/// Matches a path regex. Anchors in the pattern decide full or partial match.
#[derive(Debug)]
pub struct RegexRouteRule {
    base: RouteRuleBase,
    source: String,
    regex: Regex,
}

impl RegexRouteRule {
    pub fn new(base: RouteRuleBase, source: impl Into<String>) -> Result<Self, RouteConfigError> {
        let source = source.into();
        let regex = Regex::new(&source).map_err(|e| RouteConfigError::InvalidPathRegex {
            pattern: source.clone(),
            source: e,
        })?;
        Ok(Self {
            base,
            source,
            regex,
        })
    }
}

impl RouteRule for RegexRouteRule {
    fn base(&self) -> &RouteRuleBase {
        &self.base
    }

    fn matches(&self, headers: &Headers, _random_value: u64) -> bool {
        headers
            .path()
            .map(|path| self.regex.is_match(path))
            .unwrap_or(false)
    }

    fn matcher(&self) -> &str {
        &self.source
    }

    fn match_type(&self) -> PathMatchType {
        PathMatchType::Regex
    }
}

/// Matches the `service` routing-key header, for protocols without paths.
#[derive(Debug)]
pub struct ServiceRouteRule {
    base: RouteRuleBase,
    match_value: String,
}

impl ServiceRouteRule {
    pub fn new(base: RouteRuleBase, match_value: impl Into<String>) -> Self {
        Self {
            base,
            match_value: match_value.into(),
        }
    }
}

impl RouteRule for ServiceRouteRule {
    fn base(&self) -> &RouteRuleBase {
        &self.base
    }

    fn matches(&self, headers: &Headers, _random_value: u64) -> bool {
        headers.get(SERVICE_HEADER) == Some(self.match_value.as_str())
    }

    fn matcher(&self) -> &str {
        &self.match_value
    }

    fn match_type(&self) -> PathMatchType {
        PathMatchType::ServiceHeader
    }
}

/// Compile one configured route into its variant.
pub fn build_route_rule(
    virtual_host: VirtualHostId,
    config: &RouteConfig,
) -> Result<Box<dyn RouteRule>, RouteConfigError> {
    let spec = &config.route_match;
    let specifiers = [&spec.prefix, &spec.path, &spec.regex, &spec.service];
    match specifiers.iter().filter(|s| s.is_some()).count() {
        0 => return Err(RouteConfigError::MissingPathSpecifier),
        1 => {}
        _ => return Err(RouteConfigError::MultiplePathSpecifiers),
    }

    let base = RouteRuleBase::from_config(virtual_host, config)?;

    if let Some(path) = &spec.path {
        return Ok(Box::new(ExactRouteRule::new(base, path.clone())));
    }
    if let Some(prefix) = &spec.prefix {
        return Ok(Box::new(PrefixRouteRule::new(base, prefix.clone())));
    }
    if let Some(service) = &spec.service {
        if base.has_predicates() {
            tracing::debug!(
                service = %service,
                "Service route ignores header and query predicates"
            );
        }
        return Ok(Box::new(ServiceRouteRule::new(base, service.clone())));
    }
    if let Some(pattern) = &spec.regex {
        if base.has_predicates() {
            tracing::warn!(
                regex = %pattern,
                route = config.name.as_deref().unwrap_or(""),
                "Regex route ignores its header and query predicates"
            );
        }
        return Ok(Box::new(RegexRouteRule::new(base, pattern.clone())?));
    }

    Err(RouteConfigError::MissingPathSpecifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{
        DirectResponseConfig, HeaderMatcherConfig, HeaderValueOptionConfig,
        QueryParameterMatcherConfig, RetryPolicyConfig, RouteMatchConfig, WeightedClusterConfig,
        WeightedClustersConfig,
    };
    use crate::routing::header_parser::HeaderDirective;
    use crate::routing::matcher::QueryMatchSpec;

    const VH: VirtualHostId = VirtualHostId::new(0);

    fn request(path: &str) -> Headers {
        let mut headers = Headers::new();
        headers.insert(PATH_HEADER, path);
        headers
    }

    fn cluster_base(cluster: &str) -> RouteRuleBase {
        RouteRuleBase::new(VH, RouteAction::Cluster(cluster.to_string()))
    }

    fn route_to(cluster: &str, route_match: RouteMatchConfig) -> RouteConfig {
        RouteConfig {
            route_match,
            route: Some(RouteActionConfig {
                cluster_name: Some(cluster.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_exact_path_match() {
        let rule = ExactRouteRule::new(cluster_base("c"), "/foo");
        assert!(rule.matches(&request("/foo"), 0));
        assert!(!rule.matches(&request("/foo/"), 0));
        assert!(!rule.matches(&request("/FOO"), 0));
        assert!(!rule.matches(&Headers::new(), 0));

        let insensitive = ExactRouteRule::new(cluster_base("c").with_case_sensitive(false), "/foo");
        assert!(insensitive.matches(&request("/FOO"), 0));
        assert!(!insensitive.matches(&request("/foo/"), 0));
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        let rule = PrefixRouteRule::new(cluster_base("c").with_case_sensitive(false), "/api");
        assert!(rule.matches(&request("/api"), 0));
        assert!(rule.matches(&request("/api/users"), 0));
        assert!(!rule.matches(&request("/API/users"), 0));
        assert!(!rule.matches(&request("/ap"), 0));
    }

    #[test]
    fn test_regex_match() {
        let rule = RegexRouteRule::new(cluster_base("c"), "^/api/v[0-9]+/.*$").unwrap();
        assert!(rule.matches(&request("/api/v2/x"), 0));
        assert!(!rule.matches(&request("/api/vx/x"), 0));
        assert!(!rule.matches(&request("/apiv2/users"), 0));

        let unanchored = RegexRouteRule::new(cluster_base("c"), "/v[0-9]+/").unwrap();
        assert!(unanchored.matches(&request("/api/v1/users"), 0));

        assert!(matches!(
            RegexRouteRule::new(cluster_base("c"), "(unclosed"),
            Err(RouteConfigError::InvalidPathRegex { .. })
        ));
    }

    #[test]
    fn test_regex_skips_base_predicate() {
        let base = cluster_base("c").with_headers(vec![HeaderMatcher::exact("x-env", "prod")]);
        let rule = RegexRouteRule::new(base, "^/api").unwrap();
        assert!(rule.matches(&request("/api/x"), 0));
    }

    #[test]
    fn test_service_header_match() {
        let base = cluster_base("c").with_headers(vec![HeaderMatcher::exact("x-env", "prod")]);
        let rule = ServiceRouteRule::new(base, "com.example.Foo");

        let mut headers = Headers::new();
        headers.insert(SERVICE_HEADER, "com.example.Foo");
        assert!(rule.matches(&headers, 0));

        headers.insert(SERVICE_HEADER, "com.example.Bar");
        assert!(!rule.matches(&headers, 0));
        assert!(!rule.matches(&Headers::new(), 0));
        assert_eq!(rule.match_type(), PathMatchType::ServiceHeader);
    }

    #[test]
    fn test_header_predicate_is_monotonic() {
        let base = cluster_base("c").with_headers(vec![HeaderMatcher::exact("x-version", "v2")]);
        let rule = PrefixRouteRule::new(base, "/");

        let mut headers = request("/anything");
        assert!(!rule.matches(&headers, 0));
        headers.insert("x-version", "v2");
        assert!(rule.matches(&headers, 0));
        headers.insert("x-extra", "1");
        assert!(rule.matches(&headers, 0));
    }

    #[test]
    fn test_query_predicate_only_with_query_string() {
        let base = cluster_base("c").with_query_parameters(vec![QueryParameterMatcher::new(
            "debug",
            QueryMatchSpec::Exact("1".into()),
        )]);
        let rule = PrefixRouteRule::new(base, "/");

        let mut headers = request("/x");
        assert!(rule.matches(&headers, 0));

        headers.insert(QUERY_STRING_HEADER, "debug=0");
        assert!(!rule.matches(&headers, 0));

        headers.insert(QUERY_STRING_HEADER, "debug=1&user=a");
        assert!(rule.matches(&headers, 0));
    }

    #[test]
    fn test_prefix_rewrite_is_idempotent() {
        let base = cluster_base("c")
            .with_prefix_rewrite("/v2")
            .with_host_rewrite("backend.internal")
            .with_request_headers_parser(
                HeaderParser::new(
                    vec![HeaderDirective::new("x-route", "%MATCHED%", true)],
                    vec![],
                )
                .unwrap(),
            );
        let rule = PrefixRouteRule::new(base, "/api");

        let mut headers = request("/api/users");
        rule.finalize_request_headers(&mut headers);
        let once = headers.clone();
        rule.finalize_request_headers(&mut headers);

        assert_eq!(headers, once);
        assert_eq!(headers.path(), Some("/v2/users"));
        assert_eq!(headers.original_path(), Some("/api/users"));
        assert_eq!(headers.host(), Some("backend.internal"));
        assert_eq!(headers.get("x-route"), Some("/api"));
    }

    #[test]
    fn test_resolve_cluster_header() {
        let mut base = RouteRuleBase::new(
            VH,
            RouteAction::ClusterHeader {
                header_name: "x-cluster".into(),
            },
        );
        base.cluster_not_found_response_code = 404;

        let mut headers = Headers::new();
        assert_eq!(
            base.resolve_cluster(&headers, 0),
            ClusterResolution::NotFound { status: 404 }
        );
        headers.insert("x-cluster", "payments");
        assert_eq!(base.resolve_cluster(&headers, 0), ClusterResolution::Cluster("payments"));
        assert_eq!(base.cluster_name(), "");
    }

    #[test]
    fn test_resolve_weighted_and_redirect() {
        let weighted = WeightedClusters::new(vec![
            crate::routing::weighted::WeightedClusterEntry::new("a", 0),
            crate::routing::weighted::WeightedClusterEntry::new("b", 10),
        ])
        .unwrap();
        let base = RouteRuleBase::new(VH, RouteAction::WeightedClusters(weighted));
        for rv in 0..20 {
            assert_eq!(base.resolve_cluster(&Headers::new(), rv), ClusterResolution::Cluster("b"));
        }

        let redirect = RouteRuleBase::new(
            VH,
            RouteAction::Redirect(RedirectAction::new(None, None, true)),
        );
        let mut headers = request("/login");
        headers.insert(HOST_HEADER, "example.com");
        headers.insert(QUERY_STRING_HEADER, "next=/home");
        assert_eq!(
            redirect.resolve_cluster(&headers, 0),
            ClusterResolution::Redirect("https://example.com/login?next=/home".into())
        );
    }

    #[test]
    fn test_build_route_rule_variants() {
        let exact = build_route_rule(
            VH,
            &route_to(
                "c",
                RouteMatchConfig {
                    path: Some("/health".into()),
                    ..Default::default()
                },
            ),
        )
        .unwrap();
        assert_eq!(exact.match_type(), PathMatchType::Exact);
        assert_eq!(exact.matcher(), "/health");
        assert_eq!(exact.cluster_name(), "c");
        assert_eq!(exact.global_timeout(), Duration::ZERO);
        assert_eq!(exact.policy().retry_policy(), &RetryPolicy::default());
        assert!(exact.metadata_match_criteria().is_none());

        let service = build_route_rule(
            VH,
            &route_to(
                "c",
                RouteMatchConfig {
                    service: Some("com.example.Foo".into()),
                    ..Default::default()
                },
            ),
        )
        .unwrap();
        assert_eq!(service.match_type(), PathMatchType::ServiceHeader);
    }

    #[test]
    fn test_build_route_rule_errors() {
        let none = route_to("c", RouteMatchConfig::default());
        assert!(matches!(
            build_route_rule(VH, &none),
            Err(RouteConfigError::MissingPathSpecifier)
        ));

        let two = route_to(
            "c",
            RouteMatchConfig {
                prefix: Some("/".into()),
                path: Some("/x".into()),
                ..Default::default()
            },
        );
        assert!(matches!(
            build_route_rule(VH, &two),
            Err(RouteConfigError::MultiplePathSpecifiers)
        ));

        let mut no_action = route_to(
            "c",
            RouteMatchConfig {
                prefix: Some("/".into()),
                ..Default::default()
            },
        );
        no_action.route = None;
        assert!(matches!(
            build_route_rule(VH, &no_action),
            Err(RouteConfigError::MissingAction)
        ));

        let mut two_actions = route_to(
            "c",
            RouteMatchConfig {
                prefix: Some("/".into()),
                ..Default::default()
            },
        );
        two_actions.direct_response = Some(DirectResponseConfig {
            status: 200,
            body: None,
        });
        assert!(matches!(
            build_route_rule(VH, &two_actions),
            Err(RouteConfigError::MultipleActions)
        ));

        let mut contradictory = route_to(
            "c",
            RouteMatchConfig {
                prefix: Some("/".into()),
                headers: vec![
                    HeaderMatcherConfig {
                        name: "x".into(),
                        value: Some("1".into()),
                        ..Default::default()
                    },
                    HeaderMatcherConfig {
                        name: "x".into(),
                        value: Some("2".into()),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            },
        );
        assert!(matches!(
            build_route_rule(VH, &contradictory),
            Err(RouteConfigError::ContradictoryHeaders { .. })
        ));

        contradictory.route_match.headers.clear();
        contradictory.route_match.query_parameters = vec![QueryParameterMatcherConfig {
            name: "id".into(),
            value: Some("[".into()),
            regex: true,
        }];
        assert!(matches!(
            build_route_rule(VH, &contradictory),
            Err(RouteConfigError::Matcher(_))
        ));

        let mut self_reading = route_to(
            "c",
            RouteMatchConfig {
                prefix: Some("/".into()),
                ..Default::default()
            },
        );
        self_reading.route.as_mut().unwrap().request_headers_to_add = vec![HeaderValueOptionConfig {
            name: "x-a".into(),
            value: "%REQ(x-a)%-s".into(),
            append: false,
        }];
        assert!(matches!(
            build_route_rule(VH, &self_reading),
            Err(RouteConfigError::HeaderTemplate(_))
        ));
    }

    #[test]
    fn test_build_with_policies_and_weights() {
        let config = RouteConfig {
            name: Some("checkout".into()),
            route_match: RouteMatchConfig {
                prefix: Some("/checkout".into()),
                ..Default::default()
            },
            route: Some(RouteActionConfig {
                weighted_clusters: Some(WeightedClustersConfig {
                    clusters: vec![
                        WeightedClusterConfig {
                            name: "v1".into(),
                            weight: 90,
                            metadata_match: BTreeMap::from([("version".into(), "1".into())]),
                        },
                        WeightedClusterConfig {
                            name: "v2".into(),
                            weight: 10,
                            metadata_match: BTreeMap::new(),
                        },
                    ],
                    total_weight: Some(100),
                }),
                timeout_ms: 1500,
                retry_policy: Some(RetryPolicyConfig {
                    retry_on: true,
                    retry_timeout_ms: 200,
                    num_retries: 3,
                }),
                metadata_match: BTreeMap::from([("stage".into(), "prod".into())]),
                response_headers_to_add: vec![HeaderValueOptionConfig {
                    name: "x-served-by".into(),
                    value: "mesh".into(),
                    append: false,
                }],
                ..Default::default()
            }),
            ..Default::default()
        };

        let rule = build_route_rule(VH, &config).unwrap();
        let base = rule.base();
        assert_eq!(base.name(), Some("checkout"));
        assert_eq!(rule.global_timeout(), Duration::from_millis(1500));
        assert_eq!(rule.policy().retry_policy().num_retries(), 3);
        assert_eq!(rule.cluster_name(), "");

        let v1 = base.metadata_match_for(0).unwrap();
        assert_eq!(v1.get("version"), Some("1"));
        assert_eq!(v1.get("stage"), Some("prod"));
        let v2 = base.metadata_match_for(95).unwrap();
        assert_eq!(v2.get("version"), None);

        let mut response = Headers::new();
        rule.finalize_response_headers(&mut response);
        assert_eq!(response.get("x-served-by"), Some("mesh"));

        let mut mismatch = config.clone();
        if let Some(route) = mismatch.route.as_mut() {
            if let Some(weighted) = route.weighted_clusters.as_mut() {
                weighted.total_weight = Some(50);
            }
        }
        assert!(matches!(
            build_route_rule(VH, &mismatch),
            Err(RouteConfigError::Weights(WeightError::TotalWeightMismatch { .. }))
        ));
    }
}
