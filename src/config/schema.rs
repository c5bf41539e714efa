//! Configuration schema definitions.
//!
//! This module defines the routing portion of the proxy configuration.
//! All types derive Serde traits for deserialization from TOML or JSON files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the router.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Protocol spoken by downstream clients.
    pub downstream_protocol: Protocol,

    /// Protocol spoken to upstream clusters.
    pub upstream_protocol: Protocol,

    /// Accept route table updates at runtime (file watching).
    pub support_dynamic_route: bool,

    /// Virtual hosts, each owning an ordered route list.
    pub virtual_hosts: Vec<VirtualHostConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            downstream_protocol: Protocol::Http1,
            upstream_protocol: Protocol::Http1,
            support_dynamic_route: true,
            virtual_hosts: Vec::new(),
            observability: ObservabilityConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

/// Wire protocols the proxy can route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http1,
    Http2,
    /// Application RPC protocol routed by the `service` header.
    Rpc,
}

/// A named group of routes selected by request host.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct VirtualHostConfig {
    /// Virtual host identifier for logging/metrics.
    pub name: String,

    /// Domains served: exact names, `*.suffix` wildcards or `*`.
    pub domains: Vec<String>,

    /// Routes evaluated in order; first match wins.
    pub routes: Vec<RouteConfig>,
}

/// A single route entry.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Optional route name for logging.
    pub name: Option<String>,

    /// Match conditions.
    #[serde(rename = "match")]
    pub route_match: RouteMatchConfig,

    /// Forward to a cluster.
    pub route: Option<RouteActionConfig>,

    /// Answer with a redirect.
    pub redirect: Option<RedirectConfig>,

    /// Answer directly without contacting an upstream.
    pub direct_response: Option<DirectResponseConfig>,

    /// Opaque metadata read by filters (tracing, subset load balancing).
    pub metadata: BTreeMap<String, serde_json::Value>,

    /// Upstream resource priority.
    pub priority: RoutePriority,
}

/// Upstream resource priority of a route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutePriority {
    #[default]
    Default,
    High,
}

/// Route match conditions. Exactly one of `prefix`, `path`, `regex` or
/// `service` must be set.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteMatchConfig {
    /// Path prefix.
    pub prefix: Option<String>,

    /// Exact path.
    pub path: Option<String>,

    /// Path regular expression.
    pub regex: Option<String>,

    /// Expected value of the `service` routing-key header.
    pub service: Option<String>,

    /// Exact path comparison is case sensitive.
    pub case_sensitive: bool,

    /// Header predicates, all of which must match.
    pub headers: Vec<HeaderMatcherConfig>,

    /// Query parameter predicates, all of which must match.
    pub query_parameters: Vec<QueryParameterMatcherConfig>,
}

impl Default for RouteMatchConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            path: None,
            regex: None,
            service: None,
            case_sensitive: true,
            headers: Vec::new(),
            query_parameters: Vec::new(),
        }
    }
}

/// Header predicate.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaderMatcherConfig {
    pub name: String,

    /// Expected value; absent means "header is present".
    pub value: Option<String>,

    /// Treat `value` as a regular expression.
    pub regex: bool,

    /// Integer range `[start, end)` the header value must fall into.
    pub range: Option<RangeConfig>,

    /// Negate the predicate. A missing header then matches.
    pub invert: bool,
}

/// Half-open integer range.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RangeConfig {
    pub start: i64,
    pub end: i64,
}

/// Query parameter predicate.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryParameterMatcherConfig {
    pub name: String,

    /// Expected value; absent means "parameter is present".
    pub value: Option<String>,

    /// Treat `value` as a regular expression.
    pub regex: bool,
}

/// Forwarding action. Exactly one of `cluster_name`, `cluster_header` or
/// `weighted_clusters` must be set.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteActionConfig {
    pub cluster_name: Option<String>,

    /// Request header carrying the cluster name.
    pub cluster_header: Option<String>,

    /// Status returned when the `cluster_header` cluster is missing.
    pub cluster_not_found_response_code: u16,

    pub weighted_clusters: Option<WeightedClustersConfig>,

    /// Request timeout in milliseconds; 0 keeps the parent default.
    pub timeout_ms: u64,

    pub prefix_rewrite: Option<String>,
    pub host_rewrite: Option<String>,

    pub retry_policy: Option<RetryPolicyConfig>,
    pub rate_limits: Option<RateLimitPolicyConfig>,
    pub shadow: Option<ShadowPolicyConfig>,
    pub hash_policy: Vec<HashPolicyConfig>,

    /// Subset load-balancing criteria.
    pub metadata_match: BTreeMap<String, String>,

    pub request_headers_to_add: Vec<HeaderValueOptionConfig>,
    pub request_headers_to_remove: Vec<String>,
    pub response_headers_to_add: Vec<HeaderValueOptionConfig>,
    pub response_headers_to_remove: Vec<String>,

    pub virtual_clusters: Vec<VirtualClusterConfig>,
}

impl Default for RouteActionConfig {
    fn default() -> Self {
        Self {
            cluster_name: None,
            cluster_header: None,
            cluster_not_found_response_code: default_cluster_not_found_code(),
            weighted_clusters: None,
            timeout_ms: 0,
            prefix_rewrite: None,
            host_rewrite: None,
            retry_policy: None,
            rate_limits: None,
            shadow: None,
            hash_policy: Vec::new(),
            metadata_match: BTreeMap::new(),
            request_headers_to_add: Vec::new(),
            request_headers_to_remove: Vec::new(),
            response_headers_to_add: Vec::new(),
            response_headers_to_remove: Vec::new(),
            virtual_clusters: Vec::new(),
        }
    }
}

fn default_cluster_not_found_code() -> u16 {
    503
}

/// Weighted traffic split.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WeightedClustersConfig {
    pub clusters: Vec<WeightedClusterConfig>,

    /// Declared total; must equal the sum of weights when set.
    pub total_weight: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WeightedClusterConfig {
    pub name: String,
    pub weight: u32,
    #[serde(default)]
    pub metadata_match: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    pub retry_on: bool,
    pub retry_timeout_ms: u64,
    pub num_retries: u32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitPolicyConfig {
    pub stage: u32,
    pub include_virtual_host_rate_limits: bool,
    pub actions: Vec<RateLimitActionConfig>,
}

/// Source of one rate-limit descriptor entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RateLimitActionConfig {
    RequestHeader {
        header_name: String,
        descriptor_key: String,
    },
    RemoteAddress,
    GenericKey {
        descriptor_value: String,
    },
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ShadowPolicyConfig {
    pub cluster: Option<String>,

    /// Share of requests mirrored, 0–100.
    pub runtime_fraction_percent: u32,
}

/// One hash policy entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HashPolicyConfig {
    Header {
        header_name: String,
    },
    Cookie {
        name: String,
        #[serde(default)]
        ttl_secs: Option<u64>,
    },
    SourceIp,
    QueryParameter {
        name: String,
    },
}

/// Header added to a request or response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaderValueOptionConfig {
    pub name: String,

    /// Literal value; `%MATCHED%` and `%REQ(header)%` are substituted.
    pub value: String,

    /// Append to an existing value instead of replacing it.
    pub append: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct VirtualClusterConfig {
    pub name: String,
    pub pattern: String,
    pub method: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RedirectConfig {
    pub host_redirect: Option<String>,
    pub path_redirect: Option<String>,
    pub https_redirect: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectResponseConfig {
    pub status: u16,
    #[serde(default)]
    pub body: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
