//! Per-route policy objects.
//!
//! # Responsibilities
//! - Hold retry, rate-limit, shadow and hash policies for downstream filters
//! - Hold subset load-balancing criteria and virtual-cluster classifiers
//!
//! # Design Decisions
//! - Immutable after construction; every accessor is a pure read
//! - Defaults are valid "disabled" policies, so a route always has a policy
//! - Nothing here executes a retry, a rate limit or a mirror

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::time::Duration;

use regex::Regex;

use crate::config::schema::{
    HashPolicyConfig, RateLimitActionConfig, RateLimitPolicyConfig, RetryPolicyConfig,
    ShadowPolicyConfig, VirtualClusterConfig,
};
use crate::routing::headers::Headers;

/// Retry settings read by the retry filter.
///
/// The default is "no retry" and compares equal to an explicitly
/// disabled policy with zero thresholds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    retry_on: bool,
    retry_timeout: Duration,
    num_retries: u32,
}

impl RetryPolicy {
    pub fn new(retry_on: bool, retry_timeout: Duration, num_retries: u32) -> Self {
        Self {
            retry_on,
            retry_timeout,
            num_retries,
        }
    }

    pub fn retry_on(&self) -> bool {
        self.retry_on
    }

    /// Per-try timeout; zero means the route timeout applies.
    pub fn retry_timeout(&self) -> Duration {
        self.retry_timeout
    }

    pub fn num_retries(&self) -> u32 {
        self.num_retries
    }
}

impl From<&RetryPolicyConfig> for RetryPolicy {
    fn from(config: &RetryPolicyConfig) -> Self {
        Self::new(
            config.retry_on,
            Duration::from_millis(config.retry_timeout_ms),
            config.num_retries,
        )
    }
}

/// Source of one rate-limit descriptor entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitAction {
    RequestHeader {
        header_name: String,
        descriptor_key: String,
    },
    RemoteAddress,
    GenericKey {
        descriptor_value: String,
    },
}

/// Rate-limit descriptor settings read by the rate-limit filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitPolicy {
    stage: u32,
    include_virtual_host_rate_limits: bool,
    actions: Vec<RateLimitAction>,
}

impl RateLimitPolicy {
    pub fn new(stage: u32, include_virtual_host_rate_limits: bool, actions: Vec<RateLimitAction>) -> Self {
        Self {
            stage,
            include_virtual_host_rate_limits,
            actions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn stage(&self) -> u32 {
        self.stage
    }

    pub fn include_virtual_host_rate_limits(&self) -> bool {
        self.include_virtual_host_rate_limits
    }

    pub fn actions(&self) -> &[RateLimitAction] {
        &self.actions
    }

    /// Descriptor entries for a request, or `None` if a required header is
    /// missing (the request is then not rate limited by this policy).
    pub fn descriptor(
        &self,
        headers: &Headers,
        remote_address: Option<IpAddr>,
    ) -> Option<Vec<(String, String)>> {
        if self.actions.is_empty() {
            return None;
        }

        self.actions
            .iter()
            .map(|action| match action {
                RateLimitAction::RequestHeader {
                    header_name,
                    descriptor_key,
                } => headers
                    .get(header_name)
                    .map(|value| (descriptor_key.clone(), value.to_string())),
                RateLimitAction::RemoteAddress => {
                    remote_address.map(|ip| ("remote_address".to_string(), ip.to_string()))
                }
                RateLimitAction::GenericKey { descriptor_value } => {
                    Some(("generic_key".to_string(), descriptor_value.clone()))
                }
            })
            .collect()
    }
}

impl From<&RateLimitPolicyConfig> for RateLimitPolicy {
    fn from(config: &RateLimitPolicyConfig) -> Self {
        let actions = config
            .actions
            .iter()
            .map(|action| match action {
                RateLimitActionConfig::RequestHeader {
                    header_name,
                    descriptor_key,
                } => RateLimitAction::RequestHeader {
                    header_name: header_name.to_ascii_lowercase(),
                    descriptor_key: descriptor_key.clone(),
                },
                RateLimitActionConfig::RemoteAddress => RateLimitAction::RemoteAddress,
                RateLimitActionConfig::GenericKey { descriptor_value } => {
                    RateLimitAction::GenericKey {
                        descriptor_value: descriptor_value.clone(),
                    }
                }
            })
            .collect();
        Self::new(config.stage, config.include_virtual_host_rate_limits, actions)
    }
}

/// Traffic mirroring settings read by the shadow filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShadowPolicy {
    cluster: Option<String>,
    runtime_fraction_percent: u32,
}

impl ShadowPolicy {
    pub fn new(cluster: impl Into<String>, runtime_fraction_percent: u32) -> Self {
        Self {
            cluster: Some(cluster.into()),
            runtime_fraction_percent: runtime_fraction_percent.min(100),
        }
    }

    pub fn enabled(&self) -> bool {
        self.cluster.is_some() && self.runtime_fraction_percent > 0
    }

    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    pub fn runtime_fraction_percent(&self) -> u32 {
        self.runtime_fraction_percent
    }
}

impl From<&ShadowPolicyConfig> for ShadowPolicy {
    fn from(config: &ShadowPolicyConfig) -> Self {
        match &config.cluster {
            Some(cluster) => Self::new(cluster.clone(), config.runtime_fraction_percent),
            None => Self::default(),
        }
    }
}

/// One request attribute feeding the session-affinity hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashPolicyEntry {
    Header { name: String },
    Cookie { name: String, ttl: Option<Duration> },
    SourceIp,
    QueryParameter { name: String },
}

/// Session-affinity hashing settings read by the load balancer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashPolicy {
    entries: Vec<HashPolicyEntry>,
}

impl HashPolicy {
    pub fn new(entries: Vec<HashPolicyEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HashPolicyEntry] {
        &self.entries
    }

    /// Stable hash of the configured request attributes.
    ///
    /// Suitable as the random value for weighted cluster selection when
    /// requests from the same client must land on the same cluster.
    /// Returns `None` when no configured attribute is present.
    pub fn hash_key(&self, headers: &Headers, source_ip: Option<IpAddr>) -> Option<u64> {
        let mut hasher = DefaultHasher::new();
        let mut found = false;

        for entry in &self.entries {
            match entry {
                HashPolicyEntry::Header { name } => {
                    if let Some(value) = headers.get(name) {
                        value.hash(&mut hasher);
                        found = true;
                    }
                }
                HashPolicyEntry::Cookie { name, .. } => {
                    if let Some(value) = headers.get("cookie").and_then(|c| find_cookie(c, name)) {
                        value.hash(&mut hasher);
                        found = true;
                    }
                }
                HashPolicyEntry::SourceIp => {
                    if let Some(ip) = source_ip {
                        ip.hash(&mut hasher);
                        found = true;
                    }
                }
                HashPolicyEntry::QueryParameter { name } => {
                    let params = headers.query_params();
                    if let Some((_, value)) = params.iter().find(|(k, _)| k == name) {
                        value.hash(&mut hasher);
                        found = true;
                    }
                }
            }
        }

        found.then(|| hasher.finish())
    }
}

fn find_cookie<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

impl From<&[HashPolicyConfig]> for HashPolicy {
    fn from(configs: &[HashPolicyConfig]) -> Self {
        let entries = configs
            .iter()
            .map(|config| match config {
                HashPolicyConfig::Header { header_name } => HashPolicyEntry::Header {
                    name: header_name.to_ascii_lowercase(),
                },
                HashPolicyConfig::Cookie { name, ttl_secs } => HashPolicyEntry::Cookie {
                    name: name.clone(),
                    ttl: ttl_secs.map(Duration::from_secs),
                },
                HashPolicyConfig::SourceIp => HashPolicyEntry::SourceIp,
                HashPolicyConfig::QueryParameter { name } => {
                    HashPolicyEntry::QueryParameter { name: name.clone() }
                }
            })
            .collect();
        Self::new(entries)
    }
}

/// All policies attached to a route, returned as one handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutePolicy {
    retry: RetryPolicy,
    rate_limit: RateLimitPolicy,
    shadow: ShadowPolicy,
    hash: HashPolicy,
}

impl RoutePolicy {
    pub fn new(
        retry: RetryPolicy,
        rate_limit: RateLimitPolicy,
        shadow: ShadowPolicy,
        hash: HashPolicy,
    ) -> Self {
        Self {
            retry,
            rate_limit,
            shadow,
            hash,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn rate_limit_policy(&self) -> &RateLimitPolicy {
        &self.rate_limit
    }

    pub fn shadow_policy(&self) -> &ShadowPolicy {
        &self.shadow
    }

    pub fn hash_policy(&self) -> &HashPolicy {
        &self.hash
    }
}

/// Subset load-balancing criteria, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataMatchCriteria {
    criteria: Vec<(String, String)>,
}

impl MetadataMatchCriteria {
    pub fn new(criteria: &BTreeMap<String, String>) -> Self {
        Self {
            criteria: criteria
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.criteria
            .binary_search_by(|(k, _)| k.as_str().cmp(name))
            .ok()
            .map(|i| self.criteria[i].1.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.criteria.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Combine with more specific criteria; `overrides` wins on conflicts.
    pub fn merge(&self, overrides: &MetadataMatchCriteria) -> MetadataMatchCriteria {
        let mut merged: BTreeMap<String, String> = self.criteria.iter().cloned().collect();
        merged.extend(overrides.criteria.iter().cloned());
        MetadataMatchCriteria::new(&merged)
    }
}

/// Secondary request classifier (per-endpoint stats bucketing).
#[derive(Debug, Clone)]
pub struct VirtualClusterEntry {
    name: String,
    pattern: Regex,
    method: Option<String>,
}

impl VirtualClusterEntry {
    pub fn from_config(config: &VirtualClusterConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            name: config.name.clone(),
            pattern: Regex::new(&format!("^(?:{})$", config.pattern))?,
            method: config.method.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, headers: &Headers) -> bool {
        let path_matches = headers
            .path()
            .map(|path| self.pattern.is_match(path))
            .unwrap_or(false);
        let method_matches = match &self.method {
            Some(method) => headers
                .method()
                .map(|m| m.eq_ignore_ascii_case(method))
                .unwrap_or(false),
            None => true,
        };
        path_matches && method_matches
    }
}
