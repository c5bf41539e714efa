//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path, headers, query)
//!     → headers.rs (routing view with pseudo headers)
//!     → snapshot.rs (current RouteTable)
//!     → table.rs (virtual host by domain)
//!     → virtual_host.rs (ordered rules, first match wins)
//!     → rule.rs (base predicate via matcher.rs, then path discriminator)
//!     → Return: matched rule or None
//!
//! After a match:
//!     → rule.rs finalize (path/host rewrite, header_parser.rs)
//!     → rule.rs resolve_cluster (weighted.rs for traffic splits)
//!     → policy.rs (read by retry, rate-limit, shadow and hashing filters)
//!
//! Route Compilation (startup and reload):
//!     RouterConfig
//!     → Compile predicates, regexes, policies
//!     → Freeze as immutable RouteTable
//!     → Publish through RouteTableHandle
//! ```
//!
//! # Design Decisions
//! - Routes compiled at build time, immutable at runtime
//! - Deterministic: same headers and random value always give the same decision
//! - First match wins (configuration order, no specificity ranking)

pub mod header_parser;
pub mod headers;
pub mod matcher;
pub mod policy;
pub mod rule;
pub mod snapshot;
pub mod table;
pub mod virtual_host;
pub mod weighted;

pub use headers::{parse_query_string, Headers, QueryParams};
pub use matcher::{match_headers, match_query_params, HeaderMatcher, QueryParameterMatcher};
pub use policy::{
    HashPolicy, MetadataMatchCriteria, RateLimitPolicy, RetryPolicy, RoutePolicy, ShadowPolicy,
};
pub use rule::{
    build_route_rule, ClusterResolution, PathMatchType, RouteAction, RouteConfigError, RouteRule,
    RouteRuleBase,
};
pub use snapshot::RouteTableHandle;
pub use table::{BasicServiceRoute, RouteBuildError, RouteMatch, RouteTable, RouteTableBuild};
pub use virtual_host::{VirtualHost, VirtualHostId};
pub use weighted::{select_cluster, SelectError, WeightedClusterEntry, WeightedClusters};

/// Random value for weighted selection when no hash policy applies.
pub fn random_value() -> u64 {
    rand::random()
}
