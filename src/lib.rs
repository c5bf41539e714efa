//! Request routing for a service-mesh data-plane proxy.
//!
//! Given a request's host, path, headers and query parameters, picks the
//! route, the upstream cluster and the per-route policies (retry, rate
//! limit, shadow, hashing, header rewriting) that downstream filters read.

pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use config::schema::RouterConfig;
pub use routing::{Headers, RouteRule, RouteTable, RouteTableHandle};
