//! Shared fixtures for integration tests.

#![allow(dead_code)]

use mesh_router::config::{parse_config, ConfigFormat};
use mesh_router::routing::headers::{HOST_HEADER, PATH_HEADER, QUERY_STRING_HEADER};
use mesh_router::routing::Headers;
use mesh_router::RouterConfig;

/// A mesh with one HTTP virtual host, one RPC virtual host and a default.
pub const MESH_CONFIG: &str = r#"
downstream_protocol = "http1"
upstream_protocol = "http2"

[[virtual_hosts]]
name = "storefront"
domains = ["shop.example.com", "*.shop.example.com"]

[[virtual_hosts.routes]]
name = "health"
match = { path = "/foo" }
route = { cluster_name = "exact-foo" }

[[virtual_hosts.routes]]
name = "api-versioned"
match = { regex = "^/api/v[0-9]+/.*$" }
route = { cluster_name = "api-versioned" }

[[virtual_hosts.routes]]
name = "canary"
match = { prefix = "/checkout", headers = [{ name = "x-canary", value = "1" }] }
route = { cluster_name = "checkout-canary" }

[[virtual_hosts.routes]]
name = "checkout"
match = { prefix = "/checkout" }

[virtual_hosts.routes.route]
prefix_rewrite = "/v2/checkout"
timeout_ms = 2500
hash_policy = [{ type = "header", header_name = "x-user" }]
request_headers_to_add = [{ name = "x-routed-by", value = "mesh:%MATCHED%", append = true }]

[virtual_hosts.routes.route.weighted_clusters]
total_weight = 10
clusters = [{ name = "checkout-a", weight = 0 }, { name = "checkout-b", weight = 10 }]

[virtual_hosts.routes.route.retry_policy]
retry_on = true
retry_timeout_ms = 250
num_retries = 2

[[virtual_hosts.routes]]
name = "search"
match = { prefix = "/search", query_parameters = [{ name = "debug", value = "1" }] }
route = { cluster_name = "search-debug" }

[[virtual_hosts.routes]]
name = "static"
match = { prefix = "/Static" }
route = { cluster_name = "static" }

[[virtual_hosts]]
name = "rpc"
domains = ["rpc.internal"]

[[virtual_hosts.routes]]
match = { service = "com.example.Foo" }
route = { cluster_name = "foo-service" }

[[virtual_hosts.routes]]
match = { prefix = "/", headers = [{ name = "service", value = "com.example.Bar" }] }
route = { cluster_name = "bar-service" }

[[virtual_hosts]]
name = "default"
domains = ["*"]

[[virtual_hosts.routes]]
match = { prefix = "/" }
direct_response = { status = 404, body = "no route" }
"#;

pub fn mesh_config() -> RouterConfig {
    parse_config(MESH_CONFIG, ConfigFormat::Toml).unwrap()
}

/// A default virtual host routing everything to `cluster`.
pub fn single_cluster_config(cluster: &str) -> RouterConfig {
    let raw = format!(
        r#"
[[virtual_hosts]]
name = "default"
domains = ["*"]

[[virtual_hosts.routes]]
match = {{ prefix = "/" }}
route = {{ cluster_name = "{cluster}" }}
"#
    );
    parse_config(&raw, ConfigFormat::Toml).unwrap()
}

pub fn request(host: &str, path: &str) -> Headers {
    let mut headers = Headers::new();
    headers.insert(HOST_HEADER, host);
    headers.insert(PATH_HEADER, path);
    headers
}

pub fn request_with_query(host: &str, path: &str, query: &str) -> Headers {
    let mut headers = request(host, path);
    headers.insert(QUERY_STRING_HEADER, query);
    headers
}
