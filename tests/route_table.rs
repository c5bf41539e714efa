//! End-to-end routing decisions against a built route table.

use std::collections::HashMap;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use mesh_router::config::{parse_config, ConfigFormat};
use mesh_router::routing::headers::SERVICE_HEADER;
use mesh_router::routing::{
    select_cluster, ClusterResolution, Headers, PathMatchType, RetryPolicy, RouteTable,
    WeightedClusterEntry,
};

mod common;

use common::{mesh_config, request, request_with_query};

const SHOP: &str = "shop.example.com";

fn table() -> RouteTable {
    let build = RouteTable::build(&mesh_config());
    assert!(build.errors.is_empty(), "unexpected errors: {:?}", build.errors);
    build.table
}

fn cluster_for(table: &RouteTable, headers: &Headers) -> Option<String> {
    let found = table.find_route(headers, 0)?;
    match found.rule.base().resolve_cluster(headers, 0) {
        ClusterResolution::Cluster(name) => Some(name.to_string()),
        other => Some(format!("{other:?}")),
    }
}

#[test]
fn test_exact_path_does_not_match_trailing_slash() {
    let table = table();
    assert_eq!(cluster_for(&table, &request(SHOP, "/foo")).as_deref(), Some("exact-foo"));

    // The storefront host is still selected; no other virtual host is tried.
    assert!(table.find_route(&request(SHOP, "/foo/"), 0).is_none());
}

#[test]
fn test_regex_route() {
    let table = table();
    let found = table.find_route(&request(SHOP, "/api/v2/x"), 0).unwrap();
    assert_eq!(found.rule.match_type(), PathMatchType::Regex);
    assert_eq!(found.rule.cluster_name(), "api-versioned");

    assert!(table.find_route(&request(SHOP, "/api/vx/x"), 0).is_none());
}

#[test]
fn test_prefix_is_case_sensitive() {
    let table = table();
    assert_eq!(
        cluster_for(&table, &request(SHOP, "/Static/app.js")).as_deref(),
        Some("static")
    );
    assert!(table.find_route(&request(SHOP, "/static/app.js"), 0).is_none());
}

#[test]
fn test_first_match_wins_and_header_predicate() {
    let table = table();

    let mut canary = request(SHOP, "/checkout/cart");
    canary.insert("x-canary", "1");
    assert_eq!(cluster_for(&table, &canary).as_deref(), Some("checkout-canary"));

    // Adding unrelated headers never turns a match into a non-match.
    canary.insert("x-unrelated", "yes");
    assert_eq!(cluster_for(&table, &canary).as_deref(), Some("checkout-canary"));

    let plain = request(SHOP, "/checkout/cart");
    assert_eq!(cluster_for(&table, &plain).as_deref(), Some("checkout-b"));
}

#[test]
fn test_query_predicates() {
    let table = table();

    // No query string: query predicates are not consulted.
    assert_eq!(
        cluster_for(&table, &request(SHOP, "/search")).as_deref(),
        Some("search-debug")
    );
    assert_eq!(
        cluster_for(&table, &request_with_query(SHOP, "/search", "q=shoes&debug=1")).as_deref(),
        Some("search-debug")
    );
    assert!(table
        .find_route(&request_with_query(SHOP, "/search", "q=shoes"), 0)
        .is_none());
}

#[test]
fn test_service_header_routes() {
    let table = table();

    let mut rpc = request("rpc.internal", "");
    rpc.insert(SERVICE_HEADER, "com.example.Foo");
    let found = table.find_route(&rpc, 0).unwrap();
    assert_eq!(found.rule.match_type(), PathMatchType::ServiceHeader);
    assert_eq!(found.rule.cluster_name(), "foo-service");

    let missing = request("rpc.internal", "/");
    assert!(table.find_route(&missing, 0).is_none());

    let mut bar = request("rpc.internal", "/");
    bar.insert(SERVICE_HEADER, "com.example.Bar");
    assert_eq!(cluster_for(&table, &bar).as_deref(), Some("bar-service"));

    let pairs: Vec<_> = table
        .basic_service_routes()
        .into_iter()
        .map(|p| (p.service, p.cluster))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("com.example.Foo".to_string(), "foo-service".to_string()),
            ("com.example.Bar".to_string(), "bar-service".to_string()),
        ]
    );
}

#[test]
fn test_default_virtual_host_direct_response() {
    let table = table();
    let headers = request("unknown.example.org", "/anything");
    let found = table.find_route(&headers, 0).unwrap();
    assert_eq!(found.virtual_host.name(), "default");
    match found.rule.base().resolve_cluster(&headers, 0) {
        ClusterResolution::DirectResponse(response) => {
            assert_eq!(response.status, 404);
            assert_eq!(response.body.as_deref(), Some("no route"));
        }
        other => panic!("expected direct response, got {other:?}"),
    }
}

#[test]
fn test_route_finalizes_headers_idempotently() {
    let table = table();
    let mut headers = request("www.shop.example.com", "/checkout/cart");

    let found = table.route(&mut headers, 0).unwrap();
    assert_eq!(found.rule.base().name(), Some("checkout"));
    assert_eq!(headers.path(), Some("/v2/checkout/cart"));
    assert_eq!(headers.original_path(), Some("/checkout/cart"));
    assert_eq!(headers.get("x-routed-by"), Some("mesh:/checkout"));

    let once = headers.clone();
    found.rule.finalize_request_headers(&mut headers);
    assert_eq!(headers, once);
}

#[test]
fn test_route_policies() {
    let table = table();
    let found = table.find_route(&request(SHOP, "/checkout"), 0).unwrap();
    let rule = found.rule;

    assert_eq!(rule.global_timeout(), Duration::from_millis(2500));
    assert_eq!(
        rule.policy().retry_policy(),
        &RetryPolicy::new(true, Duration::from_millis(250), 2)
    );
    assert!(!rule.policy().shadow_policy().enabled());
    assert!(rule.policy().rate_limit_policy().is_empty());

    let mut alice = request(SHOP, "/checkout");
    alice.insert("x-user", "alice");
    let key = rule.policy().hash_policy().hash_key(&alice, None);
    assert!(key.is_some());
    assert_eq!(key, rule.policy().hash_policy().hash_key(&alice, None));

    // A route without overrides has the disabled default.
    let plain = table.find_route(&request(SHOP, "/foo"), 0).unwrap();
    assert_eq!(plain.rule.global_timeout(), Duration::ZERO);
    assert_eq!(plain.rule.policy().retry_policy(), &RetryPolicy::default());
}

#[test]
fn test_zero_weight_cluster_never_selected() {
    let table = table();
    let headers = request(SHOP, "/checkout");
    let found = table.find_route(&headers, 0).unwrap();
    for rv in 0..500u64 {
        assert_eq!(
            found.rule.base().resolve_cluster(&headers, rv),
            ClusterResolution::Cluster("checkout-b")
        );
    }
}

#[test]
fn test_weighted_selection_is_proportional() {
    let entries = vec![
        WeightedClusterEntry::new("a", 20),
        WeightedClusterEntry::new("b", 30),
        WeightedClusterEntry::new("c", 50),
    ];

    let mut counts: HashMap<&str, u64> = HashMap::new();
    for rv in 0..100_000u64 {
        *counts
            .entry(select_cluster(&entries, 100, rv).unwrap())
            .or_default() += 1;
    }
    assert_eq!(counts["a"], 20_000);
    assert_eq!(counts["b"], 30_000);
    assert_eq!(counts["c"], 50_000);

    assert_eq!(
        select_cluster(&entries, 100, 4242),
        select_cluster(&entries, 100, 4242)
    );
}

const ADMIN_GUARD_CONFIG: &str = r#"
[[virtual_hosts]]
name = "edge"
domains = ["*"]

[[virtual_hosts.routes]]
name = "deny-admin"
match = { prefix = "/api/admin" }
direct_response = { status = 403 }

[[virtual_hosts.routes]]
name = "api"
match = { prefix = "/api" }

[virtual_hosts.routes.route]
cluster_name = "api"
prefix_rewrite = "/v2"
"#;

#[test]
fn test_client_mesh_headers_cannot_redirect_routing() {
    let config = parse_config(ADMIN_GUARD_CONFIG, ConfigFormat::Toml).unwrap();
    let build = RouteTable::build(&config);
    assert!(build.errors.is_empty(), "unexpected errors: {:?}", build.errors);
    let table = build.table;

    let request = Request::builder()
        .uri("http://edge.local/api/public")
        .header("x-mesh-original-path", "/api/admin/secrets")
        .header("x-mesh-querystring", "debug=1")
        .header("X-Mesh-Path", "/api/admin/secrets")
        .body(Body::empty())
        .unwrap();
    let mut headers = Headers::from_request(&request);

    let found = table.route(&mut headers, 0).unwrap();
    assert_eq!(found.rule.base().name(), Some("api"));
    assert_eq!(
        found.rule.base().resolve_cluster(&headers, 0),
        ClusterResolution::Cluster("api")
    );
    assert_eq!(headers.path(), Some("/v2/public"));
    assert_eq!(headers.original_path(), Some("/api/public"));
    assert!(headers.query_params().is_empty());
    assert!(headers
        .upstream_headers()
        .all(|(name, _)| !name.starts_with("x-mesh-")));

    // The real admin path is still denied.
    let admin = Request::builder()
        .uri("http://edge.local/api/admin/secrets")
        .body(Body::empty())
        .unwrap();
    let mut admin_headers = Headers::from_request(&admin);
    let denied = table.route(&mut admin_headers, 0).unwrap();
    assert_eq!(denied.rule.base().name(), Some("deny-admin"));
    assert!(matches!(
        denied.rule.base().resolve_cluster(&admin_headers, 0),
        ClusterResolution::DirectResponse(response) if response.status == 403
    ));
}
