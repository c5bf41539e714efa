//! Admin API.
//!
//! # Responsibilities
//! - Report the published route table (generation, virtual hosts, routes)
//! - Guard every endpoint with a bearer token
//!
//! # Design Decisions
//! - Read-only: reloads come from the config watcher, not the API
//! - Each request reads one snapshot, so a response never mixes two tables

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use crate::routing::RouteTableHandle;

use self::auth::admin_auth_middleware;
use self::handlers::{get_routes, get_status};

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub routes: Arc<RouteTableHandle>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(routes: Arc<RouteTableHandle>, api_key: &str) -> Self {
        Self {
            routes,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}
