use axum::{extract::State, Json};
use serde::Serialize;

use crate::routing::{PathMatchType, RouteRule};

use super::AdminState;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub generation: u64,
    pub virtual_hosts: usize,
    pub routes: usize,
}

#[derive(Serialize)]
pub struct RouteSummary {
    pub name: Option<String>,
    pub match_type: PathMatchType,
    pub matcher: String,
    pub action: String,
    pub timeout_ms: u64,
}

#[derive(Serialize)]
pub struct VirtualHostSummary {
    pub name: String,
    pub domains: Vec<String>,
    pub routes: Vec<RouteSummary>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let table = state.routes.load();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        generation: table.generation(),
        virtual_hosts: table.virtual_hosts().len(),
        routes: table.route_count(),
    })
}

pub async fn get_routes(State(state): State<AdminState>) -> Json<Vec<VirtualHostSummary>> {
    let table = state.routes.load();
    let summaries = table
        .virtual_hosts()
        .iter()
        .map(|vh| VirtualHostSummary {
            name: vh.name().to_string(),
            domains: vh.domains().to_vec(),
            routes: vh.routes().iter().map(|rule| summarize(rule.as_ref())).collect(),
        })
        .collect();
    Json(summaries)
}

fn summarize(rule: &dyn RouteRule) -> RouteSummary {
    RouteSummary {
        name: rule.base().name().map(str::to_string),
        match_type: rule.match_type(),
        matcher: rule.matcher().to_string(),
        action: rule.base().action().to_string(),
        timeout_ms: rule.global_timeout().as_millis() as u64,
    }
}
