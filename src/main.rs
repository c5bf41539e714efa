//! mesh-router
//!
//! Loads the routing configuration of a service-mesh proxy, publishes it as
//! an immutable route table and answers routing decisions.
//!
//! # Architecture Overview
//!
//! ```text
//!   route config (TOML/JSON)
//!        │ load + validate                 ┌──────────────────────────┐
//!        ▼                                 │  RouteTableHandle        │
//!   RouteTable::build ───── publish ──────▶│  (ArcSwap snapshot)      │
//!        ▲                                 └────────────┬─────────────┘
//!        │ reload                                       │ load()
//!   ConfigWatcher (notify)                              ▼
//!                                   request headers → virtual host → rule
//!                                                      → cluster + policy
//!
//!   Cross-cutting: tracing logs, Prometheus metrics, admin API (axum)
//! ```

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use mesh_router::admin::{setup_admin_router, AdminState};
use mesh_router::config::{load_config, watcher::ConfigWatcher};
use mesh_router::lifecycle::Shutdown;
use mesh_router::observability::{logging::init_logging, metrics::init_metrics};
use mesh_router::routing::headers::{
    Headers, HOST_HEADER, METHOD_HEADER, PATH_HEADER, QUERY_STRING_HEADER,
};
use mesh_router::routing::{random_value, ClusterResolution, RouteTable, RouteTableHandle};

#[derive(Parser)]
#[command(name = "mesh-router")]
#[command(about = "Service-mesh request router", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, validate and build a route config
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the routing decision for one request
    Match {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        host: String,
        #[arg(long, default_value = "/")]
        path: String,
        #[arg(long, default_value = "GET")]
        method: String,
        #[arg(long)]
        query: Option<String>,
        /// Request header as `name=value`; repeatable
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
        /// Fixed value for weighted selection
        #[arg(long)]
        random_value: Option<u64>,
    },
    /// Publish the route table and keep it current
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => check(&config),
        Commands::Match {
            config,
            host,
            path,
            method,
            query,
            headers,
            random_value,
        } => {
            let mut request = Headers::with_capacity(headers.len() + 4);
            for (name, value) in headers {
                request.append(name, &value);
            }
            request.insert(HOST_HEADER, host);
            request.insert(PATH_HEADER, path);
            request.insert(METHOD_HEADER, method);
            if let Some(query) = query {
                request.insert(QUERY_STRING_HEADER, query);
            }
            print_match(&config, request, random_value)
        }
        Commands::Serve { config } => serve(config).await,
    }
}

fn check(path: &Path) -> Result<(), Box<dyn Error>> {
    let config = load_config(path)?;
    init_logging(&config.observability);

    let build = RouteTable::build(&config);
    for error in &build.errors {
        eprintln!("error: {error}");
    }
    for pair in build.table.basic_service_routes() {
        println!("service {} -> cluster {}", pair.service, pair.cluster);
    }
    println!(
        "{} virtual hosts, {} routes, {} errors",
        build.table.virtual_hosts().len(),
        build.table.route_count(),
        build.errors.len()
    );

    if build.errors.is_empty() {
        Ok(())
    } else {
        Err(format!("{} routes failed to build", build.errors.len()).into())
    }
}

fn print_match(
    path: &Path,
    mut request: Headers,
    fixed_random: Option<u64>,
) -> Result<(), Box<dyn Error>> {
    let config = load_config(path)?;
    let table = RouteTable::build(&config).table;

    let probe = fixed_random.unwrap_or_else(random_value);
    let Some(found) = table.route(&mut request, probe) else {
        println!("{}", serde_json::json!({ "matched": false }));
        return Ok(());
    };
    let rule = found.rule;

    // Session affinity: a hash policy hit replaces the random draw.
    let random = fixed_random
        .or_else(|| rule.policy().hash_policy().hash_key(&request, None))
        .unwrap_or(probe);

    let resolution = match rule.base().resolve_cluster(&request, random) {
        ClusterResolution::Cluster(name) => serde_json::json!({ "cluster": name }),
        ClusterResolution::NotFound { status } => serde_json::json!({ "not_found": status }),
        ClusterResolution::Redirect(location) => serde_json::json!({ "redirect": location }),
        ClusterResolution::DirectResponse(response) => serde_json::json!({
            "direct_response": { "status": response.status, "body": response.body }
        }),
    };
    let retry = rule.policy().retry_policy();

    let decision = serde_json::json!({
        "matched": true,
        "virtual_host": found.virtual_host.name(),
        "route": rule.base().name(),
        "match_type": rule.match_type(),
        "matcher": rule.matcher(),
        "resolution": resolution,
        "path": request.path(),
        "host": request.host(),
        "timeout_ms": rule.global_timeout().as_millis() as u64,
        "retry": {
            "retry_on": retry.retry_on(),
            "num_retries": retry.num_retries(),
            "retry_timeout_ms": retry.retry_timeout().as_millis() as u64,
        },
        "shadow_cluster": rule.policy().shadow_policy().cluster(),
        "virtual_cluster": rule.base().virtual_cluster(&request),
        "metadata_match": rule.base().metadata_match_for(random).map(|criteria| {
            criteria
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::from(v)))
                .collect::<serde_json::Map<_, _>>()
        }),
    });

    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

async fn serve(path: PathBuf) -> Result<(), Box<dyn Error>> {
    let config = load_config(&path)?;
    init_logging(&config.observability);

    tracing::info!(
        config = ?path,
        downstream = ?config.downstream_protocol,
        upstream = ?config.upstream_protocol,
        "mesh-router v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let (handle, errors) = RouteTableHandle::from_config(&config);
    for error in &errors {
        tracing::warn!(error = %error, "Route not published");
    }
    let routes = Arc::new(handle);
    let shutdown = Shutdown::new();

    // Keep the watcher alive for the whole process.
    let _watcher = if config.support_dynamic_route {
        let (watcher, mut updates) = ConfigWatcher::new(&path);
        let watcher = watcher.run()?;

        let routes = routes.clone();
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = updates.recv() => {
                        let Some(new_config) = update else { break };
                        for error in routes.reload(&new_config) {
                            tracing::warn!(error = %error, "Route not published");
                        }
                    }
                    _ = stop.recv() => break,
                }
            }
            tracing::debug!("Reload task stopped");
        });
        Some(watcher)
    } else {
        tracing::info!("Dynamic routing disabled, route table is fixed");
        None
    };

    let admin_task = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");

        let app = setup_admin_router(AdminState::new(routes.clone(), &config.admin.api_key));
        let mut stop = shutdown.subscribe();
        Some(tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            });
            if let Err(e) = server.await {
                tracing::error!(error = %e, "Admin API failed");
            }
        }))
    } else {
        None
    };

    shutdown.wait_for_signal().await;

    if let Some(task) = admin_task {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
