//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! route config file (TOML/JSON)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (virtual host level checks)
//!     → RouterConfig (validated, immutable)
//!     → routing::RouteTable::build (per-route checks)
//!
//! On reload:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → new RouteTable built and swapped in atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError, ConfigFormat};
pub use schema::{
    AdminConfig, ObservabilityConfig, RouteActionConfig, RouteConfig, RouteMatchConfig,
    RouterConfig, VirtualHostConfig,
};
