//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation of the virtual host layer (serde handles syntactic)
//! - Detect conflicting domains and virtual host names
//! - Report suspicious but legal configurations as warnings
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Per-route problems (weights, regexes, actions) are not checked here;
//!   the route table builder reports them route by route so the rest of
//!   the table can still be published

use std::collections::HashMap;

use thiserror::Error;

use crate::config::schema::RouterConfig;

/// A semantic problem that makes a configuration unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("virtual host #{index} has an empty name")]
    EmptyVirtualHostName { index: usize },

    #[error("virtual host '{0}' is defined more than once")]
    DuplicateVirtualHost(String),

    #[error("virtual host '{0}' has no domains")]
    NoDomains(String),

    #[error("domain '{domain}' is claimed by both '{first}' and '{second}'")]
    DuplicateDomain {
        domain: String,
        first: String,
        second: String,
    },

    #[error("admin API is enabled but no api_key is set")]
    MissingAdminKey,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut names: HashMap<&str, usize> = HashMap::new();
    let mut domains: HashMap<String, &str> = HashMap::new();

    for (index, vhost) in config.virtual_hosts.iter().enumerate() {
        if vhost.name.is_empty() {
            errors.push(ValidationError::EmptyVirtualHostName { index });
        } else if names.insert(vhost.name.as_str(), index).is_some() {
            errors.push(ValidationError::DuplicateVirtualHost(vhost.name.clone()));
        }

        if vhost.domains.is_empty() {
            errors.push(ValidationError::NoDomains(vhost.name.clone()));
        }

        for domain in &vhost.domains {
            let domain = domain.to_ascii_lowercase();
            if let Some(first) = domains.get(&domain) {
                errors.push(ValidationError::DuplicateDomain {
                    domain,
                    first: first.to_string(),
                    second: vhost.name.clone(),
                });
            } else {
                domains.insert(domain, vhost.name.as_str());
            }
        }
    }

    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::MissingAdminKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Log legal configurations that are probably mistakes.
pub fn warn_suspicious(config: &RouterConfig) {
    if !config.support_dynamic_route {
        tracing::warn!("Dynamic routing disabled, route table will not be reloaded");
    }

    if config.virtual_hosts.is_empty() {
        tracing::warn!("No virtual hosts configured, every request will be unrouted");
    }

    for vhost in &config.virtual_hosts {
        if vhost.routes.is_empty() {
            tracing::warn!(virtual_host = %vhost.name, "Virtual host has no routes");
        }
    }
}
