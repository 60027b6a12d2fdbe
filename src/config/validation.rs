//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (status codes, addresses, methods)
//! - Detect duplicate or contradictory route settings
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::Method;

use crate::config::schema::GateConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),
    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),
    #[error("duplicate route name '{0}'")]
    DuplicateRoute(String),
    #[error("route '{name}': path '{path}' must start with '/'")]
    RoutePath { name: String, path: String },
    #[error("route '{name}': invalid method '{method}'")]
    RouteMethod { name: String, method: String },
    #[error("route '{name}': status {status} outside 100..=999")]
    RouteStatus { name: String, status: u16 },
    #[error("route '{0}': timeout_ms and disabled are mutually exclusive")]
    RouteTimeoutConflict(String),
    #[error("filter #{0} has no condition")]
    EmptyFilter(usize),
    #[error("filter #{index}: path prefix '{prefix}' must start with '/'")]
    FilterPrefix { index: usize, prefix: String },
}

pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    let mut names = HashSet::new();
    for route in &config.routes {
        if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }
        if !route.path.starts_with('/') {
            errors.push(ValidationError::RoutePath {
                name: route.name.clone(),
                path: route.path.clone(),
            });
        }
        if route.method.parse::<Method>().is_err() {
            errors.push(ValidationError::RouteMethod {
                name: route.name.clone(),
                method: route.method.clone(),
            });
        }
        if !(100..=999).contains(&route.status) {
            errors.push(ValidationError::RouteStatus {
                name: route.name.clone(),
                status: route.status,
            });
        }
        if route.timeout_ms.is_some() && route.disabled {
            errors.push(ValidationError::RouteTimeoutConflict(route.name.clone()));
        }
    }

    for (index, filter) in config.filters.iter().enumerate() {
        if filter.host.is_none() && filter.path_prefix.is_none() {
            errors.push(ValidationError::EmptyFilter(index));
        }
        if let Some(prefix) = &filter.path_prefix {
            if !prefix.starts_with('/') {
                errors.push(ValidationError::FilterPrefix {
                    index,
                    prefix: prefix.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
