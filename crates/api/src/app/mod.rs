//! HTTP API application wiring (Axum router + service wiring).
//!
//! Layout:
//! - `services.rs`: request-facing facade over the engine and access guard
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request DTOs and JSON response mapping
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use aeroforge_infra::{AppConfig, ConfigError};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router around already-bootstrapped services.
pub fn build_app(services: Arc<services::AppServices>) -> Router {
    // Protected routes: require a bearer token.
    let protected = routes::router().layer(axum::middleware::from_fn(middleware::auth_middleware));

    Router::new()
        .merge(routes::public_router())
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}

/// Bootstrap services from `config` and build the router (used by `main.rs` and tests).
pub fn build_app_from_config(config: &AppConfig) -> Result<Router, ConfigError> {
    let services = Arc::new(services::AppServices::from_config(config)?);
    Ok(build_app(services))
}
