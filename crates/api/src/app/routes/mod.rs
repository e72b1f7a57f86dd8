use axum::{
    routing::{delete, get, post},
    Router,
};

pub mod common;
pub mod departments;
pub mod parts;
pub mod personnel;
pub mod planes;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/part/list", get(parts::list_parts))
        .route("/part/create", post(parts::create_part))
        .route("/part/recycle", delete(parts::recycle_part))
        .route("/plane/list", get(planes::list_planes))
        .route("/plane/create", post(planes::assemble_plane))
        .route("/plane/recycle", delete(planes::recycle_plane))
        .route("/plane/assemble-history", get(planes::assembly_history))
        .route("/department/list", get(departments::list_departments))
}

/// Router for endpoints reachable without a token.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/personnel/login", post(personnel::login))
        .route("/personnel/register", post(personnel::register))
}
