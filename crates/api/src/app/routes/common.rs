use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use aeroforge_core::{DomainError, DomainResult};

use crate::app::errors;

/// Run a synchronous engine call on the blocking pool.
///
/// The spawned task is not tied to the request future: if the client goes
/// away the operation still runs to completion.
pub async fn run_blocking<T, F>(f: F) -> DomainResult<T>
where
    F: FnOnce() -> DomainResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DomainError::storage(format!("inventory task failed: {e}")))?
}

/// 200 with the mapped body, or the error response.
pub fn respond<T>(result: DomainResult<T>, to_json: impl FnOnce(&T) -> Value) -> Response {
    respond_with(StatusCode::OK, result, to_json)
}

pub fn respond_with<T>(status: StatusCode, result: DomainResult<T>, to_json: impl FnOnce(&T) -> Value) -> Response {
    match result {
        Ok(value) => (status, Json(to_json(&value))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
