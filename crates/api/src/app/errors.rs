use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use aeroforge_core::DomainError;

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let status = match &err {
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::InsufficientInventory(_) | DomainError::Conflict(_) => StatusCode::CONFLICT,
        DomainError::Unauthorized => StatusCode::UNAUTHORIZED,
        DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
        DomainError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = match &err {
        DomainError::Validation(m)
        | DomainError::NotFound(m)
        | DomainError::InsufficientInventory(m)
        | DomainError::Conflict(m)
        | DomainError::Forbidden(m) => m.clone(),
        DomainError::Unauthorized => "Invalid or expired credentials.".to_string(),
        DomainError::Storage(m) => {
            tracing::error!(error = %m, "request failed with storage error");
            "Internal storage failure; the operation was not applied.".to_string()
        }
    };
    json_error(status, err.code(), message)
}

pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "status": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
