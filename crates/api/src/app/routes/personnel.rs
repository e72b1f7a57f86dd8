use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::Response,
    Json,
};
use serde_json::json;

use aeroforge_auth::NewUser;

use crate::app::routes::common::{respond, respond_with, run_blocking};
use crate::app::services::SharedServices;
use crate::app::{dto, errors};

pub async fn login(
    Extension(services): Extension<SharedServices>,
    body: Result<Json<dto::LoginRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    let result = run_blocking(move || services.login(&body.username, &body.password)).await;
    respond(result, |token| json!({ "access": token }))
}

pub async fn register(
    Extension(services): Extension<SharedServices>,
    body: Result<Json<NewUser>, JsonRejection>,
) -> Response {
    let Json(new_user) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    let result = run_blocking(move || services.register(new_user)).await;
    respond_with(StatusCode::CREATED, result, |account| {
        json!({
            "id": account.id,
            "username": account.username,
            "email": account.email,
            "department": account.department,
        })
    })
}
