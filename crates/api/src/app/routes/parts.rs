use axum::{
    extract::{rejection::JsonRejection, Extension},
    response::Response,
    Json,
};

use crate::app::routes::common::{respond, run_blocking};
use crate::app::services::SharedServices;
use crate::app::{dto, errors};
use crate::context::CredentialContext;

pub async fn list_parts(
    Extension(services): Extension<SharedServices>,
    Extension(ctx): Extension<CredentialContext>,
) -> Response {
    let result = run_blocking(move || services.list_parts(ctx.credential())).await;
    respond(result, dto::part_listing_to_json)
}

pub async fn create_part(
    Extension(services): Extension<SharedServices>,
    Extension(ctx): Extension<CredentialContext>,
    body: Result<Json<dto::PartRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let (part, plane) = match body.ids() {
        Ok(ids) => ids,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let result = run_blocking(move || services.add_part(ctx.credential(), part, plane)).await;
    respond(result, dto::part_added_to_json)
}

pub async fn recycle_part(
    Extension(services): Extension<SharedServices>,
    Extension(ctx): Extension<CredentialContext>,
    body: Result<Json<dto::PartRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let (part, plane) = match body.ids() {
        Ok(ids) => ids,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let result = run_blocking(move || services.recycle_part(ctx.credential(), part, plane)).await;
    respond(result, dto::part_recycled_to_json)
}
