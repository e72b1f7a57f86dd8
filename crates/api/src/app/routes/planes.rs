use axum::{
    extract::{rejection::JsonRejection, Extension},
    response::Response,
    Json,
};

use crate::app::routes::common::{respond, run_blocking};
use crate::app::services::SharedServices;
use crate::app::{dto, errors};
use crate::context::CredentialContext;

pub async fn list_planes(
    Extension(services): Extension<SharedServices>,
    Extension(ctx): Extension<CredentialContext>,
) -> Response {
    let result = run_blocking(move || services.list_planes(ctx.credential())).await;
    respond(result, dto::plane_listing_to_json)
}

pub async fn assemble_plane(
    Extension(services): Extension<SharedServices>,
    Extension(ctx): Extension<CredentialContext>,
    body: Result<Json<dto::PlaneRequest>, JsonRejection>,
) -> Response {
    let plane = match body {
        Ok(Json(body)) => match body.id() {
            Ok(id) => id,
            Err(e) => return errors::domain_error_to_response(e),
        },
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    let result = run_blocking(move || services.assemble_plane(ctx.credential(), plane)).await;
    respond(result, dto::assembly_to_json)
}

pub async fn recycle_plane(
    Extension(services): Extension<SharedServices>,
    Extension(ctx): Extension<CredentialContext>,
    body: Result<Json<dto::PlaneRequest>, JsonRejection>,
) -> Response {
    let plane = match body {
        Ok(Json(body)) => match body.id() {
            Ok(id) => id,
            Err(e) => return errors::domain_error_to_response(e),
        },
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    let result = run_blocking(move || services.recycle_plane(ctx.credential(), plane)).await;
    respond(result, dto::plane_recycled_to_json)
}

pub async fn assembly_history(
    Extension(services): Extension<SharedServices>,
    Extension(ctx): Extension<CredentialContext>,
) -> Response {
    let result = run_blocking(move || services.assembly_history(ctx.credential())).await;
    respond(result, |records| dto::history_to_json(records))
}
