use axum::{extract::Extension, response::Response};

use crate::app::dto;
use crate::app::routes::common::respond;
use crate::app::services::SharedServices;
use crate::context::CredentialContext;

pub async fn list_departments(
    Extension(services): Extension<SharedServices>,
    Extension(ctx): Extension<CredentialContext>,
) -> Response {
    respond(
        services.department_overview(ctx.credential()),
        dto::department_overview_to_json,
    )
}
