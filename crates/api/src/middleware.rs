use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use aeroforge_auth::Credential;

use crate::app::errors;
use crate::context::CredentialContext;

/// Require a bearer token on every protected route.
pub async fn auth_middleware(mut req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let token = match extract_bearer(req.headers()) {
        Ok(token) => token.to_string(),
        Err(message) => return errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", message),
    };

    req.extensions_mut()
        .insert(CredentialContext::new(Credential::bearer(token)));

    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, &'static str> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or("Authentication token is required.")?;

    let header = header.to_str().map_err(|_| "Malformed authorization header.")?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or("Authorization header must use the Bearer scheme.")?;

    let token = header.trim();
    if token.is_empty() {
        return Err("Authentication token is required.");
    }

    Ok(token)
}
