use axum::{
    Extension,
    body::Body as AxumBody,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use tracing::warn;

use crate::services::auth_service::resolve_identity;
use crate::web::models::Identity;
use crate::web::{AppState, error::AppError};

/// Token from `Authorization: Bearer ...`, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub async fn auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut req: Request<AxumBody>,
    next: Next,
) -> Result<Response, AppError> {
    // Try to get token from Authorization header first, then fall back to cookie
    let token = bearer_token(req.headers())
        .or_else(|| jar.get("token").map(|c| c.value().to_string()))
        .ok_or_else(|| AppError::Unauthorized("Missing authentication token".to_string()))?;

    let identity = resolve_identity(&token, &state.config.jwt_secret)?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

pub async fn require_driver(
    Extension(identity): Extension<Identity>,
    req: Request<AxumBody>,
    next: Next,
) -> Result<Response, AppError> {
    if !identity.is_driver() {
        warn!(user_id = %identity.user_id, role = %identity.role, "Non-driver called a driver endpoint.");
        return Err(AppError::Forbidden("Driver role required".to_string()));
    }
    Ok(next.run(req).await)
}

pub async fn require_manager(
    Extension(identity): Extension<Identity>,
    req: Request<AxumBody>,
    next: Next,
) -> Result<Response, AppError> {
    if identity.is_driver() {
        warn!(user_id = %identity.user_id, "Driver called a manager endpoint.");
        return Err(AppError::Forbidden("Manager access required".to_string()));
    }
    Ok(next.run(req).await)
}
