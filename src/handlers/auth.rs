use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};

use crate::errors::AppError;
use crate::models::Actor;
use crate::response::ApiResponse;
use crate::services::auth;
use crate::state::AppState;

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AppError::Unauthorized)?;
        state.auth.authenticate(token)?.ok_or(AppError::Unauthorized)
    }
}

// POST /auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<ApiResponse<()>, AppError> {
    let Some(device_id) = actor.device_id.as_deref() else {
        return Err(AppError::Validation(
            "this credential is not tied to a device session".to_string(),
        ));
    };

    {
        let db = state.conn()?;
        auth::invalidate_session(&db, &actor.user_id, device_id)?;
    }

    Ok(ApiResponse::ok("logged out", ()))
}
