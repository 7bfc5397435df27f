//! Bearer-token authentication middleware
//!
//! Every `/api` route requires `Authorization: Bearer <token>`. Tokens
//! resolve to active users through the `users` table; the resolved user is
//! attached as a request extension for handlers.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::db::users::{self, User};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// The authenticated caller, available to handlers via `Extension`
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = bearer_token(&request)
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

    let user = users::find_by_token(&state.db, &token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("unknown token".to_string()))?;

    if !user.is_active {
        return Err(ApiError::Unauthorized("user is deactivated".to_string()));
    }

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

fn bearer_token(request: &Request) -> Option<String> {
    let header = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    header
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
