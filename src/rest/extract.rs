// rest/extract.rs — auth extractors for route handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::sync::Arc;

use crate::auth::parse_auth_header;
use crate::error::ApiError;
use crate::storage::UserRow;
use crate::AppContext;

/// Authenticated caller. Rejects with 401 when the Authorization header is
/// missing, malformed, or names an unknown token.
pub struct CurrentUser(pub UserRow);

/// Like [`CurrentUser`] but anonymous callers pass through as `None`.
/// A *present but invalid* token still rejects.
pub struct OptionalUser(pub Option<UserRow>);

async fn lookup(parts: &Parts, ctx: &AppContext) -> Result<Option<UserRow>, ApiError> {
    let Some(header) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let token = header
        .to_str()
        .ok()
        .and_then(parse_auth_header)
        .ok_or(ApiError::Unauthorized)?;
    let user = ctx
        .storage
        .get_token_user(token)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Some(user))
}

impl FromRequestParts<Arc<AppContext>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        match lookup(parts, state).await? {
            Some(user) => Ok(CurrentUser(user)),
            None => Err(ApiError::Unauthorized),
        }
    }
}

impl FromRequestParts<Arc<AppContext>> for OptionalUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        Ok(OptionalUser(lookup(parts, state).await?))
    }
}
