// rest/routes/users.rs — registration, profiles, auth tokens, avatars,
// and subscriptions.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::Json;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::auth::{self, MIN_PASSWORD_LEN};
use crate::error::{bad_request, not_found, ApiError};
use crate::media;
use crate::rest::extract::{CurrentUser, OptionalUser};
use crate::rest::pagination::{envelope, PageQuery, Pagination};
use crate::storage::UserRow;
use crate::AppContext;

const MAX_NAME_LEN: usize = 150;
const MAX_EMAIL_LEN: usize = 254;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.@+-]+$").expect("valid username regex"));

/// Public profile shape shared by every endpoint that embeds a user.
pub(crate) async fn user_json(
    ctx: &AppContext,
    user: &UserRow,
    viewer: Option<i64>,
) -> Result<Value, ApiError> {
    let is_subscribed = match viewer {
        Some(viewer_id) => ctx.storage.is_following(viewer_id, user.id).await?,
        None => false,
    };
    Ok(json!({
        "id": user.id,
        "email": user.email,
        "username": user.username,
        "first_name": user.first_name,
        "last_name": user.last_name,
        "is_subscribed": is_subscribed,
        "avatar": user.avatar.as_deref().map(media::media_url),
    }))
}

/// Profile plus the author's recipes, as rendered in subscription lists.
/// `recipes_limit` caps the embedded recipe previews.
pub(crate) async fn user_with_recipes_json(
    ctx: &AppContext,
    user: &UserRow,
    viewer: Option<i64>,
    recipes_limit: Option<i64>,
) -> Result<Value, ApiError> {
    let mut body = user_json(ctx, user, viewer).await?;
    let recipes = ctx.storage.recipes_by_author(user.id, recipes_limit).await?;
    let previews: Vec<Value> = recipes
        .iter()
        .map(super::recipes::short_recipe_json)
        .collect();
    body["recipes"] = Value::Array(previews);
    body["recipes_count"] = json!(ctx.storage.count_recipes_by_author(user.id).await?);
    Ok(body)
}

// ─── Registration and profiles ──────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterBody {
    email: String,
    username: String,
    first_name: String,
    last_name: String,
    password: String,
}

fn validate_registration(body: &RegisterBody) -> Result<(), ApiError> {
    if body.email.is_empty() || !body.email.contains('@') || body.email.len() > MAX_EMAIL_LEN {
        return Err(bad_request("invalid email address"));
    }
    if body.username.is_empty() || body.username.len() > MAX_NAME_LEN {
        return Err(bad_request("username must be 1-150 characters"));
    }
    if !USERNAME_RE.is_match(&body.username) {
        return Err(bad_request(
            "username may only contain letters, digits and @/./+/-/_",
        ));
    }
    if body.username == "me" {
        return Err(bad_request("'me' is not a valid username"));
    }
    if body.first_name.is_empty() || body.first_name.len() > MAX_NAME_LEN {
        return Err(bad_request("first_name must be 1-150 characters"));
    }
    if body.last_name.is_empty() || body.last_name.len() > MAX_NAME_LEN {
        return Err(bad_request("last_name must be 1-150 characters"));
    }
    if body.password.len() < MIN_PASSWORD_LEN {
        return Err(bad_request("password must be at least 8 characters"));
    }
    Ok(())
}

/// POST /api/users/
pub async fn register(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<RegisterBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    validate_registration(&body)?;
    if ctx.storage.find_user_by_email(&body.email).await?.is_some() {
        return Err(bad_request("a user with this email already exists"));
    }
    if ctx
        .storage
        .find_user_by_username(&body.username)
        .await?
        .is_some()
    {
        return Err(bad_request("a user with this username already exists"));
    }

    let hash = auth::hash_password(&body.password);
    let user = ctx
        .storage
        .create_user(
            &body.email,
            &body.username,
            &body.first_name,
            &body.last_name,
            &hash,
        )
        .await?;
    info!(user_id = user.id, username = %user.username, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": user.id,
            "email": user.email,
            "username": user.username,
            "first_name": user.first_name,
            "last_name": user.last_name,
        })),
    ))
}

/// GET /api/users/
pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    OptionalUser(viewer): OptionalUser,
    Query(query): Query<PageQuery>,
    uri: Uri,
) -> Result<Json<Value>, ApiError> {
    let pagination = Pagination::from_query(&query, &ctx.config);
    let viewer_id = viewer.map(|u| u.id);
    let users = ctx
        .storage
        .list_users(pagination.limit_i64(), pagination.offset_i64())
        .await?;
    let count = ctx.storage.count_users().await?;
    let mut results = Vec::with_capacity(users.len());
    for user in &users {
        results.push(user_json(&ctx, user, viewer_id).await?);
    }
    Ok(Json(envelope(
        &ctx.config.site_url,
        &uri,
        count,
        &pagination,
        results,
    )))
}

/// GET /api/users/{id}/
pub async fn get(
    State(ctx): State<Arc<AppContext>>,
    OptionalUser(viewer): OptionalUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let user = ctx
        .storage
        .get_user(id)
        .await?
        .ok_or_else(|| not_found("user not found"))?;
    Ok(Json(user_json(&ctx, &user, viewer.map(|u| u.id)).await?))
}

/// GET /api/users/me/
pub async fn me(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(user_json(&ctx, &user, Some(user.id)).await?))
}

#[derive(Deserialize)]
pub struct SetPasswordBody {
    new_password: String,
    current_password: String,
}

/// POST /api/users/set_password/
pub async fn set_password(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<SetPasswordBody>,
) -> Result<StatusCode, ApiError> {
    if !auth::verify_password(&body.current_password, &user.password_hash) {
        return Err(bad_request("current password is incorrect"));
    }
    if body.new_password.len() < MIN_PASSWORD_LEN {
        return Err(bad_request("password must be at least 8 characters"));
    }
    let hash = auth::hash_password(&body.new_password);
    ctx.storage.set_password(user.id, &hash).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Avatar ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AvatarBody {
    // Option so a missing or null field maps to a 400, not a 422.
    avatar: Option<String>,
}

/// PUT /api/users/me/avatar/
pub async fn put_avatar(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<AvatarBody>,
) -> Result<Json<Value>, ApiError> {
    let data = body
        .avatar
        .as_deref()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| bad_request("avatar field is required"))?;
    let image = media::decode_data_url(data).map_err(ApiError::BadRequest)?;
    let relative = media::save_image(&ctx.config.media_dir, media::AVATAR_SUBDIR, &image).await?;
    ctx.storage.set_avatar(user.id, Some(&relative)).await?;
    remove_media_file(&ctx, user.avatar.as_deref()).await;
    Ok(Json(json!({ "avatar": media::media_url(&relative) })))
}

/// DELETE /api/users/me/avatar/
pub async fn delete_avatar(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user): CurrentUser,
) -> Result<StatusCode, ApiError> {
    ctx.storage.set_avatar(user.id, None).await?;
    remove_media_file(&ctx, user.avatar.as_deref()).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Best-effort removal of a replaced media file.
async fn remove_media_file(ctx: &AppContext, relative: Option<&str>) {
    if let Some(rel) = relative {
        let _ = tokio::fs::remove_file(ctx.config.media_dir.join(rel)).await;
    }
}

// ─── Auth tokens ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoginBody {
    email: String,
    password: String,
}

/// POST /api/auth/token/login/
pub async fn login(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<LoginBody>,
) -> Result<Json<Value>, ApiError> {
    let user = ctx.storage.find_user_by_email(&body.email).await?;
    let valid = user
        .as_ref()
        .map(|u| auth::verify_password(&body.password, &u.password_hash))
        .unwrap_or(false);
    let Some(user) = user.filter(|_| valid) else {
        return Err(bad_request("unable to log in with provided credentials"));
    };
    let token = ctx.storage.create_token(user.id).await?;
    info!(user_id = user.id, "login");
    Ok(Json(json!({ "auth_token": token })))
}

/// POST /api/auth/token/logout/
pub async fn logout(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(auth::parse_auth_header)
        .ok_or(ApiError::Unauthorized)?;
    ctx.storage.delete_token(token).await?;
    info!(user_id = user.id, "logout");
    Ok(StatusCode::NO_CONTENT)
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SubscriptionQuery {
    page: Option<u64>,
    limit: Option<u64>,
    recipes_limit: Option<i64>,
}

/// GET /api/users/subscriptions/
pub async fn subscriptions(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<SubscriptionQuery>,
    uri: Uri,
) -> Result<Json<Value>, ApiError> {
    let pagination = Pagination::from_query(
        &PageQuery {
            page: query.page,
            limit: query.limit,
        },
        &ctx.config,
    );
    let authors = ctx
        .storage
        .list_following(user.id, pagination.limit_i64(), pagination.offset_i64())
        .await?;
    let count = ctx.storage.count_following(user.id).await?;
    let mut results = Vec::with_capacity(authors.len());
    for author in &authors {
        results.push(
            user_with_recipes_json(&ctx, author, Some(user.id), query.recipes_limit).await?,
        );
    }
    Ok(Json(envelope(
        &ctx.config.site_url,
        &uri,
        count,
        &pagination,
        results,
    )))
}

#[derive(Deserialize)]
pub struct SubscribeQuery {
    recipes_limit: Option<i64>,
}

/// POST /api/users/{id}/subscribe/
pub async fn subscribe(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Query(query): Query<SubscribeQuery>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let author = ctx
        .storage
        .get_user(id)
        .await?
        .ok_or_else(|| not_found("user not found"))?;
    if author.id == user.id {
        return Err(bad_request("cannot subscribe to yourself"));
    }
    if !ctx.storage.follow(user.id, author.id).await? {
        return Err(bad_request("already subscribed to this user"));
    }
    let body =
        user_with_recipes_json(&ctx, &author, Some(user.id), query.recipes_limit).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

/// DELETE /api/users/{id}/subscribe/
pub async fn unsubscribe(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    ctx.storage
        .get_user(id)
        .await?
        .ok_or_else(|| not_found("user not found"))?;
    if !ctx.storage.unfollow(user.id, id).await? {
        return Err(bad_request("not subscribed to this user"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(username: &str, email: &str, password: &str) -> RegisterBody {
        RegisterBody {
            email: email.to_string(),
            username: username.to_string(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn accepts_normal_registration() {
        assert!(validate_registration(&body("alice_01", "a@b.c", "longenough")).is_ok());
        assert!(validate_registration(&body("a.b+c@d-e", "a@b.c", "longenough")).is_ok());
    }

    #[test]
    fn rejects_bad_usernames() {
        assert!(validate_registration(&body("has space", "a@b.c", "longenough")).is_err());
        assert!(validate_registration(&body("me", "a@b.c", "longenough")).is_err());
        assert!(validate_registration(&body("", "a@b.c", "longenough")).is_err());
        assert!(validate_registration(&body(&"x".repeat(151), "a@b.c", "longenough")).is_err());
    }

    #[test]
    fn rejects_bad_email_and_password() {
        assert!(validate_registration(&body("alice", "not-an-email", "longenough")).is_err());
        assert!(validate_registration(&body("alice", "a@b.c", "short")).is_err());
    }
}
