// rest/routes/recipes.rs — recipe CRUD, favorites, shopping cart,
// cart download, and short-link issuance.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode, Uri};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::error::{bad_request, not_found, ApiError};
use crate::media;
use crate::rest::extract::{CurrentUser, OptionalUser};
use crate::rest::pagination::{envelope, PageQuery, Pagination};
use crate::shopping;
use crate::storage::recipes::{RecipeFilter, RecipeRow};
use crate::AppContext;

const MIN_AMOUNT: i64 = 1;
const MIN_COOKING_TIME: i64 = 1;
const MAX_RECIPE_NAME_LEN: usize = 256;

// ─── JSON shapes ─────────────────────────────────────────────────────────────

/// Compact recipe preview used by favorites, carts, and subscription lists.
pub(crate) fn short_recipe_json(recipe: &RecipeRow) -> Value {
    json!({
        "id": recipe.id,
        "name": recipe.name,
        "image": media::media_url(&recipe.image),
        "cooking_time": recipe.cooking_time,
    })
}

/// Full recipe shape with embedded author, tags, and ingredient lines.
pub(crate) async fn recipe_json(
    ctx: &AppContext,
    recipe: &RecipeRow,
    viewer: Option<i64>,
) -> Result<Value, ApiError> {
    let author = ctx
        .storage
        .get_user(recipe.author_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("recipe {} has no author row", recipe.id))?;
    let tags: Vec<Value> = ctx
        .storage
        .recipe_tags(recipe.id)
        .await?
        .iter()
        .map(super::tags::tag_json)
        .collect();
    let ingredients: Vec<Value> = ctx
        .storage
        .recipe_ingredient_lines(recipe.id)
        .await?
        .iter()
        .map(|line| {
            json!({
                "id": line.id,
                "name": line.name,
                "measurement_unit": line.measurement_unit,
                "amount": line.amount,
            })
        })
        .collect();
    let (is_favorited, is_in_shopping_cart) = match viewer {
        Some(uid) => (
            ctx.storage.is_favorited(uid, recipe.id).await?,
            ctx.storage.in_cart(uid, recipe.id).await?,
        ),
        None => (false, false),
    };
    Ok(json!({
        "id": recipe.id,
        "tags": tags,
        "author": super::users::user_json(ctx, &author, viewer).await?,
        "ingredients": ingredients,
        "is_favorited": is_favorited,
        "is_in_shopping_cart": is_in_shopping_cart,
        "name": recipe.name,
        "image": media::media_url(&recipe.image),
        "text": recipe.text,
        "cooking_time": recipe.cooking_time,
    }))
}

// ─── Request bodies and validation ───────────────────────────────────────────

#[derive(Deserialize)]
struct IngredientRef {
    id: i64,
    amount: i64,
}

/// Create/update payload. Create requires everything; PATCH may omit the
/// scalar fields but must always resend ingredients and tags.
#[derive(Deserialize)]
pub struct RecipeBody {
    ingredients: Option<Vec<IngredientRef>>,
    tags: Option<Vec<i64>>,
    image: Option<String>,
    name: Option<String>,
    text: Option<String>,
    cooking_time: Option<i64>,
}

/// Validate ingredient and tag references against the database.
/// Returns (tag_ids, ingredient (id, amount) lines) ready for storage.
async fn validate_refs(
    ctx: &AppContext,
    body: &RecipeBody,
) -> Result<(Vec<i64>, Vec<(i64, i64)>), ApiError> {
    let ingredients = body
        .ingredients
        .as_ref()
        .ok_or_else(|| bad_request("ingredients field is required"))?;
    if ingredients.is_empty() {
        return Err(bad_request("at least one ingredient is required"));
    }
    let mut seen = HashSet::new();
    let mut lines = Vec::with_capacity(ingredients.len());
    for item in ingredients {
        if !seen.insert(item.id) {
            return Err(bad_request("duplicate ingredients are not allowed"));
        }
        if item.amount < MIN_AMOUNT {
            return Err(bad_request("ingredient amount must be at least 1"));
        }
        if ctx.storage.get_ingredient(item.id).await?.is_none() {
            return Err(bad_request(format!("unknown ingredient id {}", item.id)));
        }
        lines.push((item.id, item.amount));
    }

    let tags = body
        .tags
        .as_ref()
        .ok_or_else(|| bad_request("tags field is required"))?;
    if tags.is_empty() {
        return Err(bad_request("at least one tag is required"));
    }
    let mut seen = HashSet::new();
    for &tag_id in tags {
        if !seen.insert(tag_id) {
            return Err(bad_request("duplicate tags are not allowed"));
        }
        if ctx.storage.get_tag(tag_id).await?.is_none() {
            return Err(bad_request(format!("unknown tag id {tag_id}")));
        }
    }

    Ok((tags.clone(), lines))
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() || name.len() > MAX_RECIPE_NAME_LEN {
        return Err(bad_request("name must be 1-256 characters"));
    }
    Ok(())
}

fn validate_cooking_time(minutes: i64) -> Result<(), ApiError> {
    if minutes < MIN_COOKING_TIME {
        return Err(bad_request("cooking_time must be at least 1 minute"));
    }
    Ok(())
}

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ListQuery {
    page: Option<u64>,
    limit: Option<u64>,
    author: Option<i64>,
    tags: Vec<String>,
    is_favorited: bool,
    is_in_shopping_cart: bool,
}

/// Hand-parsed because `tags` may repeat (`?tags=lunch&tags=dinner`),
/// which `Query<T>` cannot express.
fn parse_list_query(uri: &Uri) -> ListQuery {
    let mut out = ListQuery::default();
    for pair in uri.query().unwrap_or("").split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match key {
            "page" => out.page = value.parse().ok(),
            "limit" => out.limit = value.parse().ok(),
            "author" => out.author = value.parse().ok(),
            "tags" if !value.is_empty() => out.tags.push(value.to_string()),
            "is_favorited" => out.is_favorited = truthy(value),
            "is_in_shopping_cart" => out.is_in_shopping_cart = truthy(value),
            _ => {}
        }
    }
    out
}

fn truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "True")
}

/// GET /api/recipes/
pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    OptionalUser(viewer): OptionalUser,
    uri: Uri,
) -> Result<Json<Value>, ApiError> {
    let query = parse_list_query(&uri);
    let viewer_id = viewer.map(|u| u.id);
    let pagination = Pagination::from_query(
        &PageQuery {
            page: query.page,
            limit: query.limit,
        },
        &ctx.config,
    );

    // Bookmark filters only make sense for a signed-in viewer; anonymous
    // callers get the unfiltered list, matching the reference behavior.
    let filter = RecipeFilter {
        author: query.author,
        tag_slugs: query.tags,
        favorited_by: viewer_id.filter(|_| query.is_favorited),
        in_cart_of: viewer_id.filter(|_| query.is_in_shopping_cart),
    };

    let rows = ctx
        .storage
        .list_recipes(&filter, pagination.limit_i64(), pagination.offset_i64())
        .await?;
    let count = ctx.storage.count_recipes(&filter).await?;
    let mut results = Vec::with_capacity(rows.len());
    for row in &rows {
        results.push(recipe_json(&ctx, row, viewer_id).await?);
    }
    Ok(Json(envelope(
        &ctx.config.site_url,
        &uri,
        count,
        &pagination,
        results,
    )))
}

// ─── CRUD ────────────────────────────────────────────────────────────────────

/// POST /api/recipes/
pub async fn create(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<RecipeBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (tag_ids, lines) = validate_refs(&ctx, &body).await?;
    let name = body
        .name
        .as_deref()
        .ok_or_else(|| bad_request("name field is required"))?;
    validate_name(name)?;
    let text = body
        .text
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| bad_request("text field is required"))?;
    let cooking_time = body
        .cooking_time
        .ok_or_else(|| bad_request("cooking_time field is required"))?;
    validate_cooking_time(cooking_time)?;
    let image_data = body
        .image
        .as_deref()
        .filter(|i| !i.is_empty())
        .ok_or_else(|| bad_request("image field is required"))?;

    let image = media::decode_data_url(image_data).map_err(ApiError::BadRequest)?;
    let relative = media::save_image(&ctx.config.media_dir, media::RECIPE_SUBDIR, &image).await?;

    let recipe = ctx
        .storage
        .create_recipe(user.id, name, text, cooking_time, &relative, &tag_ids, &lines)
        .await?;
    info!(recipe_id = recipe.id, author = user.id, "recipe created");

    let rendered = recipe_json(&ctx, &recipe, Some(user.id)).await?;
    Ok((StatusCode::CREATED, Json(rendered)))
}

/// GET /api/recipes/{id}/
pub async fn get(
    State(ctx): State<Arc<AppContext>>,
    OptionalUser(viewer): OptionalUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let recipe = ctx
        .storage
        .get_recipe(id)
        .await?
        .ok_or_else(|| not_found("recipe not found"))?;
    Ok(Json(recipe_json(&ctx, &recipe, viewer.map(|u| u.id)).await?))
}

/// PATCH /api/recipes/{id}/
pub async fn update(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<RecipeBody>,
) -> Result<Json<Value>, ApiError> {
    let existing = ctx
        .storage
        .get_recipe(id)
        .await?
        .ok_or_else(|| not_found("recipe not found"))?;
    if existing.author_id != user.id {
        return Err(ApiError::Forbidden(
            "only the author may edit this recipe".to_string(),
        ));
    }

    let (tag_ids, lines) = validate_refs(&ctx, &body).await?;
    let name = body.name.as_deref().unwrap_or(&existing.name);
    validate_name(name)?;
    let text = body.text.as_deref().unwrap_or(&existing.text);
    if text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }
    let cooking_time = body.cooking_time.unwrap_or(existing.cooking_time);
    validate_cooking_time(cooking_time)?;

    let image_path = match body.image.as_deref().filter(|i| !i.is_empty()) {
        Some(data) => {
            let image = media::decode_data_url(data).map_err(ApiError::BadRequest)?;
            media::save_image(&ctx.config.media_dir, media::RECIPE_SUBDIR, &image).await?
        }
        None => existing.image.clone(),
    };

    ctx.storage
        .update_recipe(id, name, text, cooking_time, &image_path, &tag_ids, &lines)
        .await?;
    if image_path != existing.image {
        // Best-effort cleanup of the replaced file.
        let _ = tokio::fs::remove_file(ctx.config.media_dir.join(&existing.image)).await;
    }
    info!(recipe_id = id, author = user.id, "recipe updated");

    let updated = ctx
        .storage
        .get_recipe(id)
        .await?
        .ok_or_else(|| not_found("recipe not found"))?;
    Ok(Json(recipe_json(&ctx, &updated, Some(user.id)).await?))
}

/// DELETE /api/recipes/{id}/
pub async fn delete(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let recipe = ctx
        .storage
        .get_recipe(id)
        .await?
        .ok_or_else(|| not_found("recipe not found"))?;
    if recipe.author_id != user.id {
        return Err(ApiError::Forbidden(
            "only the author may delete this recipe".to_string(),
        ));
    }
    ctx.storage.delete_recipe(id).await?;
    let _ = tokio::fs::remove_file(ctx.config.media_dir.join(&recipe.image)).await;
    info!(recipe_id = id, author = user.id, "recipe deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ─── Favorites and shopping cart ─────────────────────────────────────────────

/// POST /api/recipes/{id}/favorite/
pub async fn favorite(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let recipe = ctx
        .storage
        .get_recipe(id)
        .await?
        .ok_or_else(|| not_found("recipe not found"))?;
    if !ctx.storage.favorite(user.id, id).await? {
        return Err(bad_request("recipe is already in favorites"));
    }
    Ok((StatusCode::CREATED, Json(short_recipe_json(&recipe))))
}

/// DELETE /api/recipes/{id}/favorite/
pub async fn unfavorite(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    ctx.storage
        .get_recipe(id)
        .await?
        .ok_or_else(|| not_found("recipe not found"))?;
    if !ctx.storage.unfavorite(user.id, id).await? {
        return Err(bad_request("recipe is not in favorites"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/recipes/{id}/shopping_cart/
pub async fn cart_add(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let recipe = ctx
        .storage
        .get_recipe(id)
        .await?
        .ok_or_else(|| not_found("recipe not found"))?;
    if !ctx.storage.cart_add(user.id, id).await? {
        return Err(bad_request("recipe is already in the shopping cart"));
    }
    Ok((StatusCode::CREATED, Json(short_recipe_json(&recipe))))
}

/// DELETE /api/recipes/{id}/shopping_cart/
pub async fn cart_remove(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    ctx.storage
        .get_recipe(id)
        .await?
        .ok_or_else(|| not_found("recipe not found"))?;
    if !ctx.storage.cart_remove(user.id, id).await? {
        return Err(bad_request("recipe is not in the shopping cart"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/recipes/download_shopping_cart/
pub async fn download_shopping_cart(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let lines = ctx.storage.cart_lines(user.id).await?;
    let recipe_names = ctx.storage.cart_recipe_names(user.id).await?;
    let items = shopping::aggregate(&lines);
    let text = shopping::format_shopping_list(&items, &recipe_names);
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"shopping_cart.txt\"",
            ),
        ],
        text,
    ))
}

// ─── Short links ─────────────────────────────────────────────────────────────

/// GET /api/recipes/{id}/get-link/
pub async fn get_link(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    ctx.storage
        .get_recipe(id)
        .await?
        .ok_or_else(|| not_found("recipe not found"))?;
    let code = ctx.storage.ensure_short_code(id).await?;
    Ok(Json(json!({
        "short-link": format!("{}/s/{}", ctx.config.site_url, code),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_parses_repeated_tags() {
        let uri: Uri = "/api/recipes/?tags=lunch&tags=dinner&page=2&is_favorited=1"
            .parse()
            .unwrap();
        let q = parse_list_query(&uri);
        assert_eq!(q.tags, vec!["lunch", "dinner"]);
        assert_eq!(q.page, Some(2));
        assert!(q.is_favorited);
        assert!(!q.is_in_shopping_cart);
    }

    #[test]
    fn list_query_ignores_junk() {
        let uri: Uri = "/api/recipes/?author=abc&page=&unknown=1".parse().unwrap();
        let q = parse_list_query(&uri);
        assert_eq!(q.author, None);
        assert_eq!(q.page, None);
        assert!(q.tags.is_empty());
    }

    #[test]
    fn cooking_time_and_name_bounds() {
        assert!(validate_cooking_time(1).is_ok());
        assert!(validate_cooking_time(0).is_err());
        assert!(validate_name("Pancakes").is_ok());
        assert!(validate_name("  ").is_err());
        assert!(validate_name(&"x".repeat(257)).is_err());
    }
}
