// rest/routes/tags.rs — read-only tag endpoints.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{not_found, ApiError};
use crate::storage::recipes::TagRow;
use crate::AppContext;

pub(crate) fn tag_json(tag: &TagRow) -> Value {
    json!({
        "id": tag.id,
        "name": tag.name,
        "slug": tag.slug,
    })
}

/// GET /api/tags/ — plain array, never paginated.
pub async fn list(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>, ApiError> {
    let tags = ctx.storage.list_tags().await?;
    Ok(Json(Value::Array(tags.iter().map(tag_json).collect())))
}

/// GET /api/tags/{id}/
pub async fn get(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let tag = ctx
        .storage
        .get_tag(id)
        .await?
        .ok_or_else(|| not_found("tag not found"))?;
    Ok(Json(tag_json(&tag)))
}
