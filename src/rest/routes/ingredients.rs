// rest/routes/ingredients.rs — read-only ingredient endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{not_found, ApiError};
use crate::storage::recipes::IngredientRow;
use crate::AppContext;

#[derive(Deserialize)]
pub struct IngredientQuery {
    /// Case-insensitive name prefix filter.
    name: Option<String>,
}

pub(crate) fn ingredient_json(row: &IngredientRow) -> Value {
    json!({
        "id": row.id,
        "name": row.name,
        "measurement_unit": row.measurement_unit,
    })
}

/// GET /api/ingredients/?name=<prefix> — plain array, never paginated.
pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<IngredientQuery>,
) -> Result<Json<Value>, ApiError> {
    let rows = ctx.storage.list_ingredients(query.name.as_deref()).await?;
    Ok(Json(Value::Array(rows.iter().map(ingredient_json).collect())))
}

/// GET /api/ingredients/{id}/
pub async fn get(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let row = ctx
        .storage
        .get_ingredient(id)
        .await?
        .ok_or_else(|| not_found("ingredient not found"))?;
    Ok(Json(ingredient_json(&row)))
}
