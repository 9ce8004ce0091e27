// rest/routes/shortlink.rs — short-link redirects.

use axum::extract::{Path, State};
use axum::response::Redirect;
use std::sync::Arc;

use crate::error::{not_found, ApiError};
use crate::AppContext;

/// GET /s/{code} — 307 to the recipe page.
pub async fn resolve(
    State(ctx): State<Arc<AppContext>>,
    Path(code): Path<String>,
) -> Result<Redirect, ApiError> {
    let recipe = ctx
        .storage
        .find_recipe_by_short_code(&code)
        .await?
        .ok_or_else(|| not_found("unknown short link"))?;
    Ok(Redirect::temporary(&format!("/recipes/{}/", recipe.id)))
}
