// rest/routes/mod.rs — route handler modules.

pub mod ingredients;
pub mod recipes;
pub mod shortlink;
pub mod tags;
pub mod users;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::ApiError;
use crate::AppContext;

/// GET /api/health/
pub async fn health(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": ctx.started_at.elapsed().as_secs(),
    })))
}
