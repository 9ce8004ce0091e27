// rest/mod.rs — HTTP router and server entry point.

pub mod extract;
pub mod pagination;
pub mod routes;

use anyhow::{Context as _, Result};
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

use crate::AppContext;

/// Build the full application router. Exposed separately from [`serve`] so
/// tests can mount it on an ephemeral port.
pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let media_dir = ctx.config.media_dir.clone();
    Router::new()
        // users and auth
        .route("/api/users/", get(routes::users::list).post(routes::users::register))
        .route("/api/users/me/", get(routes::users::me))
        .route(
            "/api/users/me/avatar/",
            put(routes::users::put_avatar).delete(routes::users::delete_avatar),
        )
        .route("/api/users/set_password/", post(routes::users::set_password))
        .route("/api/users/subscriptions/", get(routes::users::subscriptions))
        .route("/api/users/{id}/", get(routes::users::get))
        .route(
            "/api/users/{id}/subscribe/",
            post(routes::users::subscribe).delete(routes::users::unsubscribe),
        )
        .route("/api/auth/token/login/", post(routes::users::login))
        .route("/api/auth/token/logout/", post(routes::users::logout))
        // tags and ingredients
        .route("/api/tags/", get(routes::tags::list))
        .route("/api/tags/{id}/", get(routes::tags::get))
        .route("/api/ingredients/", get(routes::ingredients::list))
        .route("/api/ingredients/{id}/", get(routes::ingredients::get))
        // recipes
        .route(
            "/api/recipes/",
            get(routes::recipes::list).post(routes::recipes::create),
        )
        .route(
            "/api/recipes/download_shopping_cart/",
            get(routes::recipes::download_shopping_cart),
        )
        .route(
            "/api/recipes/{id}/",
            get(routes::recipes::get)
                .patch(routes::recipes::update)
                .delete(routes::recipes::delete),
        )
        .route(
            "/api/recipes/{id}/favorite/",
            post(routes::recipes::favorite).delete(routes::recipes::unfavorite),
        )
        .route(
            "/api/recipes/{id}/shopping_cart/",
            post(routes::recipes::cart_add).delete(routes::recipes::cart_remove),
        )
        .route("/api/recipes/{id}/get-link/", get(routes::recipes::get_link))
        // short links, media, health
        .route("/s/{code}", get(routes::shortlink::resolve))
        .nest_service("/media", ServeDir::new(media_dir))
        .route("/api/health/", get(routes::health))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Bind and run the HTTP server until the process is stopped.
pub async fn serve(ctx: Arc<AppContext>) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    info!(
        addr = %addr,
        site_url = %ctx.config.site_url,
        "REST API listening"
    );
    axum::serve(listener, build_router(ctx)).await?;
    Ok(())
}
