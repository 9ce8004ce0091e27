// lib.rs — shared state and module wiring for the ladle recipe service.

pub mod auth;
pub mod config;
pub mod error;
pub mod imports;
pub mod media;
pub mod rest;
pub mod shopping;
pub mod storage;

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;

use config::AppConfig;
use storage::Storage;

/// Shared application state handed to every route handler.
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub storage: Arc<Storage>,
    pub started_at: Instant,
}

impl AppContext {
    pub async fn new(config: AppConfig) -> Result<Arc<Self>> {
        tokio::fs::create_dir_all(&config.media_dir).await?;
        let storage =
            Storage::new_with_slow_query(&config.data_dir, config.slow_query_threshold_ms).await?;
        Ok(Arc::new(Self {
            config: Arc::new(config),
            storage: Arc::new(storage),
            started_at: Instant::now(),
        }))
    }
}
