// src/state.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::FromRef;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    analysis::{Analyzer, HttpAnalyzer},
    config::Config,
    engine::TestSession,
    images::ImageResolver,
    proctor::ProgressMap,
    scoring::ScaleTable,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,

    /// Active attempts. Each `TestSession` is owned by its running
    /// attempt; nothing is persisted until completion.
    pub attempts: Arc<Mutex<HashMap<Uuid, TestSession>>>,

    /// Live scoring progress per proctored session.
    pub progress: ProgressMap,

    pub analyzer: Arc<dyn Analyzer>,
    pub images: Arc<ImageResolver>,
    pub scale: Arc<ScaleTable>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let http = reqwest::Client::new();

        let scale = match config.scale_table_path.as_deref() {
            Some(path) => match ScaleTable::from_json_file(path) {
                Ok(table) => table,
                Err(e) => {
                    tracing::warn!("{}; falling back to built-in scale table", e);
                    ScaleTable::default()
                }
            },
            None => ScaleTable::default(),
        };

        let analyzer = HttpAnalyzer::new(
            http.clone(),
            config.ai_api_url.clone(),
            config.ai_api_key.clone(),
            config.external_max_retries,
            config.external_backoff_ms,
        );

        let images = ImageResolver::new(
            http.clone(),
            config.telegram_bot_token.clone(),
            config.image_cache_minutes,
            config.external_max_retries,
            config.external_backoff_ms,
        );

        Self {
            pool,
            config,
            attempts: Arc::new(Mutex::new(HashMap::new())),
            progress: Arc::new(Mutex::new(HashMap::new())),
            analyzer: Arc::new(analyzer),
            images: Arc::new(images),
            scale: Arc::new(scale),
            http,
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
