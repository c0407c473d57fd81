// src/config.rs

use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,

    pub admin_username: Option<String>,
    pub admin_password: Option<String>,

    /// Generative-AI endpoint used for score estimation and analysis.
    /// Missing key disables the feature rather than failing requests.
    pub ai_api_url: String,
    pub ai_api_key: Option<String>,

    /// Bot credentials for image resolution and publish announcements.
    pub telegram_bot_token: Option<String>,
    pub telegram_announce_chat: Option<String>,

    /// Per-module countdown durations, in minutes.
    pub verbal_module_minutes: u32,
    pub quant_module_minutes: u32,

    /// Cap on simultaneous external calls (AI scoring, image resolution).
    pub scoring_concurrency: usize,
    pub external_max_retries: u32,
    pub external_backoff_ms: u64,

    /// Optional JSON file overriding the built-in raw-to-scaled table.
    pub scale_table_path: Option<String>,

    /// Resolved image URLs are cached for this long. Must stay below the
    /// upstream download-URL validity window (about an hour).
    pub image_cache_minutes: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            database_url,
            jwt_secret,
            jwt_expiration: parse_env("JWT_EXPIRATION", 86400),
            rust_log,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            ai_api_url: env::var("AI_API_URL").unwrap_or_else(|_| {
                "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
                    .to_string()
            }),
            ai_api_key: env::var("AI_API_KEY").ok(),
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_announce_chat: env::var("TELEGRAM_ANNOUNCE_CHAT").ok(),
            verbal_module_minutes: parse_env("VERBAL_MODULE_MINUTES", 32),
            quant_module_minutes: parse_env("QUANT_MODULE_MINUTES", 35),
            scoring_concurrency: parse_env("SCORING_CONCURRENCY", 3),
            external_max_retries: parse_env("EXTERNAL_MAX_RETRIES", 3),
            external_backoff_ms: parse_env("EXTERNAL_BACKOFF_MS", 500),
            scale_table_path: env::var("SCALE_TABLE_PATH").ok(),
            image_cache_minutes: parse_env("IMAGE_CACHE_MINUTES", 45),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
