// src/notify.rs

use crate::config::Config;

/// Announce a published session via the configured Telegram chat.
///
/// Best-effort: missing credentials skip the announcement with a
/// warning, and delivery failures are logged, never propagated.
pub async fn send_publish_notification(
    client: &reqwest::Client,
    config: &Config,
    session_code: &str,
    participant_count: usize,
) {
    let (Some(token), Some(chat_id)) = (
        config.telegram_bot_token.as_deref(),
        config.telegram_announce_chat.as_deref(),
    ) else {
        tracing::warn!("Telegram announcement not configured, skipping publish notification");
        return;
    };

    let text = format!(
        "Session {} published: scores are now visible to {} students.",
        session_code, participant_count
    );
    let url = format!("https://api.telegram.org/bot{}/sendMessage", token);

    let result = client
        .post(&url)
        .json(&serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        }))
        .send()
        .await;

    match result {
        Ok(response) => {
            if !response.status().is_success() {
                tracing::warn!(
                    "publish notification failed with status {}",
                    response.status()
                );
            }
        }
        Err(e) => {
            tracing::warn!("publish notification request failed: {}", e);
        }
    }
}
