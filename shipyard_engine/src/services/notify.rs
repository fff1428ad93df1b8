//! Completion notifications — best-effort webhooks on terminal status.

use reqwest::Client;

use crate::models::build::{BuildRecord, BuildStatus};
use crate::models::project::NotificationSettings;

#[derive(Debug, Default)]
pub struct Notifier {
    client: Client,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends the build outcome to every configured webhook. Failures are
    /// logged and swallowed; notifications never affect the lifecycle.
    pub async fn build_finished(
        &self,
        settings: &NotificationSettings,
        project_name: &str,
        record: &BuildRecord,
    ) {
        let message = match record.status {
            BuildStatus::Success => format!(
                "✅ *{}* ({}) build succeeded!\nVersion: {}\nBuild: {}",
                project_name, record.platform, record.version, record.build_number
            ),
            _ => format!(
                "❌ *{}* ({}) build failed!\nVersion: {}\nBuild: {}",
                project_name, record.platform, record.version, record.build_number
            ),
        };

        if let Some(url) = settings.slack_webhook_url.as_deref() {
            self.post(url, serde_json::json!({ "text": message })).await;
        }
        if let Some(url) = settings.discord_webhook_url.as_deref() {
            self.post(url, serde_json::json!({ "content": message })).await;
        }
    }

    async fn post(&self, url: &str, payload: serde_json::Value) {
        match self.client.post(url).json(&payload).send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(
                    status = %response.status(),
                    "Notification webhook returned an error"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Notification webhook failed: {e}"),
        }
    }
}
