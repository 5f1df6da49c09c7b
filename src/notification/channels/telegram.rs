//! Telegram 渠道 - 通过 Bot API 的 sendMessage 发送通知
//!
//! 每条通知一个 form 编码的 POST 请求，带 `chat_id`、`text` 和 `parse_mode=markdown`。
//! 失败只记录日志，不重试。

use crate::config::Settings;
use crate::notification::channel::{NotificationChannel, NotificationMessage, SendResult};
use anyhow::Result;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Telegram 渠道配置
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// sendMessage URL（如 https://api.telegram.org/bot<TOKEN>/sendMessage）
    pub url: Option<String>,
    pub chat_id: String,
    /// 请求超时
    pub timeout: Duration,
}

impl TelegramConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            url: settings.telegram_url.clone(),
            chat_id: settings.chat_id.clone(),
            timeout: settings.timeout,
        }
    }
}

/// Bot API 响应
#[derive(Debug, Deserialize)]
pub struct TelegramResponse {
    pub ok: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// Telegram 渠道
#[derive(Debug, Clone)]
pub struct TelegramChannel {
    client: Client,
    config: TelegramConfig,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client, config })
    }

    /// 发送并等待结果
    pub async fn send(&self, message: &NotificationMessage) -> SendResult {
        let Some(url) = self.config.url.as_deref() else {
            error!(
                "There is no telegram URL set, please set it: \
                 'telegram_url' = https://api.telegram.org/bot<TOKEN>/sendMessage"
            );
            return SendResult::Skipped("telegram_url is not set".to_string());
        };

        let form = [
            ("chat_id", self.config.chat_id.as_str()),
            ("text", message.content.as_str()),
            ("parse_mode", "markdown"),
        ];

        let response = match self.client.post(url).form(&form).send().await {
            Ok(response) => response,
            Err(e) => {
                error!(source = %message.source, event = %message.event, error = %e, "Telegram request failed");
                return SendResult::Failed(format!("HTTP request failed: {}", e));
            }
        };

        let status = response.status();
        // 非 JSON 响应时只看 HTTP 状态码
        let body = response.json::<TelegramResponse>().await.ok();

        match body {
            Some(TelegramResponse { ok: true, .. }) if status.is_success() => {
                debug!(source = %message.source, event = %message.event, "Telegram message sent");
                SendResult::Sent
            }
            None if status.is_success() => SendResult::Sent,
            other => {
                let reason = other
                    .and_then(|r| r.description)
                    .unwrap_or_else(|| format!("HTTP {}", status));
                warn!(source = %message.source, status = %status, reason = %reason, "Telegram rejected message");
                SendResult::Failed(reason)
            }
        }
    }
}

impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn send_async(&self, message: NotificationMessage) -> Result<()> {
        let channel = self.clone();
        tokio::spawn(async move {
            channel.send(&message).await;
        });
        Ok(())
    }
}
