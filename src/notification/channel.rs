//! 通知渠道 trait 定义

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// 待发送的通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// 消息内容（已格式化）
    pub content: String,
    /// 来源进程名（用于日志）
    pub source: String,
    /// 事件类别（用于日志）
    pub event: String,
}

impl NotificationMessage {
    pub fn new(content: impl Into<String>, source: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            event: event.into(),
        }
    }
}

/// 发送结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 跳过（配置缺失等）
    Skipped(String),
    /// 发送失败
    Failed(String),
}

/// 通知渠道 trait
pub trait NotificationChannel: Send + Sync {
    /// 渠道名称（用于日志）
    fn name(&self) -> &str;

    /// 异步发送消息（spawn 后立即返回，不等待结果）
    fn send_async(&self, message: NotificationMessage) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_message_new() {
        let msg = NotificationMessage::new("api - *log* - hi", "api", "log");
        assert_eq!(msg.content, "api - *log* - hi");
        assert_eq!(msg.source, "api");
        assert_eq!(msg.event, "log");
    }
}
