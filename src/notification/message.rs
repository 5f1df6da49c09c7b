//! 消息记录 - 队列中流转的统一格式

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 时间桶宽度（毫秒）
pub const BUCKET_MILLIS: i64 = 100_000;

/// 旧版 error 事件使用的分桶除数
pub const LEGACY_ERROR_BUCKET_MILLIS: i64 = 99_999;

/// 计算粗粒度时间桶
pub fn time_bucket(at: DateTime<Utc>, divisor: i64) -> i64 {
    at.timestamp_millis().div_euclid(divisor)
}

/// 事件类别
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventClass {
    /// 标准输出日志
    Log,
    /// 标准错误日志
    Error,
    /// 未捕获异常
    Exception,
    /// pm2 守护进程被终止
    Kill,
    /// pm2 进程事件（restart、exit 等）
    Event(String),
    /// 限流抑制通知
    Suppressed,
}

impl EventClass {
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        match self {
            EventClass::Log => "log".into(),
            EventClass::Error => "error".into(),
            EventClass::Exception => "exception".into(),
            EventClass::Kill => "kill".into(),
            EventClass::Event(kind) => format!("event-{}", kind).into(),
            EventClass::Suppressed => "suppressed".into(),
        }
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

/// 消息记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// 来源进程名
    pub source_name: String,
    pub event_class: EventClass,
    /// 消息正文
    pub body: String,
    /// 粗粒度时间桶（不是毫秒时间戳）
    pub timestamp: i64,
}

impl Message {
    pub fn new(
        source_name: impl Into<String>,
        event_class: EventClass,
        body: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            event_class,
            body: body.into(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_bucket() {
        let at = DateTime::from_timestamp_millis(1_700_000_050_000).unwrap();
        assert_eq!(time_bucket(at, BUCKET_MILLIS), 17_000_000);
        // 旧除数得到的桶号略大，与 log 的桶不可比
        assert!(time_bucket(at, LEGACY_ERROR_BUCKET_MILLIS) > time_bucket(at, BUCKET_MILLIS));
    }

    #[test]
    fn test_event_class_display() {
        assert_eq!(EventClass::Log.to_string(), "log");
        assert_eq!(EventClass::Error.to_string(), "error");
        assert_eq!(EventClass::Kill.to_string(), "kill");
        assert_eq!(EventClass::Suppressed.to_string(), "suppressed");
        assert_eq!(EventClass::Event("restart".to_string()).to_string(), "event-restart");
    }

    #[test]
    fn test_generic_events_compare_by_type() {
        assert_eq!(
            EventClass::Event("restart".to_string()),
            EventClass::Event("restart".to_string())
        );
        assert_ne!(
            EventClass::Event("restart".to_string()),
            EventClass::Event("exit".to_string())
        );
    }
}
