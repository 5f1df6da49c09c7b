//! 事件标准化 - 把 pm2 总线记录转换为统一的消息记录
//!
//! 输入为逐行 JSON，每行一个总线信封：
//!
//! ```text
//! {"topic": "log:out", "data": {"process": {"name": "api"}, "data": "listening on :3000\n"}}
//! {"topic": "process:event", "data": {"event": "restart", "process": {"name": "api"}}}
//! ```

use crate::clock::Clock;
use crate::config::{Settings, NOTIFIER_NAME};
use crate::notification::message::{
    time_bucket, EventClass, Message, BUCKET_MILLIS, LEGACY_ERROR_BUCKET_MILLIS,
};
use anyhow::{Context, Result};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// pm2 kill 事件使用的固定来源名
pub const PM2_SOURCE: &str = "PM2";

/// 总线主题
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusTopic {
    /// `log:out`
    LogOut,
    /// `log:err`
    LogErr,
    /// `pm2:kill`
    Kill,
    /// `process:exception`
    Exception,
    /// `process:event`
    ProcessEvent,
    Other(String),
}

impl BusTopic {
    pub fn parse(topic: &str) -> Self {
        match topic {
            "log:out" => BusTopic::LogOut,
            "log:err" => BusTopic::LogErr,
            "pm2:kill" => BusTopic::Kill,
            "process:exception" => BusTopic::Exception,
            "process:event" => BusTopic::ProcessEvent,
            other => BusTopic::Other(other.to_string()),
        }
    }
}

/// 总线信封（一行输入）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEnvelope {
    pub topic: String,
    #[serde(default)]
    pub data: BusPacket,
}

/// pm2 总线数据包，字段都可能缺失
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusPacket {
    #[serde(default)]
    pub process: Option<ProcessInfo>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// `process:event` 的事件类型
    #[serde(default)]
    pub event: Option<String>,
    /// `pm2:kill` 的说明
    #[serde(default)]
    pub msg: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessInfo {
    #[serde(default)]
    pub name: Option<String>,
}

impl BusPacket {
    fn process_name(&self) -> Option<&str> {
        self.process
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .filter(|n| !n.is_empty())
    }

    /// 日志正文；非字符串载荷序列化为 JSON
    fn text(&self) -> String {
        match &self.data {
            Some(serde_json::Value::String(s)) => s.trim_end_matches(['\r', '\n']).to_string(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

/// 解析一行输入
pub fn parse_line(line: &str) -> Result<BusEnvelope> {
    serde_json::from_str(line).with_context(|| {
        let preview: String = line.chars().take(80).collect();
        format!("Malformed bus record: {}", preview)
    })
}

fn log_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{4}-\d{2}-\d{2})([ T])(\d{2}:\d{2})(:\d{2}(?:\.\d+)?)?(\s*(?:[+-]\d{2}:?\d{2}|Z))?")
            .expect("log date pattern is valid")
    })
}

/// 把 pm2 日志日期替换为格式占位符
///
/// `2017-05-16 12:46 +03:00:` → `YYYY-MM-DD HH:mm Z:`
pub fn mask_log_date(text: &str) -> String {
    log_date_regex()
        .replace_all(text, |caps: &Captures| {
            let mut masked = format!("YYYY-MM-DD{}HH:mm", &caps[2]);
            if caps.get(4).is_some() {
                masked.push_str(":ss");
            }
            if let Some(zone) = caps.get(5) {
                let spacing = &zone.as_str()[..zone.as_str().len() - zone.as_str().trim_start().len()];
                masked.push_str(spacing);
                masked.push('Z');
            }
            masked
        })
        .into_owned()
}

/// 日志行是否只有日期前缀
///
/// 先做日期掩码，再检查掩码后的行是否只剩 `YYYY-MM-DD HH:mm[:ss][ Z][:]`。
pub fn is_date_only(text: &str) -> bool {
    let text = text.trim();
    let masked = mask_log_date(text);
    if masked == text {
        return false;
    }

    let Some(rest) = masked
        .strip_prefix("YYYY-MM-DD")
        .and_then(|rest| rest.strip_prefix(|c| c == ' ' || c == 'T'))
        .and_then(|rest| rest.strip_prefix("HH:mm"))
    else {
        return false;
    };
    let rest = rest.strip_prefix(":ss").unwrap_or(rest).trim_start();
    let rest = rest.strip_prefix('Z').unwrap_or(rest).trim();
    rest.is_empty() || rest == ":"
}

/// 事件标准化器
pub struct Normalizer {
    settings: Settings,
    clock: Arc<dyn Clock>,
}

impl Normalizer {
    pub fn new(settings: Settings, clock: Arc<dyn Clock>) -> Self {
        Self { settings, clock }
    }

    fn bucket(&self, class: &EventClass) -> i64 {
        let divisor = if self.settings.legacy_error_bucket && *class == EventClass::Error {
            LEGACY_ERROR_BUCKET_MILLIS
        } else {
            BUCKET_MILLIS
        };
        time_bucket(self.clock.now(), divisor)
    }

    /// 来源进程名；缺失时丢弃，来自自身的事件也丢弃
    fn foreign_source<'a>(&self, topic: &str, packet: &'a BusPacket) -> Option<&'a str> {
        let Some(name) = packet.process_name() else {
            warn!(topic = %topic, "Bus record without process name, dropped");
            return None;
        };
        if name == NOTIFIER_NAME {
            debug!(topic = %topic, "Ignoring event from the notifier itself");
            return None;
        }
        Some(name)
    }

    /// 标准化一条总线记录；被禁用、被过滤或字段缺失时返回 None
    pub fn normalize(&self, envelope: &BusEnvelope) -> Option<Message> {
        let packet = &envelope.data;
        let topic = envelope.topic.as_str();

        let (source, class, body) = match BusTopic::parse(topic) {
            BusTopic::LogOut if self.settings.log => {
                (self.foreign_source(topic, packet)?, EventClass::Log, self.log_text(packet)?)
            }
            BusTopic::LogErr if self.settings.error => {
                (self.foreign_source(topic, packet)?, EventClass::Error, self.log_text(packet)?)
            }
            BusTopic::Kill if self.settings.kill => (
                PM2_SOURCE,
                EventClass::Kill,
                packet.msg.clone().unwrap_or_default(),
            ),
            BusTopic::Exception if self.settings.exception => {
                let body = packet
                    .data
                    .as_ref()
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "null".to_string());
                (self.foreign_source(topic, packet)?, EventClass::Exception, body)
            }
            BusTopic::ProcessEvent => {
                let kind = packet.event.as_deref().filter(|e| !e.is_empty())?;
                if !self.settings.event_enabled(kind) {
                    return None;
                }
                let source = self.foreign_source(topic, packet)?;
                let body = format!(
                    "The following event has occurred on the PM2 process {}: {}",
                    source, kind
                );
                (source, EventClass::Event(kind.to_string()), body)
            }
            _ => return None,
        };

        let timestamp = self.bucket(&class);
        Some(Message::new(source, class, body, timestamp))
    }

    fn log_text(&self, packet: &BusPacket) -> Option<String> {
        let text = packet.text();
        if self.settings.skip_date_only_lines && is_date_only(&text) {
            debug!("Skipping date-only log line");
            return None;
        }
        Some(text)
    }
}
