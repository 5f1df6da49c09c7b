//! 配置加载 - 从 JSON 文件和环境变量读取，启动时解析一次
//!
//! 查找顺序：
//! 1. `--config <path>` 指定的文件
//! 2. `~/.config/pm2-telegram-notify/config.json`
//! 3. 默认值
//!
//! 环境变量 `PTN_TELEGRAM_URL` / `PTN_CHAT_ID` 覆盖文件中的值。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// 本通知器自身的进程名，来自该进程的事件不会被转发
pub const NOTIFIER_NAME: &str = "pm2-telegram-notify";

pub const DEFAULT_BUFFER_SECONDS: i64 = 2;
pub const DEFAULT_QUEUE_MAX: usize = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

const ENV_TELEGRAM_URL: &str = "PTN_TELEGRAM_URL";
const ENV_CHAT_ID: &str = "PTN_CHAT_ID";

/// 原始配置（与配置文件一一对应）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// 完整的 sendMessage URL，如 https://api.telegram.org/bot<TOKEN>/sendMessage
    pub telegram_url: Option<String>,
    pub chat_id: Option<String>,
    /// 是否启用合并缓冲
    pub buffer: bool,
    pub buffer_seconds: i64,
    pub queue_max: i64,
    pub log: bool,
    pub error: bool,
    pub kill: bool,
    pub exception: bool,
    /// HTTP 请求超时（秒）
    pub timeout_secs: u64,
    /// 复现 error 事件使用 99999 作为分桶除数的旧行为
    pub legacy_error_bucket: bool,
    /// 丢弃只有日期前缀的日志行
    pub skip_date_only_lines: bool,
    /// 其余键：按 pm2 事件类型开关（如 `"restart": true`）
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            telegram_url: None,
            chat_id: None,
            buffer: true,
            buffer_seconds: DEFAULT_BUFFER_SECONDS,
            queue_max: DEFAULT_QUEUE_MAX as i64,
            log: false,
            error: true,
            kill: true,
            exception: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            legacy_error_bucket: false,
            skip_date_only_lines: true,
            extra: BTreeMap::new(),
        }
    }
}

impl NotifyConfig {
    /// 默认配置文件路径
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| {
            home.join(".config")
                .join(NOTIFIER_NAME)
                .join("config.json")
        })
    }

    /// 从指定文件加载
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: NotifyConfig = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// 按查找顺序加载，并应用环境变量覆盖
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// 应用环境变量覆盖（lookup 便于测试注入）
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_TELEGRAM_URL).filter(|v| !v.trim().is_empty()) {
            self.telegram_url = Some(url);
        }
        if let Some(chat_id) = lookup(ENV_CHAT_ID).filter(|v| !v.trim().is_empty()) {
            self.chat_id = Some(chat_id);
        }
    }

    /// 解析为管线使用的设置
    pub fn resolve(&self) -> Settings {
        let event_toggles = self
            .extra
            .iter()
            .filter(|(_, value)| is_truthy(value))
            .map(|(key, _)| key.clone())
            .collect();

        Settings {
            telegram_url: self
                .telegram_url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            chat_id: self.chat_id.clone().unwrap_or_default(),
            buffer: self.buffer,
            buffer_seconds: clamp_buffer_seconds(self.buffer_seconds),
            queue_max: clamp_queue_max(self.queue_max),
            log: self.log,
            error: self.error,
            kill: self.kill,
            exception: self.exception,
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            legacy_error_bucket: self.legacy_error_bucket,
            skip_date_only_lines: self.skip_date_only_lines,
            event_toggles,
        }
    }
}

/// 解析后的设置
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub telegram_url: Option<String>,
    pub chat_id: String,
    pub buffer: bool,
    pub buffer_seconds: i64,
    pub queue_max: usize,
    pub log: bool,
    pub error: bool,
    pub kill: bool,
    pub exception: bool,
    #[serde(skip)]
    pub timeout: Duration,
    pub legacy_error_bucket: bool,
    pub skip_date_only_lines: bool,
    /// 已启用的 pm2 事件类型
    pub event_toggles: Vec<String>,
}

impl Settings {
    /// 该 pm2 事件类型是否启用
    pub fn event_enabled(&self, event_type: &str) -> bool {
        self.event_toggles.iter().any(|t| t == event_type)
    }
}

impl Default for Settings {
    fn default() -> Self {
        NotifyConfig::default().resolve()
    }
}

/// buffer_seconds 只接受 (0, 5) 开区间，否则回退到默认值
pub fn clamp_buffer_seconds(value: i64) -> i64 {
    if value > 0 && value < 5 {
        value
    } else {
        DEFAULT_BUFFER_SECONDS
    }
}

/// queue_max 只接受 [10, 100]，否则回退到默认值
pub fn clamp_queue_max(value: i64) -> usize {
    if value > 9 && value <= 100 {
        value as usize
    } else {
        DEFAULT_QUEUE_MAX
    }
}

/// 配置值是否为真（pm2 的模块配置常以字符串形式保存布尔值）
fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        serde_json::Value::String(s) => {
            let s = s.trim();
            !s.is_empty() && s != "false" && s != "0"
        }
        serde_json::Value::Null => false,
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}
