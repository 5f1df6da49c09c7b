//! pm2 Telegram Notify - 把 pm2 进程事件转发到 Telegram

pub mod clock;
pub mod config;
pub mod event;
pub mod notification;
pub mod source;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{NotifyConfig, Settings, NOTIFIER_NAME};
pub use event::{BusEnvelope, BusPacket, Normalizer};
pub use notification::{
    EventClass, Message, MessageQueue, NotificationChannel, NotificationMessage, Notifier,
    OverflowGuard, SendResult, TelegramChannel, TelegramConfig,
};
pub use source::read_events;
