//! 通知管线 - 队列、合并、限流与投递
//!
//! # 数据流
//! 1. `Normalizer` 把总线记录转换为 `Message` 并追加到队尾
//! 2. `Notifier` 每个 tick 出队一条（可能合并后的）消息交给渠道
//! 3. `OverflowGuard` 截断超长队列，每个抑制周期只发一条抑制通知

pub mod channel;
pub mod channels;
pub mod formatter;
pub mod message;
pub mod pump;
pub mod queue;
pub mod throttle;

pub use channel::{NotificationChannel, NotificationMessage, SendResult};
pub use channels::{TelegramChannel, TelegramConfig};
pub use message::{EventClass, Message};
pub use pump::{Notifier, TickReport, TICK_INTERVAL};
pub use queue::MessageQueue;
pub use throttle::{OverflowGuard, OverflowOutcome, SuppressionState};
