//! 溢出保护 - 限制队列深度，每个抑制周期只发一条抑制通知

use super::message::{time_bucket, EventClass, Message, BUCKET_MILLIS};
use super::queue::MessageQueue;
use crate::config::NOTIFIER_NAME;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

/// 抑制通知正文
pub const SUPPRESSION_NOTICE: &str = "Messages are being suppressed due to rate limiting.";

/// 抑制冷却时间（秒）
pub const SUPPRESSION_COOLDOWN_SECS: i64 = 60;

/// 抑制状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuppressionState {
    pub active: bool,
    pub activated_at: DateTime<Utc>,
}

/// 单次检查的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverflowOutcome {
    /// 新进入抑制周期时产生的抑制通知
    pub notice: Option<Message>,
    /// 被丢弃的消息数
    pub dropped: usize,
}

/// 溢出保护
#[derive(Debug)]
pub struct OverflowGuard {
    queue_max: usize,
    cooldown: Duration,
    state: SuppressionState,
}

impl OverflowGuard {
    pub fn new(queue_max: usize, now: DateTime<Utc>) -> Self {
        Self {
            queue_max,
            cooldown: Duration::seconds(SUPPRESSION_COOLDOWN_SECS),
            state: SuppressionState {
                active: false,
                activated_at: now,
            },
        }
    }

    pub fn state(&self) -> SuppressionState {
        self.state
    }

    pub fn is_suppressed(&self) -> bool {
        self.state.active
    }

    /// 每个 tick 调用一次
    ///
    /// 超过上限时：若未处于抑制状态则进入抑制并产生一条通知（边沿触发），
    /// 然后无条件截断到前 `queue_max` 条。冷却检查独立进行。
    pub fn check(&mut self, queue: &mut MessageQueue, now: DateTime<Utc>) -> OverflowOutcome {
        let mut outcome = OverflowOutcome::default();

        if queue.len() > self.queue_max {
            if !self.state.active {
                self.state = SuppressionState {
                    active: true,
                    activated_at: now,
                };
                outcome.notice = Some(Message::new(
                    NOTIFIER_NAME,
                    EventClass::Suppressed,
                    SUPPRESSION_NOTICE,
                    time_bucket(now, BUCKET_MILLIS),
                ));
                info!(queue_len = queue.len(), queue_max = self.queue_max, "Suppression started");
            }
            outcome.dropped = queue.truncate(self.queue_max);
            warn!(dropped = outcome.dropped, "Queue overflow, messages dropped");
        }

        if self.state.active && now - self.state.activated_at > self.cooldown {
            self.state.active = false;
            info!("Suppression cooldown elapsed");
        }

        outcome
    }
}
