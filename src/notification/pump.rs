//! 投递泵 - 固定间隔出队、格式化并发送
//!
//! 队列和抑制状态只归 `Notifier` 所有。事件源在独立任务中运行，通过 mpsc 通道把
//! 标准化后的消息交给泵；泵在同一个任务里交替处理入队和 tick，因此无需加锁。

use super::channel::{NotificationChannel, NotificationMessage};
use super::formatter;
use super::message::Message;
use super::queue::MessageQueue;
use super::throttle::OverflowGuard;
use crate::clock::Clock;
use crate::config::Settings;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// 默认 tick 间隔
pub const TICK_INTERVAL: Duration = Duration::from_secs(10);

/// 单个 tick 的处理结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// 本次交给渠道的通知
    pub dispatched: Vec<NotificationMessage>,
    /// 溢出丢弃的消息数
    pub dropped: usize,
}

/// 通知器上下文
pub struct Notifier {
    settings: Settings,
    queue: MessageQueue,
    guard: OverflowGuard,
    channel: Arc<dyn NotificationChannel>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
}

impl Notifier {
    pub fn new(settings: Settings, channel: Arc<dyn NotificationChannel>, clock: Arc<dyn Clock>) -> Self {
        let guard = OverflowGuard::new(settings.queue_max, clock.now());
        Self {
            settings,
            queue: MessageQueue::new(),
            guard,
            channel,
            clock,
            tick_interval: TICK_INTERVAL,
        }
    }

    /// 自定义 tick 间隔
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    pub fn is_suppressed(&self) -> bool {
        self.guard.is_suppressed()
    }

    /// 入队（追加到队尾）
    pub fn push(&mut self, message: Message) {
        debug!(
            source = %message.source_name,
            event = %message.event_class,
            queue_len = self.queue.len() + 1,
            "Message queued"
        );
        self.queue.push(message);
    }

    /// 执行一次 tick：至多发送一条（可能是合并后的）消息，然后做溢出检查
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        if let Some(outbound) = self.next_outbound() {
            self.dispatch(outbound, &mut report);
        }

        let outcome = self.guard.check(&mut self.queue, self.clock.now());
        report.dropped = outcome.dropped;
        if let Some(notice) = outcome.notice {
            let outbound = NotificationMessage::new(
                formatter::render(&notice),
                notice.source_name.clone(),
                notice.event_class.to_string(),
            );
            self.dispatch(outbound, &mut report);
        }

        report
    }

    /// 出队并渲染下一条通知
    ///
    /// 队头两条构成 log/error 配对时优先发送配对通知，不参与合并；
    /// 否则按时间窗口合并，再与新的队头检查一次配对。
    fn next_outbound(&mut self) -> Option<NotificationMessage> {
        let head_pair = match (self.queue.peek(), self.queue.get(1)) {
            (Some(first), Some(second)) => formatter::is_related_pair(first, second),
            _ => false,
        };
        if head_pair {
            let first = self.queue.pop()?;
            let second = self.queue.pop()?;
            return Some(Self::paired(&first, &second));
        }

        let message = self
            .queue
            .pop_and_coalesce(self.settings.buffer_seconds, self.settings.buffer)?;
        let related = self
            .queue
            .peek()
            .is_some_and(|head| formatter::is_related_pair(&message, head));
        let outbound = match related.then(|| self.queue.pop()).flatten() {
            Some(head) => Self::paired(&message, &head),
            None => NotificationMessage::new(
                formatter::render(&message),
                message.source_name.clone(),
                message.event_class.to_string(),
            ),
        };
        Some(outbound)
    }

    fn paired(current: &Message, head: &Message) -> NotificationMessage {
        NotificationMessage::new(
            formatter::render_pair(current, head),
            current.source_name.clone(),
            "error",
        )
    }

    fn dispatch(&self, message: NotificationMessage, report: &mut TickReport) {
        if let Err(e) = self.channel.send_async(message.clone()) {
            warn!(channel = self.channel.name(), error = %e, "Channel async send failed");
        }
        report.dispatched.push(message);
    }

    /// 主循环：接收事件并按固定间隔投递
    ///
    /// 事件源关闭后继续 tick 直到队列清空再返回。
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<Message>) {
        let mut interval = tokio::time::interval_at(
            tokio::time::Instant::now() + self.tick_interval,
            self.tick_interval,
        );
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.tick_interval.as_secs(),
            queue_max = self.settings.queue_max,
            buffer = self.settings.buffer,
            buffer_seconds = self.settings.buffer_seconds,
            "Delivery pump started"
        );

        let mut source_open = true;
        loop {
            tokio::select! {
                received = events.recv(), if source_open => match received {
                    Some(message) => self.push(message),
                    None => {
                        info!(pending = self.queue.len(), "Event source closed");
                        source_open = false;
                    }
                },
                _ = interval.tick() => {
                    self.tick();
                }
            }

            if !source_open && self.queue.is_empty() {
                info!("Queue drained, delivery pump stopping");
                break;
            }
        }
    }
}
