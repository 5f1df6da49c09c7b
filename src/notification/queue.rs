//! 消息队列 - 尾部追加、头部取出，出队时按时间窗口合并

use super::message::Message;
use std::collections::VecDeque;

/// FIFO 消息队列
#[derive(Debug, Default)]
pub struct MessageQueue {
    messages: VecDeque<Message>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加到队尾
    pub fn push(&mut self, message: Message) {
        self.messages.push_back(message);
    }

    /// 取出队头
    pub fn pop(&mut self) -> Option<Message> {
        self.messages.pop_front()
    }

    /// 查看队头
    pub fn peek(&self) -> Option<&Message> {
        self.messages.front()
    }

    /// 按位置查看（0 为队头）
    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 只保留前 `max` 条，返回丢弃的数量
    pub fn truncate(&mut self, max: usize) -> usize {
        let dropped = self.messages.len().saturating_sub(max);
        self.messages.truncate(max);
        dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// 取出队头，并合并紧随其后、同一时间窗口内、事件类别不同的消息
    ///
    /// 窗口为 `[head.timestamp, head.timestamp + window)`。遇到第一条不满足条件的
    /// 消息即停止，它留在队头等下一次出队。
    pub fn pop_and_coalesce(&mut self, window: i64, buffering: bool) -> Option<Message> {
        let mut head = self.pop()?;
        if !buffering {
            return Some(head);
        }

        let mut bodies = vec![std::mem::take(&mut head.body)];
        while let Some(next) = self.peek() {
            let in_window = next.timestamp >= head.timestamp && next.timestamp < head.timestamp + window;
            if !in_window || next.event_class == head.event_class {
                break;
            }
            if let Some(next) = self.pop() {
                bodies.push(next.body);
            }
        }

        head.body = bodies.join("\n");
        Some(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::message::EventClass;

    fn msg(body: &str, class: EventClass, ts: i64) -> Message {
        Message::new("api", class, body, ts)
    }

    #[test]
    fn test_fifo_without_buffering() {
        let mut queue = MessageQueue::new();
        for i in 0..5 {
            queue.push(msg(&format!("m{}", i), EventClass::Log, 100));
        }
        queue.push(msg("e", EventClass::Error, 100));

        let popped: Vec<String> = std::iter::from_fn(|| queue.pop_and_coalesce(2, false))
            .map(|m| m.body)
            .collect();

        assert_eq!(popped, vec!["m0", "m1", "m2", "m3", "m4", "e"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_coalesce_merges_different_classes_in_window() {
        let mut queue = MessageQueue::new();
        queue.push(msg("A", EventClass::Log, 100));
        queue.push(msg("B", EventClass::Error, 100));
        queue.push(msg("C", EventClass::Log, 110));

        let merged = queue.pop_and_coalesce(2, true).unwrap();
        assert_eq!(merged.body, "A\nB");
        assert_eq!(merged.event_class, EventClass::Log);
        assert_eq!(merged.timestamp, 100);

        // C 在窗口外，留在队头
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek().unwrap().body, "C");
    }

    #[test]
    fn test_coalesce_stops_at_same_class() {
        let mut queue = MessageQueue::new();
        queue.push(msg("A", EventClass::Log, 100));
        queue.push(msg("B", EventClass::Log, 100));
        queue.push(msg("C", EventClass::Error, 100));

        let merged = queue.pop_and_coalesce(2, true).unwrap();
        assert_eq!(merged.body, "A");
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_coalesce_window_is_half_open() {
        let mut queue = MessageQueue::new();
        queue.push(msg("A", EventClass::Log, 100));
        queue.push(msg("B", EventClass::Error, 101));
        queue.push(msg("C", EventClass::Exception, 102));

        let merged = queue.pop_and_coalesce(2, true).unwrap();
        assert_eq!(merged.body, "A\nB");
        assert_eq!(queue.peek().unwrap().body, "C");
    }

    #[test]
    fn test_coalesce_ignores_earlier_bucket() {
        let mut queue = MessageQueue::new();
        queue.push(msg("A", EventClass::Log, 100));
        queue.push(msg("B", EventClass::Error, 99));

        let merged = queue.pop_and_coalesce(2, true).unwrap();
        assert_eq!(merged.body, "A");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_coalesce_compares_against_original_head() {
        // A(log) B(error) C(log)：C 与队头类别相同，停止
        let mut queue = MessageQueue::new();
        queue.push(msg("A", EventClass::Log, 100));
        queue.push(msg("B", EventClass::Error, 100));
        queue.push(msg("C", EventClass::Log, 100));
        queue.push(msg("D", EventClass::Kill, 100));

        let merged = queue.pop_and_coalesce(2, true).unwrap();
        assert_eq!(merged.body, "A\nB");
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_pop_empty_queue() {
        let mut queue = MessageQueue::new();
        assert!(queue.pop_and_coalesce(2, true).is_none());
        assert!(queue.pop_and_coalesce(2, false).is_none());
    }

    #[test]
    fn test_truncate_keeps_oldest() {
        let mut queue = MessageQueue::new();
        for i in 0..15 {
            queue.push(msg(&i.to_string(), EventClass::Log, 100));
        }

        assert_eq!(queue.truncate(10), 5);
        assert_eq!(queue.len(), 10);
        assert_eq!(queue.peek().unwrap().body, "0");
        assert_eq!(queue.iter().last().unwrap().body, "9");
        assert_eq!(queue.truncate(10), 0);
    }
}
