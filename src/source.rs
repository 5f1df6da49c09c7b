//! 事件源 - 逐行读取总线记录，标准化后交给投递泵

use crate::event::{parse_line, Normalizer};
use crate::notification::message::Message;
use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// 读取直到输入结束，返回转发的消息数
///
/// 单行格式错误（包括非 UTF-8 内容）只记录日志并跳过；泵已退出时提前返回。
pub async fn read_events<R>(
    reader: R,
    normalizer: &Normalizer,
    sink: mpsc::UnboundedSender<Message>,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.split(b'\n');
    let mut forwarded = 0;

    while let Some(raw) = lines.next_segment().await? {
        // 非 UTF-8 字节替换为 U+FFFD，不中断读取
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let envelope = match parse_line(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Skipping malformed bus record");
                continue;
            }
        };

        let Some(message) = normalizer.normalize(&envelope) else {
            debug!(topic = %envelope.topic, "Bus record filtered");
            continue;
        };

        if sink.send(message).is_err() {
            debug!("Delivery pump gone, stop reading events");
            break;
        }
        forwarded += 1;
    }

    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Settings;
    use crate::notification::message::EventClass;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_read_events_skips_bad_lines() {
        let input = concat!(
            "{\"topic\":\"log:err\",\"data\":{\"process\":{\"name\":\"api\"},\"data\":\"boom\"}}\n",
            "\n",
            "garbage\n",
            "{\"topic\":\"log:out\",\"data\":{\"process\":{\"name\":\"api\"},\"data\":\"filtered\"}}\n",
            "{\"topic\":\"pm2:kill\",\"data\":{\"msg\":\"bye\"}}\n",
        );
        let normalizer = Normalizer::new(Settings::default(), Arc::new(ManualClock::at_millis(0)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let forwarded = read_events(input.as_bytes(), &normalizer, tx).await.unwrap();

        // 默认配置不转发 log:out
        assert_eq!(forwarded, 2);
        assert_eq!(rx.recv().await.unwrap().event_class, EventClass::Error);
        assert_eq!(rx.recv().await.unwrap().event_class, EventClass::Kill);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_read_events_survives_invalid_utf8_line() {
        let mut input = Vec::new();
        input.extend_from_slice(b"{\"topic\":\"pm2:kill\",\"data\":{\"msg\":\"a\"}}\n");
        input.extend_from_slice(b"\xff\xfe garbage\n");
        input.extend_from_slice(b"{\"topic\":\"pm2:kill\",\"data\":{\"msg\":\"b\xff\"}}\n");
        input.extend_from_slice(b"{\"topic\":\"pm2:kill\",\"data\":{\"msg\":\"c\"}}\n");
        let normalizer = Normalizer::new(Settings::default(), Arc::new(ManualClock::at_millis(0)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let forwarded = read_events(input.as_slice(), &normalizer, tx).await.unwrap();

        assert_eq!(forwarded, 3);
        let mut bodies = Vec::new();
        while let Some(message) = rx.recv().await {
            bodies.push(message.body);
        }
        assert_eq!(bodies, vec!["a", "b\u{FFFD}", "c"]);
    }

    #[tokio::test]
    async fn test_read_events_stops_when_pump_gone() {
        let input = "{\"topic\":\"pm2:kill\",\"data\":{\"msg\":\"a\"}}\n{\"topic\":\"pm2:kill\",\"data\":{\"msg\":\"b\"}}\n";
        let normalizer = Normalizer::new(Settings::default(), Arc::new(ManualClock::at_millis(0)));
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let forwarded = read_events(input.as_bytes(), &normalizer, tx).await.unwrap();
        assert_eq!(forwarded, 0);
    }
}
