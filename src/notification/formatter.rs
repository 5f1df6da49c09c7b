//! 消息格式化 - 渲染为 Telegram markdown 文本

use super::message::{EventClass, Message};

/// 配对通知中每段摘录的最大字符数
pub const MAX_EXCERPT_CHARS: usize = 2000;

/// 按字符截断（不会切断 UTF-8 字符）
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// 渲染单条消息：`<source> - *<event>* - <body>`
pub fn render(message: &Message) -> String {
    format!(
        "{} - *{}* - {}",
        message.source_name, message.event_class, message.body
    )
}

/// 判断刚出队的消息与当前队头是否构成 log/error 配对
///
/// 两者必须一个是 log、一个是 error（顺序不限），且 log 的时间桶不晚于 error。
pub fn is_related_pair(current: &Message, head: &Message) -> bool {
    match (&current.event_class, &head.event_class) {
        (EventClass::Log, EventClass::Error) => current.timestamp <= head.timestamp,
        (EventClass::Error, EventClass::Log) => head.timestamp <= current.timestamp,
        _ => false,
    }
}

/// 渲染 log/error 配对通知
///
/// 以 log 的来源命名，先给出日志摘录，再以粗体给出错误摘录。
pub fn render_pair(current: &Message, head: &Message) -> String {
    let (log, error) = if current.event_class == EventClass::Log {
        (current, head)
    } else {
        (head, current)
    };

    format!(
        "{} - *{}* - {}\n *{}*",
        log.source_name,
        EventClass::Error,
        truncate_chars(&log.body, MAX_EXCERPT_CHARS),
        truncate_chars(&error.body, MAX_EXCERPT_CHARS),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_single() {
        let m = Message::new("api", EventClass::Exception, "{\"message\":\"boom\"}", 1);
        assert_eq!(render(&m), "api - *exception* - {\"message\":\"boom\"}");
    }

    #[test]
    fn test_render_generic_event() {
        let m = Message::new("worker", EventClass::Event("restart".to_string()), "restarted", 1);
        assert_eq!(render(&m), "worker - *event-restart* - restarted");
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("日志内容", 2), "日志");
        assert_eq!(truncate_chars("ab", 5), "ab");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn test_related_pair_requires_log_not_after_error() {
        let log = Message::new("api", EventClass::Log, "l", 100);
        let error = Message::new("api", EventClass::Error, "e", 100);
        let later_error = Message::new("api", EventClass::Error, "e", 101);
        let earlier_error = Message::new("api", EventClass::Error, "e", 99);

        assert!(is_related_pair(&log, &error));
        assert!(is_related_pair(&error, &log));
        assert!(is_related_pair(&log, &later_error));
        assert!(!is_related_pair(&log, &earlier_error));
        assert!(!is_related_pair(&earlier_error, &log));
    }

    #[test]
    fn test_unrelated_classes_never_pair() {
        let log = Message::new("api", EventClass::Log, "l", 100);
        let log2 = Message::new("api", EventClass::Log, "l2", 100);
        let kill = Message::new("PM2", EventClass::Kill, "k", 100);

        assert!(!is_related_pair(&log, &log2));
        assert!(!is_related_pair(&log, &kill));
        assert!(!is_related_pair(&kill, &log));
    }

    #[test]
    fn test_render_pair_truncates_each_part() {
        let long_log = "x".repeat(2500);
        let long_err = "y".repeat(2100);
        let log = Message::new("api", EventClass::Log, long_log, 100);
        let error = Message::new("api", EventClass::Error, long_err, 100);

        let text = render_pair(&error, &log);

        let expected = format!("api - *error* - {}\n *{}*", "x".repeat(2000), "y".repeat(2000));
        assert_eq!(text, expected);
    }
}
