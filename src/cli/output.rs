//! Output formatting for CLI commands

use serde::Serialize;

use crate::notification::{DeliveryReport, NotificationLogEntry};

/// --json 输出：格式化的 JSON
pub fn format_output<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// ✓ / ✗ 状态行
pub fn status_line(success: bool, message: &str) -> String {
    if success {
        format!("✓ {}", message)
    } else {
        format!("✗ {}", message)
    }
}

/// 打印投递结果，返回是否成功
pub fn print_report(report: &DeliveryReport, json: bool) -> bool {
    if json {
        println!("{}", format_output(report));
    } else if report.skipped {
        println!("- {}", report.message);
    } else if report.success {
        println!("{}", status_line(true, &report.message));
    } else {
        eprintln!("{}", status_line(false, &report.message));
    }
    report.success
}

/// 一行一条历史记录
pub fn format_entry(entry: &NotificationLogEntry) -> String {
    let mark = if entry.success { "✓" } else { "✗" };
    let mut line = format!(
        "{} {} {} [{}] {}",
        mark,
        entry.local_date(),
        entry.local_time(),
        entry.priority,
        entry.title
    );
    if let Some(error) = &entry.error {
        line.push_str(&format!(" ({})", error));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Priority;
    use chrono::Utc;

    #[test]
    fn test_status_line() {
        assert_eq!(status_line(true, "sent"), "✓ sent");
        assert_eq!(status_line(false, "boom"), "✗ boom");
    }

    #[test]
    fn test_format_output_is_pretty_json() {
        let out = format_output(&serde_json::json!({"topic": "alerts", "count": 2}));
        assert!(out.contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["topic"], "alerts");
        assert_eq!(parsed["count"], 2);
    }

    #[test]
    fn test_format_entry_shows_error() {
        let entry = NotificationLogEntry::new("Deploy", "done", Priority::High, vec![], Utc::now())
            .with_outcome(false, Some("HTTP 500".to_string()), 3);
        let line = format_entry(&entry);
        assert!(line.starts_with("✗ "));
        assert!(line.contains("[high] Deploy"));
        assert!(line.ends_with("(HTTP 500)"));
    }
}
