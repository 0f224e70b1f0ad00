//! 可靠投递 - 去重、重试、写前日志和兜底文件
//!
//! `Notifier` 是整个发送管道的上下文对象，持有发送端、去重器、时钟、
//! 历史和兜底日志，取代进程级全局变量。

use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use super::deduplicator::NotificationDeduplicator;
use super::fallback::FallbackLog;
use super::history::{HistoryLog, NotificationLogEntry};
use super::message::NotificationRequest;
use super::priority::{classify_priority, classify_tags, Priority};
use super::relay::Relay;
use super::sender::{SendOutcome, Sender};
use crate::clock::Clock;
use crate::config::{Config, ConfigStore, NotifyPaths};

/// 默认最大尝试次数
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// 批量消息中每条正文保留的字符数
const BATCH_ITEM_CHARS: usize = 200;

/// 投递选项
#[derive(Debug, Clone)]
pub struct DeliveryOptions {
    /// 最大尝试次数，0 按 1 处理
    pub max_retries: u32,
    /// 跳过 30 秒去重检查
    pub allow_duplicate: bool,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            allow_duplicate: false,
        }
    }
}

impl DeliveryOptions {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn allow_duplicate(mut self, allow: bool) -> Self {
        self.allow_duplicate = allow;
        self
    }
}

/// 投递结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub success: bool,
    pub message: String,
    /// 实际尝试次数（去重跳过时为 0）
    pub attempts: u32,
    pub skipped: bool,
    /// 对应的历史记录 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
}

/// 批量发送结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub success: bool,
    pub message: String,
    pub count: usize,
}

#[derive(Debug, Clone)]
struct QueuedNotification {
    title: String,
    message: String,
    priority: Priority,
}

/// 通知投递上下文
pub struct Notifier {
    paths: NotifyPaths,
    sender: Sender,
    clock: Arc<dyn Clock>,
    dedup: Mutex<NotificationDeduplicator>,
    queue: Mutex<Vec<QueuedNotification>>,
}

impl Notifier {
    pub(crate) fn from_parts(
        paths: NotifyPaths,
        relay: Arc<dyn Relay>,
        clock: Arc<dyn Clock>,
        dedup: NotificationDeduplicator,
    ) -> Self {
        let sender = Sender::new(ConfigStore::new(paths.config.clone()), relay, clock.clone());
        Self {
            paths,
            sender,
            clock,
            dedup: Mutex::new(dedup),
            queue: Mutex::new(Vec::new()),
        }
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn paths(&self) -> &NotifyPaths {
        &self.paths
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> Config {
        self.sender.config()
    }

    /// 按当前配置打开历史记录
    pub fn history(&self) -> HistoryLog {
        let config = self.config();
        HistoryLog::new(self.paths.history(&config.logging))
            .with_max_entries(config.logging.max_history)
            .with_clock(self.clock.clone())
    }

    pub fn fallback_log(&self) -> FallbackLog {
        FallbackLog::new(self.paths.fallback_log.clone())
    }

    /// 可靠投递：去重 → 自动分类 → 写前日志 → 重试 → 兜底
    pub fn ensure_delivery(&self, request: NotificationRequest, options: &DeliveryOptions) -> DeliveryReport {
        if !options.allow_duplicate {
            let mut dedup = self.dedup.lock().unwrap_or_else(|e| e.into_inner());
            if !dedup.should_send(&request.title, &request.message, self.clock.instant()) {
                info!(title = %request.title, "Duplicate notification suppressed");
                return DeliveryReport {
                    success: true,
                    message: "Duplicate suppressed".to_string(),
                    attempts: 0,
                    skipped: true,
                    entry_id: None,
                };
            }
        }

        let request = classify(request);
        let entry_id = self.write_ahead(&request);

        let max_attempts = options.max_retries.max(1);
        let mut attempts = 0;
        let mut last_error = String::new();
        let mut exhausted = true;

        for attempt in 1..=max_attempts {
            attempts = attempt;
            let outcome = if attempt > 1 {
                self.sender.send(&request.clone().with_bypass_rate_limit(true))
            } else {
                self.sender.send(&request)
            };

            if outcome.success {
                info!(title = %request.title, attempt, "Notification delivered");
                self.complete_entry(entry_id.as_deref(), true, None, attempt);
                return DeliveryReport {
                    success: true,
                    message: outcome.message,
                    attempts: attempt,
                    skipped: false,
                    entry_id,
                };
            }

            warn!(attempt, max_attempts, error = %outcome.message, "Delivery attempt failed");
            last_error = outcome.message;

            if !outcome.retryable {
                exhausted = false;
                break;
            }

            if attempt < max_attempts {
                let wait = Duration::from_secs(1u64 << attempt.min(16));
                info!(wait_secs = wait.as_secs(), "Retrying after backoff");
                self.clock.sleep(wait);
            }
        }

        self.complete_entry(entry_id.as_deref(), false, Some(last_error.clone()), attempts);
        self.fallback_log()
            .record_or_warn(&request.title, &request.message, &last_error, self.clock.now());

        let message = if exhausted {
            format!("All {} attempts failed: {}", attempts, last_error)
        } else {
            last_error
        };
        DeliveryReport {
            success: false,
            message,
            attempts,
            skipped: false,
            entry_id,
        }
    }

    /// 默认选项的可靠投递
    pub fn ensure(&self, title: &str, message: &str) -> DeliveryReport {
        self.ensure_delivery(NotificationRequest::new(title, message), &DeliveryOptions::default())
    }

    /// 单次发送并记录历史（不去重、不重试）
    pub fn send_once(&self, request: &NotificationRequest) -> SendOutcome {
        let outcome = self.sender.send(request);
        let config = self.config();
        if config.logging.enabled {
            let priority = request.priority.unwrap_or(config.default_priority);
            let entry = NotificationLogEntry::new(
                request.title.clone(),
                &request.message,
                priority,
                request.tags.clone(),
                self.clock.now(),
            )
            .with_outcome(
                outcome.success,
                (!outcome.success).then(|| outcome.message.clone()),
                1,
            );
            if let Err(e) = self.history().log(entry) {
                warn!(error = %e, "Failed to log notification");
            }
        }
        outcome
    }

    /// 任务完成
    pub fn task_complete(&self, task: &str, details: &str, duration: Option<&str>) -> DeliveryReport {
        let mut message = if details.is_empty() {
            "Task completed successfully.".to_string()
        } else {
            details.to_string()
        };
        if let Some(duration) = duration {
            message.push_str(&format!("\n\nDuration: {}", duration));
        }
        self.deliver_kind("task_complete", format!("Task Complete: {}", task), message, false)
    }

    /// 需要用户操作（总是发送）
    pub fn action_required(&self, action: &str, details: &str, options: &[String]) -> DeliveryReport {
        let mut message = details.to_string();
        if !options.is_empty() {
            message.push_str("\n\nOptions:\n");
            message.push_str(&numbered_options(options));
        }
        message.push_str("\n\nPlease respond in your terminal.");
        self.deliver_kind("action_required", format!("ACTION REQUIRED: {}", action), message, true)
    }

    /// 卡住了
    pub fn blocked(&self, blocker: &str, details: &str, suggestion: Option<&str>) -> DeliveryReport {
        let mut message = details.to_string();
        if let Some(suggestion) = suggestion {
            message.push_str(&format!("\n\nTo fix:\n{}", suggestion));
        }
        self.deliver_kind("blocked", format!("BLOCKED: {}", blocker), message, true)
    }

    pub fn error(&self, kind: &str, details: &str) -> DeliveryReport {
        self.deliver_kind("error", format!("ERROR: {}", kind), details.to_string(), true)
    }

    pub fn info(&self, title: &str, message: &str) -> DeliveryReport {
        self.deliver_kind("info", title.to_string(), message.to_string(), false)
    }

    pub fn success(&self, title: &str, message: &str) -> DeliveryReport {
        self.deliver_kind("success", title.to_string(), message.to_string(), false)
    }

    /// 加入批量队列
    pub fn queue(&self, title: &str, message: &str, priority: Priority) {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.push(QueuedNotification {
            title: title.to_string(),
            message: message.to_string(),
            priority,
        });
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 合并队列中的通知为一条发送，然后清空队列
    pub fn flush_queue(&self) -> BatchReport {
        let items = std::mem::take(&mut *self.queue.lock().unwrap_or_else(|e| e.into_inner()));
        if items.is_empty() {
            return BatchReport {
                success: true,
                message: "Queue empty".to_string(),
                count: 0,
            };
        }

        let count = items.len();
        let mut message = format!("Batch of {} notifications:\n\n", count);
        for (i, item) in items.iter().enumerate() {
            let body: String = item.message.chars().take(BATCH_ITEM_CHARS).collect();
            message.push_str(&format!("--- {}. {} ---\n{}\n\n", i + 1, item.title, body));
        }

        // 批量消息取队列中的最高优先级
        let priority = items.iter().map(|i| i.priority).max().unwrap_or_default();
        let request = NotificationRequest::new(format!("Batch Update: {} items", count), message)
            .with_priority(priority)
            .with_tags(["package", "computer"]);
        let report = self.ensure_delivery(request, &DeliveryOptions::default());

        BatchReport {
            success: report.success,
            message: report.message,
            count,
        }
    }

    fn deliver_kind(&self, kind: &str, title: String, message: String, allow_duplicate: bool) -> DeliveryReport {
        let config = self.config();
        let (default_priority, default_tags) = kind_defaults(kind);
        let request = NotificationRequest::new(title, message)
            .with_priority(config.priority_for(kind, default_priority))
            .with_tags(config.tags_for(kind, default_tags));
        self.ensure_delivery(
            request,
            &DeliveryOptions::default().allow_duplicate(allow_duplicate),
        )
    }

    /// 发送前写入历史；返回条目 ID
    fn write_ahead(&self, request: &NotificationRequest) -> Option<String> {
        let config = self.config();
        if !config.logging.enabled {
            return None;
        }
        let entry = NotificationLogEntry::new(
            request.title.clone(),
            &request.message,
            request.priority.unwrap_or(config.default_priority),
            request.tags.clone(),
            self.clock.now(),
        );
        let id = entry.id.clone();
        match self.history().log(entry) {
            Ok(()) => Some(id),
            Err(e) => {
                warn!(error = %e, "Failed to write history entry before delivery");
                None
            }
        }
    }

    fn complete_entry(&self, id: Option<&str>, success: bool, error: Option<String>, attempts: u32) {
        let Some(id) = id else { return };
        if let Err(e) = self.history().complete(id, success, error, attempts) {
            warn!(error = %e, "Failed to update history entry");
        }
    }
}

/// 未指定优先级/标签时按标题关键词推断
fn classify(mut request: NotificationRequest) -> NotificationRequest {
    if request.priority.is_none() {
        request.priority = Some(classify_priority(&request.title));
    }
    if request.tags.is_empty() {
        request.tags = classify_tags(&request.title);
    }
    request
}

fn kind_defaults(kind: &str) -> (Priority, &'static [&'static str]) {
    let (priority, tags): (Priority, &'static [&'static str]) = match kind {
        "task_complete" => (Priority::High, &["white_check_mark", "computer"][..]),
        "action_required" => (Priority::Urgent, &["warning", "bell"][..]),
        "blocked" => (Priority::High, &["x", "stop_sign"][..]),
        "error" => (Priority::High, &["rotating_light", "skull"][..]),
        "success" => (Priority::Default, &["tada", "rocket"][..]),
        _ => (Priority::Default, &["information_source"][..]),
    };
    (priority, tags)
}

/// `  1. Yes\n  2. No`
pub fn numbered_options(options: &[String]) -> String {
    options
        .iter()
        .enumerate()
        .map(|(i, opt)| format!("  {}. {}", i + 1, opt))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_fills_missing_fields_only() {
        let req = classify(NotificationRequest::new("ERROR: Build", "x"));
        assert_eq!(req.priority, Some(Priority::High));
        assert_eq!(req.tags, vec!["rotating_light", "skull"]);

        let req = classify(
            NotificationRequest::new("ERROR: Build", "x")
                .with_priority(Priority::Low)
                .with_tags(["custom"]),
        );
        assert_eq!(req.priority, Some(Priority::Low));
        assert_eq!(req.tags, vec!["custom"]);
    }

    #[test]
    fn test_numbered_options() {
        let options = vec!["Yes".to_string(), "No".to_string()];
        assert_eq!(numbered_options(&options), "  1. Yes\n  2. No");
    }

    #[test]
    fn test_delivery_options_default() {
        let options = DeliveryOptions::default();
        assert_eq!(options.max_retries, 3);
        assert!(!options.allow_duplicate);
    }
}
