//! 自动通知钩子 - 任务开始/结束、工具失败、错误、需要输入、长任务
//!
//! 每个钩子先看配置里的 `auto_notify` 开关，再交给 [`Notifier`] 可靠投递。
//! 任务开始时间用注入的 [`Clock`](crate::clock::Clock) 记录，测试里可以用虚拟时间。

use chrono::Local;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::notification::delivery::{DeliveryOptions, DeliveryReport, Notifier};
use crate::notification::message::NotificationRequest;
use crate::notification::priority::Priority;

/// traceback 只保留最后这么多字符
const TRACEBACK_TAIL_CHARS: usize = 300;

/// 任务结束钩子的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskEnd {
    /// 有对应的开始记录时才有
    pub duration: Option<String>,
    pub notified: bool,
}

/// 工具执行结束钩子的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolReport {
    pub notified: bool,
    pub priority: Priority,
}

/// [`TaskHooks::run_task`] 的通知选项
#[derive(Debug, Clone, Copy)]
pub struct TaskOptions {
    pub notify_on_start: bool,
    pub notify_on_complete: bool,
    pub notify_on_error: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            notify_on_start: false,
            notify_on_complete: true,
            notify_on_error: true,
        }
    }
}

/// 自动通知钩子
pub struct TaskHooks<'a> {
    notifier: &'a Notifier,
    /// 任务 ID -> 开始时间
    started: Mutex<HashMap<String, Instant>>,
    counter: AtomicU64,
}

impl<'a> TaskHooks<'a> {
    pub fn new(notifier: &'a Notifier) -> Self {
        Self {
            notifier,
            started: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// 记录任务开始，返回任务 ID
    ///
    /// 只有 `notify` 为 true 且 `auto_notify.on_task_start` 打开时才发通知。
    pub fn on_task_start(&self, name: &str, task_id: Option<&str>, details: Option<&str>, notify: bool) -> String {
        let clock = self.notifier.clock();
        let task_id = match task_id {
            Some(id) => id.to_string(),
            None => {
                let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
                format!("task_{}_{}", n, clock.now().timestamp())
            }
        };
        self.started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task_id.clone(), clock.instant());
        debug!(task = %name, task_id = %task_id, "Task started");

        if notify && self.notifier.config().auto_notify.on_task_start {
            let message = match details {
                Some(details) => details.to_string(),
                None => format!(
                    "Started at {}",
                    clock.now().with_timezone(&Local).format("%H:%M:%S")
                ),
            };
            let request = NotificationRequest::new(format!("Task Started: {}", name), message)
                .with_priority(Priority::Low)
                .with_tags(["hourglass_flowing_sand", "computer"]);
            self.notifier.ensure_delivery(request, &DeliveryOptions::default());
        }
        task_id
    }

    /// 任务已运行时长；没有开始记录时返回 `None`
    pub fn elapsed(&self, task_id: &str) -> Option<Duration> {
        let started = *self
            .started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(task_id)?;
        Some(self.notifier.clock().instant().saturating_duration_since(started))
    }

    /// 任务结束：成功走 task_complete，失败走 blocked
    ///
    /// 两种情况都受 `auto_notify.on_task_complete` 控制。
    pub fn on_task_end(
        &self,
        name: &str,
        task_id: Option<&str>,
        success: bool,
        details: Option<&str>,
        notify: bool,
    ) -> TaskEnd {
        let duration = task_id
            .and_then(|id| {
                let started = self
                    .started
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(id)?;
                Some(self.notifier.clock().instant().saturating_duration_since(started))
            })
            .map(format_duration);

        let mut notified = false;
        if notify && self.notifier.config().auto_notify.on_task_complete {
            let report = if success {
                self.notifier.task_complete(
                    name,
                    details.unwrap_or("Completed successfully."),
                    duration.as_deref(),
                )
            } else {
                self.notifier.blocked(
                    &format!("Task Failed: {}", name),
                    details.unwrap_or("Task did not complete successfully."),
                    None,
                )
            };
            notified = report.success;
        }
        info!(task = %name, success, duration = ?duration, notified, "Task ended");
        TaskEnd { duration, notified }
    }

    /// 工具执行结束；只有失败且 `auto_notify.on_error` 打开时通知
    pub fn on_tool_complete(
        &self,
        tool: &str,
        success: bool,
        output: Option<&str>,
        error: Option<&str>,
    ) -> ToolReport {
        if success || !self.notifier.config().auto_notify.on_error {
            return ToolReport {
                notified: false,
                priority: Priority::Default,
            };
        }
        let details = error.or(output).unwrap_or("Tool execution failed.");
        let report = self.notifier.error(&format!("{} Failed", tool), details);
        ToolReport {
            notified: report.success,
            priority: Priority::High,
        }
    }

    /// 错误：可恢复的是 ERROR，不可恢复的是 CRITICAL（高优先级）
    pub fn on_error(&self, kind: &str, message: &str, traceback: Option<&str>, recoverable: bool) -> bool {
        if !self.notifier.config().auto_notify.on_error {
            return false;
        }
        let mut details = message.to_string();
        if let Some(traceback) = traceback {
            details.push_str("\n\nTraceback:\n");
            details.push_str(tail_chars(traceback, TRACEBACK_TAIL_CHARS));
        }
        let request = if recoverable {
            NotificationRequest::new(format!("ERROR: {}", kind), details)
                .with_priority(Priority::Default)
                .with_tags(["warning"])
        } else {
            NotificationRequest::new(format!("CRITICAL: {}", kind), details)
                .with_priority(Priority::High)
                .with_tags(["rotating_light", "skull"])
        };
        self.deliver(request).success
    }

    /// 需要用户输入（只通知，不等待回复）
    pub fn on_user_input_needed(
        &self,
        prompt: &str,
        options: &[String],
        context: Option<&str>,
        remind_after_minutes: Option<u32>,
    ) -> bool {
        if !self.notifier.config().auto_notify.on_action_required {
            return false;
        }
        let mut message = match context {
            Some(context) => format!("{}\n\n{}", context, prompt),
            None => prompt.to_string(),
        };
        if let Some(minutes) = remind_after_minutes {
            message.push_str(&format!("\n\n(Will remind in {} minutes if no response)", minutes));
        }
        self.notifier
            .action_required("User Input Needed", &message, options)
            .success
    }

    /// 长任务提醒；运行时间未到 `long_task_threshold_seconds` 时不发
    pub fn on_long_task(
        &self,
        name: &str,
        elapsed: Duration,
        estimated_remaining: Option<Duration>,
        progress_percent: Option<f64>,
    ) -> bool {
        let auto = self.notifier.config().auto_notify;
        if !auto.on_long_task || elapsed < Duration::from_secs(auto.long_task_threshold_seconds) {
            return false;
        }
        let mut message = format!("Task has been running for {}", format_duration(elapsed));
        if let Some(percent) = progress_percent {
            message.push_str(&format!("\n\nProgress: {:.1}%", percent));
        }
        if let Some(remaining) = estimated_remaining {
            message.push_str(&format!("\nEstimated remaining: {}", format_duration(remaining)));
        }
        let request = NotificationRequest::new(format!("Long Task: {}", name), message)
            .with_priority(Priority::Low)
            .with_tags(["hourglass", "computer"]);
        self.deliver(request).success
    }

    /// 用开始记录计算运行时间，再走 [`on_long_task`](Self::on_long_task)
    pub fn check_long_task(&self, name: &str, task_id: &str, progress_percent: Option<f64>) -> bool {
        match self.elapsed(task_id) {
            Some(elapsed) => self.on_long_task(name, elapsed, None, progress_percent),
            None => false,
        }
    }

    /// 跟踪一个任务：开始、执行、结束通知；结果原样返回
    pub fn run_task<T, E, F>(&self, name: &str, options: TaskOptions, f: F) -> Result<T, E>
    where
        E: Display,
        F: FnOnce() -> Result<T, E>,
    {
        let task_id = self.on_task_start(name, None, None, options.notify_on_start);
        let result = f();
        match &result {
            Ok(_) if options.notify_on_complete => {
                self.on_task_end(name, Some(task_id.as_str()), true, None, true);
            }
            Err(e) if options.notify_on_error => {
                let details = format!("Error: {}", e);
                self.on_task_end(name, Some(task_id.as_str()), false, Some(details.as_str()), true);
            }
            _ => {
                self.started
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&task_id);
            }
        }
        result
    }

    fn deliver(&self, request: NotificationRequest) -> DeliveryReport {
        self.notifier.ensure_delivery(request, &DeliveryOptions::default())
    }
}

/// `42.5s` / `2m 5s` / `1h 1m`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        return format!("{:.1}s", secs);
    }
    let whole = duration.as_secs();
    if whole < 3600 {
        format!("{}m {}s", whole / 60, whole % 60)
    } else {
        format!("{}h {}m", whole / 3600, (whole % 3600) / 60)
    }
}

fn tail_chars(text: &str, max: usize) -> &str {
    match text.char_indices().rev().nth(max.saturating_sub(1)) {
        Some((idx, _)) if max > 0 => &text[idx..],
        _ if max == 0 => "",
        _ => text,
    }
}
