//! 通知去重器 - 防止短时间内发送重复通知
//!
//! ## 去重策略
//! 1. key = `title:message` 的哈希（16 位十六进制）
//! 2. 30 秒时间窗口
//! 3. 每次检查时顺便清理过期记录
//!
//! 只保存在进程内存中。

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};
use tracing::debug;

/// 默认去重窗口
pub const DEDUP_WINDOW: Duration = Duration::from_secs(30);

/// 计算去重 key
pub fn dedup_key(title: &str, message: &str) -> String {
    let mut hasher = DefaultHasher::new();
    format!("{}:{}", title, message).hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// 通知去重器
pub struct NotificationDeduplicator {
    /// dedup key -> 最近一次发送时间
    recent: HashMap<String, Instant>,
    window: Duration,
}

impl NotificationDeduplicator {
    /// 创建新的去重器，使用默认 30 秒窗口
    pub fn new() -> Self {
        Self {
            recent: HashMap::new(),
            window: DEDUP_WINDOW,
        }
    }

    /// 设置去重窗口时长
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// 检查是否为窗口内的重复通知
    ///
    /// 返回 `true` 表示重复，应跳过。不会记录本次发送。
    pub fn is_duplicate(&mut self, title: &str, message: &str, now: Instant) -> bool {
        self.cleanup_expired(now);

        let key = dedup_key(title, message);
        match self.recent.get(&key) {
            Some(prev) if now.duration_since(*prev) < self.window => {
                debug!(
                    key = %key,
                    elapsed_secs = now.duration_since(*prev).as_secs(),
                    "Notification deduplicated (same title and message within window)"
                );
                true
            }
            _ => false,
        }
    }

    /// 记录一次发送
    pub fn record(&mut self, title: &str, message: &str, now: Instant) {
        self.recent.insert(dedup_key(title, message), now);
    }

    /// 检查并记录：返回 `true` 表示应该发送
    pub fn should_send(&mut self, title: &str, message: &str, now: Instant) -> bool {
        if self.is_duplicate(title, message, now) {
            return false;
        }
        self.record(title, message, now);
        true
    }

    /// 清理过期记录
    fn cleanup_expired(&mut self, now: Instant) {
        let window = self.window;
        self.recent
            .retain(|_, time| now.duration_since(*time) < window);
    }

    /// 清除所有记录
    pub fn clear(&mut self) {
        self.recent.clear();
    }

    /// 当前记录数
    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}

impl Default for NotificationDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}
