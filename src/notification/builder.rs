//! Notifier 构建器 - 组装配置、relay、时钟和本地文件位置

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::deduplicator::{NotificationDeduplicator, DEDUP_WINDOW};
use super::delivery::Notifier;
use super::relay::{HttpRelay, Relay};
use crate::clock::{Clock, SystemClock};
use crate::config::NotifyPaths;

/// Notifier 构建器
pub struct NotifierBuilder {
    paths: Option<NotifyPaths>,
    relay: Option<Arc<dyn Relay>>,
    clock: Option<Arc<dyn Clock>>,
    dedup_window: Duration,
}

impl NotifierBuilder {
    pub fn new() -> Self {
        Self {
            paths: None,
            relay: None,
            clock: None,
            dedup_window: DEDUP_WINDOW,
        }
    }

    /// 设置本地文件位置（默认 `~/.config/ntfy-notify`）
    pub fn paths(mut self, paths: NotifyPaths) -> Self {
        self.paths = Some(paths);
        self
    }

    /// 设置 relay（默认 HTTP）
    pub fn relay(mut self, relay: Arc<dyn Relay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// 设置时钟（默认系统时钟）
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 设置去重窗口
    pub fn dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn build(self) -> Result<Notifier> {
        let paths = self.paths.unwrap_or_else(NotifyPaths::default_location);
        let relay: Arc<dyn Relay> = match self.relay {
            Some(relay) => relay,
            None => Arc::new(HttpRelay::new()?),
        };
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let dedup = NotificationDeduplicator::new().with_window(self.dedup_window);

        debug!(base_dir = %paths.base_dir.display(), "Building notifier");
        Ok(Notifier::from_parts(paths, relay, clock, dedup))
    }
}

impl Default for NotifierBuilder {
    fn default() -> Self {
        Self::new()
    }
}
