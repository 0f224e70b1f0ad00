//! 时钟抽象 - 让重试退避、去重窗口和轮询等待可以在测试中被模拟
//!
//! 生产环境使用 [`SystemClock`]（真实 sleep），测试使用 [`ManualClock`]，
//! `sleep` 只推进虚拟时间，不会真正阻塞线程。

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 时间来源
pub trait Clock: Send + Sync {
    /// 当前墙上时间（用于日志时间戳和 `since=` 轮询参数）
    fn now(&self) -> DateTime<Utc>;

    /// 单调时间（用于窗口和超时计算）
    fn instant(&self) -> Instant;

    /// 阻塞等待
    fn sleep(&self, duration: Duration);
}

/// 真实系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// 手动时钟 - `sleep` 立即返回并推进虚拟时间
pub struct ManualClock {
    base_instant: Instant,
    base_time: DateTime<Utc>,
    offset: Mutex<Duration>,
    slept: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// 从指定墙上时间开始
    pub fn starting_at(time: DateTime<Utc>) -> Self {
        Self {
            base_instant: Instant::now(),
            base_time: time,
            offset: Mutex::new(Duration::ZERO),
            slept: Mutex::new(Vec::new()),
        }
    }

    /// 手动推进时间（不计入 sleep 记录）
    pub fn advance(&self, duration: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += duration;
    }

    /// 自创建以来经过的虚拟时间
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 所有 sleep 调用的时长，按调用顺序
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let offset = self.elapsed();
        self.base_time + chrono::Duration::from_std(offset).unwrap_or_else(|_| chrono::Duration::zero())
    }

    fn instant(&self) -> Instant {
        self.base_instant + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.slept
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
        self.advance(duration);
    }
}
